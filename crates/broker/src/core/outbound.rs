//! Outbound callback invocation.
//!
//! For callbacks the broker is an RPC client of each registered
//! listener: it connects to the socket derived from the client id,
//! caches the connection, and issues `WatchInvoke` / `ProvideInvoke`
//! requests over it. Every call is bounded by the configured timeout;
//! a timed-out call fails alone and poisons neither the connection nor
//! the subscription.

use std::sync::Arc;

use stash_proto::paths;
use stash_proto::protocol::StashProtocol;
use stash_proto::types::{ClientId, ErrorCode, Request, RequestPayload, ResponsePayload};
use stash_rpc::{CounterIdGen, MainLoop, Reject};
use tokio::io::BufReader;
use tokio::net::UnixStream;

use super::{BrokerCore, CallbackTarget, CallerSocket};

impl BrokerCore {
	/// Delivers one change notification to every target and waits for
	/// each acknowledgment.
	pub(crate) async fn notify_watchers(
		self: &Arc<Self>,
		targets: Vec<CallbackTarget>,
		path: &str,
		value: &[u8],
	) {
		for target in targets {
			self.notify_watcher(target, path, value).await;
		}
	}

	async fn notify_watcher(self: &Arc<Self>, target: CallbackTarget, path: &str, value: &[u8]) {
		let peer = match self.caller(target.client).await {
			Ok(peer) => peer,
			Err(err) => {
				tracing::warn!(client = target.client.0, error = %err, "cannot reach watcher listener");
				return;
			}
		};
		let req = Request::new(RequestPayload::WatchInvoke {
			path: path.to_string(),
			cb: target.cb,
			token: target.token,
			value: value.to_vec(),
		});
		match tokio::time::timeout(self.config.rpc_timeout, peer.request(req)).await {
			Ok(Ok(_)) => {}
			Ok(Err(err)) => {
				tracing::warn!(client = target.client.0, path, error = %err, "watch notification failed");
				self.drop_caller(target.client);
			}
			Err(_) => {
				tracing::warn!(client = target.client.0, path, "watch notification timed out");
			}
		}
	}

	/// Asks a provider for the value at `path`. `None` on any failure;
	/// GET then reports the value as absent.
	pub(crate) async fn call_provider(
		self: &Arc<Self>,
		target: CallbackTarget,
		path: &str,
	) -> Option<Vec<u8>> {
		let peer = match self.caller(target.client).await {
			Ok(peer) => peer,
			Err(err) => {
				tracing::warn!(client = target.client.0, error = %err, "cannot reach provider listener");
				return None;
			}
		};
		let req = Request::new(RequestPayload::ProvideInvoke {
			path: path.to_string(),
			cb: target.cb,
			token: target.token,
		});
		match tokio::time::timeout(self.config.rpc_timeout, peer.request(req)).await {
			Ok(Ok(ResponsePayload::Value { value })) if !value.is_empty() => Some(value),
			Ok(Ok(_)) => None,
			Ok(Err(err)) => {
				tracing::warn!(client = target.client.0, path, error = %err, "provider call failed");
				self.drop_caller(target.client);
				None
			}
			Err(_) => {
				tracing::warn!(client = target.client.0, path, "provider call timed out");
				None
			}
		}
	}

	/// The cached connection to a client listener, establishing it on
	/// first use.
	async fn caller(&self, client: ClientId) -> std::io::Result<CallerSocket> {
		if let Some(peer) = self.cached_caller(client) {
			return Ok(peer);
		}

		let socket_path = paths::client_socket_path(&self.config.socket_path, client);
		let stream = UnixStream::connect(&socket_path).await?;
		let (reader, writer) = stream.into_split();
		let (main_loop, peer) = MainLoop::new(
			|_socket| Reject::new(ErrorCode::UnexpectedRequest),
			StashProtocol::new(),
			CounterIdGen::new(),
		);
		tokio::spawn(async move {
			if let Err(err) = main_loop.run(BufReader::new(reader), writer).await {
				tracing::debug!(error = %err, "listener connection error");
			}
		});

		self.callers.lock().unwrap().insert(client, peer.clone());
		Ok(peer)
	}

	fn cached_caller(&self, client: ClientId) -> Option<CallerSocket> {
		let mut callers = self.callers.lock().unwrap();
		match callers.get(&client) {
			Some(peer) if !peer.is_closed() => Some(peer.clone()),
			Some(_) => {
				callers.remove(&client);
				None
			}
			None => None,
		}
	}

	/// Closes and forgets the cached connection to `client`.
	pub(crate) fn drop_caller(&self, client: ClientId) {
		if let Some(peer) = self.callers.lock().unwrap().remove(&client) {
			peer.close();
		}
	}
}
