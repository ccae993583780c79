//! The per-client callback listener.
//!
//! Once a process registers a watcher or provider, the broker needs a
//! way back in: the listener publishes a socket named after the client
//! id next to the broker socket and serves the broker's `WatchInvoke` /
//! `ProvideInvoke` requests. It starts lazily on the first registration
//! and stops when the init refcount drops to zero.
//!
//! User callbacks run on the runtime's blocking pool, so a callback may
//! freely call back into the public API while its invocation is still
//! being served.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use stash_proto::paths;
use stash_proto::protocol::StashProtocol;
use stash_proto::types::{ErrorCode, Request, RequestPayload, ResponsePayload};
use stash_rpc::{CounterIdGen, MainLoop};
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tower_service::Service;

use crate::callbacks::CallbackTable;
use crate::state::{ClientError, Shared};

/// Lifecycle of the process's listener.
pub(crate) enum ListenerState {
	Stopped,
	Running {
		socket: PathBuf,
		accept: JoinHandle<()>,
	},
}

impl Shared {
	/// Starts the listener if it is not already running. Idempotent and
	/// race-free: concurrent registrations serialize on the state lock.
	pub(crate) fn ensure_listener(self: &Arc<Self>) -> Result<(), ClientError> {
		let mut guard = self.listener.lock().unwrap();
		if matches!(*guard, ListenerState::Running { .. }) {
			return Ok(());
		}

		let socket = paths::client_socket_path(&self.socket_path, self.client_id);
		let _ = std::fs::remove_file(&socket);
		let listener = {
			let _enter = self.handle.enter();
			match UnixListener::bind(&socket) {
				Ok(listener) => listener,
				Err(err) => {
					tracing::error!(socket = %socket.display(), error = %err, "failed to bind listener socket");
					return Err(ClientError::Listener);
				}
			}
		};
		tracing::debug!(socket = %socket.display(), "listener started");

		let accept = self.handle.spawn(accept_loop(listener, self.callbacks.clone()));
		*guard = ListenerState::Running { socket, accept };
		Ok(())
	}

	/// Stops the listener and removes its socket file.
	pub(crate) fn stop_listener(&self) {
		let mut guard = self.listener.lock().unwrap();
		if let ListenerState::Running { socket, accept } =
			std::mem::replace(&mut *guard, ListenerState::Stopped)
		{
			accept.abort();
			let _ = std::fs::remove_file(&socket);
			tracing::debug!("listener stopped");
		}
	}
}

async fn accept_loop(listener: UnixListener, callbacks: Arc<CallbackTable>) {
	loop {
		match listener.accept().await {
			Ok((stream, _addr)) => {
				let callbacks = callbacks.clone();
				tokio::spawn(async move {
					let (reader, writer) = stream.into_split();
					let (main_loop, _socket) = MainLoop::new(
						|_socket| ListenerService { callbacks },
						StashProtocol::new(),
						CounterIdGen::new(),
					);
					if let Err(err) = main_loop.run(BufReader::new(reader), writer).await {
						tracing::debug!(error = %err, "broker callback connection error");
					}
				});
			}
			Err(err) => {
				tracing::warn!(error = %err, "listener accept failed");
			}
		}
	}
}

/// Serves broker-initiated callback invocations.
struct ListenerService {
	callbacks: Arc<CallbackTable>,
}

impl Service<Request> for ListenerService {
	type Response = ResponsePayload;
	type Error = ErrorCode;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn poll_ready(
		&mut self,
		_cx: &mut std::task::Context<'_>,
	) -> std::task::Poll<Result<(), Self::Error>> {
		std::task::Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: Request) -> Self::Future {
		let callbacks = self.callbacks.clone();

		Box::pin(async move {
			match req.payload {
				RequestPayload::WatchInvoke {
					path,
					cb,
					token,
					value,
				} => {
					let Some(callback) = callbacks.watch_by_handle(cb) else {
						// The registration raced an unregister; the change
						// is acknowledged and dropped.
						tracing::debug!(cb, path, "watch invocation for an unknown handle");
						return Ok(ResponsePayload::Ok);
					};
					let acknowledged = tokio::task::spawn_blocking(move || {
						let bytes = (!value.is_empty()).then_some(value.as_slice());
						callback(&path, token, bytes)
					})
					.await;
					match acknowledged {
						Ok(true) => {}
						Ok(false) => tracing::debug!("watch callback reported failure"),
						Err(err) => tracing::error!(error = %err, "watch callback panicked"),
					}
					Ok(ResponsePayload::Ok)
				}
				RequestPayload::ProvideInvoke { path, cb, token } => {
					let Some(callback) = callbacks.provide_by_handle(cb) else {
						tracing::debug!(cb, path, "provide invocation for an unknown handle");
						return Ok(ResponsePayload::Value { value: Vec::new() });
					};
					let produced =
						tokio::task::spawn_blocking(move || callback(&path, token)).await;
					let value = match produced {
						Ok(Some(value)) => value,
						Ok(None) => Vec::new(),
						Err(err) => {
							tracing::error!(error = %err, "provider callback panicked");
							Vec::new()
						}
					};
					Ok(ResponsePayload::Value { value })
				}
				_ => Err(ErrorCode::UnexpectedRequest),
			}
		})
	}
}
