//! Common test utilities and helpers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stash_proto::paths::client_socket_path;
use stash_proto::protocol::StashProtocol;
use stash_proto::types::{ClientId, ErrorCode, Request, RequestPayload, ResponsePayload};
use stash_rpc::{CounterIdGen, MainLoop, service_fn};
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::sync::mpsc;

use crate::core::{BrokerConfig, BrokerCore};

pub fn test_core(dir: &Path) -> Arc<BrokerCore> {
	test_core_with_timeout(dir, Duration::from_secs(5))
}

pub fn test_core_with_timeout(dir: &Path, rpc_timeout: Duration) -> Arc<BrokerCore> {
	BrokerCore::new_with_config(BrokerConfig {
		socket_path: dir.join("stash-broker.sock"),
		rpc_timeout,
	})
}

/// How a test listener answers callback invocations.
#[derive(Debug, Clone)]
pub enum Behavior {
	/// Acknowledge watch invocations; answer provide invocations with
	/// this value.
	Answer(Vec<u8>),
	/// Never reply, forcing the broker-side timeout.
	Stall,
}

/// A fake client listener bound where the broker expects to find the
/// real one, capturing every invocation it receives.
pub struct TestListener {
	invokes: mpsc::UnboundedReceiver<RequestPayload>,
}

impl TestListener {
	pub async fn spawn(core: &BrokerCore, client: ClientId, behavior: Behavior) -> Self {
		let socket = client_socket_path(&core.config().socket_path, client);
		if let Some(parent) = socket.parent() {
			std::fs::create_dir_all(parent).unwrap();
		}
		let _ = std::fs::remove_file(&socket);
		let listener = UnixListener::bind(&socket).unwrap();

		let (tx, rx) = mpsc::unbounded_channel();
		tokio::spawn(async move {
			while let Ok((stream, _addr)) = listener.accept().await {
				let tx = tx.clone();
				let behavior = behavior.clone();
				tokio::spawn(async move {
					let (reader, writer) = stream.into_split();
					let (main_loop, _socket) = MainLoop::new(
						move |_socket| {
							service_fn(move |req: Request| {
								let tx = tx.clone();
								let behavior = behavior.clone();
								async move {
									let payload = req.payload;
									let _ = tx.send(payload.clone());
									match behavior {
										Behavior::Answer(value) => match payload {
											RequestPayload::ProvideInvoke { .. } => {
												Ok(ResponsePayload::Value { value })
											}
											_ => Ok(ResponsePayload::Ok),
										},
										Behavior::Stall => {
											std::future::pending::<Result<ResponsePayload, ErrorCode>>()
												.await
										}
									}
								}
							})
						},
						StashProtocol::new(),
						CounterIdGen::new(),
					);
					let _ = main_loop.run(BufReader::new(reader), writer).await;
				});
			}
		});

		Self { invokes: rx }
	}

	/// The next captured invocation, if one already arrived.
	pub fn try_recv(&mut self) -> Option<RequestPayload> {
		self.invokes.try_recv().ok()
	}
}
