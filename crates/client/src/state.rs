//! Process-wide client state.
//!
//! One shared state per process, guarded by a mutex and reference
//! counted by `init`/`shutdown` pairs. The state owns a small tokio
//! runtime that drives the broker connection and the callback listener;
//! the public API blocks on that runtime, so it can be used from any
//! thread — including from inside callbacks, which run on the runtime's
//! blocking pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stash_proto::paths::{self, PathError};
use stash_proto::protocol::StashProtocol;
use stash_proto::types::{ClientId, ErrorCode, Request, RequestPayload, ResponsePayload};
use stash_rpc::{CounterIdGen, MainLoop, PeerSocket, Reject, RpcError};
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::runtime::{Handle, Runtime};

use crate::callbacks::CallbackTable;
use crate::listener::ListenerState;

/// Timeout for every call to the broker.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for in-flight callbacks on final shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Why a client operation failed; logged at the API boundary.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ClientError {
	#[error("client is not initialised")]
	NotInitialized,
	#[error("invalid path: {0}")]
	Path(#[from] PathError),
	#[error("cannot reach broker: {0}")]
	Connect(std::io::Error),
	#[error("request timed out")]
	Timeout,
	#[error("request failed: {0}")]
	Rpc(RpcError<ErrorCode>),
	#[error("callback listener failed to start")]
	Listener,
	#[error("broker sent an unexpected {0} reply")]
	UnexpectedReply(&'static str),
}

/// State shared by every API call of this process.
pub(crate) struct Shared {
	pub handle: Handle,
	pub socket_path: PathBuf,
	pub client_id: ClientId,
	pub callbacks: Arc<CallbackTable>,
	/// Cached connection to the broker, re-established on demand.
	conn: tokio::sync::Mutex<Option<PeerSocket<StashProtocol>>>,
	pub(crate) listener: Mutex<ListenerState>,
}

struct ClientState {
	refcount: u32,
	runtime: Option<Runtime>,
	shared: Option<Arc<Shared>>,
}

static STATE: Mutex<ClientState> = Mutex::new(ClientState {
	refcount: 0,
	runtime: None,
	shared: None,
});

pub(crate) fn init(debug: bool) -> bool {
	if debug {
		let _ = tracing_subscriber::fmt()
			.with_max_level(tracing::Level::DEBUG)
			.try_init();
	}

	let mut state = STATE.lock().unwrap();
	if state.shared.is_none() {
		let runtime = match tokio::runtime::Builder::new_multi_thread()
			.worker_threads(2)
			.thread_name("stash-client")
			.enable_all()
			.build()
		{
			Ok(runtime) => runtime,
			Err(err) => {
				tracing::error!(error = %err, "failed to start client runtime");
				return false;
			}
		};
		state.shared = Some(Arc::new(Shared {
			handle: runtime.handle().clone(),
			socket_path: paths::default_socket_path(),
			client_id: ClientId(u64::from(std::process::id())),
			callbacks: CallbackTable::new(),
			conn: tokio::sync::Mutex::new(None),
			listener: Mutex::new(ListenerState::Stopped),
		}));
		state.runtime = Some(runtime);
	}
	state.refcount += 1;
	tracing::debug!(refcount = state.refcount, "client initialised");
	true
}

pub(crate) fn shutdown() -> bool {
	let (runtime, shared) = {
		let mut state = STATE.lock().unwrap();
		if state.refcount == 0 {
			tracing::error!("shutdown without a matching init");
			return false;
		}
		state.refcount -= 1;
		if state.refcount > 0 {
			tracing::debug!(refcount = state.refcount, "shutdown deferred, other users remain");
			return true;
		}
		(state.runtime.take(), state.shared.take())
	};

	if let Some(shared) = &shared {
		shared.stop_listener();
	}
	if let Some(runtime) = runtime {
		// In-flight callbacks get a bounded grace period to finish; after
		// that the runtime and its threads are torn down regardless.
		runtime.shutdown_timeout(SHUTDOWN_GRACE);
	}
	tracing::debug!("client shut down");
	true
}

/// The live shared state, or `NotInitialized`.
pub(crate) fn current() -> Result<Arc<Shared>, ClientError> {
	STATE
		.lock()
		.unwrap()
		.shared
		.clone()
		.ok_or(ClientError::NotInitialized)
}

impl Shared {
	/// Performs one blocking round-trip to the broker.
	pub fn invoke(&self, payload: RequestPayload) -> Result<ResponsePayload, ClientError> {
		self.handle.block_on(async {
			let peer = self.connection().await?;
			let call = peer.request(Request::new(payload));
			match tokio::time::timeout(RPC_TIMEOUT, call).await {
				Ok(Ok(reply)) => Ok(reply),
				Ok(Err(err)) => {
					if matches!(err, RpcError::Closed) {
						self.forget_connection().await;
					}
					Err(ClientError::Rpc(err))
				}
				Err(_) => Err(ClientError::Timeout),
			}
		})
	}

	/// The cached broker connection, re-establishing it when the old one
	/// is gone. A failed connect is reported per call; there is no retry.
	async fn connection(&self) -> Result<PeerSocket<StashProtocol>, ClientError> {
		let mut conn = self.conn.lock().await;
		if let Some(peer) = conn.as_ref()
			&& !peer.is_closed()
		{
			return Ok(peer.clone());
		}

		let stream = UnixStream::connect(&self.socket_path)
			.await
			.map_err(ClientError::Connect)?;
		let (reader, writer) = stream.into_split();
		let (main_loop, peer) = MainLoop::new(
			|_socket| Reject::new(ErrorCode::UnexpectedRequest),
			StashProtocol::new(),
			CounterIdGen::new(),
		);
		self.handle.spawn(async move {
			if let Err(err) = main_loop.run(BufReader::new(reader), writer).await {
				tracing::debug!(error = %err, "broker connection error");
			}
		});

		*conn = Some(peer.clone());
		Ok(peer)
	}

	async fn forget_connection(&self) {
		*self.conn.lock().await = None;
	}
}
