//! Broker request dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stash_proto::types::{ErrorCode, Request, RequestPayload, ResponsePayload};
use tower_service::Service;

use crate::core::{BrokerCore, ConnectionId};

/// Per-connection service: decodes each request into a broker core call.
///
/// One instance serves one accepted connection; the main loop spawns a
/// task per request, so a re-entrant request issued from inside a
/// watcher or provider callback is served while the originating call is
/// still in flight.
#[derive(Debug)]
pub struct BrokerService {
	core: Arc<BrokerCore>,
	conn: ConnectionId,
}

impl BrokerService {
	/// Creates the service for one accepted connection.
	#[must_use]
	pub fn new(core: Arc<BrokerCore>, conn: ConnectionId) -> Self {
		Self { core, conn }
	}
}

impl Service<Request> for BrokerService {
	type Response = ResponsePayload;
	type Error = ErrorCode;
	type Future =
		Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn poll_ready(
		&mut self,
		_cx: &mut std::task::Context<'_>,
	) -> std::task::Poll<Result<(), Self::Error>> {
		std::task::Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: Request) -> Self::Future {
		let core = self.core.clone();
		let conn = self.conn;

		Box::pin(async move {
			match req.payload {
				RequestPayload::Set { path, value } => {
					core.set(&path, value).await?;
					Ok(ResponsePayload::Ok)
				}
				RequestPayload::Get { path } => {
					let value = core.get(&path).await?;
					Ok(ResponsePayload::Value { value })
				}
				RequestPayload::Search { path } => {
					let paths = core.search(&path)?;
					Ok(ResponsePayload::Paths { paths })
				}
				RequestPayload::Prune { path } => {
					core.prune(&path)?;
					Ok(ResponsePayload::Ok)
				}
				RequestPayload::Watch {
					path,
					id,
					cb,
					token,
				} => {
					core.watch(conn, &path, id, cb, token)?;
					Ok(ResponsePayload::Ok)
				}
				RequestPayload::Provide {
					path,
					id,
					cb,
					token,
				} => {
					core.provide(conn, &path, id, cb, token)?;
					Ok(ResponsePayload::Ok)
				}
				RequestPayload::WatchInvoke { .. } | RequestPayload::ProvideInvoke { .. } => {
					Err(ErrorCode::UnexpectedRequest)
				}
			}
		})
	}
}
