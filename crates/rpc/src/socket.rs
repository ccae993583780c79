//! Clonable handle onto a running main loop.

use std::fmt;
use std::io::Error as IoError;

use tokio::sync::{mpsc, oneshot};

use crate::{Protocol, RpcError};

/// Events carried on a main loop's channel.
pub(crate) enum MainLoopEvent<P: Protocol> {
	/// Write a pre-built frame to the peer.
	Outgoing(P::Message),
	/// Send a request; the matching response resolves the channel.
	Request(
		P::Request,
		oneshot::Sender<Result<P::ReqResult, RpcError<P::ReqError>>>,
	),
	/// A frame read from the transport (fed by the loop's reader task).
	Incoming(P::Message),
	/// The transport read side finished; `None` is an orderly disconnect.
	Disconnected(Option<IoError>),
	/// Stop the loop.
	Quit,
}

/// Handle for talking to the peer served by a [`MainLoop`](crate::MainLoop).
///
/// Clones share the loop. The socket stays usable from inside service
/// handlers running on that same loop, so a handler may issue calls back
/// through its own connection.
pub struct PeerSocket<P: Protocol> {
	tx: mpsc::UnboundedSender<MainLoopEvent<P>>,
}

impl<P: Protocol> Clone for PeerSocket<P> {
	fn clone(&self) -> Self {
		Self {
			tx: self.tx.clone(),
		}
	}
}

impl<P: Protocol> fmt::Debug for PeerSocket<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PeerSocket")
			.field("closed", &self.tx.is_closed())
			.finish()
	}
}

impl<P: Protocol> PeerSocket<P> {
	pub(crate) fn from_sender(tx: mpsc::UnboundedSender<MainLoopEvent<P>>) -> Self {
		Self { tx }
	}

	/// Sends a request and waits for the matching response.
	///
	/// The loop allocates and stamps the request id during transmission.
	/// Fails with [`RpcError::Closed`] when the loop has exited or exits
	/// before the response arrives.
	pub async fn request(&self, req: P::Request) -> Result<P::ReqResult, RpcError<P::ReqError>> {
		let (reply_tx, reply_rx) = oneshot::channel();
		self.tx
			.send(MainLoopEvent::Request(req, reply_tx))
			.map_err(|_| RpcError::Closed)?;
		reply_rx.await.map_err(|_| RpcError::Closed)?
	}

	/// Whether the loop behind this socket has exited.
	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}

	/// Asks the loop to stop.
	pub fn close(&self) {
		let _ = self.tx.send(MainLoopEvent::Quit);
	}
}
