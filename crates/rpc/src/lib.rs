#![warn(missing_docs)]

//! Generic async RPC message pump.
//!
//! A [`Protocol`] describes how messages are framed, how requests and
//! responses are told apart, and how request ids are allocated. A
//! [`MainLoop`] drives one transport (anything `AsyncBufRead` +
//! `AsyncWrite`), dispatching inbound requests to a
//! [`tower_service::Service`] and correlating inbound responses with
//! outstanding calls made through the loop's [`PeerSocket`].
//!
//! The pump is symmetric: both ends of a connection run the same loop, so
//! either side may originate requests. Inbound requests are served on
//! spawned tasks, which keeps the loop free to carry re-entrant traffic
//! issued from inside a handler.

mod main_loop;
mod service;
mod socket;

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::io::Error as IoError;

pub use main_loop::MainLoop;
pub use service::{Reject, ServiceFn, service_fn};
pub use socket::PeerSocket;
use tokio::io::{AsyncBufRead, AsyncWrite};

/// Classification of an inbound message.
#[derive(Debug)]
pub enum Inbound<Req, Resp> {
	/// The peer wants something from us.
	Request(Req),
	/// The peer answered one of our requests.
	Response(Resp),
}

/// A failed outbound call.
#[derive(Debug, thiserror::Error)]
pub enum RpcError<E> {
	/// The main loop exited before the call completed.
	#[error("peer connection closed before the call completed")]
	Closed,
	/// The peer answered with its error type.
	#[error("peer rejected the request: {0:?}")]
	Remote(E),
}

/// Monotonic allocator for `u64` request ids, starting at 1.
#[derive(Debug, Default)]
pub struct CounterIdGen(u64);

impl CounterIdGen {
	/// Creates a generator whose first id is 1.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Returns the next id.
	pub fn next(&mut self) -> u64 {
		self.0 += 1;
		self.0
	}
}

/// Wire behavior of one RPC dialect.
///
/// Implementations are cheap `Clone`s; the main loop clones the protocol
/// into its reader task.
pub trait Protocol: Clone + Send + 'static {
	/// Request/response correlation key.
	type Id: Copy + Eq + Hash + fmt::Debug + Send + 'static;
	/// On-wire frame.
	type Message: Send + 'static;
	/// Inbound or outbound request.
	type Request: Send + 'static;
	/// Inbound or outbound response.
	type Response: Send + 'static;
	/// Payload of a successful response.
	type ReqResult: Send + 'static;
	/// Payload of a failed response.
	type ReqError: Send + 'static;
	/// Allocator state for outbound request ids.
	type IdGen: Send + 'static;

	/// Allocates the id for the next outbound request.
	fn next_id(id_gen: &mut Self::IdGen) -> Self::Id;

	/// Reads one frame from the transport.
	fn read_message(
		&self,
		input: &mut (impl AsyncBufRead + Unpin + Send),
	) -> impl Future<Output = std::io::Result<Self::Message>> + Send;

	/// Writes one frame to the transport.
	fn write_message(
		&self,
		output: &mut (impl AsyncWrite + Unpin + Send),
		msg: &Self::Message,
	) -> impl Future<Output = std::io::Result<()>> + Send;

	/// Tells an inbound request apart from an inbound response.
	fn split_inbound(msg: Self::Message) -> Inbound<Self::Request, Self::Response>;

	/// Correlation id of a request.
	fn request_id(req: &Self::Request) -> Self::Id;

	/// Stamps a loop-allocated id onto an outbound request.
	fn set_request_id(req: &mut Self::Request, id: Self::Id);

	/// Correlation id of a response.
	fn response_id(resp: &Self::Response) -> Self::Id;

	/// Splits a response into the caller-visible result.
	fn split_response(resp: Self::Response) -> Result<Self::ReqResult, Self::ReqError>;

	/// Wraps a request into a frame.
	fn wrap_request(req: Self::Request) -> Self::Message;

	/// Wraps a response into a frame.
	fn wrap_response(resp: Self::Response) -> Self::Message;

	/// Builds a success response for a served request.
	fn response_ok(id: Self::Id, result: Self::ReqResult) -> Self::Response;

	/// Builds an error response for a served request.
	fn response_err(id: Self::Id, error: Self::ReqError) -> Self::Response;

	/// Whether a read error is an orderly peer disconnect.
	fn is_disconnect(err: &IoError) -> bool;
}
