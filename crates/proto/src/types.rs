//! Wire types for the stash broker protocol.
//!
//! One message type exists per request kind and one per response kind;
//! every frame carries its own tag and the receiver routes by it. The
//! `cb` and `token` fields of subscriptions are opaque 64-bit handles:
//! the broker stores them verbatim and plays them back verbatim on
//! callback invocation. `cb == 0` means "unregister".

use serde::{Deserialize, Serialize};

/// Unique identifier for requests and responses on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Identifier of a client process; the process id in practice.
///
/// The broker only requires ids to be unique among currently connected
/// clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

/// Classification of frames transmitted over a stash socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
	/// A request, in either direction.
	Request(Request),
	/// A response to an earlier request.
	Response(Response),
}

/// A single request.
///
/// The `id` field is managed by the RPC main loop and overwritten during
/// transmission; construct requests with [`Request::new`], which sets a
/// placeholder value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique identifier for this request.
	pub id: RequestId,
	/// The request payload.
	pub payload: RequestPayload,
}

impl Request {
	/// Creates a new request with a placeholder id.
	#[must_use]
	pub fn new(payload: RequestPayload) -> Self {
		Self {
			id: RequestId(0),
			payload,
		}
	}
}

/// Request payload variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestPayload {
	/// Store `value` at `path`; an empty value deletes the node.
	Set {
		/// Absolute node path.
		path: String,
		/// Value bytes; empty means delete.
		value: Vec<u8>,
	},
	/// Read the value at `path`.
	Get {
		/// Absolute node path.
		path: String,
	},
	/// List the immediate children below a root.
	Search {
		/// Empty string for the tree root, otherwise a `/`-terminated path.
		path: String,
	},
	/// Remove the node at `path` and its whole subtree.
	Prune {
		/// Absolute node path.
		path: String,
	},
	/// Register (or with `cb == 0` unregister) a change watcher.
	Watch {
		/// Pattern: a path, optionally `/`- or `/*`-terminated.
		path: String,
		/// Identity of the subscribing client.
		id: ClientId,
		/// Opaque callback handle; 0 unregisters.
		cb: u64,
		/// Opaque token round-tripped to the callback.
		token: u64,
	},
	/// Register (or with `cb == 0` unregister) an on-demand provider.
	Provide {
		/// Exact node path.
		path: String,
		/// Identity of the subscribing client.
		id: ClientId,
		/// Opaque callback handle; 0 unregisters.
		cb: u64,
		/// Opaque token round-tripped to the callback.
		token: u64,
	},
	/// Broker-to-client: a watched path changed.
	WatchInvoke {
		/// The mutated path (not the pattern).
		path: String,
		/// Callback handle from the registration.
		cb: u64,
		/// Token from the registration.
		token: u64,
		/// The new value; empty on delete.
		value: Vec<u8>,
	},
	/// Broker-to-client: produce the value for a provided path.
	ProvideInvoke {
		/// The requested path.
		path: String,
		/// Callback handle from the registration.
		cb: u64,
		/// Token from the registration.
		token: u64,
	},
}

/// A response to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// The request this responds to.
	pub request_id: RequestId,
	/// The payload when the request succeeded.
	pub payload: Option<ResponsePayload>,
	/// The error code when the request failed.
	pub error: Option<ErrorCode>,
}

/// Response payload variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
	/// Plain acknowledgment.
	Ok,
	/// A value read from the store or produced by a provider.
	///
	/// Empty bytes mean "absent"; the two are indistinguishable on the
	/// wire.
	Value {
		/// The value bytes.
		value: Vec<u8>,
	},
	/// Search results.
	Paths {
		/// Fully qualified child paths.
		paths: Vec<String>,
	},
}

/// Error codes for failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
	/// Generic internal error.
	Internal,
	/// The path violates the path grammar for this operation.
	InvalidPath,
	/// The request kind is not served on this connection.
	UnexpectedRequest,
}
