#![warn(missing_docs)]

//! Client library for the stash broker.
//!
//! Cooperating processes share configuration and state through a central
//! broker that owns a path-indexed tree of opaque byte values. This
//! crate is the process-side API: plain reads and writes, tree search
//! and pruning, plus two kinds of subscription — *watchers* that receive
//! change notifications and *providers* that compute values on demand.
//!
//! Call [`init`] before anything else and pair every `init` with a
//! [`shutdown`]. The library keeps one connection and one callback
//! listener per process; callbacks run on library-owned threads and may
//! call back into this API freely. The API blocks, so do not call it
//! from inside an async executor.
//!
//! Paths are `/`-rooted and `/`-separated with non-empty segments, e.g.
//! `/interfaces/eth0/state`. Values are raw bytes; an empty value and an
//! absent node are indistinguishable, and writing an empty value deletes
//! the node.

mod callbacks;
mod helpers;
mod listener;
mod state;

use stash_proto::paths;
use stash_proto::types::{RequestPayload, ResponsePayload};

pub use crate::callbacks::{ProvideCallback, WatchCallback};
pub use crate::helpers::{dump, get_int, get_string, set_int, set_string};
use crate::state::ClientError;

/// Initializes the library, starting the client runtime on first use.
///
/// May be called repeatedly; each call must be paired with a
/// [`shutdown`]. With `debug` set, a verbose tracing subscriber is
/// installed (best effort; an already-installed subscriber wins).
pub fn init(debug: bool) -> bool {
	state::init(debug)
}

/// Releases one [`init`] reference.
///
/// The last release stops the callback listener, giving in-flight
/// callbacks a bounded grace period before the runtime is torn down.
/// Returns false when the library was not initialized.
pub fn shutdown() -> bool {
	state::shutdown()
}

/// Stores `value` at `path`. An empty value deletes the node.
///
/// Does not return until every watcher matching `path` has been
/// notified (or timed out broker-side).
pub fn set(path: &str, value: &[u8]) -> bool {
	match try_set(path, value) {
		Ok(()) => true,
		Err(err) => {
			tracing::error!(path, error = %err, "set failed");
			false
		}
	}
}

fn try_set(path: &str, value: &[u8]) -> Result<(), ClientError> {
	paths::validate_path(path)?;
	let shared = state::current()?;
	let reply = shared.invoke(RequestPayload::Set {
		path: path.to_string(),
		value: value.to_vec(),
	})?;
	expect_ok(reply)
}

/// Reads the value at `path`.
///
/// Returns `None` when the node is absent (or holds an empty value —
/// the broker does not distinguish the two) and on failure.
#[must_use]
pub fn get(path: &str) -> Option<Vec<u8>> {
	match try_get(path) {
		Ok(value) => (!value.is_empty()).then_some(value),
		Err(err) => {
			tracing::error!(path, error = %err, "get failed");
			None
		}
	}
}

fn try_get(path: &str) -> Result<Vec<u8>, ClientError> {
	paths::validate_path(path)?;
	let shared = state::current()?;
	let reply = shared.invoke(RequestPayload::Get {
		path: path.to_string(),
	})?;
	match reply {
		ResponsePayload::Value { value } => Ok(value),
		other => Err(ClientError::UnexpectedReply(reply_name(&other))),
	}
}

/// Lists the immediate children below `root`.
///
/// `root` is either a root alias (``""``, `/`, `*`, `/*`) or a
/// `/`-terminated path. Results are fully qualified child paths; treat
/// their order as unspecified. Empty on failure.
#[must_use]
pub fn search(root: &str) -> Vec<String> {
	match try_search(root) {
		Ok(paths) => paths,
		Err(err) => {
			tracing::error!(root, error = %err, "search failed");
			Vec::new()
		}
	}
}

fn try_search(root: &str) -> Result<Vec<String>, ClientError> {
	let root = paths::validate_search_root(root)?;
	let shared = state::current()?;
	let reply = shared.invoke(RequestPayload::Search { path: root })?;
	match reply {
		ResponsePayload::Paths { paths } => Ok(paths),
		other => Err(ClientError::UnexpectedReply(reply_name(&other))),
	}
}

/// Removes the node at `path` and its entire subtree.
///
/// Pruning a nonexistent path succeeds. No watcher notifications are
/// sent for the removed entries.
pub fn prune(path: &str) -> bool {
	match try_prune(path) {
		Ok(()) => true,
		Err(err) => {
			tracing::error!(path, error = %err, "prune failed");
			false
		}
	}
}

fn try_prune(path: &str) -> Result<(), ClientError> {
	paths::validate_path(path)?;
	let shared = state::current()?;
	let reply = shared.invoke(RequestPayload::Prune {
		path: path.to_string(),
	})?;
	expect_ok(reply)
}

/// Subscribes `callback` to changes of every path matching `pattern`,
/// or unsubscribes the pattern when `callback` is `None`.
///
/// A pattern is a path, optionally `/`- or `/*`-terminated to select a
/// whole subtree; ``""``, `/`, `*` and `/*` all select everything. A `*`
/// anywhere else never matches. Re-registering a pattern replaces the
/// earlier callback. `token` is round-tripped to the callback verbatim.
pub fn watch(pattern: &str, callback: Option<WatchCallback>, token: u64) -> bool {
	match try_watch(pattern, callback, token) {
		Ok(()) => true,
		Err(err) => {
			tracing::error!(pattern, error = %err, "watch failed");
			false
		}
	}
}

fn try_watch(pattern: &str, callback: Option<WatchCallback>, token: u64) -> Result<(), ClientError> {
	let pattern = paths::normalize_watch_pattern(pattern)?;
	let shared = state::current()?;
	match callback {
		Some(callback) => {
			shared.ensure_listener()?;
			let handle = shared.callbacks.register_watch(&pattern, callback);
			let sent = shared.invoke(RequestPayload::Watch {
				path: pattern.clone(),
				id: shared.client_id,
				cb: handle,
				token,
			});
			match sent {
				Ok(reply) => expect_ok(reply),
				Err(err) => {
					shared.callbacks.forget_watch(&pattern, handle);
					Err(err)
				}
			}
		}
		None => {
			let reply = shared.invoke(RequestPayload::Watch {
				path: pattern.clone(),
				id: shared.client_id,
				cb: 0,
				token,
			})?;
			shared.callbacks.unregister_watch(&pattern);
			expect_ok(reply)
		}
	}
}

/// Registers `callback` to produce the value of exactly `path` on
/// demand, or unregisters it when `callback` is `None`.
///
/// Providers are consulted by GET only when no value is stored at the
/// path; a stored value always wins. `token` is round-tripped to the
/// callback verbatim.
pub fn provide(path: &str, callback: Option<ProvideCallback>, token: u64) -> bool {
	match try_provide(path, callback, token) {
		Ok(()) => true,
		Err(err) => {
			tracing::error!(path, error = %err, "provide failed");
			false
		}
	}
}

fn try_provide(path: &str, callback: Option<ProvideCallback>, token: u64) -> Result<(), ClientError> {
	paths::validate_path(path)?;
	let shared = state::current()?;
	match callback {
		Some(callback) => {
			shared.ensure_listener()?;
			let handle = shared.callbacks.register_provide(path, callback);
			let sent = shared.invoke(RequestPayload::Provide {
				path: path.to_string(),
				id: shared.client_id,
				cb: handle,
				token,
			});
			match sent {
				Ok(reply) => expect_ok(reply),
				Err(err) => {
					shared.callbacks.forget_provide(path, handle);
					Err(err)
				}
			}
		}
		None => {
			let reply = shared.invoke(RequestPayload::Provide {
				path: path.to_string(),
				id: shared.client_id,
				cb: 0,
				token,
			})?;
			shared.callbacks.unregister_provide(path);
			expect_ok(reply)
		}
	}
}

fn expect_ok(reply: ResponsePayload) -> Result<(), ClientError> {
	match reply {
		ResponsePayload::Ok => Ok(()),
		other => Err(ClientError::UnexpectedReply(reply_name(&other))),
	}
}

fn reply_name(reply: &ResponsePayload) -> &'static str {
	match reply {
		ResponsePayload::Ok => "Ok",
		ResponsePayload::Value { .. } => "Value",
		ResponsePayload::Paths { .. } => "Paths",
	}
}
