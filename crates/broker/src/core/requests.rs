//! Request semantics: how each operation reads and mutates broker state.
//!
//! Handlers validate defensively (the client library already rejects
//! malformed paths before any round-trip), apply the mutation under the
//! structural lock, then perform outbound calls with every lock
//! released.

use std::sync::Arc;

use stash_proto::paths;
use stash_proto::types::{ClientId, ErrorCode};

use super::registry::Subscription;
use super::{BrokerCore, ConnectionId};

impl BrokerCore {
	/// Stores `value` at `path` and notifies every matching watcher.
	///
	/// Does not return until the whole notification batch has been
	/// acknowledged or timed out.
	pub async fn set(self: &Arc<Self>, path: &str, value: Vec<u8>) -> Result<(), ErrorCode> {
		paths::validate_path(path).map_err(|_| ErrorCode::InvalidPath)?;
		{
			let mut store = self.store.lock().unwrap();
			store.set(path, value.clone());
		}
		let matches = { self.watchers.lock().unwrap().matches(path) };
		self.notify_watchers(matches, path, &value).await;
		Ok(())
	}

	/// Reads the value at `path`.
	///
	/// A stored value wins; otherwise an exact-path provider is invoked.
	/// Empty bytes mean "absent".
	pub async fn get(self: &Arc<Self>, path: &str) -> Result<Vec<u8>, ErrorCode> {
		paths::validate_path(path).map_err(|_| ErrorCode::InvalidPath)?;
		let stored = {
			let store = self.store.lock().unwrap();
			store.get(path).map(<[u8]>::to_vec)
		};
		if let Some(value) = stored {
			return Ok(value);
		}
		let provider = { self.providers.lock().unwrap().lookup(path) };
		match provider {
			Some(target) => Ok(self.call_provider(target, path).await.unwrap_or_default()),
			None => Ok(Vec::new()),
		}
	}

	/// Lists the immediate children below `root`.
	pub fn search(&self, root: &str) -> Result<Vec<String>, ErrorCode> {
		let root = paths::validate_search_root(root).map_err(|_| ErrorCode::InvalidPath)?;
		Ok(self.store.lock().unwrap().search(&root))
	}

	/// Removes the subtree at `path`. Pruned entries are not announced to
	/// watchers.
	pub fn prune(&self, path: &str) -> Result<(), ErrorCode> {
		paths::validate_path(path).map_err(|_| ErrorCode::InvalidPath)?;
		self.store.lock().unwrap().prune(path);
		Ok(())
	}

	/// Registers (`cb != 0`) or unregisters (`cb == 0`) a watcher.
	pub fn watch(
		&self,
		conn: ConnectionId,
		pattern: &str,
		client: ClientId,
		cb: u64,
		token: u64,
	) -> Result<(), ErrorCode> {
		let pattern = paths::normalize_watch_pattern(pattern).map_err(|_| ErrorCode::InvalidPath)?;
		if cb == 0 {
			self.watchers.lock().unwrap().unregister(&pattern, client);
		} else {
			self.note_owner(conn, client);
			self.watchers
				.lock()
				.unwrap()
				.register(pattern, client, Subscription { cb, token });
		}
		Ok(())
	}

	/// Registers (`cb != 0`) or unregisters (`cb == 0`) a provider.
	pub fn provide(
		&self,
		conn: ConnectionId,
		path: &str,
		client: ClientId,
		cb: u64,
		token: u64,
	) -> Result<(), ErrorCode> {
		paths::validate_path(path).map_err(|_| ErrorCode::InvalidPath)?;
		if cb == 0 {
			self.providers.lock().unwrap().unregister(path, client);
		} else {
			self.note_owner(conn, client);
			self.providers
				.lock()
				.unwrap()
				.register(path.to_string(), client, Subscription { cb, token });
		}
		Ok(())
	}
}
