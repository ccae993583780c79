//! Watcher subscriptions and pattern matching.

use stash_proto::types::ClientId;

use super::CallbackTarget;
use super::registry::{Subscription, SubscriptionTable};

/// True when `pattern` selects the mutated path `path`.
///
/// A pattern matches exactly, or as a subtree: a trailing `/` or `/*`
/// selects every descendant at any depth, and `/*` alone selects
/// everything. A `*` in any non-terminal position never matches; a
/// pattern like `/a/*/b` never fires.
#[must_use]
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
	if pattern == path {
		return true;
	}
	if let Some(prefix) = pattern.strip_suffix("/*") {
		return path.len() > prefix.len()
			&& path.starts_with(prefix)
			&& path.as_bytes()[prefix.len()] == b'/';
	}
	pattern.ends_with('/') && path.starts_with(pattern)
}

/// Active watch subscriptions, keyed `(pattern, client id)`.
#[derive(Debug, Default)]
pub struct WatcherRegistry {
	table: SubscriptionTable,
}

impl WatcherRegistry {
	/// Inserts or overwrites the `(pattern, client)` row.
	pub fn register(&mut self, pattern: String, client: ClientId, sub: Subscription) {
		self.table.register(pattern, client, sub);
	}

	/// Removes the `(pattern, client)` row; absent rows are fine.
	pub fn unregister(&mut self, pattern: &str, client: ClientId) {
		self.table.unregister(pattern, client);
	}

	/// Drops every subscription owned by `client`.
	pub fn remove_client(&mut self, client: ClientId) {
		self.table.remove_client(client);
	}

	/// Snapshot of every subscription matching a mutated path.
	///
	/// Callers copy this out under the registry lock and dispatch after
	/// releasing it.
	#[must_use]
	pub fn matches(&self, path: &str) -> Vec<CallbackTarget> {
		let mut out = Vec::new();
		for (pattern, clients) in self.table.rows() {
			if !pattern_matches(pattern, path) {
				continue;
			}
			for (client, sub) in clients {
				out.push(CallbackTarget::from_row(*client, *sub));
			}
		}
		out
	}

	/// Number of stored subscriptions.
	#[must_use]
	pub fn len(&self) -> usize {
		self.table.len()
	}

	/// Whether no subscriptions are stored.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
