//! Keyed subscription storage shared by watchers and providers.
//!
//! Both registries use the same keying and lifecycle: `(key, client id)`
//! uniquely identifies a row, re-registration overwrites, registering a
//! null callback handle deletes, and a client's rows all go away when
//! its connection closes. Only the matching rules differ.

use std::collections::BTreeMap;

use stash_proto::types::ClientId;

use super::CallbackTarget;

/// The stored half of a subscription row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
	/// Opaque callback handle; never 0 for a stored row.
	pub cb: u64,
	/// Opaque token round-tripped to the callback.
	pub token: u64,
}

/// `(key, client id) → subscription` with overwrite semantics.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTable {
	rows: BTreeMap<String, BTreeMap<ClientId, Subscription>>,
}

impl SubscriptionTable {
	pub fn register(&mut self, key: String, client: ClientId, sub: Subscription) {
		self.rows.entry(key).or_default().insert(client, sub);
	}

	/// Removes one row; removing an absent row is fine.
	pub fn unregister(&mut self, key: &str, client: ClientId) {
		if let Some(clients) = self.rows.get_mut(key) {
			clients.remove(&client);
			if clients.is_empty() {
				self.rows.remove(key);
			}
		}
	}

	/// Drops every row owned by `client`.
	pub fn remove_client(&mut self, client: ClientId) {
		self.rows.retain(|_, clients| {
			clients.remove(&client);
			!clients.is_empty()
		});
	}

	pub fn rows(&self) -> &BTreeMap<String, BTreeMap<ClientId, Subscription>> {
		&self.rows
	}

	pub fn len(&self) -> usize {
		self.rows.values().map(BTreeMap::len).sum()
	}
}

impl CallbackTarget {
	pub(crate) fn from_row(client: ClientId, sub: Subscription) -> Self {
		Self {
			client,
			cb: sub.cb,
			token: sub.token,
		}
	}
}
