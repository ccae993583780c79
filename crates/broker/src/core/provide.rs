//! Provider subscriptions: exact-path, on-demand value producers.

use stash_proto::types::ClientId;

use super::CallbackTarget;
use super::registry::{Subscription, SubscriptionTable};

/// Active provider registrations, keyed `(path, client id)`.
///
/// Matching is equality only; a provider on `/a` is never consulted for
/// `/a/b`. Registering a provider does not create a node in the tree,
/// and a stored value always wins over a provider.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
	table: SubscriptionTable,
}

impl ProviderRegistry {
	/// Inserts or overwrites the `(path, client)` row.
	pub fn register(&mut self, path: String, client: ClientId, sub: Subscription) {
		self.table.register(path, client, sub);
	}

	/// Removes the `(path, client)` row; absent rows are fine.
	pub fn unregister(&mut self, path: &str, client: ClientId) {
		self.table.unregister(path, client);
	}

	/// Drops every registration owned by `client`.
	pub fn remove_client(&mut self, client: ClientId) {
		self.table.remove_client(client);
	}

	/// The provider registered on exactly `path`.
	///
	/// When several clients provide the same path the lowest client id
	/// wins, keeping resolution deterministic.
	#[must_use]
	pub fn lookup(&self, path: &str) -> Option<CallbackTarget> {
		let clients = self.table.rows().get(path)?;
		let (client, sub) = clients.iter().next()?;
		Some(CallbackTarget::from_row(*client, *sub))
	}

	/// Number of stored registrations.
	#[must_use]
	pub fn len(&self) -> usize {
		self.table.len()
	}

	/// Whether no registrations are stored.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sub(cb: u64) -> Subscription {
		Subscription { cb, token: 0 }
	}

	#[test]
	fn lookup_is_exact_path_only() {
		let mut reg = ProviderRegistry::default();
		reg.register("/interfaces/eth0/state".to_string(), ClientId(1), sub(5));
		assert!(reg.lookup("/interfaces/eth0/state").is_some());
		assert!(reg.lookup("/interfaces/eth0").is_none());
		assert!(reg.lookup("/interfaces/eth0/state/extra").is_none());
	}

	#[test]
	fn lowest_client_id_wins() {
		let mut reg = ProviderRegistry::default();
		reg.register("/p".to_string(), ClientId(7), sub(70));
		reg.register("/p".to_string(), ClientId(3), sub(30));
		let target = reg.lookup("/p").unwrap();
		assert_eq!(target.client, ClientId(3));
		assert_eq!(target.cb, 30);
	}

	#[test]
	fn unregister_falls_back_to_the_remaining_provider() {
		let mut reg = ProviderRegistry::default();
		reg.register("/p".to_string(), ClientId(3), sub(30));
		reg.register("/p".to_string(), ClientId(7), sub(70));
		reg.unregister("/p", ClientId(3));
		assert_eq!(reg.lookup("/p").unwrap().client, ClientId(7));
	}
}
