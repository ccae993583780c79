//! Connection lifecycle: ownership tracking and subscription cleanup.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use stash_proto::types::ClientId;

use super::{BrokerCore, ConnectionId};

impl BrokerCore {
	/// Registers a newly accepted connection.
	pub fn open_connection(&self) -> ConnectionId {
		let conn = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
		self.owners.lock().unwrap().insert(conn, HashSet::new());
		conn
	}

	/// Records that `client` owns subscriptions created over `conn`.
	pub(crate) fn note_owner(&self, conn: ConnectionId, client: ClientId) {
		self.owners
			.lock()
			.unwrap()
			.entry(conn)
			.or_default()
			.insert(client);
	}

	/// Destroys every subscription owned by the clients that registered
	/// over a now-closed connection, and drops their cached listener
	/// connections.
	pub fn close_connection(&self, conn: ConnectionId) {
		let clients = self.owners.lock().unwrap().remove(&conn).unwrap_or_default();
		for client in clients {
			self.watchers.lock().unwrap().remove_client(client);
			self.providers.lock().unwrap().remove_client(client);
			self.drop_caller(client);
			tracing::debug!(client = client.0, "dropped subscriptions of disconnected client");
		}
	}
}
