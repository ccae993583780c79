//! Broker core: the path store, the subscription registries, and the
//! outbound callback machinery.
//!
//! # Mental model
//!
//! - The broker is an out-of-process daemon owning the authoritative
//!   path tree. Clients connect over IPC; each accepted connection gets
//!   a [`ConnectionId`].
//! - Watchers subscribe to change notifications by pattern; providers
//!   register to produce values on demand for exact paths. Both are
//!   keyed `(pattern, client id)` and carry two opaque `u64`s (`cb`,
//!   `token`) that the broker stores and plays back verbatim.
//! - For callback delivery the roles reverse: the broker connects to the
//!   per-client listener socket derived from the client id and issues
//!   RPC requests to it. Those connections are cached per client.
//! - A SET does not unblock its caller until every matching watcher has
//!   acknowledged or timed out, which gives observers a simple
//!   happens-before: once a SET returns, every watcher saw it.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints |
//! |---|---|---|
//! | [`BrokerCore`] | Authoritative broker state | MUST be the only owner of the tree and registries |
//! | [`PathTrie`] | Value tree | a node exists iff it has a value or a value-bearing descendant |
//! | [`WatcherRegistry`] | Change subscriptions | matching runs on a snapshot taken under the lock |
//! | [`ProviderRegistry`] | On-demand value producers | exact-path keying only |
//! | [`CallbackTarget`] | One outbound invocation | copied out of a registry before any await |
//! | [`ConnectionId`] | One accepted IPC connection | owns the client ids registered through it |
//!
//! # Invariants
//!
//! 1. No lock is held across an outbound callback send. Handlers take a
//!    structural lock, copy out the `(client, cb, token)` tuples they
//!    need, release, then call out.
//!    - Enforced in: `requests::set`, `requests::get`
//!    - Tested by: `core::tests::notifications`
//!    - Failure symptom: a re-entrant request from inside a callback
//!      deadlocks the broker.
//! 2. A SET replies only after its full notification batch completed or
//!    timed out; callback failures are per-call and non-fatal.
//!    - Enforced in: `outbound::notify_watchers`
//!    - Tested by: `core::tests::notifications::set_waits_for_the_watcher_ack`
//!    - Failure symptom: watchers observe a SET after its caller already
//!      saw the acknowledgment.
//! 3. Connection close destroys every subscription owned by the client
//!    ids registered over that connection.
//!    - Enforced in: `session::close_connection`
//!    - Tested by: `core::tests::subscriptions`
//!    - Failure symptom: dead clients keep receiving notifications and
//!      the broker burns a timeout on every subsequent SET.
//! 4. Stored values win over providers; providers are consulted for
//!    exact paths only.
//!    - Enforced in: `requests::get`
//!    - Tested by: `core::tests::providers`
//!    - Failure symptom: stale provider output shadows explicit writes.

mod outbound;
mod provide;
mod registry;
mod requests;
mod session;
mod store;
mod watch;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use provide::ProviderRegistry;
pub use registry::Subscription;
use stash_proto::paths;
use stash_proto::protocol::StashProtocol;
use stash_proto::types::ClientId;
use stash_rpc::PeerSocket;
pub use store::PathTrie;
pub use watch::{WatcherRegistry, pattern_matches};

/// Handle for sending callback invocations to a client listener.
pub type CallerSocket = PeerSocket<StashProtocol>;

/// Identifier of one accepted broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// One callback invocation copied out of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackTarget {
	/// Client to deliver to.
	pub client: ClientId,
	/// Opaque callback handle from the registration.
	pub cb: u64,
	/// Opaque token from the registration.
	pub token: u64,
}

/// Configuration for the broker core.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
	/// The broker socket; client listener sockets are resolved relative
	/// to its directory.
	pub socket_path: PathBuf,
	/// Timeout applied to every outbound callback invocation.
	pub rpc_timeout: Duration,
}

impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			socket_path: paths::default_socket_path(),
			rpc_timeout: Duration::from_secs(5),
		}
	}
}

/// Shared state for the broker.
///
/// The tree and each registry sit behind independent locks so watcher
/// churn never stalls reads. No code path may hold any of these locks
/// across an outbound send.
#[derive(Debug)]
pub struct BrokerCore {
	store: Mutex<PathTrie>,
	watchers: Mutex<WatcherRegistry>,
	providers: Mutex<ProviderRegistry>,
	/// Client ids that registered subscriptions, per connection.
	owners: Mutex<HashMap<ConnectionId, HashSet<ClientId>>>,
	/// Cached outbound connections to client listeners.
	callers: Mutex<HashMap<ClientId, CallerSocket>>,
	next_connection_id: AtomicU64,
	config: BrokerConfig,
}

impl Default for BrokerCore {
	fn default() -> Self {
		Self::with_config(BrokerConfig::default())
	}
}

impl BrokerCore {
	/// Creates a broker core with default configuration.
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Creates a broker core with custom configuration.
	#[must_use]
	pub fn new_with_config(config: BrokerConfig) -> Arc<Self> {
		Arc::new(Self::with_config(config))
	}

	fn with_config(config: BrokerConfig) -> Self {
		Self {
			store: Mutex::new(PathTrie::new()),
			watchers: Mutex::new(WatcherRegistry::default()),
			providers: Mutex::new(ProviderRegistry::default()),
			owners: Mutex::new(HashMap::new()),
			callers: Mutex::new(HashMap::new()),
			next_connection_id: AtomicU64::new(0),
			config,
		}
	}

	/// The configuration this core was built with.
	#[must_use]
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}
}

#[cfg(test)]
impl BrokerCore {
	pub(crate) fn lock_watchers_for_test(&self) -> std::sync::MutexGuard<'_, WatcherRegistry> {
		self.watchers.lock().unwrap()
	}

	pub(crate) fn lock_providers_for_test(&self) -> std::sync::MutexGuard<'_, ProviderRegistry> {
		self.providers.lock().unwrap()
	}
}

#[cfg(test)]
mod tests;
