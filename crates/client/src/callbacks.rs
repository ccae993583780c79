//! User callback registration and the per-process handle tables.
//!
//! Real callbacks never cross the wire. Registration assigns a small
//! integer handle to each callback; the broker stores and plays back the
//! handle verbatim, and the listener resolves it here when an invocation
//! arrives. Handles are never reused within a process lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A watcher callback: `(path, token, value)` where `value` is `None`
/// when the change was a delete. The return value acknowledges the
/// notification.
pub type WatchCallback = Arc<dyn Fn(&str, u64, Option<&[u8]>) -> bool + Send + Sync>;

/// A provider callback: `(path, token)` returning the produced value,
/// or `None` for "no value".
pub type ProvideCallback = Arc<dyn Fn(&str, u64) -> Option<Vec<u8>> + Send + Sync>;

struct HandleMap<T> {
	by_handle: HashMap<u64, T>,
	/// Pattern (or path) to its current handle, so re-registration and
	/// unregistration can drop the superseded callback.
	by_key: HashMap<String, u64>,
}

impl<T> Default for HandleMap<T> {
	fn default() -> Self {
		Self {
			by_handle: HashMap::new(),
			by_key: HashMap::new(),
		}
	}
}

impl<T: Clone> HandleMap<T> {
	fn insert(&mut self, key: &str, handle: u64, value: T) {
		if let Some(old) = self.by_key.insert(key.to_string(), handle) {
			self.by_handle.remove(&old);
		}
		self.by_handle.insert(handle, value);
	}

	fn remove_key(&mut self, key: &str) {
		if let Some(handle) = self.by_key.remove(key) {
			self.by_handle.remove(&handle);
		}
	}

	/// Undoes a specific registration, leaving any newer one intact.
	fn remove_exact(&mut self, key: &str, handle: u64) {
		if self.by_key.get(key) == Some(&handle) {
			self.by_key.remove(key);
		}
		self.by_handle.remove(&handle);
	}

	fn get(&self, handle: u64) -> Option<T> {
		self.by_handle.get(&handle).cloned()
	}
}

/// The process-wide callback tables.
pub(crate) struct CallbackTable {
	next_handle: AtomicU64,
	watches: Mutex<HandleMap<WatchCallback>>,
	provides: Mutex<HandleMap<ProvideCallback>>,
}

impl CallbackTable {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			// Handle 0 is the wire encoding of "unregister".
			next_handle: AtomicU64::new(1),
			watches: Mutex::new(HandleMap::default()),
			provides: Mutex::new(HandleMap::default()),
		})
	}

	pub fn register_watch(&self, pattern: &str, callback: WatchCallback) -> u64 {
		let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
		self.watches.lock().unwrap().insert(pattern, handle, callback);
		handle
	}

	pub fn unregister_watch(&self, pattern: &str) {
		self.watches.lock().unwrap().remove_key(pattern);
	}

	pub fn forget_watch(&self, pattern: &str, handle: u64) {
		self.watches.lock().unwrap().remove_exact(pattern, handle);
	}

	pub fn watch_by_handle(&self, handle: u64) -> Option<WatchCallback> {
		self.watches.lock().unwrap().get(handle)
	}

	pub fn register_provide(&self, path: &str, callback: ProvideCallback) -> u64 {
		let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
		self.provides.lock().unwrap().insert(path, handle, callback);
		handle
	}

	pub fn unregister_provide(&self, path: &str) {
		self.provides.lock().unwrap().remove_key(path);
	}

	pub fn forget_provide(&self, path: &str, handle: u64) {
		self.provides.lock().unwrap().remove_exact(path, handle);
	}

	pub fn provide_by_handle(&self, handle: u64) -> Option<ProvideCallback> {
		self.provides.lock().unwrap().get(handle)
	}
}
