//! Socket resolution and the path grammar shared by both ends.
//!
//! Paths are `/`-rooted, `/`-separated sequences of non-empty segments.
//! Search roots additionally end in `/` (or are empty, meaning the tree
//! root); watch patterns may end in `/` or `/*` to select a whole
//! subtree. Validation happens at the client API boundary, before any
//! RPC round-trip, and again defensively in the broker.

use std::path::{Path, PathBuf};

use crate::types::ClientId;

/// Environment variable overriding the broker socket location.
pub const SOCKET_ENV: &str = "STASH_BROKER_SOCKET";

/// File name of the broker socket.
const BROKER_SOCKET_FILE: &str = "stash-broker.sock";

/// Returns the default socket path for the stash broker.
///
/// Prioritizes writable directories so the broker can bind its socket
/// even in restricted environments.
///
/// # Resolution Order
///
/// 1. `STASH_BROKER_SOCKET` environment variable.
/// 2. System runtime directory (e.g., `$XDG_RUNTIME_DIR`).
/// 3. System temp directory (e.g., `/tmp`).
#[must_use]
pub fn default_socket_path() -> PathBuf {
	if let Ok(p) = std::env::var(SOCKET_ENV) {
		return PathBuf::from(p);
	}

	dirs::runtime_dir()
		.filter(|p| std::fs::create_dir_all(p).is_ok())
		.unwrap_or_else(std::env::temp_dir)
		.join(BROKER_SOCKET_FILE)
}

/// Returns the listener socket path for a client, published next to the
/// broker socket so the broker can find it from the client id alone.
#[must_use]
pub fn client_socket_path(broker_socket: &Path, client: ClientId) -> PathBuf {
	let dir = broker_socket
		.parent()
		.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
	dir.join(format!("stash-client.{}.sock", client.0))
}

/// A path rejected by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
	/// The path is empty.
	#[error("path is empty")]
	Empty,
	/// The path does not start with `/`.
	#[error("path does not start with '/'")]
	NotRooted,
	/// The path contains `//`.
	#[error("path contains an empty segment")]
	EmptySegment,
	/// The path ends with `/` where a node path is required.
	#[error("path ends with '/'")]
	TrailingSlash,
	/// A search root must end with `/`.
	#[error("search root does not end with '/'")]
	MissingTrailingSlash,
}

/// Validates a node path for set/get/prune/provide.
pub fn validate_path(path: &str) -> Result<(), PathError> {
	if path.is_empty() {
		return Err(PathError::Empty);
	}
	if !path.starts_with('/') {
		return Err(PathError::NotRooted);
	}
	if path.contains("//") {
		return Err(PathError::EmptySegment);
	}
	if path.ends_with('/') {
		return Err(PathError::TrailingSlash);
	}
	Ok(())
}

/// Validates a search root and normalizes the root aliases.
///
/// ``""``, `/`, `*` and `/*` all name the tree root and normalize to the
/// empty string; anything else must be a rooted, `/`-terminated path.
pub fn validate_search_root(path: &str) -> Result<String, PathError> {
	if matches!(path, "" | "/" | "*" | "/*") {
		return Ok(String::new());
	}
	if !path.starts_with('/') {
		return Err(PathError::NotRooted);
	}
	if path.contains("//") {
		return Err(PathError::EmptySegment);
	}
	if !path.ends_with('/') {
		return Err(PathError::MissingTrailingSlash);
	}
	Ok(path.to_string())
}

/// Validates a watch pattern and normalizes the match-everything aliases.
///
/// ``""``, `/`, `*` and `/*` normalize to `/*`. Other patterns must be
/// rooted with no empty segments; a trailing `/` or `/*` selects the
/// whole subtree. A `*` in any other position is kept verbatim and never
/// matches.
pub fn normalize_watch_pattern(path: &str) -> Result<String, PathError> {
	if matches!(path, "" | "/" | "*" | "/*") {
		return Ok("/*".to_string());
	}
	if !path.starts_with('/') {
		return Err(PathError::NotRooted);
	}
	if path.contains("//") {
		return Err(PathError::EmptySegment);
	}
	Ok(path.to_string())
}
