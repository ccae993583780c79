#![warn(missing_docs)]

//! The stash broker: a shared, hierarchical key-value store for
//! cooperating processes on one host.
//!
//! Clients connect over a Unix domain socket and read or mutate a
//! path-indexed tree of opaque byte values. The broker owns the tree,
//! fans change notifications out to subscribed watchers, and resolves
//! reads of unstored paths through registered providers.

pub mod core;
pub mod ipc;
pub mod service;

pub use stash_proto as proto;
