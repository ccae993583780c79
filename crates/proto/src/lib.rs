#![warn(missing_docs)]

//! Shared wire types for the stash IPC protocol.
//!
//! Both directions of the protocol live here: client-to-broker store
//! requests and broker-to-client callback invocations share one frame
//! type, so the broker and the per-client listener can run the same
//! [`stash_rpc::MainLoop`] over any connection.

pub mod paths;
pub mod protocol;
pub mod types;
