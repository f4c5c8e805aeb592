//! CPDA key agreement and cluster formation state.
//!
//! Each node draws a handful of keys from a shared pool and advertises
//! them to its one-hop neighbors. When the root floods a cluster query,
//! a node that shares a key with the neighbor it heard the query from
//! asks that neighbor to take it in; the neighbor becomes (or stays) a
//! cluster leader. The message handling lives in the engine; this module
//! holds the state it operates on.

mod cluster;
mod keys;

pub use cluster::{ClusterError, ClusterRole, ClusterState};
pub use keys::{KeyMap, find_matching_key, select_keys};
