//! Routing table model.
//!
//! A [`RoutingTable`] maps each destination to one [`RouteEntry`] whose
//! [`RouteState`] moves through IN_SEARCH → VALID → INVALID → removed as
//! discovery completes, links break and lifetimes run out.

mod entry;
mod table;

pub use entry::{RouteEntry, RouteState, seqno_newer};
pub use table::{PurgeOutcome, RoutingTable, RoutingTableDump};
