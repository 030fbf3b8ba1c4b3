//! Engine-side enforcement of the virtual-table protocol.
//!
//! Providers implement the traits from `vtx-module`; this crate is the
//! wrapper the engine places between the query machinery and those
//! callbacks. It owns:
//!
//! - the per-connection [`ModuleRegistry`] of registered descriptors,
//! - the schema cache of live table instances and the cursor arena,
//!   addressed through opaque [`TableId`]/[`CursorId`] handles,
//! - the scan state machine that rejects out-of-state calls before the
//!   provider is ever invoked,
//! - the planner-side index negotiation driver,
//! - the per-instance transaction coordinator.
//!
//! All provider failures propagate unchanged to the caller as explicit
//! `Result` values; no unwinding crosses the provider boundary.

mod connection;
mod plan;
mod registry;
mod scan;
mod txn;

pub use connection::{Connection, CursorId, TableId};
pub use plan::{negotiate, select_plan, PlannedConstraint, ScanPlan};
pub use registry::ModuleRegistry;
pub use scan::ScanState;
pub use txn::{TxnCoordinator, TxnPhase};
