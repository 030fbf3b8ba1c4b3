//! Virtual table provider surface.
//!
//! Virtual tables expose external data sources as SQL tables. They follow
//! the classic xCreate/xConnect/xBestIndex/xFilter/xNext protocol: the
//! planner negotiates index usage, the executor opens a cursor and drives
//! it, and a transaction coordinator sequences commit hooks around writes.
//!
//! These traits are **open** (user-implementable). Extension authors
//! implement [`VirtualTable`] and [`VirtualTableCursor`] to create custom
//! virtual table modules, then hand the engine a [`ModuleDescriptor`]
//! declaring the version and optional capabilities the module offers.
//!
//! The engine works with the type-erased [`Table`]/[`Cursor`] objects;
//! [`ModuleDescriptor::new`] wraps a typed implementation automatically.

mod descriptor;
mod erased;
mod index;
mod table;

pub use descriptor::{Capability, CapabilitySet, ModuleDescriptor, ModuleVersion};
pub use erased::{Cursor, Module, Table};
pub use index::{
    ConstraintOp, IndexConstraint, IndexConstraintUsage, IndexInfo, IndexOrderBy,
};
pub use table::{ColumnContext, VirtualTable, VirtualTableCursor};
