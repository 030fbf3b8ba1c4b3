//! Conformance tooling for virtual table providers.
//!
//! Three pieces, usable together or separately:
//!
//! - [`Recorder`]: a module decorator that logs every protocol call made
//!   to the wrapped provider, for call-sequence assertions.
//! - [`conformance::check_module`]: drives a registered module through a
//!   scripted battery of lifecycle and scan scenarios and returns a
//!   serializable [`ConformanceReport`].
//! - Reference modules: [`SeriesModule`] (eponymous, read-only, pushes
//!   constraints down), [`MemTableModule`] (writable, transactional,
//!   savepoint-aware), and [`FileTableModule`] (file-backed, with real
//!   create/destroy side effects).

pub mod conformance;
mod filetable;
mod memtable;
mod recorder;
mod series;

pub use conformance::{check_module, CheckResult, ConformanceReport};
pub use filetable::FileTableModule;
pub use memtable::MemTableModule;
pub use recorder::{CallKind, CallLog, CallRecord, Recorder};
pub use series::SeriesModule;
