//! The per-cursor scan state machine.
//!
//! A cursor moves `Opened → Iterating → closed`. `filter` is the only
//! transition into `Iterating` and may be repeated to restart the scan;
//! closing removes the cursor from the arena, so a closed cursor is
//! represented by a stale handle rather than a stored state.

use vtx_error::{Result, VtxError};

/// Engine-side position of a cursor in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Allocated by `open`; scan position undefined until filtered.
    Opened,
    /// Positioned by `filter`; `next`/`eof`/`column`/`rowid` are legal.
    Iterating,
}

impl ScanState {
    /// Check that `next`/`eof`/`column`/`rowid` may run. Rejected before
    /// the provider is invoked.
    pub fn require_iterating(self, call: &'static str) -> Result<()> {
        match self {
            Self::Iterating => Ok(()),
            Self::Opened => Err(VtxError::protocol(
                call,
                "cursor has not been filtered",
            )),
        }
    }
}
