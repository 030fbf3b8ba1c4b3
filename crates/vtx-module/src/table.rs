//! The typed provider traits: [`VirtualTable`] and [`VirtualTableCursor`].

use vtx_error::{Result, VtxError};
use vtx_types::{ModuleArgs, Value};

use crate::index::IndexInfo;

// ---------------------------------------------------------------------------
// Column context
// ---------------------------------------------------------------------------

/// A context object passed to [`VirtualTableCursor::column`] for writing
/// the column value.
///
/// Analogous to C SQLite's `sqlite3_context*` used with `sqlite3_result_*`.
#[derive(Debug, Default)]
pub struct ColumnContext {
    value: Option<Value>,
}

impl ColumnContext {
    /// Create a new empty column context.
    #[must_use]
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Set the value for this column.
    pub fn set_value(&mut self, val: Value) {
        self.value = Some(val);
    }

    /// Take the value out of this context, leaving `None`.
    pub fn take_value(&mut self) -> Option<Value> {
        self.value.take()
    }
}

// ---------------------------------------------------------------------------
// VirtualTable trait
// ---------------------------------------------------------------------------

/// A virtual table module implementation.
///
/// Covers the full lifecycle: creation, connection, index negotiation,
/// scanning, mutation, transactions, and destruction.
///
/// This trait is **open** (user-implementable). The `Sized` bound on
/// constructor methods (`create`, `connect`) keeps the rest of the trait
/// usable through the type-erased [`Table`](crate::Table) object.
///
/// # Default Implementations
///
/// Most methods have conservative defaults. At minimum, implement
/// `connect`, `declared_schema`, `best_index`, and `open`. Optional slots
/// (`update`, `rename`, transaction and savepoint hooks) are only invoked
/// by the engine when the module's [`CapabilitySet`](crate::CapabilitySet)
/// declares them.
///
/// All callbacks are synchronous: the engine invokes them on the thread
/// executing the query. Cancellation is expressed by the engine ceasing to
/// drive a cursor and dropping it, which the provider must treat as a
/// normal scan termination.
#[allow(clippy::missing_errors_doc)]
pub trait VirtualTable: Send + Sync {
    /// The cursor type for scanning this virtual table.
    type Cursor: VirtualTableCursor;

    /// Called for `CREATE VIRTUAL TABLE`.
    ///
    /// May create backing storage. Default delegates to `connect`
    /// (suitable for eponymous virtual tables).
    fn create(args: &ModuleArgs) -> Result<Self>
    where
        Self: Sized,
    {
        Self::connect(args)
    }

    /// Called once per schema load for a table that already exists.
    ///
    /// Must not create persistent state, only attach to existing state.
    fn connect(args: &ModuleArgs) -> Result<Self>
    where
        Self: Sized;

    /// The `CREATE TABLE`-shaped declaration describing this table's
    /// columns. The engine stores it as instance metadata (the
    /// `sqlite3_declare_vtab` equivalent).
    fn declared_schema(&self) -> String;

    /// Inform the query planner about available indexes and their costs.
    fn best_index(&self, info: &mut IndexInfo) -> Result<()>;

    /// Open a new scan cursor.
    fn open(&self) -> Result<Self::Cursor>;

    /// Release one connection's in-memory view (opposite of `connect`).
    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called for `DROP` — remove backing storage.
    ///
    /// Default delegates to `disconnect`.
    fn destroy(&mut self) -> Result<()> {
        self.disconnect()
    }

    /// INSERT/UPDATE/DELETE on the virtual table.
    ///
    /// - `args.len() == 1`: DELETE of rowid `args[0]`
    /// - `args[0]` Null: INSERT (`args[1]` is the requested rowid or Null,
    ///   `args[2..]` the column values)
    /// - otherwise: UPDATE of rowid `args[0]` (possibly moving to `args[1]`)
    ///
    /// Returns the new rowid for INSERT, `None` for UPDATE/DELETE.
    ///
    /// Default returns [`VtxError::ReadOnly`].
    fn update(&mut self, _args: &[Value]) -> Result<Option<i64>> {
        Err(VtxError::ReadOnly)
    }

    /// Rename the table's persistent representation.
    ///
    /// Default returns [`VtxError::Unsupported`].
    fn rename(&mut self, _new_name: &str) -> Result<()> {
        Err(VtxError::Unsupported)
    }

    /// Begin a virtual table transaction.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Durability checkpoint before commit (phase 1 of 2PC). A failure
    /// here must leave the table able to `rollback`.
    fn sync_txn(&mut self) -> Result<()> {
        Ok(())
    }

    /// Commit a virtual table transaction.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Roll back a virtual table transaction.
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    /// Create a savepoint at level `n`.
    fn savepoint(&mut self, _n: i32) -> Result<()> {
        Ok(())
    }

    /// Release savepoint level `n` (and implicitly all deeper levels).
    fn release(&mut self, _n: i32) -> Result<()> {
        Ok(())
    }

    /// Roll back to savepoint level `n`: discard all changes attributed to
    /// levels strictly greater than `n`, leaving `n` itself open.
    fn rollback_to(&mut self, _n: i32) -> Result<()> {
        Ok(())
    }

    /// Whether `suffix` names a shadow table of this module
    /// (`<table>_<suffix>`). Consulted only for V3 modules declaring
    /// shadow-name support.
    fn shadow_name(_suffix: &str) -> bool
    where
        Self: Sized,
    {
        false
    }
}

// ---------------------------------------------------------------------------
// VirtualTableCursor trait
// ---------------------------------------------------------------------------

/// A cursor for scanning a virtual table.
///
/// Cursors are `Send` but **not** `Sync` — they are single-threaded scan
/// objects bound to a specific filter invocation.
///
/// # Lifecycle
///
/// 1. [`filter`](Self::filter) begins a scan with planner-chosen parameters.
/// 2. Iterate: check [`eof`](Self::eof), read [`column`](Self::column) /
///    [`rowid`](Self::rowid), advance with [`next`](Self::next).
/// 3. The cursor is dropped when the scan completes or is abandoned.
///
/// `filter` is re-entrant: calling it again restarts the scan with new
/// arguments. The engine never calls `next` past end-of-data, and never
/// reads columns while `eof` is true.
#[allow(clippy::missing_errors_doc)]
pub trait VirtualTableCursor: Send {
    /// Begin a scan with the parameters chosen during index negotiation.
    /// `(idx_num, idx_str)` arrive verbatim from `best_index`.
    fn filter(&mut self, idx_num: i32, idx_str: Option<&str>, args: &[Value]) -> Result<()>;

    /// Advance to the next row.
    fn next(&mut self) -> Result<()>;

    /// Whether the cursor has moved past the last row. Pure query.
    fn eof(&self) -> bool;

    /// Write the value of column `col` into `ctx`.
    fn column(&self, ctx: &mut ColumnContext, col: i32) -> Result<()>;

    /// Return the rowid of the current row.
    fn rowid(&self) -> Result<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ConstraintOp, IndexConstraint};

    // -- Mock: counter(limit) virtual table --

    struct Counter {
        destroyed: bool,
    }

    struct CounterCursor {
        limit: i64,
        current: i64,
    }

    impl VirtualTable for Counter {
        type Cursor = CounterCursor;

        fn connect(_args: &ModuleArgs) -> Result<Self> {
            Ok(Self { destroyed: false })
        }

        fn declared_schema(&self) -> String {
            "CREATE TABLE x(value)".to_owned()
        }

        fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
            info.estimated_cost = 10.0;
            info.estimated_rows = 100;
            info.idx_num = 1;
            if !info.constraints.is_empty() && info.constraints[0].usable {
                info.constraint_usage[0].argv_index = 1;
                info.constraint_usage[0].omit = true;
            }
            Ok(())
        }

        fn open(&self) -> Result<CounterCursor> {
            Ok(CounterCursor {
                limit: 0,
                current: 0,
            })
        }

        fn destroy(&mut self) -> Result<()> {
            self.destroyed = true;
            Ok(())
        }
    }

    impl VirtualTableCursor for CounterCursor {
        fn filter(&mut self, _idx_num: i32, _idx_str: Option<&str>, args: &[Value]) -> Result<()> {
            self.limit = args.first().map_or(3, Value::to_integer);
            self.current = 1;
            Ok(())
        }

        fn next(&mut self) -> Result<()> {
            self.current += 1;
            Ok(())
        }

        fn eof(&self) -> bool {
            self.current > self.limit
        }

        fn column(&self, ctx: &mut ColumnContext, _col: i32) -> Result<()> {
            ctx.set_value(Value::Integer(self.current));
            Ok(())
        }

        fn rowid(&self) -> Result<i64> {
            Ok(self.current)
        }
    }

    fn args() -> ModuleArgs {
        ModuleArgs::new("counter", "main", "c", [])
    }

    #[test]
    fn test_create_delegates_to_connect() {
        let vtab = Counter::create(&args()).unwrap();
        assert!(!vtab.destroyed);
    }

    #[test]
    fn test_best_index_populates_info() {
        let vtab = Counter::connect(&args()).unwrap();
        let mut info = IndexInfo::new(
            vec![IndexConstraint {
                column: 0,
                op: ConstraintOp::Lt,
                usable: true,
            }],
            vec![],
        );

        vtab.best_index(&mut info).unwrap();

        assert_eq!(info.idx_num, 1);
        assert!((info.estimated_cost - 10.0).abs() < f64::EPSILON);
        assert_eq!(info.constraint_usage[0].argv_index, 1);
        assert!(info.constraint_usage[0].omit);
    }

    #[test]
    fn test_cursor_filter_next_eof() {
        let vtab = Counter::connect(&args()).unwrap();
        let mut cursor = vtab.open().unwrap();
        cursor.filter(0, None, &[Value::Integer(3)]).unwrap();

        let mut values = Vec::new();
        while !cursor.eof() {
            let mut ctx = ColumnContext::new();
            cursor.column(&mut ctx, 0).unwrap();
            values.push((cursor.rowid().unwrap(), ctx.take_value().unwrap()));
            cursor.next().unwrap();
        }

        assert_eq!(
            values,
            vec![
                (1, Value::Integer(1)),
                (2, Value::Integer(2)),
                (3, Value::Integer(3)),
            ]
        );
    }

    #[test]
    fn test_filter_reentrant() {
        let vtab = Counter::connect(&args()).unwrap();
        let mut cursor = vtab.open().unwrap();

        cursor.filter(0, None, &[Value::Integer(2)]).unwrap();
        cursor.next().unwrap();
        cursor.next().unwrap();
        assert!(cursor.eof());

        // Restarting the scan with new arguments resets the position.
        cursor.filter(0, None, &[Value::Integer(1)]).unwrap();
        assert!(!cursor.eof());
        assert_eq!(cursor.rowid().unwrap(), 1);
    }

    #[test]
    fn test_update_readonly_default() {
        let mut vtab = Counter::connect(&args()).unwrap();
        let err = vtab.update(&[Value::Null]).unwrap_err();
        assert!(matches!(err, VtxError::ReadOnly));
    }

    #[test]
    fn test_rename_unsupported_default() {
        let mut vtab = Counter::connect(&args()).unwrap();
        let err = vtab.rename("other").unwrap_err();
        assert!(matches!(err, VtxError::Unsupported));
    }

    #[test]
    fn test_destroy_vs_disconnect() {
        let mut vtab = Counter::connect(&args()).unwrap();
        vtab.disconnect().unwrap();
        assert!(!vtab.destroyed);
        vtab.destroy().unwrap();
        assert!(vtab.destroyed);
    }

    #[test]
    fn test_shadow_name_default() {
        assert!(!Counter::shadow_name("idx"));
    }

    #[test]
    fn test_column_context_lifecycle() {
        let mut ctx = ColumnContext::new();
        assert!(ctx.take_value().is_none());

        ctx.set_value(Value::Integer(42));
        assert_eq!(ctx.take_value(), Some(Value::Integer(42)));
        assert!(ctx.take_value().is_none());
    }
}
