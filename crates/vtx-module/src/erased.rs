//! Type-erased module and table objects.
//!
//! The engine's registry and schema cache hold heterogeneous modules, so
//! they work with `dyn`-compatible objects rather than the typed
//! [`VirtualTable`] trait (whose constructors return `Self` and whose
//! cursor is an associated type). The adapters here erase a typed
//! implementation once, at registration time.

use std::marker::PhantomData;

use vtx_error::Result;
use vtx_types::{ModuleArgs, Value};

use crate::index::IndexInfo;
use crate::table::{VirtualTable, VirtualTableCursor};

/// A scan cursor as the engine sees it.
///
/// [`VirtualTableCursor`] is already object-safe; this alias names the
/// boxed form the erased [`Table`] hands out.
pub type Cursor = dyn VirtualTableCursor;

/// A live virtual table instance as the engine sees it.
///
/// One method per protocol slot. Optional slots keep their conservative
/// defaults from the typed trait; the engine additionally consults the
/// module's declared capability set and never calls an undeclared slot.
#[allow(clippy::missing_errors_doc)]
pub trait Table: Send + Sync {
    /// The `CREATE TABLE`-shaped column declaration.
    fn declared_schema(&self) -> String;

    /// Index negotiation (see [`IndexInfo`]).
    fn best_index(&self, info: &mut IndexInfo) -> Result<()>;

    /// Open a new scan cursor.
    fn open(&self) -> Result<Box<Cursor>>;

    /// Release one connection's in-memory view.
    fn disconnect(&mut self) -> Result<()>;

    /// Remove backing storage (DROP).
    fn destroy(&mut self) -> Result<()>;

    /// INSERT/UPDATE/DELETE.
    fn update(&mut self, args: &[Value]) -> Result<Option<i64>>;

    /// Rename the persistent representation.
    fn rename(&mut self, new_name: &str) -> Result<()>;

    /// Begin a table-level transaction.
    fn begin(&mut self) -> Result<()>;

    /// Phase-one durability checkpoint.
    fn sync_txn(&mut self) -> Result<()>;

    /// Finalize the transaction.
    fn commit(&mut self) -> Result<()>;

    /// Discard all changes since `begin`.
    fn rollback(&mut self) -> Result<()>;

    /// Open savepoint level `n`.
    fn savepoint(&mut self, n: i32) -> Result<()>;

    /// Release level `n` and all deeper levels.
    fn release(&mut self, n: i32) -> Result<()>;

    /// Discard changes above level `n`, leaving `n` open.
    fn rollback_to(&mut self, n: i32) -> Result<()>;
}

/// A registered module: the factory the engine calls to produce
/// [`Table`] instances.
#[allow(clippy::missing_errors_doc)]
pub trait Module: Send + Sync {
    /// `CREATE VIRTUAL TABLE` — may create persistent state.
    fn create(&self, args: &ModuleArgs) -> Result<Box<dyn Table>>;

    /// Attach to existing state on schema load.
    fn connect(&self, args: &ModuleArgs) -> Result<Box<dyn Table>>;

    /// Whether `suffix` names a shadow table of this module.
    fn shadow_name(&self, suffix: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

struct TableAdapter<T>(T);

impl<T> Table for TableAdapter<T>
where
    T: VirtualTable + 'static,
    T::Cursor: 'static,
{
    fn declared_schema(&self) -> String {
        self.0.declared_schema()
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        self.0.best_index(info)
    }

    fn open(&self) -> Result<Box<Cursor>> {
        Ok(Box::new(self.0.open()?))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.0.disconnect()
    }

    fn destroy(&mut self) -> Result<()> {
        self.0.destroy()
    }

    fn update(&mut self, args: &[Value]) -> Result<Option<i64>> {
        self.0.update(args)
    }

    fn rename(&mut self, new_name: &str) -> Result<()> {
        self.0.rename(new_name)
    }

    fn begin(&mut self) -> Result<()> {
        self.0.begin()
    }

    fn sync_txn(&mut self) -> Result<()> {
        self.0.sync_txn()
    }

    fn commit(&mut self) -> Result<()> {
        self.0.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.0.rollback()
    }

    fn savepoint(&mut self, n: i32) -> Result<()> {
        self.0.savepoint(n)
    }

    fn release(&mut self, n: i32) -> Result<()> {
        self.0.release(n)
    }

    fn rollback_to(&mut self, n: i32) -> Result<()> {
        self.0.rollback_to(n)
    }
}

/// Erases a typed [`VirtualTable`] implementation into a [`Module`].
///
/// The `fn() -> T` phantom keeps the adapter `Send + Sync` without
/// requiring an instance of `T`.
pub(crate) struct ModuleAdapter<T>(PhantomData<fn() -> T>);

impl<T> ModuleAdapter<T> {
    pub(crate) const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Module for ModuleAdapter<T>
where
    T: VirtualTable + 'static,
    T::Cursor: 'static,
{
    fn create(&self, args: &ModuleArgs) -> Result<Box<dyn Table>> {
        Ok(Box::new(TableAdapter(T::create(args)?)))
    }

    fn connect(&self, args: &ModuleArgs) -> Result<Box<dyn Table>> {
        Ok(Box::new(TableAdapter(T::connect(args)?)))
    }

    fn shadow_name(&self, suffix: &str) -> bool {
        T::shadow_name(suffix)
    }
}

#[cfg(test)]
mod tests {
    use vtx_error::VtxError;

    use super::*;
    use crate::table::ColumnContext;

    struct One;

    struct OneCursor {
        done: bool,
    }

    impl VirtualTable for One {
        type Cursor = OneCursor;

        fn connect(_args: &ModuleArgs) -> Result<Self> {
            Ok(Self)
        }

        fn declared_schema(&self) -> String {
            "CREATE TABLE x(v)".to_owned()
        }

        fn best_index(&self, _info: &mut IndexInfo) -> Result<()> {
            Ok(())
        }

        fn open(&self) -> Result<OneCursor> {
            Ok(OneCursor { done: false })
        }
    }

    impl VirtualTableCursor for OneCursor {
        fn filter(&mut self, _idx_num: i32, _idx_str: Option<&str>, _args: &[Value]) -> Result<()> {
            self.done = false;
            Ok(())
        }

        fn next(&mut self) -> Result<()> {
            self.done = true;
            Ok(())
        }

        fn eof(&self) -> bool {
            self.done
        }

        fn column(&self, ctx: &mut ColumnContext, _col: i32) -> Result<()> {
            ctx.set_value(Value::Integer(1));
            Ok(())
        }

        fn rowid(&self) -> Result<i64> {
            Ok(1)
        }
    }

    #[test]
    fn test_erased_round_trip() {
        let module: Box<dyn Module> = Box::new(ModuleAdapter::<One>::new());
        let args = ModuleArgs::new("one", "main", "t", []);

        let mut table = module.create(&args).expect("create");
        assert_eq!(table.declared_schema(), "CREATE TABLE x(v)");

        let mut cursor = table.open().expect("open");
        cursor.filter(0, None, &[]).expect("filter");
        assert!(!cursor.eof());

        let mut ctx = ColumnContext::new();
        cursor.column(&mut ctx, 0).expect("column");
        assert_eq!(ctx.take_value(), Some(Value::Integer(1)));
        assert_eq!(cursor.rowid().expect("rowid"), 1);

        cursor.next().expect("next");
        assert!(cursor.eof());
        drop(cursor);

        // Defaults pass through the erased surface unchanged.
        assert!(matches!(
            table.update(&[Value::Null]).unwrap_err(),
            VtxError::ReadOnly
        ));
        assert!(matches!(
            table.rename("t2").unwrap_err(),
            VtxError::Unsupported
        ));
        table.destroy().expect("destroy");
    }

    #[test]
    fn test_erased_shadow_name_default() {
        let module: Box<dyn Module> = Box::new(ModuleAdapter::<One>::new());
        assert!(!module.shadow_name("idx"));
    }
}
