//! Per-connection schema cache and cursor arena.
//!
//! The engine owns every live [`Table`] instance and scan cursor, and
//! hands out opaque [`TableId`]/[`CursorId`] handles. Lifecycle and scan
//! invariants are enforced here, at the boundary, before a provider
//! callback is ever reached: a dangling handle or an out-of-state call is
//! rejected engine-side.
//!
//! A `Connection` is single-threaded: callbacks run synchronously on the
//! thread executing the query. The [`ModuleRegistry`] may be shared by
//! several connections; instances and cursors are never shared.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use vtx_error::{Result, VtxError};
use vtx_module::{Capability, CapabilitySet, ColumnContext, Cursor, Module, Table};
use vtx_types::{ModuleArgs, Value};

use crate::plan::{self, PlannedConstraint, ScanPlan};
use crate::registry::ModuleRegistry;
use crate::scan::ScanState;
use crate::txn::TxnCoordinator;

/// Opaque handle to a live virtual table instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(u64);

/// Opaque handle to an open scan cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(u64);

struct InstanceSlot {
    /// Table name as declared.
    name: String,
    /// Declared schema string captured right after create/connect.
    schema: String,
    module: Arc<dyn Module>,
    capabilities: CapabilitySet,
    eponymous: bool,
    table: Box<dyn Table>,
    open_cursors: usize,
    txn: TxnCoordinator,
}

struct CursorSlot {
    table: TableId,
    state: ScanState,
    cursor: Box<Cursor>,
}

/// One connection's view of the virtual table world.
pub struct Connection {
    registry: Arc<ModuleRegistry>,
    instances: HashMap<u64, InstanceSlot>,
    tables_by_name: HashMap<String, u64>,
    cursors: HashMap<u64, CursorSlot>,
    next_table: u64,
    next_cursor: u64,
}

impl Connection {
    /// Open a connection backed by a shared module registry.
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            instances: HashMap::new(),
            tables_by_name: HashMap::new(),
            cursors: HashMap::new(),
            next_table: 1,
            next_cursor: 1,
        }
    }

    /// The shared module registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Instance lifecycle
    // -----------------------------------------------------------------------

    /// `CREATE VIRTUAL TABLE <db>.<table> USING <module>(<user_args>)`.
    ///
    /// Drives the module's `create` slot exactly once. If the provider
    /// fails, nothing is retained and `destroy` is never called for the
    /// stillborn instance.
    pub fn create_table(
        &mut self,
        db: &str,
        table_name: &str,
        module_name: &str,
        user_args: Vec<String>,
    ) -> Result<TableId> {
        self.instantiate(db, table_name, module_name, user_args, Instantiate::Create)
    }

    /// Attach to an already-created table on schema load. Same argument
    /// contract as [`create_table`](Self::create_table), but the provider
    /// must not create persistent state.
    pub fn connect_table(
        &mut self,
        db: &str,
        table_name: &str,
        module_name: &str,
        user_args: Vec<String>,
    ) -> Result<TableId> {
        self.instantiate(db, table_name, module_name, user_args, Instantiate::Connect)
    }

    fn instantiate(
        &mut self,
        db: &str,
        table_name: &str,
        module_name: &str,
        user_args: Vec<String>,
        how: Instantiate,
    ) -> Result<TableId> {
        let key = canonical(table_name);
        if self.tables_by_name.contains_key(&key) {
            return Err(VtxError::TableExists {
                name: table_name.to_owned(),
            });
        }
        let descriptor = self
            .registry
            .find(module_name)
            .ok_or_else(|| VtxError::NoSuchModule {
                name: module_name.to_owned(),
            })?;

        let args = ModuleArgs::new(module_name, db, table_name, user_args);
        let module = Arc::clone(descriptor.module());
        let table = match how {
            Instantiate::Create => module.create(&args)?,
            Instantiate::Connect => module.connect(&args)?,
        };
        let schema = table.declared_schema();

        let id = self.next_table;
        self.next_table += 1;
        self.instances.insert(
            id,
            InstanceSlot {
                name: table_name.to_owned(),
                schema,
                module,
                capabilities: descriptor.capabilities(),
                eponymous: false,
                table,
                open_cursors: 0,
                txn: TxnCoordinator::new(table_name),
            },
        );
        self.tables_by_name.insert(key, id);
        debug!(table = %table_name, module = %module_name, ?how, "vtab instance attached");
        Ok(TableId(id))
    }

    /// Resolve an eponymous module as a table, connecting on first use.
    ///
    /// Eponymous instances are connect-only: `create` and `destroy` are
    /// never invoked for them.
    pub fn eponymous_table(&mut self, module_name: &str) -> Result<TableId> {
        let key = canonical(module_name);
        if let Some(&id) = self.tables_by_name.get(&key) {
            return Ok(TableId(id));
        }
        let descriptor = self
            .registry
            .find(module_name)
            .ok_or_else(|| VtxError::NoSuchModule {
                name: module_name.to_owned(),
            })?;
        if !descriptor.is_eponymous() {
            return Err(VtxError::NoSuchTable {
                name: module_name.to_owned(),
            });
        }

        let args = ModuleArgs::new(module_name, "main", module_name, []);
        let module = Arc::clone(descriptor.module());
        let table = module.connect(&args)?;
        let schema = table.declared_schema();

        let id = self.next_table;
        self.next_table += 1;
        self.instances.insert(
            id,
            InstanceSlot {
                name: module_name.to_owned(),
                schema,
                module,
                capabilities: descriptor.capabilities(),
                eponymous: true,
                table,
                open_cursors: 0,
                txn: TxnCoordinator::new(module_name),
            },
        );
        self.tables_by_name.insert(key, id);
        debug!(module = %module_name, "eponymous instance connected");
        Ok(TableId(id))
    }

    /// Release this connection's in-memory view of the instance.
    ///
    /// Rejected while cursors on the instance are open.
    pub fn disconnect_table(&mut self, id: TableId) -> Result<()> {
        self.require_no_cursors(id, "xDisconnect")?;
        self.instance_mut(id)?.table.disconnect()?;
        if let Some(slot) = self.instances.remove(&id.0) {
            self.tables_by_name.remove(&canonical(&slot.name));
            debug!(table = %slot.name, "vtab instance disconnected");
        }
        Ok(())
    }

    /// `DROP` the table: remove persistent state via `destroy`.
    ///
    /// Rejected while cursors are open, and never invoked for eponymous
    /// instances. If the provider fails, the instance stays registered
    /// and the error surfaces to the caller.
    pub fn drop_table(&mut self, id: TableId) -> Result<()> {
        self.require_no_cursors(id, "xDestroy")?;
        let slot = self.instance_mut(id)?;
        if slot.eponymous {
            return Err(VtxError::protocol(
                "xDestroy",
                "eponymous instances are connect-only and cannot be dropped",
            ));
        }
        if let Err(e) = slot.table.destroy() {
            warn!(table = %slot.name, error = %e, "destroy failed; instance left registered");
            return Err(e);
        }
        if let Some(slot) = self.instances.remove(&id.0) {
            self.tables_by_name.remove(&canonical(&slot.name));
            debug!(table = %slot.name, "vtab instance destroyed");
        }
        Ok(())
    }

    /// Rename the table's persistent representation.
    pub fn rename_table(&mut self, id: TableId, new_name: &str) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Rename) {
            return Err(VtxError::Unsupported);
        }
        slot.table.rename(new_name)?;
        let old_key = canonical(&slot.name);
        slot.name = new_name.to_owned();
        self.tables_by_name.remove(&old_key);
        self.tables_by_name.insert(canonical(new_name), id.0);
        Ok(())
    }

    /// The declared schema captured at create/connect time.
    pub fn table_schema(&self, id: TableId) -> Result<&str> {
        Ok(&self.instance(id)?.schema)
    }

    /// Number of open cursors on the instance.
    pub fn open_cursor_count(&self, id: TableId) -> Result<usize> {
        Ok(self.instance(id)?.open_cursors)
    }

    /// Look up a live table by name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<TableId> {
        self.tables_by_name.get(&canonical(name)).map(|&id| TableId(id))
    }

    /// Refuse ordinary writes to shadow tables.
    ///
    /// A name of the form `<table>_<suffix>` is a shadow table when a
    /// live instance `<table>` belongs to a module that declares shadow
    /// names and claims `<suffix>`.
    pub fn check_shadow_write(&self, name: &str) -> Result<()> {
        for slot in self.instances.values() {
            if !slot.capabilities.contains(Capability::ShadowNames) {
                continue;
            }
            let prefix = format!("{}_", slot.name);
            if let Some(suffix) = name.strip_prefix(&prefix) {
                if slot.module.shadow_name(suffix) {
                    return Err(VtxError::ShadowTableWrite {
                        name: name.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Index negotiation
    // -----------------------------------------------------------------------

    /// Negotiate a scan plan for one constraint candidate (see
    /// [`plan::negotiate`]).
    pub fn negotiate(
        &self,
        id: TableId,
        constraints: &[PlannedConstraint],
        order_by: &[vtx_module::IndexOrderBy],
    ) -> Result<ScanPlan> {
        let slot = self.instance(id)?;
        plan::negotiate(slot.table.as_ref(), constraints, order_by)
    }

    /// Negotiate all candidates and keep the cheapest plan (see
    /// [`plan::select_plan`]).
    pub fn select_plan(
        &self,
        id: TableId,
        candidates: &[Vec<PlannedConstraint>],
        order_by: &[vtx_module::IndexOrderBy],
    ) -> Result<ScanPlan> {
        let slot = self.instance(id)?;
        plan::select_plan(slot.table.as_ref(), candidates, order_by)
    }

    // -----------------------------------------------------------------------
    // Scan protocol
    // -----------------------------------------------------------------------

    /// Open a scan cursor on the instance.
    pub fn open_cursor(&mut self, id: TableId) -> Result<CursorId> {
        let slot = self.instance_mut(id)?;
        let cursor = slot.table.open()?;
        slot.open_cursors += 1;
        let cid = self.next_cursor;
        self.next_cursor += 1;
        self.cursors.insert(
            cid,
            CursorSlot {
                table: id,
                state: ScanState::Opened,
                cursor,
            },
        );
        debug!(cursor = cid, "cursor opened");
        Ok(CursorId(cid))
    }

    /// Position the cursor at the first qualifying row.
    ///
    /// Re-entrant: filtering an already-iterating cursor restarts the
    /// scan with the new arguments.
    pub fn filter(
        &mut self,
        id: CursorId,
        idx_num: i32,
        idx_str: Option<&str>,
        args: &[Value],
    ) -> Result<()> {
        let slot = self.cursor_mut(id)?;
        match slot.cursor.filter(idx_num, idx_str, args) {
            Ok(()) => {
                slot.state = ScanState::Iterating;
                Ok(())
            }
            Err(e) => {
                // A failed filter leaves the scan position undefined.
                slot.state = ScanState::Opened;
                Err(e)
            }
        }
    }

    /// Filter using a negotiated [`ScanPlan`], replaying `(idx_num,
    /// idx_str)` verbatim.
    pub fn filter_with_plan(&mut self, id: CursorId, plan: &ScanPlan) -> Result<()> {
        self.filter(id, plan.idx_num, plan.idx_str.as_deref(), &plan.args)
    }

    /// Advance one row. Calling past end-of-data is a protocol violation
    /// rejected before the provider is invoked.
    pub fn next(&mut self, id: CursorId) -> Result<()> {
        let slot = self.cursor_mut(id)?;
        slot.state.require_iterating("xNext")?;
        if slot.cursor.eof() {
            return Err(VtxError::protocol("xNext", "cursor is past end-of-data"));
        }
        slot.cursor.next()
    }

    /// Whether the scan is exhausted. Pure query.
    pub fn eof(&self, id: CursorId) -> Result<bool> {
        let slot = self.cursor_ref(id)?;
        slot.state.require_iterating("xEof")?;
        Ok(slot.cursor.eof())
    }

    /// Read column `col` of the current row.
    pub fn column(&self, id: CursorId, col: i32) -> Result<Value> {
        let slot = self.cursor_ref(id)?;
        slot.state.require_iterating("xColumn")?;
        if slot.cursor.eof() {
            return Err(VtxError::protocol("xColumn", "no current row"));
        }
        let mut ctx = ColumnContext::new();
        slot.cursor.column(&mut ctx, col)?;
        Ok(ctx.take_value().unwrap_or(Value::Null))
    }

    /// Rowid of the current row.
    pub fn rowid(&self, id: CursorId) -> Result<i64> {
        let slot = self.cursor_ref(id)?;
        slot.state.require_iterating("xRowid")?;
        if slot.cursor.eof() {
            return Err(VtxError::protocol("xRowid", "no current row"));
        }
        slot.cursor.rowid()
    }

    /// Close the cursor and release scan-local resources deterministically.
    /// The handle is invalid afterwards. Closing an unfiltered cursor is
    /// legal (the only cancellation mechanism is to stop driving a scan).
    pub fn close_cursor(&mut self, id: CursorId) -> Result<()> {
        let slot = self
            .cursors
            .remove(&id.0)
            .ok_or(VtxError::StaleCursor { id: id.0 })?;
        if let Some(instance) = self.instances.get_mut(&slot.table.0) {
            instance.open_cursors -= 1;
        }
        debug!(cursor = id.0, "cursor closed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// INSERT/UPDATE/DELETE, in the protocol's argument convention (see
    /// [`vtx_module::VirtualTable::update`]).
    pub fn update(&mut self, id: TableId, args: &[Value]) -> Result<Option<i64>> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Write) {
            return Err(VtxError::ReadOnly);
        }
        match args {
            [] => Err(VtxError::protocol("xUpdate", "empty argument vector")),
            [rowid] if rowid.is_null() => Err(VtxError::protocol(
                "xUpdate",
                "DELETE requires a non-null rowid",
            )),
            _ => slot.table.update(args),
        }
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Begin a table-level transaction. A no-op when the module does not
    /// offer transaction hooks (the slot is simply not called).
    pub fn begin_txn(&mut self, id: TableId) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Transactions) {
            return Ok(());
        }
        slot.txn.begin(slot.table.as_mut())
    }

    /// Phase-one durability checkpoint.
    pub fn sync_txn(&mut self, id: TableId) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Transactions) {
            return Ok(());
        }
        slot.txn.sync(slot.table.as_mut())
    }

    /// Commit the table-level transaction.
    pub fn commit_txn(&mut self, id: TableId) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Transactions) {
            return Ok(());
        }
        slot.txn.commit(slot.table.as_mut())
    }

    /// Roll back the table-level transaction.
    pub fn rollback_txn(&mut self, id: TableId) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Transactions) {
            return Ok(());
        }
        slot.txn.rollback(slot.table.as_mut())
    }

    /// Open savepoint level `n`.
    pub fn savepoint(&mut self, id: TableId, n: i32) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Savepoints) {
            return Ok(());
        }
        slot.txn.savepoint(slot.table.as_mut(), n)
    }

    /// Release savepoint level `n`.
    pub fn release(&mut self, id: TableId, n: i32) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Savepoints) {
            return Ok(());
        }
        slot.txn.release(slot.table.as_mut(), n)
    }

    /// Roll back to savepoint level `n`.
    pub fn rollback_to(&mut self, id: TableId, n: i32) -> Result<()> {
        let slot = self.instance_mut(id)?;
        if !slot.capabilities.contains(Capability::Savepoints) {
            return Ok(());
        }
        slot.txn.rollback_to(slot.table.as_mut(), n)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn instance(&self, id: TableId) -> Result<&InstanceSlot> {
        self.instances
            .get(&id.0)
            .ok_or(VtxError::StaleTable { id: id.0 })
    }

    fn instance_mut(&mut self, id: TableId) -> Result<&mut InstanceSlot> {
        self.instances
            .get_mut(&id.0)
            .ok_or(VtxError::StaleTable { id: id.0 })
    }

    fn cursor_ref(&self, id: CursorId) -> Result<&CursorSlot> {
        self.cursors
            .get(&id.0)
            .ok_or(VtxError::StaleCursor { id: id.0 })
    }

    fn cursor_mut(&mut self, id: CursorId) -> Result<&mut CursorSlot> {
        self.cursors
            .get_mut(&id.0)
            .ok_or(VtxError::StaleCursor { id: id.0 })
    }

    fn require_no_cursors(&self, id: TableId, call: &'static str) -> Result<()> {
        let slot = self.instance(id)?;
        if slot.open_cursors > 0 {
            warn!(table = %slot.name, call, cursors = slot.open_cursors, "rejected: live cursors");
            return Err(VtxError::LiveCursors {
                table: slot.name.clone(),
                cursors: slot.open_cursors,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Instantiate {
    Create,
    Connect,
}

fn canonical(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}
