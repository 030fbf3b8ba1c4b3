//! `memtable`: a writable, transactional in-memory reference table.
//!
//! Two columns `a, b`, rows keyed by rowid in a `BTreeMap`. Transaction
//! hooks work on whole-map snapshots: `begin` captures a base image,
//! `savepoint` stacks one image per level, and the rollback hooks restore
//! the matching image. Deliberately simple; it exists to exercise the
//! engine's write and transaction paths, not to be a storage engine.

use std::collections::BTreeMap;

use vtx_error::{Result, VtxError};
use vtx_module::{
    Capability, ColumnContext, IndexInfo, ModuleDescriptor, ModuleVersion, VirtualTable,
    VirtualTableCursor,
};
use vtx_types::{ModuleArgs, Value};

const NUM_COLS: usize = 2;

type Rows = BTreeMap<i64, Vec<Value>>;

/// The `memtable` module.
pub struct MemTableModule;

impl MemTableModule {
    /// Registration descriptor: writable, transactional, savepoint-aware,
    /// protocol V2.
    #[must_use]
    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new::<MemTable>("memtable", ModuleVersion::V2)
            .with_capability(Capability::Write)
            .with_capability(Capability::Transactions)
            .with_capability(Capability::Savepoints)
    }
}

#[derive(Default)]
pub(crate) struct MemTable {
    rows: Rows,
    next_rowid: i64,
    base: Option<Rows>,
    savepoints: Vec<(i32, Rows)>,
}

impl VirtualTable for MemTable {
    type Cursor = MemCursor;

    fn connect(_args: &ModuleArgs) -> Result<Self> {
        Ok(Self::default())
    }

    fn declared_schema(&self) -> String {
        "CREATE TABLE x(a, b)".to_owned()
    }

    fn best_index(&self, _info: &mut IndexInfo) -> Result<()> {
        Ok(())
    }

    fn open(&self) -> Result<MemCursor> {
        Ok(MemCursor::over(
            self.rows
                .iter()
                .map(|(rowid, values)| (*rowid, values.clone()))
                .collect(),
        ))
    }

    fn update(&mut self, args: &[Value]) -> Result<Option<i64>> {
        // DELETE: a lone rowid. A missing row is not an error.
        if let [rowid] = args {
            self.rows.remove(&rowid.to_integer());
            return Ok(None);
        }

        let values: Vec<Value> = (0..NUM_COLS)
            .map(|i| args.get(2 + i).cloned().unwrap_or(Value::Null))
            .collect();

        if args[0].is_null() {
            // INSERT, with an explicit or assigned rowid.
            let rowid = match &args[1] {
                Value::Null => {
                    self.next_rowid += 1;
                    self.next_rowid
                }
                v => v.to_integer(),
            };
            if self.rows.contains_key(&rowid) {
                return Err(VtxError::constraint(format!("rowid {rowid} already exists")));
            }
            self.next_rowid = self.next_rowid.max(rowid);
            self.rows.insert(rowid, values);
            return Ok(Some(rowid));
        }

        // UPDATE, possibly moving the row to a new rowid.
        let old = args[0].to_integer();
        let new = match &args[1] {
            Value::Null => old,
            v => v.to_integer(),
        };
        if self.rows.remove(&old).is_none() {
            return Err(VtxError::constraint(format!("no row with rowid {old}")));
        }
        if new != old && self.rows.contains_key(&new) {
            return Err(VtxError::constraint(format!("rowid {new} already exists")));
        }
        self.rows.insert(new, values);
        Ok(None)
    }

    fn begin(&mut self) -> Result<()> {
        self.base = Some(self.rows.clone());
        Ok(())
    }

    fn sync_txn(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.base = None;
        self.savepoints.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(base) = self.base.take() {
            self.rows = base;
        }
        self.savepoints.clear();
        Ok(())
    }

    fn savepoint(&mut self, n: i32) -> Result<()> {
        self.savepoints.push((n, self.rows.clone()));
        Ok(())
    }

    fn release(&mut self, n: i32) -> Result<()> {
        self.savepoints.retain(|(level, _)| *level < n);
        Ok(())
    }

    fn rollback_to(&mut self, n: i32) -> Result<()> {
        let image = self
            .savepoints
            .iter()
            .rev()
            .find(|(level, _)| *level == n)
            .map(|(_, rows)| rows.clone())
            .ok_or(VtxError::NoSuchSavepoint { level: n })?;
        self.rows = image;
        // Level n stays open; deeper levels are gone.
        self.savepoints.retain(|(level, _)| *level <= n);
        Ok(())
    }
}

pub(crate) struct MemCursor {
    // Snapshot taken at open time; writes during a scan do not disturb it.
    rows: Vec<(i64, Vec<Value>)>,
    pos: usize,
}

impl MemCursor {
    pub(crate) fn over(rows: Vec<(i64, Vec<Value>)>) -> Self {
        Self { rows, pos: 0 }
    }
}

impl VirtualTableCursor for MemCursor {
    fn filter(&mut self, _idx_num: i32, _idx_str: Option<&str>, _args: &[Value]) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn column(&self, ctx: &mut ColumnContext, col: i32) -> Result<()> {
        // Past-end reads yield NULL rather than panicking; the engine
        // rejects them before we are reached.
        let value = self
            .rows
            .get(self.pos)
            .and_then(|(_, values)| usize::try_from(col).ok().and_then(|c| values.get(c)))
            .cloned()
            .unwrap_or(Value::Null);
        ctx.set_value(value);
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        self.rows
            .get(self.pos)
            .map(|(rowid, _)| *rowid)
            .ok_or_else(|| VtxError::protocol("xRowid", "cursor is past the end of the scan"))
    }
}
