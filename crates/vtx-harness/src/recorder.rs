//! Call-logging module decorator.
//!
//! Wraps a registered module so that every protocol call reaching the
//! provider is appended to a shared [`CallLog`] before being forwarded.
//! Conformance tests register the wrapped descriptor, run a scenario, and
//! assert on the recorded sequence. Cursor drop is recorded as `Close`,
//! which makes engine-side close-on-removal observable.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use vtx_error::Result;
use vtx_module::{ColumnContext, Cursor, IndexInfo, Module, ModuleDescriptor, Table, VirtualTableCursor};
use vtx_types::{ModuleArgs, Value};

/// One protocol slot, as recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallKind {
    Create,
    Connect,
    BestIndex,
    Open,
    Filter,
    Next,
    Eof,
    Column,
    Rowid,
    Close,
    Update,
    Rename,
    Disconnect,
    Destroy,
    Begin,
    Sync,
    Commit,
    Rollback,
    Savepoint,
    Release,
    RollbackTo,
    ShadowName,
}

/// A recorded call: the slot plus a short human-readable summary.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub kind: CallKind,
    pub detail: String,
}

/// Shared, clonable log of recorded calls.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<CallRecord>>>);

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: CallKind, detail: impl Into<String>) {
        self.0.lock().push(CallRecord {
            kind,
            detail: detail.into(),
        });
    }

    /// Snapshot of the recorded call kinds, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<CallKind> {
        self.0.lock().iter().map(|r| r.kind).collect()
    }

    /// Snapshot of the full records, in order.
    #[must_use]
    pub fn records(&self) -> Vec<CallRecord> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Whether `expected` occurs as a subsequence of the recorded kinds.
    #[must_use]
    pub fn contains_sequence(&self, expected: &[CallKind]) -> bool {
        let kinds = self.kinds();
        let mut want = expected.iter();
        let mut next = want.next();
        for kind in kinds {
            match next {
                Some(&k) if k == kind => next = want.next(),
                Some(_) => {}
                None => return true,
            }
        }
        next.is_none()
    }
}

/// Builds recording decorators around an existing descriptor.
pub struct Recorder;

impl Recorder {
    /// Wrap a descriptor so every provider call lands in `log`.
    ///
    /// Name, version, capabilities, and eponymous status are preserved;
    /// only the factory is replaced.
    #[must_use]
    pub fn wrap(descriptor: &ModuleDescriptor, log: &CallLog) -> ModuleDescriptor {
        let module = RecordingModule {
            inner: Arc::clone(descriptor.module()),
            log: log.clone(),
        };
        let mut wrapped = ModuleDescriptor::erased(
            descriptor.name().to_owned(),
            descriptor.version(),
            Arc::new(module),
        );
        for cap in descriptor.capabilities().iter() {
            wrapped = wrapped.with_capability(cap);
        }
        if descriptor.is_eponymous() {
            wrapped = wrapped.eponymous();
        }
        wrapped
    }
}

struct RecordingModule {
    inner: Arc<dyn Module>,
    log: CallLog,
}

impl Module for RecordingModule {
    fn create(&self, args: &ModuleArgs) -> Result<Box<dyn Table>> {
        self.log
            .push(CallKind::Create, args.as_slice().join(","));
        let inner = self.inner.create(args)?;
        Ok(Box::new(RecordingTable {
            inner,
            log: self.log.clone(),
        }))
    }

    fn connect(&self, args: &ModuleArgs) -> Result<Box<dyn Table>> {
        self.log
            .push(CallKind::Connect, args.as_slice().join(","));
        let inner = self.inner.connect(args)?;
        Ok(Box::new(RecordingTable {
            inner,
            log: self.log.clone(),
        }))
    }

    fn shadow_name(&self, suffix: &str) -> bool {
        self.log.push(CallKind::ShadowName, suffix);
        self.inner.shadow_name(suffix)
    }
}

struct RecordingTable {
    inner: Box<dyn Table>,
    log: CallLog,
}

impl Table for RecordingTable {
    fn declared_schema(&self) -> String {
        self.inner.declared_schema()
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        self.log.push(
            CallKind::BestIndex,
            format!("constraints={}", info.constraints.len()),
        );
        self.inner.best_index(info)
    }

    fn open(&self) -> Result<Box<Cursor>> {
        self.log.push(CallKind::Open, "");
        let inner = self.inner.open()?;
        Ok(Box::new(RecordingCursor {
            inner,
            log: self.log.clone(),
        }))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.log.push(CallKind::Disconnect, "");
        self.inner.disconnect()
    }

    fn destroy(&mut self) -> Result<()> {
        self.log.push(CallKind::Destroy, "");
        self.inner.destroy()
    }

    fn update(&mut self, args: &[Value]) -> Result<Option<i64>> {
        self.log
            .push(CallKind::Update, format!("args={}", args.len()));
        self.inner.update(args)
    }

    fn rename(&mut self, new_name: &str) -> Result<()> {
        self.log.push(CallKind::Rename, new_name);
        self.inner.rename(new_name)
    }

    fn begin(&mut self) -> Result<()> {
        self.log.push(CallKind::Begin, "");
        self.inner.begin()
    }

    fn sync_txn(&mut self) -> Result<()> {
        self.log.push(CallKind::Sync, "");
        self.inner.sync_txn()
    }

    fn commit(&mut self) -> Result<()> {
        self.log.push(CallKind::Commit, "");
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.log.push(CallKind::Rollback, "");
        self.inner.rollback()
    }

    fn savepoint(&mut self, n: i32) -> Result<()> {
        self.log.push(CallKind::Savepoint, format!("n={n}"));
        self.inner.savepoint(n)
    }

    fn release(&mut self, n: i32) -> Result<()> {
        self.log.push(CallKind::Release, format!("n={n}"));
        self.inner.release(n)
    }

    fn rollback_to(&mut self, n: i32) -> Result<()> {
        self.log.push(CallKind::RollbackTo, format!("n={n}"));
        self.inner.rollback_to(n)
    }
}

struct RecordingCursor {
    inner: Box<Cursor>,
    log: CallLog,
}

impl VirtualTableCursor for RecordingCursor {
    fn filter(&mut self, idx_num: i32, idx_str: Option<&str>, args: &[Value]) -> Result<()> {
        self.log.push(
            CallKind::Filter,
            format!("idx_num={idx_num} args={}", args.len()),
        );
        self.inner.filter(idx_num, idx_str, args)
    }

    fn next(&mut self) -> Result<()> {
        self.log.push(CallKind::Next, "");
        self.inner.next()
    }

    fn eof(&self) -> bool {
        self.log.push(CallKind::Eof, "");
        self.inner.eof()
    }

    fn column(&self, ctx: &mut ColumnContext, col: i32) -> Result<()> {
        self.log.push(CallKind::Column, format!("col={col}"));
        self.inner.column(ctx, col)
    }

    fn rowid(&self) -> Result<i64> {
        self.log.push(CallKind::Rowid, "");
        self.inner.rowid()
    }
}

impl Drop for RecordingCursor {
    fn drop(&mut self) {
        self.log.push(CallKind::Close, "");
    }
}
