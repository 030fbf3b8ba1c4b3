//! Per-instance transaction coordinator.
//!
//! Sequences a virtual table's participation in the atomic-commit
//! protocol:
//!
//! ```text
//! begin → [savepoint(n)]* → sync → commit        (success)
//! begin → ...             → rollback             (abort)
//! ```
//!
//! The coordinator's calls on one instance are serialized by the engine.
//! A commit failure after a successful sync cannot be undone by this
//! protocol, so it poisons the coordinator and every later transaction
//! call on the instance is refused.

use tracing::{debug, error, warn};
use vtx_error::{Result, VtxError};
use vtx_module::Table;

/// Phase of the instance's current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnPhase {
    /// No transaction open.
    Idle,
    /// `begin` succeeded; changes are being tracked.
    Active,
    /// `sync` succeeded; the durability checkpoint is done.
    Synced,
    /// A commit-phase failure left the instance in an engine-fatal state.
    Poisoned,
}

/// Sequences transaction and savepoint hooks for one table instance.
#[derive(Debug)]
pub struct TxnCoordinator {
    table_name: String,
    phase: TxnPhase,
    /// Open savepoint levels, strictly increasing.
    levels: Vec<i32>,
}

impl TxnCoordinator {
    /// Create an idle coordinator for the named instance.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            phase: TxnPhase::Idle,
            levels: Vec::new(),
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TxnPhase {
        self.phase
    }

    /// Open savepoint levels, innermost last.
    #[must_use]
    pub fn open_levels(&self) -> &[i32] {
        &self.levels
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.phase == TxnPhase::Poisoned {
            return Err(VtxError::CoordinatorPoisoned {
                table: self.table_name.clone(),
            });
        }
        Ok(())
    }

    /// Start tracking changes. At most one open transaction per instance.
    pub fn begin(&mut self, table: &mut dyn Table) -> Result<()> {
        self.check_poisoned()?;
        if self.phase != TxnPhase::Idle {
            return Err(VtxError::NestedTransaction);
        }
        table.begin()?;
        self.phase = TxnPhase::Active;
        debug!(table = %self.table_name, "vtab transaction begun");
        Ok(())
    }

    /// Phase-one durability checkpoint. On failure the transaction stays
    /// `Active` so `rollback` can still succeed.
    pub fn sync(&mut self, table: &mut dyn Table) -> Result<()> {
        self.check_poisoned()?;
        if self.phase != TxnPhase::Active {
            return Err(VtxError::NoActiveTransaction);
        }
        table.sync_txn()?;
        self.phase = TxnPhase::Synced;
        debug!(table = %self.table_name, "vtab transaction synced");
        Ok(())
    }

    /// Finalize. Requires a successful `sync` first. Failure here is
    /// never retried: the coordinator is poisoned and the error surfaces
    /// as a consistency failure.
    pub fn commit(&mut self, table: &mut dyn Table) -> Result<()> {
        self.check_poisoned()?;
        match self.phase {
            TxnPhase::Synced => {}
            TxnPhase::Idle => return Err(VtxError::NoActiveTransaction),
            TxnPhase::Active => {
                return Err(VtxError::protocol(
                    "xCommit",
                    "commit requires a successful sync first",
                ));
            }
            TxnPhase::Poisoned => unreachable!("checked above"),
        }
        if let Err(e) = table.commit() {
            self.phase = TxnPhase::Poisoned;
            error!(table = %self.table_name, error = %e, "vtab commit failed after sync");
            return Err(VtxError::Consistency {
                table: self.table_name.clone(),
                detail: e.to_string(),
            });
        }
        self.phase = TxnPhase::Idle;
        self.levels.clear();
        debug!(table = %self.table_name, "vtab transaction committed");
        Ok(())
    }

    /// Discard all changes since `begin`. Legal from `Active` or `Synced`
    /// (a sync failure must still allow rollback). The transaction is
    /// considered closed even if the provider reports an error.
    pub fn rollback(&mut self, table: &mut dyn Table) -> Result<()> {
        self.check_poisoned()?;
        if self.phase == TxnPhase::Idle {
            return Err(VtxError::NoActiveTransaction);
        }
        let result = table.rollback();
        self.phase = TxnPhase::Idle;
        self.levels.clear();
        if let Err(ref e) = result {
            warn!(table = %self.table_name, error = %e, "vtab rollback reported an error");
        } else {
            debug!(table = %self.table_name, "vtab transaction rolled back");
        }
        result
    }

    /// Open savepoint level `n`. Levels are non-negative and strictly
    /// increasing per open savepoint.
    pub fn savepoint(&mut self, table: &mut dyn Table, n: i32) -> Result<()> {
        self.check_poisoned()?;
        if self.phase != TxnPhase::Active {
            return Err(VtxError::NoActiveTransaction);
        }
        if n < 0 {
            return Err(VtxError::protocol(
                "xSavepoint",
                format!("negative savepoint level {n}"),
            ));
        }
        if let Some(&top) = self.levels.last() {
            if n <= top {
                return Err(VtxError::protocol(
                    "xSavepoint",
                    format!("level {n} not above innermost open level {top}"),
                ));
            }
        }
        table.savepoint(n)?;
        self.levels.push(n);
        debug!(table = %self.table_name, level = n, "savepoint opened");
        Ok(())
    }

    /// Release level `n`: closes `n` and, implicitly, all deeper levels.
    pub fn release(&mut self, table: &mut dyn Table, n: i32) -> Result<()> {
        self.check_poisoned()?;
        if self.phase != TxnPhase::Active {
            return Err(VtxError::NoActiveTransaction);
        }
        if !self.levels.contains(&n) {
            return Err(VtxError::NoSuchSavepoint { level: n });
        }
        table.release(n)?;
        self.levels.retain(|&l| l < n);
        debug!(table = %self.table_name, level = n, "savepoint released");
        Ok(())
    }

    /// Roll back to level `n`: discards changes at levels strictly
    /// greater than `n` and leaves `n` itself open.
    pub fn rollback_to(&mut self, table: &mut dyn Table, n: i32) -> Result<()> {
        self.check_poisoned()?;
        if self.phase != TxnPhase::Active {
            return Err(VtxError::NoActiveTransaction);
        }
        if !self.levels.contains(&n) {
            return Err(VtxError::NoSuchSavepoint { level: n });
        }
        table.rollback_to(n)?;
        self.levels.retain(|&l| l <= n);
        debug!(table = %self.table_name, level = n, "rolled back to savepoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use vtx_error::Result as VtxResult;
    use vtx_module::{
        ColumnContext, IndexInfo, ModuleDescriptor, ModuleVersion, VirtualTable,
        VirtualTableCursor,
    };
    use vtx_types::{ModuleArgs, Value};

    use super::*;

    /// Records hook invocations; `sync`/`commit` can be rigged to fail.
    struct HookTable {
        calls: Vec<String>,
        fail_sync: bool,
        fail_commit: bool,
    }

    struct HookCursor;

    impl VirtualTable for HookTable {
        type Cursor = HookCursor;

        fn connect(args: &ModuleArgs) -> VtxResult<Self> {
            Ok(Self {
                calls: Vec::new(),
                fail_sync: args.user_args().iter().any(|a| a == "fail_sync"),
                fail_commit: args.user_args().iter().any(|a| a == "fail_commit"),
            })
        }

        fn declared_schema(&self) -> String {
            "CREATE TABLE x(v)".to_owned()
        }

        fn best_index(&self, _info: &mut IndexInfo) -> VtxResult<()> {
            Ok(())
        }

        fn open(&self) -> VtxResult<HookCursor> {
            Ok(HookCursor)
        }

        fn begin(&mut self) -> VtxResult<()> {
            self.calls.push("begin".to_owned());
            Ok(())
        }

        fn sync_txn(&mut self) -> VtxResult<()> {
            self.calls.push("sync".to_owned());
            if self.fail_sync {
                return Err(VtxError::provider_code(vtx_error::ResultCode::IoErr));
            }
            Ok(())
        }

        fn commit(&mut self) -> VtxResult<()> {
            self.calls.push("commit".to_owned());
            if self.fail_commit {
                return Err(VtxError::provider_code(vtx_error::ResultCode::IoErr));
            }
            Ok(())
        }

        fn rollback(&mut self) -> VtxResult<()> {
            self.calls.push("rollback".to_owned());
            Ok(())
        }

        fn savepoint(&mut self, n: i32) -> VtxResult<()> {
            self.calls.push(format!("savepoint({n})"));
            Ok(())
        }

        fn release(&mut self, n: i32) -> VtxResult<()> {
            self.calls.push(format!("release({n})"));
            Ok(())
        }

        fn rollback_to(&mut self, n: i32) -> VtxResult<()> {
            self.calls.push(format!("rollback_to({n})"));
            Ok(())
        }
    }

    impl VirtualTableCursor for HookCursor {
        fn filter(
            &mut self,
            _idx_num: i32,
            _idx_str: Option<&str>,
            _args: &[Value],
        ) -> VtxResult<()> {
            Ok(())
        }

        fn next(&mut self) -> VtxResult<()> {
            Ok(())
        }

        fn eof(&self) -> bool {
            true
        }

        fn column(&self, _ctx: &mut ColumnContext, _col: i32) -> VtxResult<()> {
            Ok(())
        }

        fn rowid(&self) -> VtxResult<i64> {
            Ok(0)
        }
    }

    fn table(user_args: &[&str]) -> Box<dyn Table> {
        let desc = ModuleDescriptor::new::<HookTable>("hooks", ModuleVersion::V2);
        desc.module()
            .connect(&ModuleArgs::new(
                "hooks",
                "main",
                "t",
                user_args.iter().map(|s| (*s).to_owned()),
            ))
            .expect("connect")
    }

    #[test]
    fn test_commit_sequence() {
        let mut t = table(&[]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        assert_eq!(txn.phase(), TxnPhase::Active);
        txn.sync(t.as_mut()).expect("sync");
        assert_eq!(txn.phase(), TxnPhase::Synced);
        txn.commit(t.as_mut()).expect("commit");
        assert_eq!(txn.phase(), TxnPhase::Idle);
    }

    #[test]
    fn test_commit_without_sync_rejected() {
        let mut t = table(&[]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        let err = txn.commit(t.as_mut()).unwrap_err();
        assert!(matches!(
            err,
            VtxError::ProtocolViolation { call: "xCommit", .. }
        ));
        // The transaction is still live and can roll back.
        txn.rollback(t.as_mut()).expect("rollback");
    }

    #[test]
    fn test_double_begin_rejected() {
        let mut t = table(&[]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        let err = txn.begin(t.as_mut()).unwrap_err();
        assert!(matches!(err, VtxError::NestedTransaction));
    }

    #[test]
    fn test_sync_failure_still_allows_rollback() {
        let mut t = table(&["fail_sync"]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        assert!(txn.sync(t.as_mut()).is_err());
        assert_eq!(txn.phase(), TxnPhase::Active);
        txn.rollback(t.as_mut()).expect("rollback after failed sync");
        assert_eq!(txn.phase(), TxnPhase::Idle);
    }

    #[test]
    fn test_commit_failure_poisons() {
        let mut t = table(&["fail_commit"]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        txn.sync(t.as_mut()).expect("sync");
        let err = txn.commit(t.as_mut()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(txn.phase(), TxnPhase::Poisoned);

        // Everything afterwards is refused.
        let err = txn.begin(t.as_mut()).unwrap_err();
        assert!(matches!(err, VtxError::CoordinatorPoisoned { .. }));
        let err = txn.rollback(t.as_mut()).unwrap_err();
        assert!(matches!(err, VtxError::CoordinatorPoisoned { .. }));
    }

    #[test]
    fn test_savepoint_levels_strictly_increase() {
        let mut t = table(&[]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        txn.savepoint(t.as_mut(), 1).expect("level 1");
        txn.savepoint(t.as_mut(), 2).expect("level 2");

        let err = txn.savepoint(t.as_mut(), 2).unwrap_err();
        assert!(matches!(
            err,
            VtxError::ProtocolViolation {
                call: "xSavepoint",
                ..
            }
        ));
        let err = txn.savepoint(t.as_mut(), -1).unwrap_err();
        assert!(matches!(err, VtxError::ProtocolViolation { .. }));
    }

    #[test]
    fn test_rollback_to_closes_deeper_levels() {
        let mut t = table(&[]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        txn.savepoint(t.as_mut(), 1).expect("level 1");
        txn.savepoint(t.as_mut(), 2).expect("level 2");
        txn.savepoint(t.as_mut(), 3).expect("level 3");

        txn.rollback_to(t.as_mut(), 1).expect("rollback_to 1");
        assert_eq!(txn.open_levels(), &[1]);

        // Level 2 is gone; referencing it is an error.
        let err = txn.release(t.as_mut(), 2).unwrap_err();
        assert!(matches!(err, VtxError::NoSuchSavepoint { level: 2 }));

        // Level 1 survived and can be released.
        txn.release(t.as_mut(), 1).expect("release 1");
        assert!(txn.open_levels().is_empty());
    }

    #[test]
    fn test_release_closes_own_level() {
        let mut t = table(&[]);
        let mut txn = TxnCoordinator::new("t");

        txn.begin(t.as_mut()).expect("begin");
        txn.savepoint(t.as_mut(), 1).expect("level 1");
        txn.savepoint(t.as_mut(), 5).expect("level 5");

        txn.release(t.as_mut(), 1).expect("release 1");
        assert!(txn.open_levels().is_empty());
    }

    #[test]
    fn test_savepoint_requires_active_txn() {
        let mut t = table(&[]);
        let mut txn = TxnCoordinator::new("t");
        let err = txn.savepoint(t.as_mut(), 1).unwrap_err();
        assert!(matches!(err, VtxError::NoActiveTransaction));
    }

    mod properties {
        use proptest::collection::vec;
        use proptest::prelude::*;

        use super::*;

        fn open_levels(txn: &mut TxnCoordinator, t: &mut dyn Table, raw: &[i32]) -> Vec<i32> {
            // Deduplicate into a strictly increasing sequence.
            let mut levels: Vec<i32> = raw.to_vec();
            levels.sort_unstable();
            levels.dedup();
            for &n in &levels {
                txn.savepoint(t, n).expect("savepoint");
            }
            levels
        }

        proptest! {
            #[test]
            fn rollback_to_retains_levels_up_to_target(
                raw in vec(0i32..64, 1..10),
                pick in any::<proptest::sample::Index>(),
            ) {
                let mut t = table(&[]);
                let mut txn = TxnCoordinator::new("t");
                txn.begin(t.as_mut()).expect("begin");

                let levels = open_levels(&mut txn, t.as_mut(), &raw);
                let n = levels[pick.index(levels.len())];
                txn.rollback_to(t.as_mut(), n).expect("rollback_to");

                let expected: Vec<i32> =
                    levels.iter().copied().filter(|&l| l <= n).collect();
                prop_assert_eq!(txn.open_levels(), expected.as_slice());
                // The target level itself stays open.
                prop_assert!(txn.open_levels().contains(&n));
            }

            #[test]
            fn release_closes_target_and_deeper_levels(
                raw in vec(0i32..64, 1..10),
                pick in any::<proptest::sample::Index>(),
            ) {
                let mut t = table(&[]);
                let mut txn = TxnCoordinator::new("t");
                txn.begin(t.as_mut()).expect("begin");

                let levels = open_levels(&mut txn, t.as_mut(), &raw);
                let n = levels[pick.index(levels.len())];
                txn.release(t.as_mut(), n).expect("release");

                let expected: Vec<i32> =
                    levels.iter().copied().filter(|&l| l < n).collect();
                prop_assert_eq!(txn.open_levels(), expected.as_slice());
                // The released level is no longer addressable.
                prop_assert!(
                    matches!(
                        txn.rollback_to(t.as_mut(), n).unwrap_err(),
                        VtxError::NoSuchSavepoint { .. }
                    ),
                    "expected NoSuchSavepoint for released level"
                );
            }
        }
    }
}
