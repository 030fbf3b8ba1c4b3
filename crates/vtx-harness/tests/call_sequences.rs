//! End-to-end call-sequence assertions through the engine, using the
//! recording decorator around the reference modules.

use std::sync::Arc;

use vtx_engine::{Connection, ModuleRegistry, PlannedConstraint};
use vtx_harness::{CallKind, CallLog, MemTableModule, Recorder, SeriesModule};
use vtx_module::{ConstraintOp, IndexConstraint, IndexOrderBy};
use vtx_types::Value;

fn recorded(descriptor: vtx_module::ModuleDescriptor) -> (Arc<ModuleRegistry>, CallLog) {
    let log = CallLog::new();
    let registry = Arc::new(ModuleRegistry::new());
    registry
        .register(Recorder::wrap(&descriptor, &log))
        .expect("register");
    (registry, log)
}

#[test]
fn test_full_lifecycle_sequence() {
    let (registry, log) = recorded(MemTableModule::descriptor());
    let mut conn = Connection::new(registry);

    let t = conn
        .create_table("main", "t", "memtable", vec![])
        .expect("create");
    conn.update(t, &[Value::Null, Value::Null, Value::Integer(1), Value::Null])
        .expect("insert");

    let c = conn.open_cursor(t).expect("open");
    conn.filter(c, 0, None, &[]).expect("filter");
    while !conn.eof(c).expect("eof") {
        conn.column(c, 0).expect("column");
        conn.rowid(c).expect("rowid");
        conn.next(c).expect("next");
    }
    conn.close_cursor(c).expect("close");
    conn.drop_table(t).expect("drop");

    assert!(log.contains_sequence(&[
        CallKind::Create,
        CallKind::Update,
        CallKind::Open,
        CallKind::Filter,
        CallKind::Eof,
        CallKind::Column,
        CallKind::Rowid,
        CallKind::Next,
        CallKind::Close,
        CallKind::Destroy,
    ]));
}

#[test]
fn test_transaction_sequence() {
    let (registry, log) = recorded(MemTableModule::descriptor());
    let mut conn = Connection::new(registry);
    let t = conn
        .create_table("main", "t", "memtable", vec![])
        .expect("create");

    conn.begin_txn(t).expect("begin");
    conn.savepoint(t, 0).expect("savepoint");
    conn.update(t, &[Value::Null, Value::Null]).expect("insert");
    conn.release(t, 0).expect("release");
    conn.sync_txn(t).expect("sync");
    conn.commit_txn(t).expect("commit");

    assert!(log.contains_sequence(&[
        CallKind::Begin,
        CallKind::Savepoint,
        CallKind::Update,
        CallKind::Release,
        CallKind::Sync,
        CallKind::Commit,
    ]));
}

#[test]
fn test_negotiated_descending_series_scan() {
    let (registry, log) = recorded(SeriesModule::descriptor());
    let mut conn = Connection::new(registry);
    let t = conn.eponymous_table("generate_series").expect("connect");

    // WHERE start = 3 AND stop = 9 ORDER BY value DESC
    let constraints = [
        PlannedConstraint {
            constraint: IndexConstraint {
                column: 1,
                op: ConstraintOp::Eq,
                usable: true,
            },
            value: Some(Value::Integer(3)),
        },
        PlannedConstraint {
            constraint: IndexConstraint {
                column: 2,
                op: ConstraintOp::Eq,
                usable: true,
            },
            value: Some(Value::Integer(9)),
        },
    ];
    let order_by = [IndexOrderBy {
        column: 0,
        desc: true,
    }];
    let plan = conn.negotiate(t, &constraints, &order_by).expect("negotiate");
    assert!(plan.order_by_consumed);
    assert_eq!(plan.args, vec![Value::Integer(3), Value::Integer(9)]);
    assert!(plan.omitted.iter().all(|&o| o));

    let c = conn.open_cursor(t).expect("open");
    conn.filter_with_plan(c, &plan).expect("filter");
    let mut values = Vec::new();
    while !conn.eof(c).expect("eof") {
        values.push(conn.column(c, 0).expect("column").to_integer());
        conn.next(c).expect("next");
    }
    conn.close_cursor(c).expect("close");

    assert_eq!(values, vec![9, 8, 7, 6, 5, 4, 3]);
    assert!(log.contains_sequence(&[
        CallKind::Connect,
        CallKind::BestIndex,
        CallKind::Open,
        CallKind::Filter,
    ]));
}

#[test]
fn test_failed_create_never_reaches_destroy() {
    use vtx_error::{ResultCode, VtxError};
    use vtx_module::{
        ColumnContext, IndexInfo, ModuleDescriptor, ModuleVersion, VirtualTable,
        VirtualTableCursor,
    };
    use vtx_types::ModuleArgs;

    struct Stillborn;
    struct NoCursor;

    impl VirtualTable for Stillborn {
        type Cursor = NoCursor;

        fn create(_args: &ModuleArgs) -> vtx_error::Result<Self> {
            Err(VtxError::provider(ResultCode::Error, "creation refused"))
        }

        fn connect(_args: &ModuleArgs) -> vtx_error::Result<Self> {
            Ok(Self)
        }

        fn declared_schema(&self) -> String {
            "CREATE TABLE x(v)".to_owned()
        }

        fn best_index(&self, _info: &mut IndexInfo) -> vtx_error::Result<()> {
            Ok(())
        }

        fn open(&self) -> vtx_error::Result<NoCursor> {
            Ok(NoCursor)
        }
    }

    impl VirtualTableCursor for NoCursor {
        fn filter(
            &mut self,
            _idx_num: i32,
            _idx_str: Option<&str>,
            _args: &[Value],
        ) -> vtx_error::Result<()> {
            Ok(())
        }

        fn next(&mut self) -> vtx_error::Result<()> {
            Ok(())
        }

        fn eof(&self) -> bool {
            true
        }

        fn column(&self, _ctx: &mut ColumnContext, _col: i32) -> vtx_error::Result<()> {
            Ok(())
        }

        fn rowid(&self) -> vtx_error::Result<i64> {
            Ok(0)
        }
    }

    let (registry, log) = recorded(ModuleDescriptor::new::<Stillborn>(
        "stillborn",
        ModuleVersion::V1,
    ));
    let mut conn = Connection::new(registry);

    let err = conn
        .create_table("main", "t", "stillborn", vec!["arg1".to_owned()])
        .unwrap_err();
    assert!(matches!(err, VtxError::Provider { .. }));

    // The declaration failed: nothing is retained and the instance is
    // never destroyed.
    let kinds = log.kinds();
    assert_eq!(kinds, vec![CallKind::Create]);
    let record = &log.records()[0];
    assert_eq!(record.detail, "stillborn,main,t,arg1");
}

#[test]
fn test_unconstrained_negotiation_is_full_scan() {
    let (registry, _log) = recorded(SeriesModule::descriptor());
    let mut conn = Connection::new(registry);
    let t = conn.eponymous_table("generate_series").expect("connect");

    let plan = conn.negotiate(t, &[], &[]).expect("negotiate");
    assert_eq!(plan.idx_num, 0);
    assert!(plan.args.is_empty());

    let c = conn.open_cursor(t).expect("open");
    conn.filter_with_plan(c, &plan).expect("filter");
    let mut count = 0;
    while !conn.eof(c).expect("eof") {
        count += 1;
        conn.next(c).expect("next");
    }
    conn.close_cursor(c).expect("close");
    assert_eq!(count, 10);
}
