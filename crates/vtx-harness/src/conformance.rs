//! Scripted conformance scenarios for a registered module.
//!
//! [`check_module`] attaches one instance of the module and drives it
//! through the lifecycle and scan scenarios every provider must survive,
//! recording pass/fail per scenario in a serializable report. Checks that
//! need an undeclared capability are skipped rather than failed.

use std::result::Result as StdResult;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use vtx_engine::{Connection, ModuleRegistry, TableId};
use vtx_error::{Result, VtxError};
use vtx_module::Capability;
use vtx_types::Value;

/// Outcome of a single scenario.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// Failure description; `None` on pass.
    pub detail: Option<String>,
}

/// The full battery's outcome for one module.
#[derive(Debug, Clone, Serialize)]
pub struct ConformanceReport {
    pub module: String,
    pub checks: Vec<CheckResult>,
}

impl ConformanceReport {
    /// Whether every executed check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// The failed checks.
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Render the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VtxError::internal(format!("report serialization failed: {e}")))
    }
}

type Check = StdResult<(), String>;

/// Drive `module_name` through the conformance battery.
///
/// Non-eponymous modules are instantiated with `user_args` (and dropped
/// again at the end); eponymous modules are used directly.
pub fn check_module(
    registry: &Arc<ModuleRegistry>,
    module_name: &str,
    user_args: &[String],
) -> Result<ConformanceReport> {
    let descriptor = registry
        .find(module_name)
        .ok_or_else(|| VtxError::NoSuchModule {
            name: module_name.to_owned(),
        })?;
    let capabilities = descriptor.capabilities();
    let eponymous = descriptor.is_eponymous();

    let mut conn = Connection::new(Arc::clone(registry));
    let table = if eponymous {
        conn.eponymous_table(module_name)?
    } else {
        conn.create_table("main", "conformance_probe", module_name, user_args.to_vec())?
    };

    let mut checks = Vec::new();
    let run = |name: &str, outcome: Check, checks: &mut Vec<CheckResult>| {
        info!(module = %module_name, check = name, passed = outcome.is_ok(), "conformance check");
        checks.push(CheckResult {
            name: name.to_owned(),
            passed: outcome.is_ok(),
            detail: outcome.err(),
        });
    };

    run(
        "open-close-without-filter",
        open_close_without_filter(&mut conn, table),
        &mut checks,
    );
    run("eof-idempotent", eof_idempotent(&mut conn, table), &mut checks);
    run(
        "scan-visits-each-row-once",
        scan_visits_each_row_once(&mut conn, table),
        &mut checks,
    );
    run(
        "column-every-position",
        column_every_position(&mut conn, table),
        &mut checks,
    );
    run(
        "unfiltered-iteration-rejected",
        unfiltered_iteration_rejected(&mut conn, table),
        &mut checks,
    );
    run(
        "stale-cursor-rejected",
        stale_cursor_rejected(&mut conn, table),
        &mut checks,
    );
    if !eponymous {
        run(
            "drop-with-open-cursor-rejected",
            drop_with_open_cursor_rejected(&mut conn, table),
            &mut checks,
        );
    }
    if capabilities.contains(Capability::Write) {
        run(
            "insert-visible-to-new-scan",
            insert_visible_to_new_scan(&mut conn, table),
            &mut checks,
        );
    }
    if capabilities.contains(Capability::Write) && capabilities.contains(Capability::Savepoints) {
        run(
            "savepoint-rollback-to",
            savepoint_rollback_to(&mut conn, table),
            &mut checks,
        );
    }
    if !eponymous {
        run("teardown-drop", teardown_drop(&mut conn, table), &mut checks);
    }

    Ok(ConformanceReport {
        module: module_name.to_owned(),
        checks,
    })
}

fn fail(e: impl std::fmt::Display) -> String {
    e.to_string()
}

fn scan_rowids(conn: &mut Connection, table: TableId) -> StdResult<Vec<i64>, String> {
    let c = conn.open_cursor(table).map_err(fail)?;
    let result = (|| {
        conn.filter(c, 0, None, &[]).map_err(fail)?;
        let mut out = Vec::new();
        while !conn.eof(c).map_err(fail)? {
            out.push(conn.rowid(c).map_err(fail)?);
            conn.next(c).map_err(fail)?;
        }
        Ok(out)
    })();
    conn.close_cursor(c).map_err(fail)?;
    result
}

fn open_close_without_filter(conn: &mut Connection, table: TableId) -> Check {
    let c = conn.open_cursor(table).map_err(fail)?;
    conn.close_cursor(c).map_err(fail)
}

fn eof_idempotent(conn: &mut Connection, table: TableId) -> Check {
    let c = conn.open_cursor(table).map_err(fail)?;
    let result = (|| {
        conn.filter(c, 0, None, &[]).map_err(fail)?;
        let first = conn.eof(c).map_err(fail)?;
        let second = conn.eof(c).map_err(fail)?;
        if first != second {
            return Err(format!("eof flapped without next: {first} then {second}"));
        }
        Ok(())
    })();
    conn.close_cursor(c).map_err(fail)?;
    result
}

fn scan_visits_each_row_once(conn: &mut Connection, table: TableId) -> Check {
    let first = scan_rowids(conn, table)?;
    let mut distinct = first.clone();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() != first.len() {
        return Err(format!(
            "scan produced duplicate rowids: {} rows, {} distinct",
            first.len(),
            distinct.len()
        ));
    }
    // Restarting the scan yields the same rows.
    let second = scan_rowids(conn, table)?;
    if first != second {
        return Err("restarted scan produced a different row sequence".to_owned());
    }
    Ok(())
}

fn column_every_position(conn: &mut Connection, table: TableId) -> Check {
    let c = conn.open_cursor(table).map_err(fail)?;
    let result = (|| {
        conn.filter(c, 0, None, &[]).map_err(fail)?;
        while !conn.eof(c).map_err(fail)? {
            conn.column(c, 0).map_err(fail)?;
            conn.next(c).map_err(fail)?;
        }
        Ok(())
    })();
    conn.close_cursor(c).map_err(fail)?;
    result
}

fn unfiltered_iteration_rejected(conn: &mut Connection, table: TableId) -> Check {
    let c = conn.open_cursor(table).map_err(fail)?;
    let eof = conn.eof(c);
    conn.close_cursor(c).map_err(fail)?;
    match eof {
        Err(VtxError::ProtocolViolation { .. }) => Ok(()),
        Err(e) => Err(format!("expected a protocol violation, got: {e}")),
        Ok(_) => Err("eof on an unfiltered cursor was accepted".to_owned()),
    }
}

fn stale_cursor_rejected(conn: &mut Connection, table: TableId) -> Check {
    let c = conn.open_cursor(table).map_err(fail)?;
    conn.close_cursor(c).map_err(fail)?;
    match conn.eof(c) {
        Err(VtxError::StaleCursor { .. }) => Ok(()),
        Err(e) => Err(format!("expected a stale-cursor error, got: {e}")),
        Ok(_) => Err("a closed cursor handle was accepted".to_owned()),
    }
}

fn drop_with_open_cursor_rejected(conn: &mut Connection, table: TableId) -> Check {
    let c = conn.open_cursor(table).map_err(fail)?;
    let dropped = conn.drop_table(table);
    conn.close_cursor(c).map_err(fail)?;
    match dropped {
        Err(VtxError::LiveCursors { .. }) => Ok(()),
        Err(e) => Err(format!("expected a live-cursor rejection, got: {e}")),
        Ok(()) => Err("drop succeeded with an open cursor".to_owned()),
    }
}

fn insert_visible_to_new_scan(conn: &mut Connection, table: TableId) -> Check {
    let before = scan_rowids(conn, table)?.len();
    conn.update(table, &[Value::Null, Value::Null]).map_err(fail)?;
    let after = scan_rowids(conn, table)?.len();
    if after != before + 1 {
        return Err(format!(
            "insert not visible: {before} rows before, {after} after"
        ));
    }
    Ok(())
}

fn savepoint_rollback_to(conn: &mut Connection, table: TableId) -> Check {
    conn.begin_txn(table).map_err(fail)?;
    let result = (|| {
        let base = scan_rowids(conn, table)?.len();
        conn.savepoint(table, 0).map_err(fail)?;
        conn.update(table, &[Value::Null, Value::Null]).map_err(fail)?;
        conn.rollback_to(table, 0).map_err(fail)?;
        let restored = scan_rowids(conn, table)?.len();
        if restored != base {
            return Err(format!(
                "rollback-to did not restore the savepoint image: {base} rows, then {restored}"
            ));
        }
        // The level stays open for a second rollback.
        conn.update(table, &[Value::Null, Value::Null]).map_err(fail)?;
        conn.rollback_to(table, 0).map_err(fail)?;
        conn.release(table, 0).map_err(fail)?;
        Ok(())
    })();
    match &result {
        Ok(()) => {
            conn.sync_txn(table).map_err(fail)?;
            conn.commit_txn(table).map_err(fail)?;
        }
        Err(_) => {
            let _ = conn.rollback_txn(table);
        }
    }
    result
}

fn teardown_drop(conn: &mut Connection, table: TableId) -> Check {
    conn.drop_table(table).map_err(fail)
}
