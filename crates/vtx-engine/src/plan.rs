//! Planner-side index negotiation driver.
//!
//! Builds the [`IndexInfo`] exchange for one plan candidate, runs the
//! table's `best_index`, validates the usage the table filled in, and
//! assembles the argument vector that `filter` will receive. The
//! `(idx_num, idx_str)` pair is carried through opaquely.

use tracing::{debug, warn};
use vtx_error::{Result, VtxError};
use vtx_module::{IndexConstraint, IndexInfo, IndexOrderBy, Table};
use vtx_types::Value;

/// A WHERE-clause constraint the planner could push down, paired with the
/// comparison value when one is available at plan time.
#[derive(Debug, Clone)]
pub struct PlannedConstraint {
    pub constraint: IndexConstraint,
    /// The right-hand-side value; `None` when the constraint is unusable
    /// or the value is not known until execution.
    pub value: Option<Value>,
}

/// The outcome of index negotiation for one scan.
///
/// Everything `filter` needs, plus the cost estimates the planner ranks
/// candidates by.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub idx_num: i32,
    pub idx_str: Option<String>,
    /// Filter arguments in `argv_index` order.
    pub args: Vec<Value>,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    pub order_by_consumed: bool,
    /// Per input constraint: whether the table guaranteed it and the
    /// engine may skip double-checking.
    pub omitted: Vec<bool>,
}

impl ScanPlan {
    /// The plan used when a table offers no strategy: no pushed
    /// constraints, provider-defined full scan.
    #[must_use]
    pub fn full_scan(num_constraints: usize) -> Self {
        Self {
            idx_num: 0,
            idx_str: None,
            args: Vec::new(),
            estimated_cost: IndexInfo::FULL_SCAN_COST,
            estimated_rows: 1_000_000,
            order_by_consumed: false,
            omitted: vec![false; num_constraints],
        }
    }
}

/// Run index negotiation for a single plan candidate.
///
/// A table that returns [`VtxError::Unsupported`] declines all
/// constraints and gets a full scan. Malformed usage output (argv indexes
/// that are negative, duplicated, non-dense, or attached to unusable or
/// value-less constraints) is a provider contract breach reported as a
/// protocol violation.
pub fn negotiate(
    table: &dyn Table,
    constraints: &[PlannedConstraint],
    order_by: &[IndexOrderBy],
) -> Result<ScanPlan> {
    let mut info = IndexInfo::new(
        constraints.iter().map(|c| c.constraint.clone()).collect(),
        order_by.to_vec(),
    );

    match table.best_index(&mut info) {
        Ok(()) => {}
        Err(VtxError::Unsupported) => {
            debug!("table declined index negotiation; falling back to full scan");
            return Ok(ScanPlan::full_scan(constraints.len()));
        }
        Err(e) => return Err(e),
    }

    if info.constraint_usage.len() != constraints.len() {
        return Err(VtxError::protocol(
            "xBestIndex",
            "constraint_usage length does not match constraints",
        ));
    }

    // argv indexes must form a dense 1..=k set over usable constraints
    // with known values.
    let mut slots: Vec<Option<Value>> = Vec::new();
    let mut omitted = Vec::with_capacity(constraints.len());
    for (pc, usage) in constraints.iter().zip(&info.constraint_usage) {
        omitted.push(usage.omit);
        if usage.argv_index == 0 {
            continue;
        }
        if usage.argv_index < 0 {
            return Err(VtxError::protocol(
                "xBestIndex",
                format!("negative argv_index {}", usage.argv_index),
            ));
        }
        if !pc.constraint.usable {
            warn!(
                column = pc.constraint.column,
                "table consumed an unusable constraint"
            );
            return Err(VtxError::protocol(
                "xBestIndex",
                "argv_index set on an unusable constraint",
            ));
        }
        let Some(value) = pc.value.clone() else {
            return Err(VtxError::protocol(
                "xBestIndex",
                "argv_index set on a constraint with no value",
            ));
        };
        #[allow(clippy::cast_sign_loss)]
        let slot = usage.argv_index as usize - 1;
        if slot >= slots.len() {
            slots.resize(slot + 1, None);
        }
        if slots[slot].is_some() {
            return Err(VtxError::protocol(
                "xBestIndex",
                format!("duplicate argv_index {}", usage.argv_index),
            ));
        }
        slots[slot] = Some(value);
    }

    let mut args = Vec::with_capacity(slots.len());
    for (i, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(v) => args.push(v),
            None => {
                return Err(VtxError::protocol(
                    "xBestIndex",
                    format!("argv_index gap at position {}", i + 1),
                ));
            }
        }
    }

    debug!(
        idx_num = info.idx_num,
        idx_str = info.idx_str.as_deref().unwrap_or(""),
        num_args = args.len(),
        cost = info.estimated_cost,
        rows = info.estimated_rows,
        "index negotiated"
    );

    Ok(ScanPlan {
        idx_num: info.idx_num,
        idx_str: info.idx_str,
        args,
        estimated_cost: info.estimated_cost,
        estimated_rows: info.estimated_rows,
        order_by_consumed: info.order_by_consumed,
        omitted,
    })
}

/// Negotiate each candidate constraint subset and keep the cheapest plan.
///
/// Lower estimated cost is preferred; the first candidate wins ties. An
/// empty candidate list yields the unconstrained full-scan negotiation.
pub fn select_plan(
    table: &dyn Table,
    candidates: &[Vec<PlannedConstraint>],
    order_by: &[IndexOrderBy],
) -> Result<ScanPlan> {
    if candidates.is_empty() {
        return negotiate(table, &[], order_by);
    }
    let mut best: Option<ScanPlan> = None;
    for candidate in candidates {
        let plan = negotiate(table, candidate, order_by)?;
        let better = best
            .as_ref()
            .map_or(true, |b| plan.estimated_cost < b.estimated_cost);
        if better {
            best = Some(plan);
        }
    }
    best.ok_or_else(|| VtxError::internal("plan selection produced no candidate"))
}
