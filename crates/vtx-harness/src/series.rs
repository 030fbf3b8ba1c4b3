//! `generate_series`: an eponymous, read-only integer sequence table.
//!
//! Columns are `value, start, stop, step`; the last three are hidden
//! parameters supplied through WHERE-clause equality constraints. Index
//! negotiation packs which parameters are constrained into `idx_num` bit
//! flags and consumes an ORDER BY on `value` in either direction.

use vtx_error::Result;
use vtx_module::{
    ColumnContext, ConstraintOp, IndexInfo, ModuleDescriptor, ModuleVersion, VirtualTable,
    VirtualTableCursor,
};
use vtx_types::{ModuleArgs, Value};

const COL_VALUE: i32 = 0;
const COL_START: i32 = 1;
const COL_STOP: i32 = 2;
const COL_STEP: i32 = 3;

// idx_num bit flags replayed to filter.
const FLAG_START: i32 = 1;
const FLAG_STOP: i32 = 2;
const FLAG_STEP: i32 = 4;
const FLAG_DESC: i32 = 8;

const DEFAULT_START: i64 = 1;
const DEFAULT_STOP: i64 = 10;

/// The `generate_series` module.
pub struct SeriesModule;

impl SeriesModule {
    /// Registration descriptor: eponymous, read-only, protocol V1.
    #[must_use]
    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new::<SeriesTable>("generate_series", ModuleVersion::V1).eponymous()
    }
}

pub(crate) struct SeriesTable;

impl VirtualTable for SeriesTable {
    type Cursor = SeriesCursor;

    fn connect(_args: &ModuleArgs) -> Result<Self> {
        Ok(Self)
    }

    fn declared_schema(&self) -> String {
        "CREATE TABLE x(value, start HIDDEN, stop HIDDEN, step HIDDEN)".to_owned()
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        // First usable equality constraint per hidden parameter.
        let mut slots: [Option<usize>; 3] = [None; 3];
        for (i, constraint) in info.constraints.iter().enumerate() {
            if !constraint.usable || constraint.op != ConstraintOp::Eq {
                continue;
            }
            let slot = match constraint.column {
                COL_START => &mut slots[0],
                COL_STOP => &mut slots[1],
                COL_STEP => &mut slots[2],
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(i);
            }
        }

        // Argv positions follow flag order so filter can consume them
        // positionally: start, then stop, then step.
        let mut idx_num = 0;
        let mut next_argv = 1;
        for (slot, flag) in slots.into_iter().zip([FLAG_START, FLAG_STOP, FLAG_STEP]) {
            if let Some(i) = slot {
                idx_num |= flag;
                info.constraint_usage[i].argv_index = next_argv;
                info.constraint_usage[i].omit = true;
                next_argv += 1;
            }
        }

        if let [term] = info.order_by.as_slice() {
            if term.column == COL_VALUE {
                info.order_by_consumed = true;
                if term.desc {
                    idx_num |= FLAG_DESC;
                }
            }
        }

        if idx_num & FLAG_START != 0 && idx_num & FLAG_STOP != 0 {
            info.estimated_cost = 20.0;
            info.estimated_rows = 100;
        }
        info.idx_num = idx_num;
        Ok(())
    }

    fn open(&self) -> Result<SeriesCursor> {
        Ok(SeriesCursor::default())
    }
}

#[derive(Default)]
pub(crate) struct SeriesCursor {
    value: i64,
    start: i64,
    stop: i64,
    step: i64,
    desc: bool,
    ord: i64,
    done: bool,
}

impl SeriesCursor {
    fn advance(&mut self) {
        let stepped = if self.desc {
            self.value.checked_sub(self.step)
        } else {
            self.value.checked_add(self.step)
        };
        match stepped {
            Some(v) => self.value = v,
            None => self.done = true,
        }
        self.ord += 1;
    }
}

impl VirtualTableCursor for SeriesCursor {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn filter(&mut self, idx_num: i32, _idx_str: Option<&str>, args: &[Value]) -> Result<()> {
        // Constrained parameters arrive in flag order; a NULL parameter
        // yields an empty series.
        let mut args = args.iter();
        let mut take = |flag: i32, default: i64| -> Option<i64> {
            if idx_num & flag == 0 {
                return Some(default);
            }
            match args.next() {
                Some(Value::Null) | None => None,
                Some(v) => Some(v.to_integer()),
            }
        };

        let params = (|| {
            let start = take(FLAG_START, DEFAULT_START)?;
            let stop = take(FLAG_STOP, DEFAULT_STOP)?;
            let step = take(FLAG_STEP, 1)?;
            Some((start, stop, step))
        })();

        self.ord = 1;
        match params {
            None => self.done = true,
            Some((start, stop, step)) => {
                self.start = start;
                self.stop = stop;
                // A negative step scans descending by its magnitude; zero
                // is coerced to one.
                self.desc = idx_num & FLAG_DESC != 0 || step < 0;
                self.step = step.checked_abs().unwrap_or(i64::MAX).max(1);
                self.done = stop < start;
                self.value = if self.desc {
                    // Largest reachable value not past stop. The span can
                    // exceed i64::MAX, so it is measured in unsigned
                    // arithmetic; the wrapping add is exact because the
                    // result lies in [start, stop].
                    let span = stop.wrapping_sub(start) as u64;
                    let step = self.step as u64;
                    start.wrapping_add(((span / step) * step) as i64)
                } else {
                    start
                };
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.advance();
        Ok(())
    }

    fn eof(&self) -> bool {
        if self.done {
            return true;
        }
        if self.desc {
            self.value < self.start
        } else {
            self.value > self.stop
        }
    }

    fn column(&self, ctx: &mut ColumnContext, col: i32) -> Result<()> {
        let v = match col {
            COL_VALUE => self.value,
            COL_START => self.start,
            COL_STOP => self.stop,
            COL_STEP => self.step,
            _ => {
                ctx.set_value(Value::Null);
                return Ok(());
            }
        };
        ctx.set_value(Value::Integer(v));
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.ord)
    }
}
