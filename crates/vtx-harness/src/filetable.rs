//! `filetable`: a writable table persisted as JSON lines on disk.
//!
//! Exists to exercise the lifecycle distinction the in-memory modules
//! cannot: `create` makes a file, `connect` requires it, `destroy`
//! removes it, and a reconnect observes earlier writes. The first user
//! argument is the file path.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vtx_error::{Result, ResultCode, VtxError};
use vtx_module::{
    Capability, IndexInfo, ModuleDescriptor, ModuleVersion, VirtualTable,
};
use vtx_types::{ModuleArgs, Value};

use crate::memtable::MemCursor;

/// The `filetable` module.
pub struct FileTableModule;

impl FileTableModule {
    /// Registration descriptor: writable, file-backed, protocol V1.
    #[must_use]
    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new::<FileTable>("filetable", ModuleVersion::V1)
            .with_capability(Capability::Write)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredRow {
    rowid: i64,
    values: Vec<Value>,
}

#[derive(Debug)]
pub(crate) struct FileTable {
    path: PathBuf,
    rows: BTreeMap<i64, Vec<Value>>,
    next_rowid: i64,
}

impl FileTable {
    fn path_from(args: &ModuleArgs) -> Result<PathBuf> {
        args.user_args()
            .first()
            .map(PathBuf::from)
            .ok_or_else(|| {
                VtxError::provider(ResultCode::Misuse, "filetable requires a path argument")
            })
    }

    fn persist(&self) -> Result<()> {
        let mut out = String::new();
        for (rowid, values) in &self.rows {
            let row = StoredRow {
                rowid: *rowid,
                values: values.clone(),
            };
            let line = serde_json::to_string(&row)
                .map_err(|e| VtxError::internal(format!("row serialization failed: {e}")))?;
            let _ = writeln!(out, "{line}");
        }
        fs::write(&self.path, out)?;
        Ok(())
    }
}

impl VirtualTable for FileTable {
    type Cursor = MemCursor;

    fn create(args: &ModuleArgs) -> Result<Self> {
        let path = Self::path_from(args)?;
        if path.exists() {
            return Err(VtxError::provider(
                ResultCode::Error,
                format!("backing file already exists: {}", path.display()),
            ));
        }
        fs::write(&path, "")?;
        debug!(path = %path.display(), "filetable backing file created");
        Ok(Self {
            path,
            rows: BTreeMap::new(),
            next_rowid: 0,
        })
    }

    fn connect(args: &ModuleArgs) -> Result<Self> {
        let path = Self::path_from(args)?;
        let contents = fs::read_to_string(&path)?;
        let mut rows = BTreeMap::new();
        let mut next_rowid = 0;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let row: StoredRow = serde_json::from_str(line).map_err(|e| {
                VtxError::provider(
                    ResultCode::Corrupt,
                    format!("malformed row in {}: {e}", path.display()),
                )
            })?;
            next_rowid = next_rowid.max(row.rowid);
            rows.insert(row.rowid, row.values);
        }
        Ok(Self {
            path,
            rows,
            next_rowid,
        })
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
        if let [rowid] = args {
            self.rows.remove(&rowid.to_integer());
            self.persist()?;
            return Ok(None);
        }

        let values: Vec<Value> = args.get(2..).map(<[Value]>::to_vec).unwrap_or_default();

        let result = if args[0].is_null() {
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
            Some(rowid)
        } else {
            let old = args[0].to_integer();
            let new = match &args[1] {
                Value::Null => old,
                v => v.to_integer(),
            };
            if self.rows.remove(&old).is_none() {
                return Err(VtxError::constraint(format!("no row with rowid {old}")));
            }
            self.rows.insert(new, values);
            None
        };
        self.persist()?;
        Ok(result)
    }

    fn destroy(&mut self) -> Result<()> {
        fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "filetable backing file removed");
        Ok(())
    }
}
