use thiserror::Error;

/// Primary error type for vtx operations.
///
/// Modeled after SQLite's error codes with Rust-idiomatic structure:
/// structured variants for the cases callers match on, a numeric
/// [`ResultCode`] mapping for the classic integer surface.
#[derive(Error, Debug)]
pub enum VtxError {
    // === Configuration Errors ===
    /// A module with this name is already registered on the connection.
    #[error("module already registered: {name}")]
    DuplicateModule { name: String },

    /// The module descriptor is malformed (version/capability mismatch,
    /// missing mandatory slot).
    #[error("invalid module descriptor for {module}: {detail}")]
    InvalidDescriptor { module: String, detail: String },

    /// No module with this name is registered.
    #[error("no such module: {name}")]
    NoSuchModule { name: String },

    /// A virtual table with this name already exists in the schema cache.
    #[error("table {name} already exists")]
    TableExists { name: String },

    /// No virtual table with this name.
    #[error("no such table: {name}")]
    NoSuchTable { name: String },

    // === Protocol Violations ===
    /// A callback was requested in a state where the protocol forbids it.
    /// Detected engine-side; the provider is never invoked.
    #[error("protocol violation in {call}: {detail}")]
    ProtocolViolation { call: &'static str, detail: String },

    /// A cursor handle that was already closed (or never existed) was used.
    #[error("unknown or closed cursor handle {id}")]
    StaleCursor { id: u64 },

    /// A table handle that was already dropped (or never existed) was used.
    #[error("unknown or dropped table handle {id}")]
    StaleTable { id: u64 },

    /// Destroy/drop was requested while cursors on the instance are open.
    #[error("table {table} is locked: {cursors} cursor(s) still open")]
    LiveCursors { table: String, cursors: usize },

    /// An ordinary write targeted a shadow table claimed by a module.
    #[error("table {name} is a shadow table and may not be written directly")]
    ShadowTableWrite { name: String },

    // === Provider Errors ===
    /// The provider callback failed; code and optional message pass through
    /// to the query caller unchanged.
    #[error("virtual table error: {}", message.as_deref().unwrap_or("unspecified"))]
    Provider {
        code: ResultCode,
        message: Option<String>,
    },

    /// Write attempted on a read-only virtual table.
    #[error("attempt to write a readonly virtual table")]
    ReadOnly,

    /// The provider does not offer this operation.
    #[error("unsupported operation")]
    Unsupported,

    /// Constraint violation reported by the provider's update path.
    #[error("constraint failed: {detail}")]
    Constraint { detail: String },

    // === Transaction Errors ===
    /// Transaction hook called with no transaction open on the instance.
    #[error("no virtual table transaction is active")]
    NoActiveTransaction,

    /// `begin` called while a transaction is already open on the instance.
    #[error("virtual table transaction already active")]
    NestedTransaction,

    /// Savepoint level does not reference an open level.
    #[error("no open savepoint at level {level}")]
    NoSuchSavepoint { level: i32 },

    /// Commit failed after sync succeeded. The coordinator cannot undo the
    /// partial commit; the instance's transaction state is poisoned.
    #[error("consistency failure committing {table}: {detail}")]
    Consistency { table: String, detail: String },

    /// The coordinator was poisoned by an earlier consistency failure and
    /// refuses further transaction work on the instance.
    #[error("transaction coordinator for {table} is poisoned")]
    CoordinatorPoisoned { table: String },

    // === I/O (file-backed providers) ===
    /// File I/O error from a provider's persistent state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Internal ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// SQLite result/error codes for wire-level compatibility.
///
/// These match the numeric values from C SQLite's `sqlite3.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Callback requested abort.
    Abort = 4,
    /// Database file is locked.
    Busy = 5,
    /// Table is locked.
    Locked = 6,
    /// Out of memory.
    NoMem = 7,
    /// Attempt to write a read-only table.
    ReadOnly = 8,
    /// Disk I/O error.
    IoErr = 10,
    /// State is corrupt.
    Corrupt = 11,
    /// Not found.
    NotFound = 12,
    /// Constraint violation.
    Constraint = 19,
    /// Data type mismatch.
    Mismatch = 20,
    /// Library used incorrectly.
    Misuse = 21,
    /// Feature not available.
    NoLfs = 22,
}

impl ResultCode {
    /// Parse a provider-returned integer into a code, defaulting unknown
    /// values to [`ResultCode::Error`].
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Ok,
            2 => Self::Internal,
            4 => Self::Abort,
            5 => Self::Busy,
            6 => Self::Locked,
            7 => Self::NoMem,
            8 => Self::ReadOnly,
            10 => Self::IoErr,
            11 => Self::Corrupt,
            12 => Self::NotFound,
            19 => Self::Constraint,
            20 => Self::Mismatch,
            21 => Self::Misuse,
            22 => Self::NoLfs,
            _ => Self::Error,
        }
    }
}

impl VtxError {
    /// Map this error to a numeric result code.
    #[allow(clippy::match_same_arms)]
    pub const fn result_code(&self) -> ResultCode {
        match self {
            Self::DuplicateModule { .. }
            | Self::InvalidDescriptor { .. }
            | Self::NoSuchModule { .. }
            | Self::TableExists { .. }
            | Self::NoSuchTable { .. } => ResultCode::Error,
            Self::ProtocolViolation { .. } | Self::StaleCursor { .. } | Self::StaleTable { .. } => {
                ResultCode::Misuse
            }
            Self::LiveCursors { .. } => ResultCode::Locked,
            Self::ShadowTableWrite { .. } => ResultCode::Error,
            Self::Provider { code, .. } => *code,
            Self::ReadOnly => ResultCode::ReadOnly,
            Self::Unsupported => ResultCode::NoLfs,
            Self::Constraint { .. } => ResultCode::Constraint,
            Self::NoActiveTransaction | Self::NestedTransaction | Self::NoSuchSavepoint { .. } => {
                ResultCode::Misuse
            }
            Self::Consistency { .. } | Self::CoordinatorPoisoned { .. } => ResultCode::Corrupt,
            Self::Io(_) => ResultCode::IoErr,
            Self::Internal(_) => ResultCode::Internal,
        }
    }

    /// Whether the failure may succeed if the caller retries.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LiveCursors { .. }
                | Self::Provider {
                    code: ResultCode::Busy | ResultCode::Locked,
                    ..
                }
        )
    }

    /// Whether the transaction outcome is engine-fatal for the instance.
    ///
    /// True only for commit-phase failures after a successful sync: the
    /// protocol has no way to undo a partial commit across instances.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Consistency { .. } | Self::CoordinatorPoisoned { .. }
        )
    }

    /// Create a protocol-violation error.
    pub fn protocol(call: &'static str, detail: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            call,
            detail: detail.into(),
        }
    }

    /// Create a provider error with a message.
    pub fn provider(code: ResultCode, message: impl Into<String>) -> Self {
        Self::Provider {
            code,
            message: Some(message.into()),
        }
    }

    /// Create a provider error with no message.
    #[must_use]
    pub const fn provider_code(code: ResultCode) -> Self {
        Self::Provider {
            code,
            message: None,
        }
    }

    /// Create an invalid-descriptor error.
    pub fn invalid_descriptor(module: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            module: module.into(),
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a constraint error.
    pub fn constraint(detail: impl Into<String>) -> Self {
        Self::Constraint {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `VtxError`.
pub type Result<T> = std::result::Result<T, VtxError>;
