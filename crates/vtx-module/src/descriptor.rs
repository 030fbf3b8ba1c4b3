//! Module descriptors: version, capability slots, and registration-time
//! validation.
//!
//! The native protocol expresses optional operations as nullable function
//! pointers in a struct. Here each optional slot is a declared
//! [`Capability`] instead: the engine checks availability by presence in
//! the [`CapabilitySet`] rather than null-testing, and rejects impossible
//! combinations once, at registration time, instead of at call time.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use vtx_error::{Result, VtxError};

use crate::erased::{Module, ModuleAdapter};
use crate::table::VirtualTable;

/// Protocol version of a module. Later versions are strict supersets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ModuleVersion {
    /// Base scan/write protocol.
    V1 = 1,
    /// Adds nested-transaction (savepoint) hooks.
    V2 = 2,
    /// Adds shadow-table naming.
    V3 = 3,
}

/// An optional capability slot a module may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The table accepts INSERT/UPDATE/DELETE via `update`.
    Write,
    /// The table supports `rename`.
    Rename,
    /// The table participates in the two-phase commit protocol
    /// (`begin`/`sync_txn`/`commit`/`rollback`).
    Transactions,
    /// The table supports nested savepoint hooks (requires V2).
    Savepoints,
    /// The module claims shadow-table names (requires V3).
    ShadowNames,
}

impl Capability {
    const ALL: [Self; 5] = [
        Self::Write,
        Self::Rename,
        Self::Transactions,
        Self::Savepoints,
        Self::ShadowNames,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::Write => 1 << 0,
            Self::Rename => 1 << 1,
            Self::Transactions => 1 << 2,
            Self::Savepoints => 1 << 3,
            Self::ShadowNames => 1 << 4,
        }
    }

    /// The minimum module version that carries this slot.
    const fn minimum_version(self) -> ModuleVersion {
        match self {
            Self::Write | Self::Rename | Self::Transactions => ModuleVersion::V1,
            Self::Savepoints => ModuleVersion::V2,
            Self::ShadowNames => ModuleVersion::V3,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Rename => "rename",
            Self::Transactions => "transactions",
            Self::Savepoints => "savepoints",
            Self::ShadowNames => "shadow-names",
        }
    }
}

/// The set of optional capabilities a module declares.
///
/// Mandatory read-path slots (create/connect, disconnect/destroy, open,
/// filter, next, eof, column, rowid, `best_index`) are trait methods and
/// always present; this set covers only the optional slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set: a plain read-only table.
    pub const EMPTY: Self = Self(0);

    /// Add a capability.
    #[must_use]
    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    /// Whether the capability is declared.
    #[must_use]
    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Iterate over the declared capabilities.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for cap in self.iter() {
            if !first {
                write!(f, "+")?;
            }
            write!(f, "{}", cap.name())?;
            first = false;
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// An immutable registration record for a virtual table module.
///
/// Constructed once by the extension, validated and then referenced (not
/// owned) by the engine's catalog. The descriptor never changes after
/// registration.
#[derive(Clone)]
pub struct ModuleDescriptor {
    name: String,
    version: ModuleVersion,
    capabilities: CapabilitySet,
    eponymous: bool,
    module: Arc<dyn Module>,
}

impl ModuleDescriptor {
    /// Describe a typed [`VirtualTable`] implementation under `name`.
    ///
    /// Starts with no optional capabilities and non-eponymous usage; chain
    /// [`with_capability`](Self::with_capability) and
    /// [`eponymous`](Self::eponymous) to declare more.
    #[must_use]
    pub fn new<T>(name: impl Into<String>, version: ModuleVersion) -> Self
    where
        T: VirtualTable + 'static,
        T::Cursor: 'static,
    {
        Self {
            name: name.into(),
            version,
            capabilities: CapabilitySet::EMPTY,
            eponymous: false,
            module: Arc::new(ModuleAdapter::<T>::new()),
        }
    }

    /// Describe an already type-erased [`Module`] under `name`.
    ///
    /// Used by decorators that wrap another module's factory; typed
    /// implementations should prefer [`new`](Self::new).
    #[must_use]
    pub fn erased(name: impl Into<String>, version: ModuleVersion, module: Arc<dyn Module>) -> Self {
        Self {
            name: name.into(),
            version,
            capabilities: CapabilitySet::EMPTY,
            eponymous: false,
            module,
        }
    }

    /// Declare an optional capability.
    #[must_use]
    pub const fn with_capability(mut self, cap: Capability) -> Self {
        self.capabilities = self.capabilities.with(cap);
        self
    }

    /// Mark the module as eponymous: the module name itself is usable as a
    /// table without a prior `CREATE VIRTUAL TABLE`. Eponymous instances
    /// are connect-only; `create`/`destroy` are never invoked for them.
    #[must_use]
    pub const fn eponymous(mut self) -> Self {
        self.eponymous = true;
        self
    }

    /// The registered module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared protocol version.
    #[must_use]
    pub const fn version(&self) -> ModuleVersion {
        self.version
    }

    /// The declared optional capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Whether the module is eponymous.
    #[must_use]
    pub const fn is_eponymous(&self) -> bool {
        self.eponymous
    }

    /// The type-erased module factory.
    #[must_use]
    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    /// Check version/capability consistency.
    ///
    /// Declaring a slot the version does not carry, or savepoints without
    /// the base transaction hooks, is a configuration error.
    pub fn validate(&self) -> Result<()> {
        for cap in self.capabilities.iter() {
            if self.version < cap.minimum_version() {
                return Err(VtxError::invalid_descriptor(
                    &self.name,
                    format!(
                        "capability '{}' requires module version {:?}, declared {:?}",
                        cap.name(),
                        cap.minimum_version(),
                        self.version
                    ),
                ));
            }
        }
        if self.capabilities.contains(Capability::Savepoints)
            && !self.capabilities.contains(Capability::Transactions)
        {
            return Err(VtxError::invalid_descriptor(
                &self.name,
                "savepoint hooks require the base transaction hooks",
            ));
        }
        debug!(
            module = %self.name,
            version = self.version as i32,
            capabilities = %self.capabilities,
            eponymous = self.eponymous,
            "descriptor validated"
        );
        Ok(())
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .field("eponymous", &self.eponymous)
            .finish_non_exhaustive()
    }
}
