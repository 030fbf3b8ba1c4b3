//! Registry of virtual table modules, keyed by canonical (uppercase) name.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;
use vtx_error::{Result, VtxError};
use vtx_module::ModuleDescriptor;

/// Registry for virtual table modules registered on a connection.
///
/// Names are matched case-insensitively (ASCII). Unlike a SQL function
/// registry, re-registering a name is an error rather than an overwrite:
/// the schema cache may already hold instances built from the original
/// descriptor.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ModuleDescriptor>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module descriptor.
    ///
    /// Validates the descriptor's version/capability consistency and
    /// rejects duplicate names. On success the module name becomes
    /// resolvable for subsequent table declarations.
    pub fn register(&self, descriptor: ModuleDescriptor) -> Result<()> {
        descriptor.validate()?;
        let key = canonical_name(descriptor.name());
        let mut modules = self.modules.write();
        if modules.contains_key(&key) {
            return Err(VtxError::DuplicateModule {
                name: descriptor.name().to_owned(),
            });
        }
        debug!(module = %key, "module registered");
        modules.insert(key, descriptor);
        Ok(())
    }

    /// Look up a module by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        let key = canonical_name(name);
        let result = self.modules.read().get(&key).cloned();
        debug!(
            module = %key,
            hit = result.is_some(),
            "registry lookup"
        );
        result
    }

    /// Whether a module with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(&canonical_name(name))
    }
}

fn canonical_name(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}
