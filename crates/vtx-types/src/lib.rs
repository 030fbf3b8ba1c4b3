//! Value and argument types shared by the vtx provider and engine crates.

mod value;

pub use value::Value;

/// The ordered argument vector from a virtual table declaration.
///
/// Positions are significant and fixed by the protocol:
/// `[module name, database name, table name, user arguments...]`.
/// The engine passes this to `create`/`connect` exactly as declared,
/// never reordered.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModuleArgs {
    argv: Vec<String>,
}

impl ModuleArgs {
    /// Build an argument vector from the declaration's parts.
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        user_args: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut argv = vec![module.into(), database.into(), table.into()];
        argv.extend(user_args);
        Self { argv }
    }

    /// The module name (argv position 0).
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.argv[0]
    }

    /// The database name (argv position 1).
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.argv[1]
    }

    /// The table name (argv position 2).
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.argv[2]
    }

    /// The user-supplied arguments (argv positions 3..), in declaration order.
    #[must_use]
    pub fn user_args(&self) -> &[String] {
        &self.argv[3..]
    }

    /// The full argument vector, in declaration order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.argv
    }

    /// Number of entries including the three fixed positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.argv.len()
    }

    /// Always false: the three fixed positions are present by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}
