//! Static configuration for one remote module.

use url::Url;

/// Describes where a remote module lives and how to address it once loaded.
///
/// Descriptors are created during host bootstrap and never mutated for the
/// life of the session; the registry hands out clones.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Logical module id, unique across the registry (e.g. `crm`).
    pub id: String,
    /// URL of the remote entry.
    pub entry_url: Url,
    /// Scope name the remote registers its container under. Must match the
    /// remote's own build configuration exactly.
    pub scope: String,
    /// Exposed module path the host asks the container for (e.g. `./App`).
    pub exposed_module: String,
    /// Human-readable display name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Permission strings required to use the module. Empty means the
    /// module is never matched by permission-filtered preloading.
    pub required_permissions: Vec<String>,
}

impl ModuleDescriptor {
    pub fn new(
        id: impl Into<String>,
        entry_url: Url,
        scope: impl Into<String>,
        exposed_module: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            entry_url,
            scope: scope.into(),
            exposed_module: exposed_module.into(),
            description: String::new(),
            required_permissions: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}
