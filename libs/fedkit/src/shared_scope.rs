//! Shared-dependency scope offered to remotes during the handshake.
//!
//! The host declares which common libraries it carries and at which
//! versions; a remote validates its own requirements against the scope in
//! `RemoteContainer::init` so both sides reuse one copy instead of each
//! bundling their own.

use std::collections::HashMap;

/// One library the host offers for reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedLibrary {
    pub version: String,
}

/// The set of libraries the host offers, keyed by library name.
#[derive(Debug, Clone, Default)]
pub struct SharedScope {
    entries: HashMap<String, SharedLibrary>,
}

impl SharedScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scope from `library -> version` pairs (the config shape).
    pub fn from_versions(versions: &HashMap<String, String>) -> Self {
        let entries = versions
            .iter()
            .map(|(name, version)| {
                (
                    name.clone(),
                    SharedLibrary {
                        version: version.clone(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn provide(&mut self, library: impl Into<String>, version: impl Into<String>) {
        self.entries.insert(
            library.into(),
            SharedLibrary {
                version: version.into(),
            },
        );
    }

    pub fn get(&self, library: &str) -> Option<&SharedLibrary> {
        self.entries.get(library)
    }

    /// Whether the scope satisfies `required` for `library`.
    pub fn satisfies(&self, library: &str, required: &str) -> bool {
        self.get(library)
            .is_some_and(|lib| version_compatible(&lib.version, required))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Caret-style compatibility: same major, and the provided version is not
/// older than the required one. A leading `^` on the requirement is
/// accepted and ignored. Non-numeric components fall back to exact string
/// equality.
pub fn version_compatible(provided: &str, required: &str) -> bool {
    let required = required.strip_prefix('^').unwrap_or(required);
    let (Some(provided), Some(required)) = (parse_version(provided), parse_version(required))
    else {
        return provided == required;
    };

    provided.0 == required.0 && provided >= required
}

fn parse_version(v: &str) -> Option<(u64, u64, u64)> {
    let mut parts = v.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    Some((major, minor, patch))
}
