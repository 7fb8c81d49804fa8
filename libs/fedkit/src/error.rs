//! Error taxonomy for the federation loading chain.
//!
//! Three failure classes are kept apart on purpose:
//! - **Transport**: the remote entry could not be fetched at all
//!   ([`ScriptError`], wrapped as [`LoadError::Transport`]). "The server is
//!   down."
//! - **Protocol**: the entry loaded but the remote did not honor the
//!   federation contract: no container under the expected scope, a failed
//!   shared-dependency handshake, or an unknown exposed path. "The server is
//!   running the wrong build."
//! - **Render**: the resolved component failed while rendering
//!   ([`ComponentError`]); caught only at the slot, never by the loader
//!   cache, since by then loading already succeeded.
//!
//! Errors are `Clone` so a single load outcome can settle every concurrent
//! waiter of a shared in-flight future.

use std::time::Duration;

/// Failure to fetch or execute a remote entry (the transport class).
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ScriptError {
    /// Network-level failure: DNS, connection refused, TLS, aborted body.
    #[error("failed to fetch remote entry '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// The entry URL answered with an error status.
    #[error("remote entry '{url}' answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// The entry fetch did not settle within the configured bound.
    #[error("loading remote entry '{url}' timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// The entry payload could not be interpreted as a remote entry.
    #[error("remote entry '{url}' is not a valid entry: {reason}")]
    Entry { url: String, reason: String },
}

impl ScriptError {
    /// The entry URL this failure is about, for diagnostics.
    pub fn url(&self) -> &str {
        match self {
            Self::Fetch { url, .. }
            | Self::Status { url, .. }
            | Self::Timeout { url, .. }
            | Self::Entry { url, .. } => url,
        }
    }
}

/// Failure reported by a remote container itself.
///
/// Containers do not know which scope the host registered them under, so
/// these carry only container-local context; the bridge attaches the scope
/// when mapping them into [`LoadError`].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ContainerError {
    /// A shared dependency required by the remote is missing or incompatible.
    #[error("shared dependency '{library}' requires {required}, host provides {provided}")]
    Incompatible {
        library: String,
        required: String,
        provided: String,
    },

    /// Any other handshake failure.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The container does not expose the requested path.
    #[error("unknown exposed path '{path}' (available: {})", available.join(", "))]
    UnknownPath {
        path: String,
        available: Vec<String>,
    },
}

/// Failure of the full load chain for one module.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    /// The module id is not present in the registry.
    #[error("module '{id}' is not registered")]
    UnknownModule { id: String },

    /// Transport class: the remote entry could not be fetched.
    #[error("transport failure for module '{id}'")]
    Transport {
        id: String,
        #[source]
        source: ScriptError,
    },

    /// Protocol class: the entry executed but registered nothing under the
    /// descriptor's scope.
    #[error(
        "no container registered under scope '{scope}' after loading '{url}' \
         (host and remote disagree on the federation contract)"
    )]
    ContainerMissing { scope: String, url: String },

    /// Protocol class: the shared-dependency handshake failed.
    #[error("handshake with scope '{scope}' failed")]
    Handshake {
        scope: String,
        #[source]
        source: ContainerError,
    },

    /// Protocol class: the container does not expose the requested path.
    #[error("scope '{scope}' does not expose '{path}'")]
    UnknownExposedPath {
        scope: String,
        path: String,
        #[source]
        source: ContainerError,
    },

    /// Protocol class: the factory for an exposed path failed to produce a
    /// component.
    #[error("factory for '{path}' in scope '{scope}' failed: {reason}")]
    Factory {
        scope: String,
        path: String,
        reason: String,
    },
}

impl LoadError {
    /// True for the transport class ("server is down"), false for the
    /// protocol class ("server runs the wrong build") and registry misses.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Failure raised by a component while rendering.
#[derive(Debug, Clone, thiserror::Error)]
#[error("component '{component}' failed to render: {reason}")]
pub struct ComponentError {
    pub component: String,
    pub reason: String,
}

impl ComponentError {
    pub fn new(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn transport_classification() {
        let err = LoadError::Transport {
            id: "crm".into(),
            source: ScriptError::Fetch {
                url: "http://localhost:4301/remote-entry.json".into(),
                reason: "connection refused".into(),
            },
        };
        assert!(err.is_transport());

        let err = LoadError::ContainerMissing {
            scope: "crm".into(),
            url: "http://localhost:4301/remote-entry.json".into(),
        };
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_error_preserves_script_source() {
        let err = LoadError::Transport {
            id: "hr".into(),
            source: ScriptError::Status {
                url: "http://localhost:4302/remote-entry.json".into(),
                status: 503,
            },
        };

        let source = err.source().expect("transport error should have a source");
        let script = source
            .downcast_ref::<ScriptError>()
            .expect("source should be a ScriptError");
        assert_eq!(script.url(), "http://localhost:4302/remote-entry.json");
    }

    #[test]
    fn messages_tell_down_apart_from_wrong_build() {
        let down = ScriptError::Fetch {
            url: "http://localhost:4303/remote-entry.json".into(),
            reason: "connection refused".into(),
        };
        assert!(down.to_string().contains("failed to fetch"));

        let wrong_build = LoadError::ContainerMissing {
            scope: "finance".into(),
            url: "http://localhost:4303/remote-entry.json".into(),
        };
        assert!(wrong_build.to_string().contains("federation contract"));
    }
}
