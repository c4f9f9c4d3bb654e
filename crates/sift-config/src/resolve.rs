//! Configuration and identity resolution.
//!
//! Resolution order (highest first):
//! 1. Value set on the live session after it opened
//! 2. Value set before the session opened (pending)
//! 3. Value recovered from the durable store
//! 4. Built-in default
//!
//! Step 1 is not decided here: live updates are applied as ordinary session
//! tasks after the opening resolution, so they always win.

use crate::schema::SessionConfig;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Set on the open session.
    Live,

    /// Set before the session opened.
    Pending,

    /// Read back from the durable store.
    Persisted,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Live => write!(f, "live session"),
            ConfigSource::Pending => write!(f, "pending"),
            ConfigSource::Persisted => write!(f, "persisted store"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A value recorded before the session opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PendingValue<T> {
    /// Nothing was recorded; fall through to lower-precedence sources.
    #[default]
    Absent,

    /// An explicit value.
    Set(T),

    /// An explicit "no value", which still outranks persisted state.
    Cleared,
}

impl<T> PendingValue<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, PendingValue::Absent)
    }
}

/// Values captured before attachment, merged when the session opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSettings {
    pub config: PendingValue<SessionConfig>,
    pub user_id: PendingValue<String>,
}

/// A resolved value together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ConfigSource,
}

/// Resolve the session config from the pending holder and the persisted JSON.
///
/// Unreadable persisted JSON is logged and treated as absent.
pub fn resolve_config(
    pending: PendingValue<SessionConfig>,
    persisted: Option<&str>,
) -> Resolved<SessionConfig> {
    match pending {
        PendingValue::Set(config) => {
            return Resolved {
                value: config,
                source: ConfigSource::Pending,
            }
        }
        PendingValue::Cleared => {
            return Resolved {
                value: SessionConfig::default(),
                source: ConfigSource::BuiltinDefault,
            }
        }
        PendingValue::Absent => {}
    }

    if let Some(json) = persisted {
        match SessionConfig::from_json(json) {
            Ok(config) => {
                return Resolved {
                    value: config,
                    source: ConfigSource::Persisted,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable persisted config");
            }
        }
    }

    Resolved {
        value: SessionConfig::default(),
        source: ConfigSource::BuiltinDefault,
    }
}

/// Resolve the user id from the pending holder and the persisted value.
///
/// An empty persisted string means no user id.
pub fn resolve_user_id(
    pending: PendingValue<String>,
    persisted: Option<&str>,
) -> Resolved<Option<String>> {
    match pending {
        PendingValue::Set(user_id) => Resolved {
            value: Some(user_id),
            source: ConfigSource::Pending,
        },
        PendingValue::Cleared => Resolved {
            value: None,
            source: ConfigSource::Pending,
        },
        PendingValue::Absent => match persisted.filter(|s| !s.is_empty()) {
            Some(user_id) => Resolved {
                value: Some(user_id.to_string()),
                source: ConfigSource::Persisted,
            },
            None => Resolved {
                value: None,
                source: ConfigSource::BuiltinDefault,
            },
        },
    }
}
