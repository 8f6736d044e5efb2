//! Source lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a position source.
///
/// ```text
///  Initializing ---> Started <----- start() ----+
///                    |     ^                    |
///                  stop() start()   failure -> Error     permanently -> Down
///                    v     |                               unavailable
///                    Stopped
/// ```
///
/// `Error` is reachable from any state; `Down` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    #[default]
    Initializing,
    Started,
    Stopped,
    Error,
    Down,
}

impl ProviderState {
    /// Whether the source can no longer be relied on by its supervisor.
    pub fn is_failed(self) -> bool {
        matches!(self, ProviderState::Error | ProviderState::Down)
    }

    pub fn is_terminal(self) -> bool {
        self == ProviderState::Down
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderState::Initializing => "initializing",
            ProviderState::Started => "started",
            ProviderState::Stopped => "stopped",
            ProviderState::Error => "error",
            ProviderState::Down => "down",
        };
        f.write_str(name)
    }
}

/// Connection to a backend service, tracked apart from [`ProviderState`].
///
/// Backends without a connection phase report `Connected` straight away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

/// Which slot of the supervisor a source occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    Primary,
    Fallback,
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRole::Primary => f.write_str("primary"),
            SourceRole::Fallback => f.write_str("fallback"),
        }
    }
}
