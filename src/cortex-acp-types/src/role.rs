//! Peer roles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which side of an ACP connection a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The editor / client side.
    Client,
    /// The coding agent side.
    Agent,
}

impl Role {
    /// The role of the remote peer.
    pub fn peer(self) -> Self {
        match self {
            Self::Client => Self::Agent,
            Self::Agent => Self::Client,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Agent => write!(f, "agent"),
        }
    }
}
