//! Device roles, identity, and observed peers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{DeviceId, TypesError};

/// The functional identity a device operates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Asks for help.
    RequestSender,
    /// Carries requests between areas.
    RequestTransporter,
    /// Responds to requests.
    RequestHandler,
}

impl Role {
    /// All roles.
    pub const ALL: [Role; 3] = [
        Role::RequestSender,
        Role::RequestTransporter,
        Role::RequestHandler,
    ];

    /// Persisted name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::RequestSender => "request_sender",
            Role::RequestTransporter => "request_transporter",
            Role::RequestHandler => "request_handler",
        }
    }

    /// Short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Role::RequestSender => "sender",
            Role::RequestTransporter => "transporter",
            Role::RequestHandler => "handler",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TypesError;

    /// Accepts either the persisted name or the short label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s || role.label() == s)
            .ok_or_else(|| TypesError::UnknownRole(s.to_string()))
    }
}

/// This device's persisted identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Generated once, never changes.
    pub id: DeviceId,
    /// `None` until the user picks a role.
    pub role: Option<Role>,
}

/// A device observed in inbound traffic.
///
/// Ephemeral: rebuilt from what the transports see, used for status display
/// only, never for merge decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    /// Peer's device id.
    pub id: DeviceId,
    /// Role the peer announced, if its transport carries one.
    pub role: Option<Role>,
    /// Last time traffic from this peer was seen (Unix ms).
    pub last_seen: i64,
    /// Whether the peer was seen recently enough to count as reachable.
    pub is_connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_persisted_and_short_names() {
        assert_eq!("request_handler".parse::<Role>().unwrap(), Role::RequestHandler);
        assert_eq!("transporter".parse::<Role>().unwrap(), Role::RequestTransporter);
        assert!("medic".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_as_persisted_name() {
        let json = serde_json::to_string(&Role::RequestSender).unwrap();
        assert_eq!(json, "\"request_sender\"");
    }
}
