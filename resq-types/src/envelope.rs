//! Envelope - the wire format wrapper transports exchange.
//!
//! A transport that moves bytes (files, sockets, radio frames) carries one
//! [`Envelope`] per record. The whole record travels every time, never a
//! delta, so a receiver that missed earlier versions still reconstructs the
//! full history.

use serde::{Deserialize, Serialize};

use crate::{DeviceId, DisasterRequest, Role, TypesError};

/// Current wire version.
pub const WIRE_VERSION: u8 = 1;

/// A request plus the routing metadata of the device that sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire version (currently 1)
    pub version: u8,
    /// Device that put this envelope on the transport (not necessarily the
    /// request's original sender).
    pub origin: DeviceId,
    /// Role the origin device was operating as.
    pub role: Option<Role>,
    /// Unix ms when the envelope was written - informational only
    pub sent_at: i64,
    /// The full request record.
    pub request: DisasterRequest,
}

impl Envelope {
    /// Wrap a request for sending.
    pub fn new(origin: DeviceId, role: Option<Role>, sent_at: i64, request: DisasterRequest) -> Self {
        Self {
            version: WIRE_VERSION,
            origin,
            role,
            sent_at,
            request,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        rmp_serde::to_vec_named(self).map_err(TypesError::Serialization)
    }

    /// Deserialize from MessagePack bytes, rejecting unknown versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        let envelope: Envelope =
            rmp_serde::from_slice(bytes).map_err(TypesError::Deserialization)?;
        if envelope.version != WIRE_VERSION {
            return Err(TypesError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope)
    }
}
