//! The disaster request record and its status history.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{DeviceId, RequestId, TypesError};

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created by the sender, not yet seen by anyone else.
    Created,
    /// Carried onward by a transporter.
    Forwarded,
    /// Accepted by a handler.
    Received,
    /// Closed out; the sender has confirmed.
    Acknowledged,
    /// Handled by the responder.
    Resolved,
}

impl RequestStatus {
    /// All statuses in declaration order.
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Created,
        RequestStatus::Forwarded,
        RequestStatus::Received,
        RequestStatus::Acknowledged,
        RequestStatus::Resolved,
    ];

    /// Wire/storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Created => "created",
            RequestStatus::Forwarded => "forwarded",
            RequestStatus::Received => "received",
            RequestStatus::Acknowledged => "acknowledged",
            RequestStatus::Resolved => "resolved",
        }
    }

    /// Stable rank used only as the last tie-breaker when ordering history.
    pub fn rank(&self) -> u8 {
        match self {
            RequestStatus::Created => 0,
            RequestStatus::Forwarded => 1,
            RequestStatus::Received => 2,
            RequestStatus::Resolved => 3,
            RequestStatus::Acknowledged => 4,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypesError::UnknownStatus(s.to_string()))
    }
}

/// One entry of a request's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    /// Status the request moved to.
    pub status: RequestStatus,
    /// When the change happened (Unix ms, device clock).
    pub timestamp: i64,
    /// Device that applied the change.
    pub updated_by: DeviceId,
}

impl StatusEntry {
    /// Create a history entry.
    pub fn new(status: RequestStatus, timestamp: i64, updated_by: DeviceId) -> Self {
        Self {
            status,
            timestamp,
            updated_by,
        }
    }
}

/// A geographic coordinate pair supplied by the device's location service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// An emergency request, the unit of synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterRequest {
    /// Globally unique id, assigned by the originating device.
    pub id: RequestId,
    /// Creation time (Unix ms, originating device clock).
    pub timestamp: i64,
    /// Device that created the request.
    pub sender_id: DeviceId,
    /// Free-form category tag (medical, supplies, rescue, info).
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-text description.
    pub description: String,
    /// Current lifecycle status; always the status of the last history entry.
    pub status: RequestStatus,
    /// Append-only status history, oldest first.
    pub status_history: Vec<StatusEntry>,
    /// Optional location at creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl DisasterRequest {
    /// Build a freshly created request with a new id.
    ///
    /// The history starts with a single `created` entry by the sender.
    pub fn create(
        sender_id: DeviceId,
        kind: impl Into<String>,
        description: impl Into<String>,
        location: Option<Location>,
        now: i64,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            timestamp: now,
            sender_id: sender_id.clone(),
            kind: kind.into(),
            description: description.into(),
            status: RequestStatus::Created,
            status_history: vec![StatusEntry::new(RequestStatus::Created, now, sender_id)],
            location,
        }
    }

    /// The newest history entry, if any.
    pub fn latest_entry(&self) -> Option<&StatusEntry> {
        self.status_history.last()
    }

    /// True if `status` matches the last history entry (or history is empty).
    pub fn status_is_consistent(&self) -> bool {
        self.latest_entry()
            .map_or(true, |entry| entry.status == self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DisasterRequest {
        DisasterRequest::create(
            DeviceId::from("device-a"),
            "medical",
            "Two injured near the bridge",
            Some(Location {
                latitude: 14.5995,
                longitude: 120.9842,
            }),
            1_700_000_000_000,
        )
    }

    #[test]
    fn create_starts_with_created_entry() {
        let req = sample();
        assert_eq!(req.status, RequestStatus::Created);
        assert_eq!(req.status_history.len(), 1);
        assert_eq!(req.status_history[0].updated_by, req.sender_id);
        assert_eq!(req.status_history[0].timestamp, req.timestamp);
        assert!(req.status_is_consistent());
    }

    #[test]
    fn json_uses_exchange_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "medical");
        assert_eq!(json["senderId"], "device-a");
        assert_eq!(json["status"], "created");
        assert_eq!(json["statusHistory"][0]["updatedBy"], "device-a");
        assert_eq!(json["location"]["latitude"], 14.5995);
    }

    #[test]
    fn missing_location_deserializes_as_none() {
        let json = r#"{
            "id": "r1",
            "timestamp": 5,
            "senderId": "a",
            "type": "info",
            "description": "road blocked",
            "status": "forwarded",
            "statusHistory": [
                {"status": "created", "timestamp": 5, "updatedBy": "a"},
                {"status": "forwarded", "timestamp": 9, "updatedBy": "b"}
            ]
        }"#;
        let req: DisasterRequest = serde_json::from_str(json).unwrap();
        assert!(req.location.is_none());
        assert_eq!(req.status, RequestStatus::Forwarded);
        assert!(req.status_is_consistent());
    }

    #[test]
    fn status_parses_from_wire_name() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!(matches!(
            "lost".parse::<RequestStatus>(),
            Err(TypesError::UnknownStatus(_))
        ));
    }

    #[test]
    fn inconsistent_status_detected() {
        let mut req = sample();
        req.status = RequestStatus::Resolved;
        assert!(!req.status_is_consistent());
    }
}
