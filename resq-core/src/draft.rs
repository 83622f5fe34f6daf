//! Validation of user-entered requests before they become records.

use resq_types::{DeviceId, DisasterRequest, Location};
use thiserror::Error;

/// Minimum description length in characters (after trimming).
pub const MIN_DESCRIPTION_CHARS: usize = 5;

/// Maximum description length in characters (after trimming).
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Request categories offered by the capture form.
///
/// `kind` stays free-form; these are suggestions, not a closed set.
pub const KNOWN_KINDS: [&str; 4] = ["medical", "supplies", "rescue", "info"];

/// Reasons a draft cannot become a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    /// Description shorter than [`MIN_DESCRIPTION_CHARS`].
    #[error("description too short: {len} chars (minimum 5)")]
    TooShort {
        /// Trimmed length.
        len: usize,
    },

    /// Description longer than [`MAX_DESCRIPTION_CHARS`].
    #[error("description too long: {len} chars (maximum 500)")]
    TooLong {
        /// Trimmed length.
        len: usize,
    },

    /// No category given.
    #[error("request type must not be empty")]
    EmptyKind,
}

/// What the user filled in on the capture form.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDraft {
    /// Category tag.
    pub kind: String,
    /// Free-text description.
    pub description: String,
    /// Location supplied by the platform's location service, if any.
    pub location: Option<Location>,
}

impl RequestDraft {
    /// Create a draft without a location.
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            location: None,
        }
    }

    /// Attach a location.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Check the draft without consuming it.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.kind.trim().is_empty() {
            return Err(DraftError::EmptyKind);
        }
        let len = self.description.trim().chars().count();
        if len < MIN_DESCRIPTION_CHARS {
            return Err(DraftError::TooShort { len });
        }
        if len > MAX_DESCRIPTION_CHARS {
            return Err(DraftError::TooLong { len });
        }
        Ok(())
    }

    /// Validate and turn the draft into a freshly created request.
    pub fn into_request(self, sender: DeviceId, now: i64) -> Result<DisasterRequest, DraftError> {
        self.validate()?;
        Ok(DisasterRequest::create(
            sender,
            self.kind.trim().to_lowercase(),
            self.description.trim(),
            self.location,
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resq_types::RequestStatus;

    #[test]
    fn valid_draft_becomes_created_request() {
        let draft = RequestDraft::new("Medical", "  Elderly man with chest pain  ");
        let req = draft.into_request(DeviceId::from("me"), 42).unwrap();

        assert_eq!(req.kind, "medical");
        assert_eq!(req.description, "Elderly man with chest pain");
        assert_eq!(req.status, RequestStatus::Created);
        assert_eq!(req.sender_id, DeviceId::from("me"));
        assert_eq!(req.timestamp, 42);
    }

    #[test]
    fn short_description_rejected_after_trim() {
        let draft = RequestDraft::new("info", "   hi   ");
        assert_eq!(draft.validate(), Err(DraftError::TooShort { len: 2 }));
    }

    #[test]
    fn long_description_rejected() {
        let draft = RequestDraft::new("info", "x".repeat(MAX_DESCRIPTION_CHARS + 1));
        assert_eq!(
            draft.validate(),
            Err(DraftError::TooLong {
                len: MAX_DESCRIPTION_CHARS + 1
            })
        );
    }

    #[test]
    fn boundary_lengths_accepted() {
        assert!(RequestDraft::new("info", "x".repeat(MIN_DESCRIPTION_CHARS)).validate().is_ok());
        assert!(RequestDraft::new("info", "x".repeat(MAX_DESCRIPTION_CHARS)).validate().is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let draft = RequestDraft::new("info", "ñññññ");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn empty_kind_rejected() {
        let draft = RequestDraft::new(" ", "Water needed for 20 people");
        assert_eq!(draft.validate(), Err(DraftError::EmptyKind));
    }

    #[test]
    fn location_is_carried_over() {
        let loc = Location {
            latitude: -6.2,
            longitude: 106.8,
        };
        let req = RequestDraft::new("rescue", "Trapped under debris")
            .with_location(loc)
            .into_request(DeviceId::from("me"), 1)
            .unwrap();
        assert_eq!(req.location, Some(loc));
    }
}
