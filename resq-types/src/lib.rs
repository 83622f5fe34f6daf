//! # resq-types
//!
//! Data model and wire format types for ResQLink offline request sync.
//!
//! This crate provides the foundational types used across all ResQLink crates:
//! - [`DeviceId`], [`RequestId`] - Identity types
//! - [`DisasterRequest`], [`StatusEntry`], [`RequestStatus`] - The unit of sync
//! - [`Role`], [`Peer`], [`DeviceIdentity`] - Device model
//! - [`Envelope`] - Wire wrapper exchanged by transports
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod request;
mod role;

pub use envelope::{Envelope, WIRE_VERSION};
pub use error::TypesError;
pub use ids::{now_millis, DeviceId, RequestId};
pub use request::{DisasterRequest, Location, RequestStatus, StatusEntry};
pub use role::{DeviceIdentity, Peer, Role};
