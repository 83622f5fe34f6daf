//! Request lifecycle.
//!
//! ```text
//! created ──► forwarded ──► received ──► acknowledged
//!                              │              ▲
//!                              └─► resolved ──┘
//! ```
//!
//! `acknowledged` is terminal. The reconciliation merge does not enforce
//! this graph (history is append-only, sequence is permissive); it exists so
//! the presentation layer only offers legitimate transitions.

use resq_types::{RequestStatus, Role};

/// Statuses reachable in one step from `from`.
pub fn allowed_next(from: RequestStatus) -> &'static [RequestStatus] {
    match from {
        RequestStatus::Created => &[RequestStatus::Forwarded],
        RequestStatus::Forwarded => &[RequestStatus::Received],
        RequestStatus::Received => &[RequestStatus::Acknowledged, RequestStatus::Resolved],
        RequestStatus::Resolved => &[RequestStatus::Acknowledged],
        RequestStatus::Acknowledged => &[],
    }
}

/// True if `from -> to` is an edge of the lifecycle.
pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    allowed_next(from).contains(&to)
}

/// Statuses a device acting as `role` would apply to a request in `current`.
///
/// Transporters forward, handlers receive and resolve, senders acknowledge a
/// resolution. Only lifecycle edges are offered.
pub fn role_actions(role: Role, current: RequestStatus) -> Vec<RequestStatus> {
    let owned: &[RequestStatus] = match role {
        Role::RequestTransporter => &[RequestStatus::Forwarded],
        Role::RequestHandler => &[RequestStatus::Received, RequestStatus::Resolved],
        Role::RequestSender => &[RequestStatus::Acknowledged],
    };
    allowed_next(current)
        .iter()
        .copied()
        .filter(|next| owned.contains(next))
        .collect()
}

/// True if the status has no outgoing transitions.
pub fn is_terminal(status: RequestStatus) -> bool {
    allowed_next(status).is_empty()
}
