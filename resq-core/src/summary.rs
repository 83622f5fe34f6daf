//! Per-status counts for dashboards and the CLI status view.

use resq_types::{DisasterRequest, RequestStatus};

/// Count of requests in each lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    /// All requests.
    pub total: usize,
    /// `created`
    pub created: usize,
    /// `forwarded`
    pub forwarded: usize,
    /// `received`
    pub received: usize,
    /// `acknowledged`
    pub acknowledged: usize,
    /// `resolved`
    pub resolved: usize,
}

impl StatusSummary {
    /// Tally a set of requests.
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a DisasterRequest>) -> Self {
        let mut summary = Self::default();
        for request in requests {
            summary.total += 1;
            match request.status {
                RequestStatus::Created => summary.created += 1,
                RequestStatus::Forwarded => summary.forwarded += 1,
                RequestStatus::Received => summary.received += 1,
                RequestStatus::Acknowledged => summary.acknowledged += 1,
                RequestStatus::Resolved => summary.resolved += 1,
            }
        }
        summary
    }

    /// Requests nobody has taken on yet (created or forwarded).
    pub fn pending(&self) -> usize {
        self.created + self.forwarded
    }

    /// Requests still needing attention (everything not resolved or acknowledged).
    pub fn open(&self) -> usize {
        self.total - self.resolved - self.acknowledged
    }
}
