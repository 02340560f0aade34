//! Bookkeeping for restore orders of archived products.
//!
//! The catalogue never pushes a notification when a restore finishes, so the
//! tracker only records what was asked and when, and decides how long the
//! orchestrator should wait before polling all outstanding requests together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, warn};

use super::clock::Clock;
use super::models::RestoreAck;
use super::retry_policy::RestorePolicy;

/// Lifecycle of a restore request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Unrequested,
    Requested,
    Ready,     // terminal
    Abandoned, // terminal
}

impl RestoreState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RestoreState::Ready | RestoreState::Abandoned)
    }
}

/// A restore order issued for one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub identifier: String,
    pub pid: String,
    pub requested_at: DateTime<Utc>,
    /// Estimated completion reported by the catalogue, if it could be parsed.
    pub estimated_ready_at: Option<DateTime<Utc>>,
    pub last_status: String,
    /// Number of polls that found the product still archived.
    pub retry_count: u32,
    pub state: RestoreState,
}

/// Tracks restore requests across the wait phase of a cycle.
pub struct RestoreTracker {
    policy: RestorePolicy,
    clock: Arc<dyn Clock>,
    requests: Vec<RestoreRequest>,
    poll_round: u32,
}

impl RestoreTracker {
    pub fn new(policy: RestorePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            requests: Vec::new(),
            poll_round: 0,
        }
    }

    /// Forget requests that reached a terminal state in a previous cycle.
    ///
    /// Abandoned items are still in the queue, so they get a fresh restore
    /// attempt in the new cycle.
    pub fn begin_cycle(&mut self) {
        self.requests.retain(|r| !r.state.is_terminal());
        self.poll_round = 0;
    }

    pub fn state(&self, identifier: &str) -> RestoreState {
        self.get(identifier)
            .map(|r| r.state)
            .unwrap_or(RestoreState::Unrequested)
    }

    pub fn get(&self, identifier: &str) -> Option<&RestoreRequest> {
        self.requests.iter().find(|r| r.identifier == identifier)
    }

    /// Record an acknowledged restore order (Unrequested → Requested).
    pub fn record_requested(&mut self, identifier: &str, pid: &str, ack: &RestoreAck) {
        let now = self.clock.now();
        let estimated_ready_at = ack.estimated_time.as_deref().and_then(parse_estimated_time);
        let request = RestoreRequest {
            identifier: identifier.to_string(),
            pid: pid.to_string(),
            requested_at: now,
            estimated_ready_at,
            last_status: ack.summary(),
            retry_count: 0,
            state: RestoreState::Requested,
        };
        self.upsert(request);
    }

    /// Record a failed restore order (→ Abandoned for this cycle).
    pub fn record_failed(&mut self, identifier: &str, pid: &str, reason: &str) {
        let request = RestoreRequest {
            identifier: identifier.to_string(),
            pid: pid.to_string(),
            requested_at: self.clock.now(),
            estimated_ready_at: None,
            last_status: reason.to_string(),
            retry_count: 0,
            state: RestoreState::Abandoned,
        };
        self.upsert(request);
    }

    /// Requests still waiting for their product to come online, in request order.
    pub fn outstanding(&self) -> Vec<RestoreRequest> {
        self.requests
            .iter()
            .filter(|r| r.state == RestoreState::Requested)
            .cloned()
            .collect()
    }

    pub fn outstanding_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.state == RestoreState::Requested)
            .count()
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding_count() > 0
    }

    /// Single shared delay before the next poll of all outstanding requests.
    ///
    /// The first round waits until the latest expected availability (the
    /// catalogue estimate, or request time plus the default window); later
    /// rounds use the policy's growing window.
    pub fn next_wait(&self) -> Duration {
        if self.poll_round > 0 {
            return self.policy.window_for(self.poll_round);
        }

        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.policy.wait_window)
            .unwrap_or_else(|_| chrono::Duration::zero());

        let latest = self
            .requests
            .iter()
            .filter(|r| r.state == RestoreState::Requested)
            .map(|r| r.estimated_ready_at.unwrap_or(r.requested_at + window))
            .max();

        match latest {
            Some(ready_at) => self
                .policy
                .clamp((ready_at - now).to_std().unwrap_or(Duration::ZERO)),
            None => Duration::ZERO,
        }
    }

    /// The product came online on re-resolution (Requested → Ready).
    pub fn mark_ready(&mut self, identifier: &str) {
        if let Some(request) = self.find_requested_mut(identifier) {
            request.state = RestoreState::Ready;
            request.last_status = "online".to_string();
            info!("Restore of {} completed, product is online", identifier);
        }
    }

    /// The product is still archived (or could not be polled).
    ///
    /// Returns the resulting state: Requested while polls remain, Abandoned
    /// once the ceiling is hit.
    pub fn mark_still_pending(&mut self, identifier: &str, status: &str) -> RestoreState {
        let max_polls = self.policy.max_polls;
        let policy = self.policy.clone();
        match self.find_requested_mut(identifier) {
            Some(request) => {
                request.retry_count += 1;
                request.last_status = status.to_string();
                if !policy.should_poll_again(request.retry_count) {
                    request.state = RestoreState::Abandoned;
                    warn!(
                        "Restore of {} still not available after {} polls, abandoning for this cycle",
                        identifier, max_polls
                    );
                }
                request.state
            }
            None => self.state(identifier),
        }
    }

    /// Called after all outstanding requests were polled once.
    pub fn finish_poll_round(&mut self) {
        self.poll_round += 1;
    }

    fn find_requested_mut(&mut self, identifier: &str) -> Option<&mut RestoreRequest> {
        self.requests
            .iter_mut()
            .find(|r| r.identifier == identifier && r.state == RestoreState::Requested)
    }

    fn upsert(&mut self, request: RestoreRequest) {
        match self
            .requests
            .iter_mut()
            .find(|r| r.identifier == request.identifier)
        {
            Some(existing) => *existing = request,
            None => self.requests.push(request),
        }
    }
}

/// Parse the catalogue's estimated restore time.
///
/// Accepts RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS[.fff]` values (taken as UTC).
pub fn parse_estimated_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
