//! Mock venue adapter.
//!
//! Simulates trade execution with deterministic tickets, used in mock mode
//! and throughout the test suite. Failure modes are scriptable so tests can
//! exercise rejection, transport failure, and timeout paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ExecutionRequest, TradeStatus, VenueClient, VenueError, VenueReply};
use crate::model::SignalKind;
use crate::vault::TradeCredentials;

/// First ticket number handed out by the mock venue.
const TICKET_SEED: i64 = 10_000;

/// Scripted behavior for venue calls.
#[derive(Debug, Clone)]
pub enum VenueBehavior {
    /// Every call succeeds.
    Succeed,
    /// Every execution is rejected with this reason.
    Reject(String),
    /// Every call fails at the transport layer with this reason.
    Unreachable(String),
    /// Every call sleeps first, then succeeds (for timeout tests).
    Delay(Duration),
}

/// In-process venue simulation.
pub struct MockVenue {
    behavior: Mutex<VenueBehavior>,
    online: AtomicBool,
    next_ticket: AtomicI64,
    open_tickets: Mutex<HashSet<i64>>,
    closed_tickets: Mutex<HashSet<i64>>,
    executions: AtomicU64,
    executed_ids: Mutex<Vec<String>>,
    failing_queries: AtomicU32,
}

impl MockVenue {
    /// Venue that accepts everything.
    #[must_use]
    pub fn always_succeed() -> Self {
        Self::with_behavior(VenueBehavior::Succeed)
    }

    /// Venue that rejects every execution (business failure).
    #[must_use]
    pub fn rejecting(reason: &str) -> Self {
        Self::with_behavior(VenueBehavior::Reject(reason.to_string()))
    }

    /// Venue that is unreachable (transport failure); probes fail too.
    #[must_use]
    pub fn unreachable(reason: &str) -> Self {
        let venue = Self::with_behavior(VenueBehavior::Unreachable(reason.to_string()));
        venue.online.store(false, Ordering::SeqCst);
        venue
    }

    fn with_behavior(behavior: VenueBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            online: AtomicBool::new(true),
            next_ticket: AtomicI64::new(TICKET_SEED),
            open_tickets: Mutex::new(HashSet::new()),
            closed_tickets: Mutex::new(HashSet::new()),
            executions: AtomicU64::new(0),
            executed_ids: Mutex::new(Vec::new()),
            failing_queries: AtomicU32::new(0),
        }
    }

    /// Replace the scripted behavior.
    pub fn set_behavior(&self, behavior: VenueBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Script probe results without changing call behavior.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make the next `count` status queries fail at the transport layer.
    pub fn fail_next_queries(&self, count: u32) {
        self.failing_queries.store(count, Ordering::SeqCst);
    }

    /// Number of execution calls that reached the venue.
    #[must_use]
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Signal ids in the order their execution calls arrived.
    #[must_use]
    pub fn executed_signal_ids(&self) -> Vec<String> {
        self.executed_ids.lock().clone()
    }

    fn settle(&self, request: &ExecutionRequest) -> VenueReply {
        match request.kind {
            SignalKind::Close => {
                if let Some(ticket) = request.ticket {
                    self.open_tickets.lock().remove(&ticket);
                    self.closed_tickets.lock().insert(ticket);
                }
                VenueReply {
                    ticket: request.ticket,
                    message: format!(
                        "trade {} closed (mock)",
                        request.ticket.unwrap_or_default()
                    ),
                }
            }
            SignalKind::Modify => VenueReply {
                ticket: request.ticket,
                message: format!(
                    "trade {} modified (mock)",
                    request.ticket.unwrap_or_default()
                ),
            },
            _ => {
                let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
                self.open_tickets.lock().insert(ticket);
                VenueReply {
                    ticket: Some(ticket),
                    message: format!("trade executed (mock) ticket {ticket}"),
                }
            }
        }
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        _credentials: &TradeCredentials,
    ) -> Result<VenueReply, VenueError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.executed_ids.lock().push(request.signal_id.clone());

        let behavior = self.behavior.lock().clone();
        match behavior {
            VenueBehavior::Succeed => Ok(self.settle(request)),
            VenueBehavior::Reject(reason) => Err(VenueError::Rejected(reason)),
            VenueBehavior::Unreachable(reason) => Err(VenueError::Transport(reason)),
            VenueBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.settle(request))
            }
        }
    }

    async fn query_status(&self, ticket: i64) -> Result<TradeStatus, VenueError> {
        if self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(VenueError::Transport("scripted query failure".to_string()));
        }

        let behavior = self.behavior.lock().clone();
        if let VenueBehavior::Unreachable(reason) = behavior {
            return Err(VenueError::Transport(reason));
        }

        if self.open_tickets.lock().contains(&ticket) {
            Ok(TradeStatus {
                ticket,
                is_open: true,
            })
        } else if self.closed_tickets.lock().contains(&ticket) {
            Ok(TradeStatus {
                ticket,
                is_open: false,
            })
        } else {
            Err(VenueError::Rejected(format!("unknown ticket {ticket}")))
        }
    }

    async fn probe(&self) -> bool {
        let behavior = self.behavior.lock().clone();
        if let VenueBehavior::Delay(delay) = behavior {
            tokio::time::sleep(delay).await;
        }
        self.online.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mock-venue"
    }
}
