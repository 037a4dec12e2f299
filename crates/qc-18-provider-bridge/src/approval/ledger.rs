//! Pending-Request Ledger: at most one open approval round per origin.
//!
//! Every request that needs a decision for an origin holds a oneshot receiver
//! attached to that origin's round. Resolving the round removes it and sends
//! the same outcome to every attached waiter, so each waiter is completed at
//! most once and a new round can only start after the old one is gone.
//!
//! Flow:
//! 1. Gate calls `admit()`; the first caller opens a round, later callers join it
//! 2. Gate shows the prompt, every caller awaits its [`ApprovalTicket`]
//! 3. A decision calls `resolve_with()`, which records it and releases all waiters
//! 4. `sweep_task` expires rounds that never got a decision

use crate::domain::error::DenialReason;
use crate::domain::ids::RoundId;
use crate::domain::origin::{DisplayHint, Origin};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Result of an approval round as seen by one waiting request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Granted,
    Denied(DenialReason),
}

impl ApprovalOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, ApprovalOutcome::Granted)
    }
}

/// An open round
struct PendingApproval {
    round_id: RoundId,
    /// Hint from the connection that opened the round
    display_hint: Option<DisplayHint>,
    opened_at: Instant,
    waiters: Vec<oneshot::Sender<ApprovalOutcome>>,
}

/// Awaitable handle for one request attached to a round.
#[derive(Debug)]
pub struct ApprovalTicket {
    round_id: RoundId,
    receiver: oneshot::Receiver<ApprovalOutcome>,
}

impl ApprovalTicket {
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    /// Wait for the round's outcome.
    ///
    /// A round dropped without an outcome counts as unavailable, never as a hang.
    pub async fn wait(self) -> ApprovalOutcome {
        self.receiver
            .await
            .unwrap_or(ApprovalOutcome::Denied(DenialReason::Unavailable))
    }
}

/// What `admit` did for a caller.
#[derive(Debug)]
pub enum Admission {
    /// Origin already allowed and no round open; proceed.
    Allowed,
    /// A new round was opened; the caller must show the prompt.
    Opened(ApprovalTicket),
    /// Attached to the round already open for this origin.
    Joined(ApprovalTicket),
}

/// Statistics for the ledger
#[derive(Debug, Default)]
pub struct LedgerStats {
    /// Rounds opened
    pub rounds_opened: AtomicU64,
    /// Requests attached to an already open round
    pub rounds_joined: AtomicU64,
    /// Rounds resolved with a grant
    pub rounds_granted: AtomicU64,
    /// Rounds resolved with a denial (human or UI failure)
    pub rounds_denied: AtomicU64,
    /// Rounds expired by the sweeper
    pub rounds_expired: AtomicU64,
    /// Decisions that matched no open round
    pub stale_decisions: AtomicU64,
}

pub struct ApprovalLedger {
    rounds: DashMap<Origin, PendingApproval>,
    stats: Arc<LedgerStats>,
}

impl Default for ApprovalLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self {
            rounds: DashMap::new(),
            stats: Arc::new(LedgerStats::default()),
        }
    }

    /// Attach a request to the origin's round, opening one if needed.
    ///
    /// `already_allowed` is consulted only when no round is open, with the
    /// origin's entry locked, so a decision landing concurrently is either
    /// fully visible or not at all.
    pub fn admit<F>(&self, origin: &Origin, hint: Option<&DisplayHint>, already_allowed: F) -> Admission
    where
        F: FnOnce() -> bool,
    {
        let (tx, rx) = oneshot::channel();
        match self.rounds.entry(origin.clone()) {
            Entry::Occupied(mut occupied) => {
                let round = occupied.get_mut();
                round.waiters.push(tx);
                self.stats.rounds_joined.fetch_add(1, Ordering::Relaxed);
                debug!(
                    origin = %origin,
                    round_id = %round.round_id,
                    waiters = round.waiters.len(),
                    "Joined open approval round"
                );
                Admission::Joined(ApprovalTicket {
                    round_id: round.round_id,
                    receiver: rx,
                })
            }
            Entry::Vacant(vacant) => {
                if already_allowed() {
                    return Admission::Allowed;
                }
                let round_id = RoundId::new();
                vacant.insert(PendingApproval {
                    round_id,
                    display_hint: hint.cloned(),
                    opened_at: Instant::now(),
                    waiters: vec![tx],
                });
                self.stats.rounds_opened.fetch_add(1, Ordering::Relaxed);
                info!(origin = %origin, round_id = %round_id, "Opened approval round");
                Admission::Opened(ApprovalTicket {
                    round_id,
                    receiver: rx,
                })
            }
        }
    }

    /// Resolve the origin's open round.
    ///
    /// `record` runs with the origin's entry still locked, before the round is
    /// removed, so no new round can observe the origin between the two.
    /// Returns the number of released waiters, or `None` if no round was open.
    pub fn resolve_with<F>(&self, origin: &Origin, outcome: ApprovalOutcome, record: F) -> Option<usize>
    where
        F: FnOnce(Option<&DisplayHint>),
    {
        let round = match self.rounds.entry(origin.clone()) {
            Entry::Occupied(occupied) => {
                record(occupied.get().display_hint.as_ref());
                occupied.remove()
            }
            Entry::Vacant(_) => {
                self.stats.stale_decisions.fetch_add(1, Ordering::Relaxed);
                debug!(origin = %origin, "Decision for origin with no open round ignored");
                return None;
            }
        };
        Some(self.release(origin, round, outcome))
    }

    /// Resolve only if the open round is still `round_id`.
    pub fn resolve_round(
        &self,
        origin: &Origin,
        round_id: RoundId,
        outcome: ApprovalOutcome,
    ) -> Option<usize> {
        let round = match self.rounds.entry(origin.clone()) {
            Entry::Occupied(occupied) if occupied.get().round_id == round_id => occupied.remove(),
            _ => {
                self.stats.stale_decisions.fetch_add(1, Ordering::Relaxed);
                debug!(origin = %origin, round_id = %round_id, "Round already closed");
                return None;
            }
        };
        Some(self.release(origin, round, outcome))
    }

    /// Expire rounds open longer than `ttl`.
    ///
    /// Returns the number of rounds removed.
    pub fn remove_expired(&self, ttl: Duration) -> usize {
        let mut expired = Vec::new();

        self.rounds.retain(|origin, round| {
            let elapsed = round.opened_at.elapsed();
            if elapsed >= ttl {
                warn!(
                    origin = %origin,
                    round_id = %round.round_id,
                    elapsed_ms = elapsed.as_millis(),
                    "Expiring approval round"
                );
                expired.push(std::mem::take(&mut round.waiters));
                false // Remove
            } else {
                true // Keep
            }
        });

        // Send after every shard lock is released
        let removed = expired.len();
        for waiters in expired {
            for waiter in waiters {
                let _ = waiter.send(ApprovalOutcome::Denied(DenialReason::Expired));
            }
        }
        self.stats
            .rounds_expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    fn release(&self, origin: &Origin, round: PendingApproval, outcome: ApprovalOutcome) -> usize {
        let waiters = round.waiters.len();
        let mut delivered = 0;
        for waiter in round.waiters {
            // A dropped receiver means the request's connection is gone
            if waiter.send(outcome).is_ok() {
                delivered += 1;
            }
        }

        if outcome.is_granted() {
            self.stats.rounds_granted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.rounds_denied.fetch_add(1, Ordering::Relaxed);
        }

        info!(
            origin = %origin,
            round_id = %round.round_id,
            outcome = ?outcome,
            waiters = waiters,
            delivered = delivered,
            elapsed_ms = round.opened_at.elapsed().as_millis(),
            "Resolved approval round"
        );
        waiters
    }

    pub fn is_pending(&self, origin: &Origin) -> bool {
        self.rounds.contains_key(origin)
    }

    /// Number of open rounds
    pub fn pending_count(&self) -> usize {
        self.rounds.len()
    }

    /// Requests attached to the origin's open round (0 if none)
    pub fn waiter_count(&self, origin: &Origin) -> usize {
        self.rounds.get(origin).map_or(0, |r| r.waiters.len())
    }

    /// Get statistics
    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }
}

/// Background task expiring rounds that outlive `ttl`
pub async fn sweep_task(ledger: Arc<ApprovalLedger>, ttl: Duration, interval: Duration) {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep_interval.tick().await;
        let removed = ledger.remove_expired(ttl);
        if removed > 0 {
            debug!(removed = removed, "Expired stale approval rounds");
        }
    }
}
