//! Approval Gate: ties the Permission Store, the ledger and the approval UI.
//!
//! Per origin:
//!
//! ```text
//! NoRecord ──privileged──▶ Pending ──grant──▶ Allowed
//!                             │
//!                             └──deny / UI failure / expiry──▶ (capability denied)
//! Denied ──privileged──▶ Pending (fresh round)
//! ```
//!
//! Only the request's own future is suspended while a round is open.

use crate::approval::ledger::{Admission, ApprovalLedger, ApprovalOutcome};
use crate::approval::store::PermissionStore;
use crate::domain::error::DenialReason;
use crate::domain::origin::{Caller, Origin};
use crate::domain::permission::Decision;
use crate::ports::outbound::{ApprovalPrompt, ApprovalUi};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ApprovalGate {
    store: Arc<PermissionStore>,
    ledger: Arc<ApprovalLedger>,
    ui: Arc<dyn ApprovalUi>,
}

impl ApprovalGate {
    pub fn new(
        store: Arc<PermissionStore>,
        ledger: Arc<ApprovalLedger>,
        ui: Arc<dyn ApprovalUi>,
    ) -> Self {
        Self { store, ledger, ui }
    }

    /// Wait until the caller's origin may use a privileged method.
    ///
    /// `purpose` is shown to the human if a new round has to be opened.
    pub async fn authorize(&self, caller: &Caller, purpose: &str) -> ApprovalOutcome {
        let origin = &caller.origin;
        let admission = self
            .ledger
            .admit(origin, caller.display_hint.as_ref(), || {
                self.store.is_allowed(origin)
            });

        let ticket = match admission {
            Admission::Allowed => return ApprovalOutcome::Granted,
            Admission::Joined(ticket) => ticket,
            Admission::Opened(ticket) => {
                if let Some(record) = self
                    .store
                    .mark_requested(origin, caller.display_hint.clone())
                {
                    self.store.persist_created(record).await;
                }

                let prompt = ApprovalPrompt {
                    round_id: ticket.round_id(),
                    origin: origin.clone(),
                    display_hint: caller.display_hint.clone(),
                    purpose: purpose.to_string(),
                };
                if let Err(e) = self.ui.request_approval(prompt).await {
                    warn!(
                        origin = %origin,
                        round_id = %ticket.round_id(),
                        error = %e,
                        "Approval UI unavailable, denying round"
                    );
                    self.ledger.resolve_round(
                        origin,
                        ticket.round_id(),
                        ApprovalOutcome::Denied(DenialReason::Unavailable),
                    );
                }
                ticket
            }
        };

        let round_id = ticket.round_id();
        let outcome = ticket.wait().await;
        debug!(origin = %origin, round_id = %round_id, outcome = ?outcome, "Approval wait finished");
        outcome
    }

    /// Human granted `origin`. Returns false if no round was open.
    pub fn grant(&self, origin: &Origin) -> bool {
        self.decide(origin, Decision::Grant)
    }

    /// Human denied `origin`. Returns false if no round was open.
    pub fn deny(&self, origin: &Origin) -> bool {
        self.decide(origin, Decision::Deny)
    }

    fn decide(&self, origin: &Origin, decision: Decision) -> bool {
        let outcome = match decision {
            Decision::Grant => ApprovalOutcome::Granted,
            Decision::Deny => ApprovalOutcome::Denied(DenialReason::Denied),
        };

        let released = self.ledger.resolve_with(origin, outcome, |hint| {
            self.store.record_decision(origin, hint.cloned(), decision);
        });

        match released {
            Some(waiters) => {
                info!(origin = %origin, decision = ?decision, waiters = waiters, "Decision applied");
                true
            }
            None => {
                debug!(origin = %origin, decision = ?decision, "Stale decision");
                false
            }
        }
    }

    pub fn store(&self) -> &Arc<PermissionStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<ApprovalLedger> {
        &self.ledger
    }
}
