//! Approval UI over a bounded channel.
//!
//! The bridge pushes [`ApprovalPrompt`]s; a trusted UI task drains the
//! receiver, shows each prompt and answers through `ProviderBridge::grant` /
//! `ProviderBridge::deny`.

use crate::ports::outbound::{ApprovalPrompt, ApprovalUi, ApprovalUiError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Create a connected UI adapter / prompt receiver pair.
pub fn create_approval_channel(
    capacity: usize,
) -> (ChannelApprovalUi, mpsc::Receiver<ApprovalPrompt>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelApprovalUi { tx }, rx)
}

/// Sender half handed to the bridge.
#[derive(Debug, Clone)]
pub struct ChannelApprovalUi {
    tx: mpsc::Sender<ApprovalPrompt>,
}

#[async_trait]
impl ApprovalUi for ChannelApprovalUi {
    async fn request_approval(&self, prompt: ApprovalPrompt) -> Result<(), ApprovalUiError> {
        // Never wait for queue space: a stuck UI must deny, not hang the round.
        self.tx.try_send(prompt).map_err(|e| match e {
            mpsc::error::TrySendError::Full(p) => {
                warn!(origin = %p.origin, round_id = %p.round_id, "Approval UI queue full");
                ApprovalUiError::Busy
            }
            mpsc::error::TrySendError::Closed(p) => {
                warn!(origin = %p.origin, round_id = %p.round_id, "Approval UI receiver closed");
                ApprovalUiError::Closed
            }
        })
    }
}
