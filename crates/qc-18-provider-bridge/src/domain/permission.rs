//! Permission records: one per origin, overwritten in place.

use crate::domain::origin::{DisplayHint, Origin};
use serde::{Deserialize, Serialize};

/// Decision state of an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// A round was opened; no human decision yet.
    Requested,
    Allowed,
    Denied,
}

impl PermissionState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// `Requested` is only ever an initial state: a decided origin is never
    /// pushed back to it, only overwritten by another explicit decision.
    pub fn can_transition_to(self, next: PermissionState) -> bool {
        !matches!(next, PermissionState::Requested)
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, PermissionState::Allowed)
    }
}

/// A human decision delivered by the approval UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Grant,
    Deny,
}

impl Decision {
    pub fn state(self) -> PermissionState {
        match self {
            Decision::Grant => PermissionState::Allowed,
            Decision::Deny => PermissionState::Denied,
        }
    }
}

/// Durable per-origin record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_hint: Option<DisplayHint>,
    pub state: PermissionState,
    /// Unix seconds of the last transition
    pub updated_at: u64,
}

impl PermissionRecord {
    pub fn requested(origin: Origin, favicon_hint: Option<DisplayHint>, now: u64) -> Self {
        Self {
            origin,
            favicon_hint,
            state: PermissionState::Requested,
            updated_at: now,
        }
    }

    pub fn decided(
        origin: Origin,
        favicon_hint: Option<DisplayHint>,
        decision: Decision,
        now: u64,
    ) -> Self {
        Self {
            origin,
            favicon_hint,
            state: decision.state(),
            updated_at: now,
        }
    }
}
