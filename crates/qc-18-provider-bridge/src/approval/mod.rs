//! Approval subsystem: permission table, open rounds, and the gate over both.
//!
//! Lock order is always ledger entry, then store entry. The store never
//! calls back into the ledger.

pub mod gate;
pub mod ledger;
pub mod store;

pub use gate::ApprovalGate;
pub use ledger::{
    sweep_task, Admission, ApprovalLedger, ApprovalOutcome, ApprovalTicket, LedgerStats,
};
pub use store::PermissionStore;
