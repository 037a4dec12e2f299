//! Request Router: classify, authorize, forward.
//!
//! A method name is only ever executed through its registry entry. Unknown
//! names never reach the engine.

use crate::approval::gate::ApprovalGate;
use crate::approval::ledger::ApprovalOutcome;
use crate::approval::store::PermissionStore;
use crate::domain::config::MethodsConfig;
use crate::domain::error::{ApiError, ApiResult};
use crate::domain::methods::{get_method_info, DenialPolicy, LocalMethod, MethodInfo, MethodTarget};
use crate::domain::origin::{Caller, Origin};
use crate::ports::outbound::ExecutionEngine;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Capability reported by `wallet_getPermissions`
const ACCOUNTS_CAPABILITY: &str = "eth_accounts";

pub struct RequestRouter {
    gate: Arc<ApprovalGate>,
    engine: Arc<dyn ExecutionEngine>,
    store: Arc<PermissionStore>,
    denial_overrides: HashMap<String, DenialPolicy>,
    disabled: HashSet<String>,
}

impl RequestRouter {
    pub fn new(
        gate: Arc<ApprovalGate>,
        engine: Arc<dyn ExecutionEngine>,
        config: &MethodsConfig,
    ) -> Self {
        let store = Arc::clone(gate.store());
        Self {
            gate,
            engine,
            store,
            denial_overrides: config.denial_policies.clone(),
            disabled: config.disabled_methods.clone(),
        }
    }

    /// Registry default unless overridden by config
    pub fn denial_policy(&self, info: &MethodInfo) -> DenialPolicy {
        self.denial_overrides
            .get(info.name)
            .copied()
            .unwrap_or(info.denial)
    }

    /// Route one call from `caller`.
    pub async fn route(&self, caller: &Caller, method: &str, params: Value) -> ApiResult<Value> {
        let info = match get_method_info(method) {
            Some(info) if !self.disabled.contains(method) => info,
            _ => {
                debug!(origin = %caller.origin, method = method, "Unknown or disabled method");
                return Err(ApiError::method_not_found(method));
            }
        };

        if info.access.requires_approval() {
            if let ApprovalOutcome::Denied(reason) = self.gate.authorize(caller, info.purpose).await
            {
                warn!(
                    origin = %caller.origin,
                    method = method,
                    reason = reason.as_str(),
                    "Capability denied"
                );
                return match self.denial_policy(info) {
                    DenialPolicy::Reject => Err(ApiError::capability_denied(method, reason)),
                    DenialPolicy::EmptyResult => Ok(json!([])),
                };
            }
        }

        match info.target {
            MethodTarget::Engine(internal) => {
                debug!(origin = %caller.origin, method = method, internal = internal, "Forwarding to engine");
                self.engine.execute(internal, params).await
            }
            MethodTarget::Local(LocalMethod::GetPermissions) => {
                Ok(self.own_permissions(&caller.origin))
            }
        }
    }

    /// The calling origin's own capabilities. Never looks at other origins.
    fn own_permissions(&self, origin: &Origin) -> Value {
        if self.store.is_allowed(origin) {
            json!([{ "parentCapability": ACCOUNTS_CAPABILITY, "invoker": origin.as_str() }])
        } else {
            json!([])
        }
    }
}
