//! Method classification registry.
//!
//! Every inbound method name a page may call is listed here with its access
//! class and the internal engine method it maps to. A name that is not in the
//! registry is never forwarded.
//!
//! - **Open**: informational, forwarded without any approval round
//! - **Privileged**: requires an `allowed` permission record for the origin

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Access class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodAccess {
    Open,
    Privileged,
}

impl MethodAccess {
    pub fn requires_approval(&self) -> bool {
        matches!(self, MethodAccess::Privileged)
    }
}

/// What a privileged method answers when its capability is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialPolicy {
    /// Structured capability-denied error
    Reject,
    /// Successful response with an empty list
    EmptyResult,
}

/// Methods the bridge answers itself instead of forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalMethod {
    /// The calling origin's own permission state
    GetPermissions,
}

/// Where an accepted call is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodTarget {
    /// Forward to the execution engine under this internal name
    Engine(&'static str),
    Local(LocalMethod),
}

/// Method metadata
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Inbound method name (e.g., "eth_requestAccounts")
    pub name: &'static str,
    pub access: MethodAccess,
    pub target: MethodTarget,
    /// Default answer on refusal (privileged only)
    pub denial: DenialPolicy,
    /// Shown to the human in the approval prompt
    pub purpose: &'static str,
}

impl MethodInfo {
    const fn open(name: &'static str, internal: &'static str) -> Self {
        Self {
            name,
            access: MethodAccess::Open,
            target: MethodTarget::Engine(internal),
            denial: DenialPolicy::Reject,
            purpose: "",
        }
    }

    const fn privileged(
        name: &'static str,
        internal: &'static str,
        denial: DenialPolicy,
        purpose: &'static str,
    ) -> Self {
        Self {
            name,
            access: MethodAccess::Privileged,
            target: MethodTarget::Engine(internal),
            denial,
            purpose,
        }
    }

    const fn local(name: &'static str, method: LocalMethod) -> Self {
        Self {
            name,
            access: MethodAccess::Open,
            target: MethodTarget::Local(method),
            denial: DenialPolicy::Reject,
            purpose: "",
        }
    }
}

/// All methods a page may call
pub static METHOD_REGISTRY: LazyLock<HashMap<&'static str, MethodInfo>> = LazyLock::new(|| {
    let methods = [
        // ═══════════════════════════════════════════════════════════════════════
        // PRIVILEGED: account-revealing and transaction/signature submission
        // ═══════════════════════════════════════════════════════════════════════
        MethodInfo::privileged(
            "eth_requestAccounts",
            "wallet_listAccounts",
            DenialPolicy::Reject,
            "View your account addresses",
        ),
        MethodInfo::privileged(
            "eth_accounts",
            "wallet_listAccounts",
            DenialPolicy::EmptyResult,
            "View your account addresses",
        ),
        MethodInfo::privileged(
            "eth_sendTransaction",
            "wallet_submitTransaction",
            DenialPolicy::Reject,
            "Submit transactions from your accounts",
        ),
        MethodInfo::privileged(
            "personal_sign",
            "wallet_signMessage",
            DenialPolicy::Reject,
            "Sign messages with your accounts",
        ),
        MethodInfo::privileged(
            "eth_sign",
            "wallet_signMessage",
            DenialPolicy::Reject,
            "Sign messages with your accounts",
        ),
        MethodInfo::privileged(
            "eth_signTypedData_v4",
            "wallet_signTypedData",
            DenialPolicy::Reject,
            "Sign typed data with your accounts",
        ),
        // ═══════════════════════════════════════════════════════════════════════
        // OPEN: informational
        // ═══════════════════════════════════════════════════════════════════════
        MethodInfo::open("eth_chainId", "chain_getId"),
        MethodInfo::open("net_version", "chain_getNetworkVersion"),
        MethodInfo::open("eth_blockNumber", "chain_getBlockNumber"),
        MethodInfo::open("eth_gasPrice", "chain_getGasPrice"),
        MethodInfo::open("eth_getBalance", "chain_getBalance"),
        MethodInfo::open("eth_getTransactionCount", "chain_getTransactionCount"),
        MethodInfo::open("eth_getCode", "chain_getCode"),
        MethodInfo::open("eth_call", "chain_call"),
        MethodInfo::open("eth_estimateGas", "chain_estimateGas"),
        MethodInfo::open("eth_getBlockByNumber", "chain_getBlockByNumber"),
        MethodInfo::open("eth_getTransactionByHash", "chain_getTransactionByHash"),
        MethodInfo::open("eth_getTransactionReceipt", "chain_getTransactionReceipt"),
        MethodInfo::open("web3_clientVersion", "node_getClientVersion"),
        MethodInfo::local("wallet_getPermissions", LocalMethod::GetPermissions),
    ];

    methods.into_iter().map(|m| (m.name, m)).collect()
});

/// Get method info by name
pub fn get_method_info(method: &str) -> Option<&'static MethodInfo> {
    METHOD_REGISTRY.get(method)
}
