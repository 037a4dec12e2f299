//! Mock collaborators for unit and integration tests.

use crate::domain::error::ApiError;
use crate::ports::outbound::{
    ApprovalPrompt, ApprovalUi, ApprovalUiError, ExecutionEngine, TimeSource,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Approval UI that records every prompt and never decides.
#[derive(Debug, Default)]
pub struct RecordingApprovalUi {
    prompts: Mutex<Vec<ApprovalPrompt>>,
    fail: AtomicBool,
}

impl RecordingApprovalUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// A UI that cannot be shown
    pub fn failing() -> Self {
        let ui = Self::default();
        ui.set_failing(true);
        ui
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<ApprovalPrompt> {
        self.prompts.lock().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl ApprovalUi for RecordingApprovalUi {
    async fn request_approval(&self, prompt: ApprovalPrompt) -> Result<(), ApprovalUiError> {
        self.prompts.lock().push(prompt);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApprovalUiError::Failed("surface did not open".into()));
        }
        Ok(())
    }
}

/// Execution engine answering from a table of canned results.
///
/// Unscripted methods echo `{"method": .., "params": ..}`.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    responses: Mutex<HashMap<String, Result<Value, ApiError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, method: &str, result: Value) -> Self {
        self.responses.lock().insert(method.to_string(), Ok(result));
        self
    }

    pub fn with_error(self, method: &str, error: ApiError) -> Self {
        self.responses.lock().insert(method.to_string(), Err(error));
        self
    }

    /// Internal methods executed so far, in order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn execute(&self, method: &str, params: Value) -> Result<Value, ApiError> {
        self.calls.lock().push((method.to_string(), params.clone()));
        match self.responses.lock().get(method) {
            Some(canned) => canned.clone(),
            None => Ok(serde_json::json!({ "method": method, "params": params })),
        }
    }
}

/// Clock frozen at a settable instant
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    now: AtomicU64,
}

impl FixedTimeSource {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
