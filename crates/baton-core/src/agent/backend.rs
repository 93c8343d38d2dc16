//! Model backend seam.
//!
//! Role agents compose a [`CompletionRequest`] and hand it to a
//! [`ModelBackend`]. Provider adapters live outside this crate; the
//! [`ScriptedBackend`] replays canned responses for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TokenUsage;
use crate::domain::{AgentError, AgentResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub role: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    /// Role-specific brief built from the turn context
    pub prompt: String,
    pub auto_approve: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> AgentResult<Completion>;
}

/// Replays canned responses, one queue per role.
///
/// Script format: `{"planner": [<response>, ...], "coder": [...]}`. A string
/// response is returned verbatim; any other JSON value is serialized first.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<HashMap<String, VecDeque<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for the next request from `role`.
    pub fn push(self, role: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role.into())
            .or_default()
            .push_back(response.into());
        self
    }

    /// Build from a parsed script object.
    pub fn from_script(script: &Value) -> AgentResult<Self> {
        let roles = script
            .as_object()
            .ok_or_else(|| AgentError::Backend("script must be a JSON object".to_string()))?;

        let mut responses = HashMap::new();
        for (role, queue) in roles {
            let items = queue.as_array().ok_or_else(|| {
                AgentError::Backend(format!("script entry for role {role} must be an array"))
            })?;
            let queue: VecDeque<String> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            responses.insert(role.clone(), queue);
        }

        Ok(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn from_json(raw: &str) -> AgentResult<Self> {
        let script: Value = serde_json::from_str(raw)?;
        Self::from_script(&script)
    }

    /// Roles that have at least one response queued.
    pub fn scripted_roles(&self) -> Vec<String> {
        let responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        let mut roles: Vec<String> = responses
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(role, _)| role.clone())
            .collect();
        roles.sort();
        roles
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> AgentResult<Completion> {
        let role = request.role.clone();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let text = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .ok_or(AgentError::ScriptExhausted { role })?;

        Ok(Completion { text, usage: None })
    }
}
