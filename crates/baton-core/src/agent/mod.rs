//! The per-role execution contract.
//!
//! An [`Agent`] turns a [`TurnContext`] into an [`AgentOutput`]. Its result
//! string is expected, but not required, to be a JSON object carrying a
//! `nextAgent` field; the orchestrator tolerates anything else.

pub mod backend;
pub mod specialists;

use async_trait::async_trait;
use baton_ledger::AgentLedgerEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AgentResult, TurnContext};
use crate::roles::{self, Role};

pub use backend::{Completion, CompletionRequest, ModelBackend, ScriptedBackend};
pub use specialists::{
    agents_for_task, CoderAgent, DocsAgent, IntegratorAgent, PlannerAgent, TesterAgent,
};

/// Tokens and cost spent on one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub tokens: u64,
    pub cost: f64,
}

impl TokenUsage {
    pub fn new(tokens: u64, cost: f64) -> Self {
        Self { tokens, cost }
    }
}

/// What an agent hands back for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Raw result, ideally a JSON object with a `nextAgent` field
    pub result: String,
    #[serde(default)]
    pub artifacts: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl AgentOutput {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ..Self::default()
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Value>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A role implementation driven by the orchestrator.
///
/// Agents keep no turn bookkeeping of their own: the global turn and the
/// per-role invocation count arrive in the [`TurnContext`].
#[async_trait]
pub trait Agent: Send + Sync {
    /// Role name this agent is registered under.
    fn role(&self) -> &str;

    /// Display name; defaults to the role.
    fn name(&self) -> &str {
        self.role()
    }

    fn task_id(&self) -> &str;

    /// Static registry entry for this role, if it is a built-in one.
    fn definition(&self) -> Option<&'static Role> {
        roles::definition_for(self.role())
    }

    /// Run one turn.
    async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput>;

    /// Build (but do not write) the ledger entry for a turn of this agent.
    fn ledger_entry(
        &self,
        turn: u32,
        action: &str,
        result: &str,
        usage: TokenUsage,
    ) -> AgentLedgerEntry {
        AgentLedgerEntry::new(
            self.role(),
            self.task_id(),
            turn,
            action,
            result,
            usage.tokens,
            usage.cost,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        task_id: String,
    }

    #[async_trait]
    impl Agent for Echo {
        fn role(&self) -> &str {
            "security"
        }

        fn task_id(&self) -> &str {
            &self.task_id
        }

        async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput> {
            Ok(AgentOutput::new(ctx.payload.to_string()))
        }
    }

    #[test]
    fn ledger_entry_is_stamped_with_role_task_and_turn() {
        let agent = Echo {
            task_id: "t-9".to_string(),
        };
        let entry = agent.ledger_entry(4, "Execute security", "{}", TokenUsage::new(12, 0.25));
        assert_eq!(entry.agent, "security");
        assert_eq!(entry.task_id, "t-9");
        assert_eq!(entry.turn, 4);
        assert_eq!(entry.tokens_used, 12);
        assert_eq!(entry.cost, 0.25);
    }

    #[test]
    fn custom_roles_have_no_definition_and_name_defaults_to_role() {
        let agent = Echo {
            task_id: "t".to_string(),
        };
        assert!(agent.definition().is_none());
        assert_eq!(agent.name(), "security");
    }

    #[test]
    fn agent_output_builders() {
        let out = AgentOutput::new("{}")
            .with_artifacts(vec![serde_json::json!({"path": "src/lib.rs"})])
            .with_usage(TokenUsage::new(3, 0.0));
        assert_eq!(out.artifacts.len(), 1);
        assert_eq!(out.usage, Some(TokenUsage::new(3, 0.0)));
    }
}
