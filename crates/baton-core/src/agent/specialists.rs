//! The five built-in role agents.
//!
//! Each one composes its role's system prompt and token budget with a
//! role-specific brief of the turn, sends it to a [`ModelBackend`] and
//! returns the completion untouched. Interpreting the text is the
//! orchestrator's job.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::backend::{CompletionRequest, ModelBackend};
use super::{Agent, AgentOutput};
use crate::domain::{AgentResult, TurnContext};
use crate::roles::{self, RoleName};

/// Shared request/response plumbing for the built-in roles.
async fn run_role(
    role: RoleName,
    backend: &dyn ModelBackend,
    ctx: &TurnContext,
    brief: String,
) -> AgentResult<AgentOutput> {
    let (system_prompt, max_tokens, auto_approve) = match roles::definition_for(role.as_str()) {
        Some(def) => (def.system_prompt, def.max_tokens, def.auto_approve),
        None => ("", 4_096, false),
    };

    let request = CompletionRequest {
        role: role.as_str().to_string(),
        system_prompt: system_prompt.to_string(),
        max_tokens,
        prompt: compose_prompt(ctx, &brief),
        auto_approve,
    };
    debug!(role = %role, turn = ctx.turn, role_turn = ctx.role_turn, "sending completion request");

    let completion = backend.complete(request).await?;
    let artifacts = extract_artifacts(&completion.text);
    Ok(AgentOutput {
        result: completion.text,
        artifacts,
        usage: completion.usage,
    })
}

fn compose_prompt(ctx: &TurnContext, brief: &str) -> String {
    let mut prompt = format!("Task {}: {}\n\n{}\n", ctx.task_id, ctx.description, brief);
    if let Some(root) = &ctx.workspace_root {
        prompt.push_str(&format!("Workspace: {root}\n"));
    }
    prompt.push_str(&format!(
        "Turn {} (invocation {} of this role).\nContext: {}\n",
        ctx.turn, ctx.role_turn, ctx.payload
    ));
    prompt
}

/// Pull a top-level `artifacts` array out of a JSON completion, if any.
fn extract_artifacts(text: &str) -> Vec<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| match v.get("artifacts") {
            Some(Value::Array(items)) => Some(items.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn previous_or_none(ctx: &TurnContext) -> &str {
    ctx.previous_output().unwrap_or("(none)")
}

pub struct PlannerAgent {
    task_id: String,
    backend: Arc<dyn ModelBackend>,
}

impl PlannerAgent {
    pub fn new(task_id: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            task_id: task_id.into(),
            backend,
        }
    }

    fn brief(&self, ctx: &TurnContext) -> String {
        if ctx.role_turn > 1 {
            format!(
                "Re-plan the remaining work. Output of the previous turn:\n{}",
                previous_or_none(ctx)
            )
        } else {
            format!(
                "Break down the following task into subtasks: {}",
                ctx.description
            )
        }
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn role(&self) -> &str {
        RoleName::Planner.as_str()
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput> {
        run_role(RoleName::Planner, self.backend.as_ref(), ctx, self.brief(ctx)).await
    }
}

pub struct CoderAgent {
    task_id: String,
    backend: Arc<dyn ModelBackend>,
}

impl CoderAgent {
    pub fn new(task_id: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            task_id: task_id.into(),
            backend,
        }
    }
}

#[async_trait]
impl Agent for CoderAgent {
    fn role(&self) -> &str {
        RoleName::Coder.as_str()
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput> {
        let brief = format!(
            "Implement the planned subtasks. Plan or feedback from the previous turn:\n{}",
            previous_or_none(ctx)
        );
        run_role(RoleName::Coder, self.backend.as_ref(), ctx, brief).await
    }
}

pub struct TesterAgent {
    task_id: String,
    backend: Arc<dyn ModelBackend>,
}

impl TesterAgent {
    pub fn new(task_id: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            task_id: task_id.into(),
            backend,
        }
    }
}

#[async_trait]
impl Agent for TesterAgent {
    fn role(&self) -> &str {
        RoleName::Tester.as_str()
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput> {
        let brief = format!(
            "Verify these changes and report passing and failing tests:\n{}",
            previous_or_none(ctx)
        );
        run_role(RoleName::Tester, self.backend.as_ref(), ctx, brief).await
    }
}

pub struct DocsAgent {
    task_id: String,
    backend: Arc<dyn ModelBackend>,
}

impl DocsAgent {
    pub fn new(task_id: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            task_id: task_id.into(),
            backend,
        }
    }
}

#[async_trait]
impl Agent for DocsAgent {
    fn role(&self) -> &str {
        RoleName::Docs.as_str()
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput> {
        let brief = format!(
            "Document the change described by the previous turn:\n{}",
            previous_or_none(ctx)
        );
        run_role(RoleName::Docs, self.backend.as_ref(), ctx, brief).await
    }
}

pub struct IntegratorAgent {
    task_id: String,
    backend: Arc<dyn ModelBackend>,
}

impl IntegratorAgent {
    pub fn new(task_id: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            task_id: task_id.into(),
            backend,
        }
    }
}

#[async_trait]
impl Agent for IntegratorAgent {
    fn role(&self) -> &str {
        RoleName::Integrator.as_str()
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput> {
        let brief = format!(
            "Merge the finished work and confirm completion. Last report:\n{}",
            previous_or_none(ctx)
        );
        run_role(RoleName::Integrator, self.backend.as_ref(), ctx, brief).await
    }
}

/// One agent per built-in role, all sharing `backend`, in default order.
pub fn agents_for_task(task_id: &str, backend: Arc<dyn ModelBackend>) -> Vec<Box<dyn Agent>> {
    vec![
        Box::new(PlannerAgent::new(task_id, backend.clone())),
        Box::new(CoderAgent::new(task_id, backend.clone())),
        Box::new(TesterAgent::new(task_id, backend.clone())),
        Box::new(DocsAgent::new(task_id, backend.clone())),
        Box::new(IntegratorAgent::new(task_id, backend)),
    ]
}
