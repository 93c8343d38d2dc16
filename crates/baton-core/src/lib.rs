//! Baton Core Library
//!
//! Turn-based multi-agent orchestration: a fixed team of roles (planner,
//! coder, tester, docs, integrator) passes a task along, one turn at a time,
//! with every turn recorded to the task's ledger.

pub mod agent;
pub mod cancel;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod report;
pub mod resume;
pub mod roles;
pub mod telemetry;

pub use agent::{
    agents_for_task, Agent, AgentOutput, CoderAgent, Completion, CompletionRequest, DocsAgent,
    IntegratorAgent, ModelBackend, PlannerAgent, ScriptedBackend, TesterAgent, TokenUsage,
};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use collaborators::{CheckpointStore, FsSessionStore, Session, SessionStore};
pub use config::{BatonConfig, ConfigError};
pub use domain::{
    AgentError, AgentResult, CollaboratorError, CollaboratorResult, ExecutionResult,
    ExecutionStatus, OrchestrationContext, OrchestrationError, Result, TurnContext,
    DEFAULT_MAX_TURNS,
};
pub use orchestrator::{ExecutionOptions, Orchestrator, OrchestratorState};
pub use report::{Handoff, RoleReport, TurnOutput};
pub use resume::{find_resume_point, ResumePoint};
pub use roles::{Role, RoleName, ROLES};
pub use telemetry::init_tracing;

pub use baton_ledger::{AgentLedgerEntry, FsLedger, LedgerError, LedgerStore, LedgerSummary};
