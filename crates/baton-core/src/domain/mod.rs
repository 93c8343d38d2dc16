//! Domain types shared by the orchestrator, agents and callers.

pub mod context;
pub mod error;
pub mod result;

pub use context::{OrchestrationContext, TurnContext, DEFAULT_MAX_TURNS};
pub use error::{
    AgentError, AgentResult, CollaboratorError, CollaboratorResult, OrchestrationError, Result,
};
pub use result::{ExecutionResult, ExecutionStatus};
