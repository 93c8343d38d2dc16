//! Error taxonomy for orchestration.
//!
//! Only conditions the run cannot absorb surface here. Malformed agent output
//! and hitting the turn ceiling are not errors; they show up in the ledger and
//! in `ExecutionResult::status`.

use baton_ledger::LedgerError;

use crate::orchestrator::OrchestratorState;

/// Failures raised by an agent or the model backend behind it.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model backend error: {0}")]
    Backend(String),

    #[error("no scripted response left for role {role}")]
    ScriptExhausted { role: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for agent operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Failures of the external collaborators (session store, checkpoint store).
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] LedgerError),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for collaborator operations.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Fatal orchestration errors. Each one aborts `execute()`.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// Configuration error: the current role has no registered agent.
    #[error("Orchestration failed: no agent registered for role '{role}'")]
    UnregisteredRole { role: String },

    #[error("Orchestration failed: invalid context: {0}")]
    InvalidContext(String),

    #[error("Orchestration failed: orchestrator is {state}, expected ready")]
    NotReady { state: OrchestratorState },

    #[error("Orchestration failed: agent '{role}' failed at turn {turn}: {source}")]
    Agent {
        role: String,
        turn: u32,
        #[source]
        source: AgentError,
    },

    /// Storage error: the run cannot continue without a durable audit trail.
    #[error("Orchestration failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Orchestration failed: checkpoint after turn {turn} failed: {source}")]
    Checkpoint {
        turn: u32,
        #[source]
        source: CollaboratorError,
    },
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestrationError>;
