//! Role registry: the static catalog of roles and the default handoff chain.
//!
//! The chain `planner -> coder -> tester -> docs -> integrator` is only the
//! fallback. A turn whose output names a `nextAgent` overrides it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The five built-in role archetypes, in default execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    Planner,
    Coder,
    Tester,
    Docs,
    Integrator,
}

impl RoleName {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleName::Planner => "planner",
            RoleName::Coder => "coder",
            RoleName::Tester => "tester",
            RoleName::Docs => "docs",
            RoleName::Integrator => "integrator",
        }
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ROLES
            .iter()
            .map(|r| r.name)
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

/// Static description of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub name: RoleName,
    /// Mandate and required output shape, handed to the model backend
    pub system_prompt: &'static str,
    /// Completion budget hint
    pub max_tokens: u32,
    /// Policy hint for the tool-execution layer; not enforced here
    pub auto_approve: bool,
}

const PLANNER_PROMPT: &str = "\
You are the planner. Decompose the task into small, independently verifiable subtasks.
- List the subtasks in execution order.
- Record dependencies between subtasks and the risks you foresee.
- Do not write code.
Respond with a single JSON object: \
{\"subtasks\": [..], \"dependencies\": [..], \"risks\": [..], \"nextAgent\": \"coder\"}.";

const CODER_PROMPT: &str = "\
You are the coder. Implement the planned subtasks in the workspace.
- Follow the existing conventions of the codebase.
- Report which subtasks you completed and which failed, with the files you changed.
Respond with a single JSON object: \
{\"completed\": [..], \"failed\": [..], \"filesChanged\": [..], \"nextAgent\": \"tester\"}.";

const TESTER_PROMPT: &str = "\
You are the tester. Run the relevant test suites against the coder's changes.
- Do not modify source code.
- Hand back to the coder when tests fail; otherwise continue to docs.
Respond with a single JSON object: \
{\"passed\": [..], \"failed\": [..], \"coverage\": 0.0, \"nextAgent\": \"docs\"}.";

const DOCS_PROMPT: &str = "\
You are the documentation writer. Update user-facing and developer docs for the change.
- Keep examples in sync with the public interface.
Respond with a single JSON object: \
{\"updated\": [..], \"summary\": \"..\", \"nextAgent\": \"integrator\"}.";

const INTEGRATOR_PROMPT: &str = "\
You are the integrator. Merge the finished work and confirm the task is complete.
- Surface any conflicts instead of resolving them silently.
Respond with a single JSON object: \
{\"merged\": true, \"conflicts\": [..], \"summary\": \"..\", \"nextAgent\": null}.";

/// The catalog, in default execution order.
pub static ROLES: [Role; 5] = [
    Role {
        name: RoleName::Planner,
        system_prompt: PLANNER_PROMPT,
        max_tokens: 4_096,
        auto_approve: true,
    },
    Role {
        name: RoleName::Coder,
        system_prompt: CODER_PROMPT,
        max_tokens: 16_384,
        auto_approve: false,
    },
    Role {
        name: RoleName::Tester,
        system_prompt: TESTER_PROMPT,
        max_tokens: 8_192,
        auto_approve: true,
    },
    Role {
        name: RoleName::Docs,
        system_prompt: DOCS_PROMPT,
        max_tokens: 8_192,
        auto_approve: true,
    },
    Role {
        name: RoleName::Integrator,
        system_prompt: INTEGRATOR_PROMPT,
        max_tokens: 4_096,
        auto_approve: false,
    },
];

/// Look up a role by name. `None` means the role is not built in.
pub fn definition_for(role: &str) -> Option<&'static Role> {
    ROLES.iter().find(|r| r.name.as_str() == role)
}

/// Role names in default handoff order.
pub fn default_order() -> Vec<&'static str> {
    ROLES.iter().map(|r| r.name.as_str()).collect()
}

/// First role of the default chain.
pub fn first() -> &'static str {
    ROLES[0].name.as_str()
}

/// The role after `role` in the default chain, or `None` if it is last or unknown.
pub fn after(role: &str) -> Option<&'static str> {
    let pos = ROLES.iter().position(|r| r.name.as_str() == role)?;
    ROLES.get(pos + 1).map(|r| r.name.as_str())
}
