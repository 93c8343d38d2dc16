//! Turn output protocol: parsing an agent's raw result into a typed
//! [`RoleReport`] and a [`Handoff`] decision.
//!
//! Parsing never fails. A result that is not JSON becomes the sentinel
//! `{"error": <raw>, "nextAgent": null}`, which stops the run cleanly.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::roles::RoleName;

/// Field of the turn envelope naming the successor role.
pub const NEXT_AGENT_FIELD: &str = "nextAgent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<Value>,
    #[serde(default)]
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReport {
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub passed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub coverage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsReport {
    pub updated: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationReport {
    pub merged: bool,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A turn's output, typed by the role that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleReport {
    Plan(PlanReport),
    Code(CodeReport),
    Test(TestReport),
    Docs(DocsReport),
    Integration(IntegrationReport),
    /// Valid JSON that does not match the role's shape, or a custom role
    Unstructured(Value),
    /// Sentinel for output that could not be parsed
    Malformed { error: String },
}

impl RoleReport {
    /// Interpret `value` with the shape expected for `role`.
    pub fn from_value(role: &str, value: &Value) -> Self {
        let typed = match role.parse::<RoleName>() {
            Ok(RoleName::Planner) => serde_json::from_value(value.clone()).ok().map(Self::Plan),
            Ok(RoleName::Coder) => serde_json::from_value(value.clone()).ok().map(Self::Code),
            Ok(RoleName::Tester) => serde_json::from_value(value.clone()).ok().map(Self::Test),
            Ok(RoleName::Docs) => serde_json::from_value(value.clone()).ok().map(Self::Docs),
            Ok(RoleName::Integrator) => serde_json::from_value(value.clone())
                .ok()
                .map(Self::Integration),
            Err(_) => None,
        };
        typed.unwrap_or_else(|| Self::Unstructured(value.clone()))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, RoleReport::Malformed { .. })
    }
}

/// Successor decision carried by a turn's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// `nextAgent` was present: `Some(role)` hands off, `None` stops.
    Explicit(Option<String>),
    /// `nextAgent` was absent; defer to the default chain.
    Absent,
}

impl Handoff {
    /// Read `nextAgent` from a parsed output. Non-objects carry no handoff.
    ///
    /// `null` and `""` both mean stop. Any other non-string value is kept
    /// verbatim as a role name, which will fail to resolve to an agent.
    pub fn from_value(value: &Value) -> Self {
        match value.get(NEXT_AGENT_FIELD) {
            None => Handoff::Absent,
            Some(Value::Null) => Handoff::Explicit(None),
            Some(Value::String(s)) if s.is_empty() => Handoff::Explicit(None),
            Some(Value::String(s)) => Handoff::Explicit(Some(s.clone())),
            Some(other) => Handoff::Explicit(Some(other.to_string())),
        }
    }

    /// Resolve against the default chain: the next role, or `None` to stop.
    pub fn resolve(self, current_role: &str) -> Option<String> {
        match self {
            Handoff::Explicit(next) => next,
            Handoff::Absent => crate::roles::after(current_role).map(str::to_string),
        }
    }
}

/// Fully interpreted turn output.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    /// Parsed JSON, or the sentinel object; this is what the ledger records
    pub value: Value,
    pub report: RoleReport,
    pub handoff: Handoff,
}

impl TurnOutput {
    /// Parse `raw` as produced by `role`. Never fails.
    pub fn parse(role: &str, raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self {
                handoff: Handoff::from_value(&value),
                report: RoleReport::from_value(role, &value),
                value,
            },
            Err(_) => Self::sentinel(raw),
        }
    }

    /// The `{error, nextAgent: null}` stand-in for unusable output.
    pub fn sentinel(error: &str) -> Self {
        Self {
            value: json!({ "error": error, NEXT_AGENT_FIELD: null }),
            report: RoleReport::Malformed {
                error: error.to_string(),
            },
            handoff: Handoff::Explicit(None),
        }
    }

    /// Sentinel for a turn that exceeded its time budget. Marked `timedOut`
    /// so a resumed run retries the role instead of treating it as done.
    pub fn timed_out(secs: u64) -> Self {
        let error = format!("turn timed out after {secs}s");
        Self {
            value: json!({ "error": error, "timedOut": true, NEXT_AGENT_FIELD: null }),
            report: RoleReport::Malformed { error },
            handoff: Handoff::Explicit(None),
        }
    }

    /// Compact serialization of `value` for the ledger (truncated there).
    pub fn ledger_result(&self) -> String {
        self.value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_output_parses_into_plan_report() {
        let out = TurnOutput::parse(
            "planner",
            r#"{"subtasks":["t1","t2"],"risks":["scope"],"nextAgent":null}"#,
        );
        match out.report {
            RoleReport::Plan(plan) => {
                assert_eq!(plan.subtasks, vec!["t1", "t2"]);
                assert_eq!(plan.risks, vec!["scope"]);
                assert!(plan.dependencies.is_empty());
            }
            other => panic!("expected Plan, got {other:?}"),
        }
        assert_eq!(out.handoff, Handoff::Explicit(None));
    }

    #[test]
    fn shape_mismatch_falls_back_to_unstructured() {
        let out = TurnOutput::parse("coder", r#"{"patch":"diff --git"}"#);
        assert!(matches!(out.report, RoleReport::Unstructured(_)));
        assert_eq!(out.handoff, Handoff::Absent);
    }

    #[test]
    fn custom_roles_are_unstructured() {
        let out = TurnOutput::parse("security", r#"{"findings":[],"nextAgent":"coder"}"#);
        assert!(matches!(out.report, RoleReport::Unstructured(_)));
        assert_eq!(out.handoff, Handoff::Explicit(Some("coder".to_string())));
    }

    #[test]
    fn non_json_becomes_the_stop_sentinel() {
        let out = TurnOutput::parse("coder", "not json");
        assert!(out.report.is_malformed());
        assert_eq!(out.value["error"], "not json");
        assert_eq!(out.value["nextAgent"], Value::Null);
        assert_eq!(out.handoff.resolve("coder"), None);
    }

    #[test]
    fn explicit_null_differs_from_absent() {
        assert_eq!(
            Handoff::from_value(&json!({"nextAgent": null})).resolve("planner"),
            None
        );
        assert_eq!(
            Handoff::from_value(&json!({})).resolve("planner"),
            Some("coder".to_string())
        );
    }

    #[test]
    fn empty_next_agent_stops() {
        assert_eq!(
            Handoff::from_value(&json!({"nextAgent": ""})),
            Handoff::Explicit(None)
        );
    }

    #[test]
    fn non_object_json_defers_to_default_chain() {
        let out = TurnOutput::parse("tester", "[1,2,3]");
        assert_eq!(out.handoff, Handoff::Absent);
        assert_eq!(out.handoff.resolve("tester"), Some("docs".to_string()));
    }

    #[test]
    fn absent_handoff_from_last_role_stops() {
        assert_eq!(Handoff::Absent.resolve("integrator"), None);
    }

    #[test]
    fn timed_out_sentinel_is_marked() {
        let out = TurnOutput::timed_out(30);
        assert_eq!(out.value["timedOut"], true);
        assert!(out.ledger_result().contains("turn timed out after 30s"));
    }
}
