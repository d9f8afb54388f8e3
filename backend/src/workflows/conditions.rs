// Workflow Conditions - predicates for triggers and post-task branching

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single condition to evaluate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Field name to evaluate (supports dot notation for nested fields)
    pub field: String,
    /// Operator for comparison
    pub operator: String,
    /// Value to compare against
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Group of conditions with AND/OR logic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// Logic operator: "AND" or "OR"
    pub logic: String,
    /// List of conditions in this group
    pub conditions: Vec<Condition>,
    /// Nested condition groups for complex logic
    #[serde(default)]
    pub groups: Vec<ConditionGroup>,
}

impl Condition {
    pub fn new(field: &str, operator: &str, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        }
    }

    pub fn equals(field: &str, value: serde_json::Value) -> Self {
        Self::new(field, "equals", value)
    }

    pub fn not_equals(field: &str, value: serde_json::Value) -> Self {
        Self::new(field, "not_equals", value)
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, "contains", serde_json::Value::String(value.to_string()))
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, "greater_than", serde_json::json!(value))
    }

    pub fn is_not_null(field: &str) -> Self {
        Self::new(field, "is_not_null", serde_json::Value::Null)
    }

    /// Evaluate this condition against a JSON context.
    ///
    /// Unknown operators and missing fields evaluate to false (except the
    /// null checks), so a malformed predicate can never fire a branch.
    pub fn evaluate(&self, context: &serde_json::Value) -> bool {
        let actual = lookup(context, &self.field);

        match self.operator.as_str() {
            "is_null" => actual.is_none() || actual == Some(&serde_json::Value::Null),
            "is_not_null" => matches!(actual, Some(v) if !v.is_null()),
            "equals" => actual == Some(&self.value),
            "not_equals" => actual != Some(&self.value),
            "contains" => match (actual.and_then(|v| v.as_str()), self.value.as_str()) {
                (Some(haystack), Some(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            "starts_with" => match (actual.and_then(|v| v.as_str()), self.value.as_str()) {
                (Some(s), Some(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            "ends_with" => match (actual.and_then(|v| v.as_str()), self.value.as_str()) {
                (Some(s), Some(suffix)) => s.ends_with(suffix),
                _ => false,
            },
            "greater_than" => match (actual.and_then(|v| v.as_f64()), self.value.as_f64()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            "less_than" => match (actual.and_then(|v| v.as_f64()), self.value.as_f64()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            "in" => match (actual, self.value.as_array()) {
                (Some(a), Some(list)) => list.contains(a),
                _ => false,
            },
            _ => false,
        }
    }
}

impl ConditionGroup {
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self {
            logic: "AND".to_string(),
            conditions,
            groups: Vec::new(),
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self {
            logic: "OR".to_string(),
            conditions,
            groups: Vec::new(),
        }
    }

    pub fn evaluate(&self, context: &serde_json::Value) -> bool {
        let conditions = self.conditions.iter().map(|c| c.evaluate(context));
        let groups = self.groups.iter().map(|g| g.evaluate(context));
        let mut results = conditions.chain(groups);

        if self.logic.eq_ignore_ascii_case("OR") {
            results.any(|r| r)
        } else {
            // AND is the default; an empty group is vacuously true
            results.all(|r| r)
        }
    }
}

/// Dot-path lookup into a JSON value.
fn lookup<'a>(context: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Where the instance goes after a branch decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BranchTarget {
    /// Proceed to the next task in display order.
    Continue,
    /// Jump forward to a specific task; tasks in between are skipped.
    GoTo { task_id: Uuid },
    /// Skip the next `count` tasks.
    Skip { count: u32 },
}

impl Default for BranchTarget {
    fn default() -> Self {
        Self::Continue
    }
}

/// A task's `branch_condition`: a predicate over the completed execution's
/// context, plus the target to follow on each outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCondition {
    #[serde(flatten)]
    pub condition: Condition,
    #[serde(default)]
    pub on_match: BranchTarget,
    #[serde(default)]
    pub otherwise: BranchTarget,
}

impl BranchCondition {
    /// Pick the branch target given the completed task's context.
    pub fn decide(&self, context: &serde_json::Value) -> &BranchTarget {
        if self.condition.evaluate(context) {
            &self.on_match
        } else {
            &self.otherwise
        }
    }
}
