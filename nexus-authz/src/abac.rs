//! ABAC condition DSL (spec §4.2): a small pure, total AST evaluated against
//! a variable environment built from the request context. Missing variables
//! resolve to `Value::Undefined`, which never satisfies `eq`.

use chrono::{DateTime, Utc};
use nexus_core::ids::PolicyId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    List(Vec<Value>),
    #[serde(skip)]
    Undefined,
}

impl Value {
    fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }
}

/// Variable environment: dotted paths like `principal.role`, `resource.labels.sensitivity`.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        self.vars.insert(path.into(), value);
        self
    }

    pub fn get(&self, path: &str) -> Value {
        self.vars.get(path).cloned().unwrap_or(Value::Undefined)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Var { name: String },
    Eq { left: Box<Condition>, right: Box<Condition> },
    Ne { left: Box<Condition>, right: Box<Condition> },
    In { needle: Box<Condition>, haystack: Box<Condition> },
    Gt { left: Box<Condition>, right: Box<Condition> },
    Lt { left: Box<Condition>, right: Box<Condition> },
    All { clauses: Vec<Condition> },
    Any { clauses: Vec<Condition> },
    Not { clause: Box<Condition> },
    TimeBetween { var: Box<Condition>, start: Box<Condition>, end: Box<Condition> },
    Literal { value: Value },
}

impl Condition {
    pub fn literal(value: Value) -> Self {
        Condition::Literal { value }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Condition::Var { name: name.into() }
    }

    fn eval_value(&self, env: &Env) -> Value {
        match self {
            Condition::Var { name } => env.get(name),
            Condition::Literal { value } => value.clone(),
            _ => Value::Bool(self.eval_bool(env)),
        }
    }

    /// Pure and total: every branch returns a bool, never panics.
    pub fn eval_bool(&self, env: &Env) -> bool {
        match self {
            Condition::Var { name } => !matches!(env.get(name), Value::Undefined),
            Condition::Literal { value } => matches!(value, Value::Bool(true)),
            Condition::Eq { left, right } => left.eval_value(env) == right.eval_value(env) && !matches!(left.eval_value(env), Value::Undefined),
            Condition::Ne { left, right } => !(left.eval_value(env) == right.eval_value(env)) && !matches!(left.eval_value(env), Value::Undefined),
            Condition::In { needle, haystack } => match haystack.eval_value(env) {
                Value::List(items) => items.contains(&needle.eval_value(env)),
                _ => false,
            },
            Condition::Gt { left, right } => match (left.eval_value(env).as_num(), right.eval_value(env).as_num()) {
                (Some(l), Some(r)) => l > r,
                _ => false,
            },
            Condition::Lt { left, right } => match (left.eval_value(env).as_num(), right.eval_value(env).as_num()) {
                (Some(l), Some(r)) => l < r,
                _ => false,
            },
            Condition::All { clauses } => clauses.iter().all(|c| c.eval_bool(env)),
            Condition::Any { clauses } => clauses.iter().any(|c| c.eval_bool(env)),
            Condition::Not { clause } => !clause.eval_bool(env),
            Condition::TimeBetween { var, start, end } => {
                let (Value::Str(v), Value::Str(s), Value::Str(e)) = (var.eval_value(env), start.eval_value(env), end.eval_value(env)) else {
                    return false;
                };
                let Ok(v) = DateTime::parse_from_rfc3339(&v) else { return false };
                let Ok(s) = DateTime::parse_from_rfc3339(&s) else { return false };
                let Ok(e) = DateTime::parse_from_rfc3339(&e) else { return false };
                v >= s && v <= e
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub priority: i32,
    pub enabled: bool,
    pub effect: Effect,
    pub resource_type: String,
    pub action: String,
    pub condition: Condition,
}

/// Evaluates all enabled, matching policies in priority order (higher first,
/// ties broken by id ascending): any `deny` wins; otherwise an explicit
/// `allow` is required. `default_deny` governs the no-match outcome.
pub fn evaluate(policies: &[Policy], resource_type: &str, action: &str, env: &Env, default_deny: bool) -> bool {
    let mut matching: Vec<&Policy> = policies
        .iter()
        .filter(|p| p.enabled && p.resource_type == resource_type && p.action == action)
        .collect();
    matching.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.as_str().cmp(b.id.as_str())));

    let mut saw_allow = false;
    for policy in matching {
        if !policy.condition.eval_bool(env) {
            continue;
        }
        match policy.effect {
            Effect::Deny => return false,
            Effect::Allow => saw_allow = true,
        }
    }
    if saw_allow {
        true
    } else {
        !default_deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(role: &str, sensitivity: &str) -> Env {
        let mut env = Env::new();
        env.set("principal.role", Value::Str(role.into()));
        env.set("resource.labels.sensitivity", Value::Str(sensitivity.into()));
        env
    }

    #[test]
    fn deny_wins_over_allow_at_same_priority_tie_break_by_id() {
        let deny = Policy {
            id: PolicyId::new("p-deny"),
            priority: 200,
            enabled: true,
            effect: Effect::Deny,
            resource_type: "document".into(),
            action: "read".into(),
            condition: Condition::Eq {
                left: Box::new(Condition::var("resource.labels.sensitivity")),
                right: Box::new(Condition::literal(Value::Str("high".into()))),
            },
        };
        let allow = Policy {
            id: PolicyId::new("p-allow"),
            priority: 100,
            enabled: true,
            effect: Effect::Allow,
            resource_type: "document".into(),
            action: "read".into(),
            condition: Condition::literal(Value::Bool(true)),
        };
        let env = env_with("reader", "high");
        assert!(!evaluate(&[allow, deny], "document", "read", &env, true));
    }

    #[test]
    fn missing_variable_never_matches_eq() {
        let policy = Policy {
            id: PolicyId::new("p1"),
            priority: 1,
            enabled: true,
            effect: Effect::Allow,
            resource_type: "document".into(),
            action: "read".into(),
            condition: Condition::Eq {
                left: Box::new(Condition::var("resource.labels.missing")),
                right: Box::new(Condition::literal(Value::Str("x".into()))),
            },
        };
        let env = Env::new();
        assert!(!evaluate(&[policy], "document", "read", &env, true));
    }

    #[test]
    fn default_deny_false_allows_when_no_policy_matches() {
        let env = Env::new();
        assert!(evaluate(&[], "document", "read", &env, false));
        assert!(!evaluate(&[], "document", "read", &env, true));
    }

    #[test]
    fn time_between_bounds_are_inclusive() {
        let cond = Condition::TimeBetween {
            var: Box::new(Condition::var("request.time")),
            start: Box::new(Condition::literal(Value::Str("2026-01-01T00:00:00Z".into()))),
            end: Box::new(Condition::literal(Value::Str("2026-12-31T23:59:59Z".into()))),
        };
        let mut env = Env::new();
        env.set("request.time", Value::Str("2026-06-01T00:00:00Z".into()));
        assert!(cond.eval_bool(&env));
    }
}
