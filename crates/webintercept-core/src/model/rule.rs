//! Rewrite rules applied by the proxy between capture and forward

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which message field a rule's predicate inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Url,
    Header,
    Body,
    Method,
}

/// What a matching rule does to the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Replace `action_target` occurrences with `action_value` in the matched field
    Replace,
    /// Append a header `action_target: action_value`
    AddHeader,
    /// Drop all headers named `action_target`
    RemoveHeader,
    /// Synthesise a 403 and never forward
    Block,
}

/// Which half of the exchange a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Request,
    Response,
    Both,
}

impl RuleScope {
    /// True when the scope covers the request half
    pub fn covers_request(self) -> bool {
        matches!(self, Self::Request | Self::Both)
    }

    /// True when the scope covers the response half
    pub fn covers_response(self) -> bool {
        matches!(self, Self::Response | Self::Both)
    }
}

/// A rewrite directive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    /// Higher priority fires first
    pub priority: i32,

    pub match_type: MatchType,
    /// Literal substring or regular expression, per `match_regex`
    pub match_pattern: String,
    pub match_regex: bool,

    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_value: Option<String>,

    pub apply_to: RuleScope,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Create an enabled rule with the given predicate and action
    pub fn new(
        name: impl Into<String>,
        match_type: MatchType,
        match_pattern: impl Into<String>,
        action_type: ActionType,
        apply_to: RuleScope,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: true,
            priority: 0,
            match_type,
            match_pattern: match_pattern.into(),
            match_regex: false,
            action_type,
            action_target: None,
            action_value: None,
            apply_to,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_coverage() {
        assert!(RuleScope::Both.covers_request());
        assert!(RuleScope::Both.covers_response());
        assert!(RuleScope::Request.covers_request());
        assert!(!RuleScope::Request.covers_response());
        assert!(!RuleScope::Response.covers_request());
    }

    #[test]
    fn serialises_snake_case() {
        let rule = Rule::new(
            "block tracker",
            MatchType::Url,
            "tracker.test",
            ActionType::Block,
            RuleScope::Request,
        );
        let json = serde_json::to_string(&rule).expect("serialise");
        assert!(json.contains("\"match_type\":\"url\""));
        assert!(json.contains("\"action_type\":\"block\""));
        assert!(json.contains("\"apply_to\":\"request\""));
    }
}
