//! Rewrite-rule engine
//!
//! Between capture and forward, each message half runs through the enabled
//! rules for its stage in descending priority order. A matching rule mutates
//! the draft in place; the first `block` action terminates evaluation and the
//! proxy answers 403 without forwarding.

use regex::Regex;
use webintercept_core::model::{ActionType, HeaderList, MatchType, Rule, RuleScope};
use webintercept_core::Result;

/// Mutable request half while rules run
#[derive(Debug, Clone)]
pub struct RequestDraft {
    pub method: String,
    pub url: String,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

/// Mutable response half while rules run
#[derive(Debug, Clone)]
pub struct ResponseDraft {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

/// What the rule pass decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Forward the (possibly mutated) message
    Continue { modified: bool },
    /// A `block` rule fired; never forward
    Blocked,
}

/// Stateless rule evaluator
pub struct RuleEngine;

impl RuleEngine {
    /// Run the request-stage rules over a draft
    pub fn apply_request(rules: &[Rule], draft: &mut RequestDraft) -> Result<RuleOutcome> {
        let mut modified = false;
        for rule in ordered(rules, RuleScope::covers_request) {
            if !Self::request_matches(rule, draft)? {
                continue;
            }
            match rule.action_type {
                ActionType::Block => return Ok(RuleOutcome::Blocked),
                ActionType::AddHeader => {
                    if let (Some(name), Some(value)) = (&rule.action_target, &rule.action_value) {
                        draft.headers.append(name.clone(), value.clone());
                        modified = true;
                    }
                }
                ActionType::RemoveHeader => {
                    if let Some(name) = &rule.action_target {
                        modified |= draft.headers.remove_all(name) > 0;
                    }
                }
                ActionType::Replace => {
                    modified |= Self::replace_in_request(rule, draft)?;
                }
            }
        }
        Ok(RuleOutcome::Continue { modified })
    }

    /// Run the response-stage rules over a draft
    pub fn apply_response(rules: &[Rule], draft: &mut ResponseDraft) -> Result<RuleOutcome> {
        let mut modified = false;
        for rule in ordered(rules, RuleScope::covers_response) {
            if !Self::response_matches(rule, draft)? {
                continue;
            }
            match rule.action_type {
                ActionType::Block => return Ok(RuleOutcome::Blocked),
                ActionType::AddHeader => {
                    if let (Some(name), Some(value)) = (&rule.action_target, &rule.action_value) {
                        draft.headers.append(name.clone(), value.clone());
                        modified = true;
                    }
                }
                ActionType::RemoveHeader => {
                    if let Some(name) = &rule.action_target {
                        modified |= draft.headers.remove_all(name) > 0;
                    }
                }
                ActionType::Replace => {
                    let value = rule.action_value.clone().unwrap_or_default();
                    if rule.match_type == MatchType::Body {
                        let body = String::from_utf8_lossy(&draft.body).into_owned();
                        let rewritten = Self::substitute(rule, &body, &value)?;
                        if rewritten != body {
                            draft.body = rewritten.into_bytes();
                            modified = true;
                        }
                    } else {
                        modified |= Self::replace_in_headers(rule, &mut draft.headers, &value)?;
                    }
                }
            }
        }
        Ok(RuleOutcome::Continue { modified })
    }

    fn request_matches(rule: &Rule, draft: &RequestDraft) -> Result<bool> {
        let matched = match rule.match_type {
            MatchType::Url => Self::pattern_matches(rule, &draft.url)?,
            MatchType::Method => Self::pattern_matches(rule, &draft.method)?,
            MatchType::Body => {
                Self::pattern_matches(rule, &String::from_utf8_lossy(&draft.body))?
            }
            MatchType::Header => {
                let mut any = false;
                for (name, value) in draft.headers.iter() {
                    if Self::pattern_matches(rule, name)? || Self::pattern_matches(rule, value)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        };
        Ok(matched)
    }

    fn response_matches(rule: &Rule, draft: &ResponseDraft) -> Result<bool> {
        let matched = match rule.match_type {
            // URL and method predicates have no response-side field to bite on.
            MatchType::Url | MatchType::Method => false,
            MatchType::Body => {
                Self::pattern_matches(rule, &String::from_utf8_lossy(&draft.body))?
            }
            MatchType::Header => {
                let mut any = false;
                for (name, value) in draft.headers.iter() {
                    if Self::pattern_matches(rule, name)? || Self::pattern_matches(rule, value)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        };
        Ok(matched)
    }

    fn pattern_matches(rule: &Rule, haystack: &str) -> Result<bool> {
        if rule.match_regex {
            Ok(Regex::new(&rule.match_pattern)?.is_match(haystack))
        } else {
            Ok(haystack.contains(&rule.match_pattern))
        }
    }

    /// Replace matches inside `haystack`: regex rules replace every match of
    /// the pattern, literal rules replace every occurrence of the action
    /// target (falling back to the match pattern).
    fn substitute(rule: &Rule, haystack: &str, replacement: &str) -> Result<String> {
        if rule.match_regex {
            let regex = Regex::new(&rule.match_pattern)?;
            Ok(regex.replace_all(haystack, replacement).into_owned())
        } else {
            let needle = rule.action_target.as_deref().unwrap_or(&rule.match_pattern);
            Ok(haystack.replace(needle, replacement))
        }
    }

    fn replace_in_request(rule: &Rule, draft: &mut RequestDraft) -> Result<bool> {
        let value = rule.action_value.clone().unwrap_or_default();
        match rule.match_type {
            MatchType::Url => {
                let rewritten = Self::substitute(rule, &draft.url, &value)?;
                if rewritten != draft.url {
                    draft.url = rewritten;
                    return Ok(true);
                }
                Ok(false)
            }
            MatchType::Method => {
                let rewritten = Self::substitute(rule, &draft.method, &value)?;
                if rewritten != draft.method {
                    draft.method = rewritten;
                    return Ok(true);
                }
                Ok(false)
            }
            MatchType::Body => {
                let body = String::from_utf8_lossy(&draft.body).into_owned();
                let rewritten = Self::substitute(rule, &body, &value)?;
                if rewritten != body {
                    draft.body = rewritten.into_bytes();
                    return Ok(true);
                }
                Ok(false)
            }
            MatchType::Header => Self::replace_in_headers(rule, &mut draft.headers, &value),
        }
    }

    fn replace_in_headers(rule: &Rule, headers: &mut HeaderList, value: &str) -> Result<bool> {
        let mut modified = false;
        for (_, header_value) in headers.iter_mut() {
            let rewritten = Self::substitute(rule, header_value, value)?;
            if rewritten != *header_value {
                *header_value = rewritten;
                modified = true;
            }
        }
        Ok(modified)
    }
}

/// Enabled rules for a stage, highest priority first
fn ordered(rules: &[Rule], covers: fn(RuleScope) -> bool) -> Vec<&Rule> {
    let mut stage_rules: Vec<&Rule> =
        rules.iter().filter(|r| r.enabled && covers(r.apply_to)).collect();
    stage_rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    stage_rules
}
