//! # webintercept proxy
//!
//! The interception core: a dual-mode proxy server that captures plain HTTP
//! and CONNECT traffic, optionally terminates TLS with forged leaf
//! certificates, runs every message through the rewrite-rule engine and the
//! operator intercept queue, forwards upstream, and records each exchange.

mod conn;
mod forward;
mod intercept;
mod rules;
mod server;

pub use forward::{ForwardedResponse, UpstreamClient};
pub use intercept::{InterceptDecision, InterceptRegistry};
pub use rules::{RequestDraft, ResponseDraft, RuleEngine, RuleOutcome};
pub use server::{ProxyManager, ProxyStatus};
