//! # webintercept intruder
//!
//! The fuzzing engine: templated requests carry byte-range payload positions,
//! four combinators (sniper, battering ram, pitchfork, cluster bomb) expand
//! payload sets into request streams, and a bounded worker pool fires them
//! with pause/resume/stop control and per-result event delivery.

mod combinator;
mod engine;
mod payloads;

pub use combinator::{apply_combination, total_requests, validate, AppliedRequest, Combinations};
pub use engine::IntruderManager;
pub use payloads::{
    builtin_list, builtin_lists, generate_dates, generate_numbers, BuiltinPayloadList,
};
