//! # webintercept sequencer
//!
//! Session-token randomness analysis: Shannon-entropy, pattern, and affix
//! statistics over collected token samples, plus the extraction recipes that
//! pull samples out of captured traffic. The statistics are pure functions;
//! the manager owns the collect → analyze → reset lifecycle.

mod analyzer;
mod extract;
mod manager;

pub use analyzer::{
    analyze_tokens, common_affixes, entropy_rating, has_repeated_pattern, has_sequential_pattern,
    shannon_entropy, AffixEnd,
};
pub use extract::extract_sample;
pub use manager::SequencerManager;
