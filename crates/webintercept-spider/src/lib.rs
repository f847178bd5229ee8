//! # webintercept spider
//!
//! The crawl engine: bounded BFS over a deduplicated, repository-backed
//! frontier with robots.txt honouring, include/exclude pattern gates, scope
//! enforcement, and HTML link/title/form extraction.

mod engine;
mod extract;
mod robots;

pub use engine::SpiderManager;
pub use extract::{extract, PageExtract};
pub use robots::RobotsCache;
