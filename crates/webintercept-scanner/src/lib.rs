//! # webintercept scanner
//!
//! The active vulnerability scanner: a closed set of independent checks
//! (SQL injection, reflected XSS, security headers, information disclosure,
//! CSRF) driven by an orchestrator over URLs derived from captured traffic, a
//! target's site map, or an explicit list.

mod check;
mod checks;
mod engine;

pub use check::{Check, CheckFinding, CheckInfo, Probe};
pub use checks::{
    all_checks, CsrfCheck, InformationDisclosureCheck, SecurityHeadersCheck, SqlInjectionCheck,
    XssCheck,
};
pub use engine::ScannerManager;
