//! Built-in vulnerability checks

mod csrf;
mod headers;
mod information;
mod sql_injection;
mod xss;

pub use csrf::CsrfCheck;
pub use headers::SecurityHeadersCheck;
pub use information::InformationDisclosureCheck;
pub use sql_injection::SqlInjectionCheck;
pub use xss::XssCheck;

use crate::check::Check;
use std::sync::Arc;
use webintercept_core::Result;

/// Instantiate every built-in check. The set is closed at compile time; new
/// checks are added here.
pub fn all_checks() -> Result<Vec<Arc<dyn Check>>> {
    Ok(vec![
        Arc::new(SqlInjectionCheck::new()?),
        Arc::new(XssCheck::new()?),
        Arc::new(SecurityHeadersCheck::new()?),
        Arc::new(InformationDisclosureCheck::new()?),
        Arc::new(CsrfCheck::new()?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_five_checks_with_stable_ids() {
        let checks = all_checks().expect("checks");
        let ids: Vec<&str> = checks.iter().map(|c| c.info().id).collect();
        assert_eq!(
            ids,
            vec!["sql_injection", "xss", "security_headers", "information_disclosure", "csrf"]
        );
    }
}
