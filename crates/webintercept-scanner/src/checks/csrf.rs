//! CSRF check
//!
//! Parses the page and flags POST forms carrying neither a recognised token
//! field nor a token meta tag. Severity rises when the form touches
//! credentials, payments, or administrative actions.

use crate::check::{check_client, Check, CheckFinding, CheckInfo, Probe};
use async_trait::async_trait;
use scraper::{Html, Selector};
use webintercept_core::model::{Confidence, IssueLocation, Severity};
use webintercept_core::Result;

const CSRF_FIELD_NAMES: &[&str] = &[
    "csrf",
    "csrf_token",
    "csrftoken",
    "csrfmiddlewaretoken",
    "_csrf",
    "_token",
    "authenticity_token",
    "token",
    "xsrf",
    "xsrf_token",
    "_xsrf",
    "anti-csrf-token",
    "anticsrf",
    "__requestverificationtoken",
];

const SENSITIVE_FIELDS: &[&str] = &["password", "email", "delete", "admin", "transfer", "payment"];

/// Flags state-changing forms without CSRF protection
pub struct CsrfCheck {
    client: reqwest::Client,
}

impl CsrfCheck {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: check_client()?,
        })
    }

    /// Synchronous HTML analysis; the parsed document must not cross an await
    fn analyze(probe: &Probe, body: &str) -> Vec<CheckFinding> {
        let document = Html::parse_document(body);
        let form_sel = Selector::parse("form").expect("static selector");
        let hidden_sel = Selector::parse("input[type=hidden]").expect("static selector");
        let field_sel = Selector::parse("input, select, textarea").expect("static selector");
        let meta_sel = Selector::parse("meta[name]").expect("static selector");

        // A page-level token meta tag protects every form on it.
        let page_has_meta_token = document.select(&meta_sel).any(|meta| {
            let name = meta.value().attr("name").unwrap_or("").to_ascii_lowercase();
            CSRF_FIELD_NAMES.iter().any(|token| name.contains(token))
        });

        let mut findings = Vec::new();
        for form in document.select(&form_sel) {
            let method = form.value().attr("method").unwrap_or("get").to_ascii_uppercase();
            if method != "POST" {
                continue;
            }

            let has_token_field = form.select(&hidden_sel).any(|input| {
                let name = input.value().attr("name").unwrap_or("").to_ascii_lowercase();
                CSRF_FIELD_NAMES.iter().any(|token| name.contains(token))
            });

            // A token-bearing attribute on the form element itself (e.g.
            // data-csrf="...") also counts as protection.
            let has_form_attr_token = form.value().attrs().any(|(name, value)| {
                let name = name.to_ascii_lowercase();
                let value = value.to_ascii_lowercase();
                CSRF_FIELD_NAMES
                    .iter()
                    .any(|token| name.contains(token) || value.contains(token))
            });

            if has_token_field || page_has_meta_token || has_form_attr_token {
                continue;
            }

            let field_names: Vec<String> = form
                .select(&field_sel)
                .filter_map(|f| f.value().attr("name"))
                .map(str::to_ascii_lowercase)
                .collect();
            let severity = if field_names
                .iter()
                .any(|name| SENSITIVE_FIELDS.iter().any(|s| name.contains(s)))
            {
                Severity::High
            } else {
                Severity::Medium
            };

            let action = form.value().attr("action").unwrap_or("");
            let form_desc = form
                .value()
                .attr("id")
                .or_else(|| form.value().attr("name"))
                .unwrap_or(if action.is_empty() { "unnamed form" } else { action });

            findings.push(CheckFinding {
                issue_type: "csrf".to_string(),
                severity,
                confidence: Confidence::Firm,
                title: format!(
                    "Form Without CSRF Protection: {}",
                    form_desc.chars().take(50).collect::<String>()
                ),
                description: format!(
                    "A POST form ({form_desc}) does not appear to have CSRF protection. \
                     An attacker could trick users into submitting unintended actions."
                ),
                url: probe.url.clone(),
                method: "POST".to_string(),
                parameter: None,
                location: Some(IssueLocation::Body),
                evidence: Some(format!(
                    "Form action: {action}, Fields: {}",
                    field_names
                        .iter()
                        .take(5)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                payload: None,
                remediation: Some(
                    "Implement CSRF tokens in all state-changing forms. Use the SameSite cookie \
                     attribute. Consider using a CSRF protection library or framework feature."
                        .to_string(),
                ),
                references: vec![
                    "https://owasp.org/www-community/attacks/csrf".to_string(),
                    "https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html".to_string(),
                ],
            });
        }
        findings
    }
}

#[async_trait]
impl Check for CsrfCheck {
    fn info(&self) -> CheckInfo {
        CheckInfo {
            id: "csrf",
            name: "Cross-Site Request Forgery (CSRF)",
            description: "Detects POST forms without CSRF token protection",
            category: "session",
            severity: Severity::Medium,
        }
    }

    async fn run(&self, probe: &Probe) -> Result<Vec<CheckFinding>> {
        let response = match self.client.get(&probe.url).send().await {
            Ok(response) => response,
            Err(_) => return Ok(Vec::new()),
        };

        let csrf_header = response.headers().get("X-CSRF-Token").is_some()
            || response.headers().get("X-XSRF-Token").is_some();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let Ok(body) = response.text().await else {
            return Ok(Vec::new());
        };

        let mut findings = Self::analyze(probe, &body);

        // Cookie-authenticated JSON endpoints without a token header are a
        // weaker, tentative signal.
        if content_type.contains("application/json")
            && probe.headers.contains("cookie")
            && !csrf_header
        {
            findings.push(CheckFinding {
                issue_type: "csrf".to_string(),
                severity: Severity::Medium,
                confidence: Confidence::Tentative,
                title: "API Endpoint May Lack CSRF Protection".to_string(),
                description: "This API endpoint uses cookie-based authentication but may not \
                              have CSRF protection."
                    .to_string(),
                url: probe.url.clone(),
                method: "POST".to_string(),
                parameter: None,
                location: Some(IssueLocation::Header),
                evidence: None,
                payload: None,
                remediation: Some(
                    "Implement CSRF tokens for cookie-authenticated API endpoints. Consider \
                     using token-based authentication (like JWT) in headers."
                        .to_string(),
                ),
                references: vec!["https://owasp.org/www-community/attacks/csrf".to_string()],
            });
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> Probe {
        Probe::get("http://t.test/login")
    }

    #[test]
    fn unprotected_post_form_is_flagged() {
        let html = r#"<form method="post" action="/login">
            <input name="username"><input name="comment">
        </form>"#;
        let findings = CsrfCheck::analyze(&probe(), html);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].confidence, Confidence::Firm);
    }

    #[test]
    fn password_field_upgrades_severity() {
        let html = r#"<form method="POST" id="login-form">
            <input name="username"><input type="password" name="password">
        </form>"#;
        let findings = CsrfCheck::analyze(&probe(), html);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].title.contains("login-form"));
    }

    #[test]
    fn token_field_or_meta_tag_protects_the_form() {
        let with_field = r#"<form method="post">
            <input type="hidden" name="csrf_token" value="x">
            <input name="password">
        </form>"#;
        assert!(CsrfCheck::analyze(&probe(), with_field).is_empty());

        let with_meta = r#"<head><meta name="csrf-token" content="x"></head>
            <form method="post"><input name="password"></form>"#;
        assert!(CsrfCheck::analyze(&probe(), with_meta).is_empty());
    }

    #[test]
    fn form_level_token_attribute_protects_the_form() {
        let with_data_attr = r#"<form method="post" data-csrf="abc123">
            <input name="password">
        </form>"#;
        assert!(CsrfCheck::analyze(&probe(), with_data_attr).is_empty());

        let with_attr_value = r#"<form method="post" data-protection="xsrf_token">
            <input name="password">
        </form>"#;
        assert!(CsrfCheck::analyze(&probe(), with_attr_value).is_empty());
    }

    #[test]
    fn get_forms_are_ignored() {
        let html = r#"<form method="get"><input name="q"></form>"#;
        assert!(CsrfCheck::analyze(&probe(), html).is_empty());
    }
}
