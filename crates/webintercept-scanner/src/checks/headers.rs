//! Security header check
//!
//! One GET; the response headers are compared against a fixed table of
//! expected protections, known disclosure headers, and per-cookie flags.

use crate::check::{check_client, Check, CheckFinding, CheckInfo, Probe};
use async_trait::async_trait;
use webintercept_core::model::{Confidence, IssueLocation, Severity};
use webintercept_core::Result;

struct RequiredHeader {
    header: &'static str,
    name: &'static str,
    severity: Severity,
    description: &'static str,
    remediation: &'static str,
}

const REQUIRED: &[RequiredHeader] = &[
    RequiredHeader {
        header: "Strict-Transport-Security",
        name: "HTTP Strict Transport Security (HSTS)",
        severity: Severity::Medium,
        description: "HSTS header is missing. This header enforces secure HTTPS connections.",
        remediation: "Add 'Strict-Transport-Security: max-age=31536000; includeSubDomains' header.",
    },
    RequiredHeader {
        header: "X-Content-Type-Options",
        name: "X-Content-Type-Options",
        severity: Severity::Low,
        description: "X-Content-Type-Options header is missing. This prevents MIME type sniffing.",
        remediation: "Add 'X-Content-Type-Options: nosniff' header.",
    },
    RequiredHeader {
        header: "X-Frame-Options",
        name: "X-Frame-Options",
        severity: Severity::Medium,
        description: "X-Frame-Options header is missing. This prevents clickjacking attacks.",
        remediation: "Add 'X-Frame-Options: DENY' or 'X-Frame-Options: SAMEORIGIN' header.",
    },
    RequiredHeader {
        header: "Content-Security-Policy",
        name: "Content Security Policy (CSP)",
        severity: Severity::Medium,
        description: "Content-Security-Policy header is missing. CSP helps prevent XSS and data injection attacks.",
        remediation: "Implement a Content-Security-Policy header appropriate for your application.",
    },
    RequiredHeader {
        header: "X-XSS-Protection",
        name: "X-XSS-Protection",
        severity: Severity::Info,
        description: "X-XSS-Protection header is missing. While deprecated, it provides legacy browser protection.",
        remediation: "Add 'X-XSS-Protection: 1; mode=block' header (or rely on CSP in modern browsers).",
    },
    RequiredHeader {
        header: "Referrer-Policy",
        name: "Referrer-Policy",
        severity: Severity::Low,
        description: "Referrer-Policy header is missing. This controls how much referrer information is shared.",
        remediation: "Add 'Referrer-Policy: strict-origin-when-cross-origin' header.",
    },
    RequiredHeader {
        header: "Permissions-Policy",
        name: "Permissions-Policy",
        severity: Severity::Low,
        description: "Permissions-Policy header is missing. This controls browser features.",
        remediation: "Add a Permissions-Policy header to restrict browser features.",
    },
];

struct DisclosureHeader {
    header: &'static str,
    name: &'static str,
    remediation: &'static str,
}

const DISCLOSURE: &[DisclosureHeader] = &[
    DisclosureHeader {
        header: "Server",
        name: "Server Header Information Disclosure",
        remediation: "Remove or obfuscate the Server header.",
    },
    DisclosureHeader {
        header: "X-Powered-By",
        name: "X-Powered-By Information Disclosure",
        remediation: "Remove the X-Powered-By header.",
    },
    DisclosureHeader {
        header: "X-AspNet-Version",
        name: "ASP.NET Version Disclosure",
        remediation: "Remove the X-AspNet-Version header in web.config.",
    },
];

/// Flags missing protections, disclosure headers, and weak cookies
pub struct SecurityHeadersCheck {
    client: reqwest::Client,
}

impl SecurityHeadersCheck {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: check_client()?,
        })
    }

    fn cookie_findings(url: &str, cookie: &str) -> Vec<CheckFinding> {
        let lower = cookie.to_ascii_lowercase();
        let evidence: String = cookie.chars().take(100).collect();
        let mut findings = Vec::new();

        let mut push = |title: &str, description: &str, severity: Severity, remediation: &str| {
            findings.push(CheckFinding {
                issue_type: "security_headers".to_string(),
                severity,
                confidence: Confidence::Certain,
                title: title.to_string(),
                description: description.to_string(),
                url: url.to_string(),
                method: "GET".to_string(),
                parameter: None,
                location: Some(IssueLocation::Cookie),
                evidence: Some(evidence.clone()),
                payload: None,
                remediation: Some(remediation.to_string()),
                references: Vec::new(),
            });
        };

        if !lower.contains("secure") {
            push(
                "Cookie Missing Secure Flag",
                "A cookie is set without the Secure flag, allowing it to be sent over HTTP.",
                Severity::Medium,
                "Add the Secure flag to all cookies.",
            );
        }
        if !lower.contains("httponly") {
            push(
                "Cookie Missing HttpOnly Flag",
                "A cookie is set without the HttpOnly flag, making it accessible to JavaScript.",
                Severity::Low,
                "Add the HttpOnly flag to cookies that don't need JavaScript access.",
            );
        }
        if !lower.contains("samesite") {
            push(
                "Cookie Missing SameSite Attribute",
                "A cookie is set without the SameSite attribute, which helps prevent CSRF.",
                Severity::Low,
                "Add SameSite=Strict or SameSite=Lax attribute to cookies.",
            );
        }
        findings
    }
}

#[async_trait]
impl Check for SecurityHeadersCheck {
    fn info(&self) -> CheckInfo {
        CheckInfo {
            id: "security_headers",
            name: "Security Headers",
            description: "Checks for missing or misconfigured HTTP security headers",
            category: "configuration",
            severity: Severity::Low,
        }
    }

    async fn run(&self, probe: &Probe) -> Result<Vec<CheckFinding>> {
        let response = match self.client.get(&probe.url).send().await {
            Ok(response) => response,
            Err(_) => return Ok(Vec::new()),
        };
        let headers = response.headers().clone();
        let mut findings = Vec::new();

        for required in REQUIRED {
            if !headers.contains_key(required.header) {
                findings.push(CheckFinding {
                    issue_type: "security_headers".to_string(),
                    severity: required.severity,
                    confidence: Confidence::Certain,
                    title: format!("Missing {} Header", required.name),
                    description: required.description.to_string(),
                    url: probe.url.clone(),
                    method: "GET".to_string(),
                    parameter: None,
                    location: Some(IssueLocation::Header),
                    evidence: None,
                    payload: None,
                    remediation: Some(required.remediation.to_string()),
                    references: vec![
                        "https://owasp.org/www-project-secure-headers/".to_string(),
                        "https://securityheaders.com/".to_string(),
                    ],
                });
            }
        }

        for disclosure in DISCLOSURE {
            if let Some(value) = headers.get(disclosure.header).and_then(|v| v.to_str().ok()) {
                findings.push(CheckFinding {
                    issue_type: "security_headers".to_string(),
                    severity: Severity::Info,
                    confidence: Confidence::Certain,
                    title: disclosure.name.to_string(),
                    description: format!(
                        "The {} header reveals server or technology information. Value: {value}",
                        disclosure.header
                    ),
                    url: probe.url.clone(),
                    method: "GET".to_string(),
                    parameter: None,
                    location: Some(IssueLocation::Header),
                    evidence: Some(format!("{}: {value}", disclosure.header)),
                    payload: None,
                    remediation: Some(disclosure.remediation.to_string()),
                    references: vec![
                        "https://owasp.org/www-project-secure-headers/".to_string(),
                    ],
                });
            }
        }

        for cookie in headers.get_all(reqwest::header::SET_COOKIE) {
            if let Ok(cookie) = cookie.to_str() {
                findings.extend(Self::cookie_findings(&probe.url, cookie));
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_cookie_yields_three_findings() {
        let findings = SecurityHeadersCheck::cookie_findings("http://t.test/", "session=abc");
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().any(|f| f.title.contains("Secure")));
        assert!(findings.iter().any(|f| f.title.contains("HttpOnly")));
        assert!(findings.iter().any(|f| f.title.contains("SameSite")));
    }

    #[test]
    fn hardened_cookie_is_clean() {
        let findings = SecurityHeadersCheck::cookie_findings(
            "http://t.test/",
            "session=abc; Secure; HttpOnly; SameSite=Lax",
        );
        assert!(findings.is_empty());
    }
}
