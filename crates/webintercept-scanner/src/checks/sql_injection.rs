//! SQL injection check
//!
//! Appends known payloads to each query parameter and scans responses for
//! database error signatures. Time-based payloads are fired too, but scoring
//! stays signature-based.

use crate::check::{check_client, query_params, with_param, Check, CheckFinding, CheckInfo, Probe};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use url::Url;
use webintercept_core::model::{Confidence, IssueLocation, Severity};
use webintercept_core::Result;

const PAYLOADS: &[&str] = &[
    "'",
    "\"",
    "' OR '1'='1",
    "\" OR \"1\"=\"1",
    "' OR 1=1--",
    "\" OR 1=1--",
    "1' ORDER BY 1--",
    "1 UNION SELECT NULL--",
    "'; DROP TABLE users--",
    "1; SELECT * FROM users",
    "' AND '1'='1",
    "' AND SLEEP(5)--",
    "1' AND (SELECT COUNT(*) FROM users) > 0--",
];

const ERROR_SIGNATURES: &[&str] = &[
    r"SQL syntax.*MySQL",
    r"Warning.*mysql_",
    r"MySqlException",
    r"valid MySQL result",
    r"check the manual that corresponds to your MySQL",
    r"MySqlClient\.",
    r"PostgreSQL.*ERROR",
    r"Warning.*\Wpg_",
    r"valid PostgreSQL result",
    r"Npgsql\.",
    r"PG::SyntaxError:",
    r"org\.postgresql\.util\.PSQLException",
    r"ERROR:\s+syntax error at or near",
    r"Driver.*SQL[\-\_\ ]*Server",
    r"OLE DB.*SQL Server",
    r"\bSQL Server[^<\x22]+Driver",
    r"Warning.*mssql_",
    r"System\.Data\.SqlClient\.",
    r"Microsoft SQL Native Client error '[0-9a-fA-F]{8}",
    r"\[SQL Server\]",
    r"ODBC SQL Server Driver",
    r"ODBC Driver \d+ for SQL Server",
    r"SQLServer JDBC Driver",
    r"com\.microsoft\.sqlserver\.jdbc\.SQLServerException",
    r"ORA-[0-9][0-9][0-9][0-9]",
    r"Oracle error",
    r"Oracle.*Driver",
    r"Warning.*\Woci_",
    r"Warning.*\Wora_",
    r"oracle\.jdbc\.driver",
    r"quoted string not properly terminated",
    r"SQLite/JDBCDriver",
    r"SQLite\.Exception",
    r"System\.Data\.SQLite\.SQLiteException",
    r"Warning.*sqlite_",
    r"Warning.*SQLite3::",
    r"\[SQLITE_ERROR\]",
    r"SQLITE_CONSTRAINT",
    r"sqlite3\.OperationalError:",
    r"sqlite3\.ProgrammingError:",
];

static ERROR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ERROR_SIGNATURES
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
});

/// Detects SQL injection through database error signatures
pub struct SqlInjectionCheck {
    client: reqwest::Client,
}

impl SqlInjectionCheck {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: check_client()?,
        })
    }

    fn first_signature(body: &str) -> Option<String> {
        ERROR_PATTERNS
            .iter()
            .find_map(|p| p.find(body))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait]
impl Check for SqlInjectionCheck {
    fn info(&self) -> CheckInfo {
        CheckInfo {
            id: "sql_injection",
            name: "SQL Injection",
            description: "Injects SQL payloads into query parameters and scans responses for database error signatures",
            category: "injection",
            severity: Severity::High,
        }
    }

    async fn run(&self, probe: &Probe) -> Result<Vec<CheckFinding>> {
        let url = Url::parse(&probe.url)?;
        let params = query_params(&url);
        let mut findings = Vec::new();

        'params: for (name, original) in params {
            for payload in PAYLOADS {
                let test_url = with_param(&url, &name, &format!("{original}{payload}"));
                let Ok(response) = self.client.get(test_url.as_str()).send().await else {
                    continue;
                };
                let Ok(body) = response.text().await else {
                    continue;
                };

                if let Some(evidence) = Self::first_signature(&body) {
                    findings.push(CheckFinding {
                        issue_type: "sql_injection".to_string(),
                        severity: Severity::High,
                        confidence: Confidence::Firm,
                        title: format!("SQL Injection in '{name}' parameter"),
                        description: format!(
                            "The parameter '{name}' appears to be vulnerable to SQL injection. \
                             A SQL error was returned when injecting the payload."
                        ),
                        url: probe.url.clone(),
                        method: probe.method.clone(),
                        parameter: Some(name.clone()),
                        location: Some(IssueLocation::Query),
                        evidence: Some(evidence),
                        payload: Some(payload.to_string()),
                        remediation: Some(
                            "Use parameterized queries (prepared statements) instead of string \
                             concatenation. Validate and sanitize all user inputs."
                                .to_string(),
                        ),
                        references: vec![
                            "https://owasp.org/www-community/attacks/SQL_Injection".to_string(),
                            "https://cheatsheetseries.owasp.org/cheatsheets/SQL_Injection_Prevention_Cheat_Sheet.html".to_string(),
                        ],
                    });
                    // One finding per parameter is enough.
                    continue 'params;
                }
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_signature_matches() {
        let body = "You have an error in your SQL syntax; check the manual that corresponds \
                    to your MySQL server";
        assert!(SqlInjectionCheck::first_signature(body).is_some());
    }

    #[test]
    fn oracle_and_sqlite_signatures_match() {
        assert!(SqlInjectionCheck::first_signature("ORA-01756: quoted string").is_some());
        assert!(SqlInjectionCheck::first_signature("sqlite3.OperationalError: near").is_some());
        assert!(SqlInjectionCheck::first_signature("a perfectly healthy page").is_none());
    }
}
