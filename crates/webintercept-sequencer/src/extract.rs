//! Sample extraction recipes
//!
//! Pulls one token out of a captured exchange's response according to the
//! analysis recipe: a named header, a cookie from `Set-Cookie`, the first
//! regex match (or its first capture group) over the body, or a dot-path
//! into a JSON body.

use regex::Regex;
use webintercept_core::model::{Exchange, ExtractionRecipe};
use webintercept_core::{Error, Result};

/// Extract a token sample from an exchange, `None` when absent
pub fn extract_sample(recipe: &ExtractionRecipe, exchange: &Exchange) -> Result<Option<String>> {
    let Some(headers) = exchange.response_headers.as_ref() else {
        return Ok(None);
    };

    match recipe {
        ExtractionRecipe::Header(name) => Ok(headers.get(name).map(str::to_string)),
        ExtractionRecipe::Cookie(name) => {
            for cookie_header in headers.get_all("set-cookie") {
                if let Some(value) = cookie_value(cookie_header, name) {
                    return Ok(Some(value));
                }
            }
            Ok(None)
        }
        ExtractionRecipe::BodyRegex(pattern) => {
            let regex = Regex::new(pattern)
                .map_err(|e| Error::invalid_config(format!("bad extraction regex: {e}")))?;
            let Some(body) = exchange.response_body.as_ref() else {
                return Ok(None);
            };
            let body = String::from_utf8_lossy(body);
            Ok(regex.captures(&body).map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            }))
        }
        ExtractionRecipe::BodyJson(path) => {
            let Some(body) = exchange.response_body.as_ref() else {
                return Ok(None);
            };
            let value: serde_json::Value = match serde_json::from_slice(body) {
                Ok(value) => value,
                Err(_) => return Ok(None),
            };
            let mut current = &value;
            for segment in path.split('.') {
                match current.get(segment) {
                    Some(next) => current = next,
                    None => return Ok(None),
                }
            }
            Ok(match current {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
        }
    }
}

/// `value` of `name=value` within one `Set-Cookie` header
fn cookie_value(header: &str, name: &str) -> Option<String> {
    let first_pair = header.split(';').next()?;
    let (cookie_name, value) = first_pair.split_once('=')?;
    if cookie_name.trim().eq_ignore_ascii_case(name) {
        Some(value.trim().to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webintercept_core::model::HeaderList;

    fn exchange_with(headers: Vec<(&str, &str)>, body: Option<&str>) -> Exchange {
        let mut exchange = Exchange::new("GET", "http://t.test/", "t.test", "/", "http");
        let mut list = HeaderList::new();
        for (name, value) in headers {
            list.append(name, value);
        }
        exchange.response_headers = Some(list);
        exchange.response_status = Some(200);
        exchange.response_body = body.map(|b| b.as_bytes().to_vec());
        exchange
    }

    #[test]
    fn header_recipe_reads_named_header() {
        let exchange = exchange_with(vec![("X-Session-Token", "abc123")], None);
        let recipe = ExtractionRecipe::Header("x-session-token".to_string());
        assert_eq!(extract_sample(&recipe, &exchange).unwrap(), Some("abc123".to_string()));
    }

    #[test]
    fn cookie_recipe_reads_matching_set_cookie() {
        let exchange = exchange_with(
            vec![
                ("Set-Cookie", "other=zzz; Path=/"),
                ("Set-Cookie", "session=tok_42; HttpOnly"),
            ],
            None,
        );
        let recipe = ExtractionRecipe::Cookie("session".to_string());
        assert_eq!(extract_sample(&recipe, &exchange).unwrap(), Some("tok_42".to_string()));

        let missing = ExtractionRecipe::Cookie("absent".to_string());
        assert_eq!(extract_sample(&missing, &exchange).unwrap(), None);
    }

    #[test]
    fn body_regex_prefers_first_capture_group() {
        let exchange = exchange_with(vec![], Some("token=\"sek_99\" rest"));
        let recipe = ExtractionRecipe::BodyRegex("token=\"([a-z0-9_]+)\"".to_string());
        assert_eq!(extract_sample(&recipe, &exchange).unwrap(), Some("sek_99".to_string()));

        let bad = ExtractionRecipe::BodyRegex("(".to_string());
        assert!(extract_sample(&bad, &exchange).is_err());
    }

    #[test]
    fn body_json_walks_dot_paths() {
        let exchange = exchange_with(vec![], Some(r#"{"session":{"token":"jt_7","ttl":60}}"#));
        let recipe = ExtractionRecipe::BodyJson("session.token".to_string());
        assert_eq!(extract_sample(&recipe, &exchange).unwrap(), Some("jt_7".to_string()));

        let number = ExtractionRecipe::BodyJson("session.ttl".to_string());
        assert_eq!(extract_sample(&number, &exchange).unwrap(), Some("60".to_string()));

        let missing = ExtractionRecipe::BodyJson("session.nope".to_string());
        assert_eq!(extract_sample(&missing, &exchange).unwrap(), None);
    }
}
