//! HTML extraction
//!
//! Synchronous on purpose: the parsed document is not `Send`, so everything
//! the crawl loop needs is pulled into owned values before the next await.

use scraper::{Html, Selector};
use url::Url;

/// What one fetched page contributed
#[derive(Debug, Clone, Default)]
pub struct PageExtract {
    /// Absolute http(s) URLs, fragments stripped, document order
    pub links: Vec<String>,
    pub title: Option<String>,
    pub form_count: u32,
}

/// Extract links, title, and form count from an HTML body fetched at `base`
pub fn extract(html: &str, base: &Url) -> PageExtract {
    let document = Html::parse_document(html);

    let anchor = Selector::parse("a[href]").expect("static selector");
    let form = Selector::parse("form").expect("static selector");
    let title = Selector::parse("title").expect("static selector");

    let mut links = Vec::new();
    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);
        links.push(resolved.to_string());
    }

    let title = document
        .select(&title)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let form_count = document.select(&form).count() as u32;

    PageExtract {
        links,
        title,
        form_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_links_and_strips_fragments() {
        let base = Url::parse("http://site.test/dir/page.html").expect("base");
        let html = r##"
            <html><head><title> Index </title></head><body>
            <a href="/a">abs path</a>
            <a href="b#section">relative with fragment</a>
            <a href="http://other.test/c">external</a>
            <a href="mailto:x@y.test">mail</a>
            <a href="javascript:void(0)">js</a>
            <form action="/post"></form>
            <form></form>
            </body></html>
        "##;

        let extract = extract(html, &base);
        assert_eq!(
            extract.links,
            vec![
                "http://site.test/a",
                "http://site.test/dir/b",
                "http://other.test/c",
            ]
        );
        assert_eq!(extract.title.as_deref(), Some("Index"));
        assert_eq!(extract.form_count, 2);
    }

    #[test]
    fn tolerates_malformed_markup() {
        let base = Url::parse("http://site.test/").expect("base");
        let extract = extract("<a href='/x'><b>unclosed<a href='/y'>", &base);
        assert_eq!(extract.links, vec!["http://site.test/x", "http://site.test/y"]);
        assert!(extract.title.is_none());
    }
}
