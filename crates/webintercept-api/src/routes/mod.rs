//! Route modules, one per engine surface

pub(crate) mod collections;
pub(crate) mod intruder;
pub(crate) mod proxy;
pub(crate) mod requests;
pub(crate) mod rules;
pub(crate) mod scanner;
pub(crate) mod sequencer;
pub(crate) mod spider;
pub(crate) mod targets;

use serde::Deserialize;
use webintercept_core::model::Page;

/// Common `?limit=&offset=` pagination query.
///
/// Listing queries embed `limit`/`offset` directly rather than flattening
/// this struct: query-string deserialisation loses integer type hints under
/// `#[serde(flatten)]`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

pub(crate) fn default_limit() -> usize {
    100
}

pub(crate) fn clamp_page(limit: usize, offset: usize) -> Page {
    Page::new(limit.clamp(1, 1000), offset)
}

impl From<Pagination> for Page {
    fn from(p: Pagination) -> Self {
        clamp_page(p.limit, p.offset)
    }
}
