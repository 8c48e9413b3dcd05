//! Parser port - content type ごとの解析
//!
//! HTML などの実際のパースはクレート外。ここでは契約だけを定義します。

use std::sync::Arc;

use url::Url;

use super::FetchResult;
use crate::domain::PacerError;

/// What a parser extracted from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    /// Outgoing links, already absolute.
    pub links: Vec<Url>,
    /// Extracted records.
    pub items: Vec<serde_json::Value>,
}

pub trait Parser: Send + Sync {
    fn parse(&self, page: &FetchResult) -> Result<ParseOutput, PacerError>;
}

/// ParserRegistry は content type から Parser を引く
pub trait ParserRegistry: Send + Sync {
    fn resolve(&self, content_type: &str) -> Option<Arc<dyn Parser>>;
}
