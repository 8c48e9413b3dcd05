//! JsonLinkParser - JSON ページ用の parser
//!
//! `{"links": [...], "items": [...]}` 形式の body を読みます。
//! links は相対 URL でもよく、ページの URL を基準に解決されます。

use serde::Deserialize;

use crate::domain::PacerError;
use crate::ports::{FetchResult, ParseOutput, Parser};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonPage {
    links: Vec<String>,
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinkParser;

impl Parser for JsonLinkParser {
    fn parse(&self, page: &FetchResult) -> Result<ParseOutput, PacerError> {
        let doc: JsonPage = serde_json::from_slice(&page.body)
            .map_err(|e| PacerError::Parse(format!("{}: {e}", page.url)))?;

        let links = doc
            .links
            .iter()
            .map(|href| {
                page.url
                    .join(href)
                    .map_err(|e| PacerError::Parse(format!("bad link '{href}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParseOutput {
            links,
            items: doc.items,
        })
    }
}
