//! MapParserRegistry - content type → Parser の表
//!
//! 解決順:
//! 1. 正規化した content type の完全一致（`text/html; charset=utf-8` → `text/html`）
//! 2. `type/*` のワイルドカード
//! 3. default parser（設定されていれば）

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::{Parser, ParserRegistry};

#[derive(Default)]
pub struct MapParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
    fallback: Option<Arc<dyn Parser>>,
}

impl MapParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `parser` for `content_type` (`text/html`, or `text/*`). Last one wins.
    pub fn register(mut self, content_type: &str, parser: Arc<dyn Parser>) -> Self {
        self.parsers.insert(normalize(content_type), parser);
        self
    }

    pub fn with_fallback(mut self, parser: Arc<dyn Parser>) -> Self {
        self.fallback = Some(parser);
        self
    }

    pub fn content_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.parsers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl ParserRegistry for MapParserRegistry {
    fn resolve(&self, content_type: &str) -> Option<Arc<dyn Parser>> {
        let normalized = normalize(content_type);
        if let Some(parser) = self.parsers.get(&normalized) {
            return Some(Arc::clone(parser));
        }
        if let Some((major, _)) = normalized.split_once('/')
            && let Some(parser) = self.parsers.get(&format!("{major}/*"))
        {
            return Some(Arc::clone(parser));
        }
        self.fallback.clone()
    }
}

fn normalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
