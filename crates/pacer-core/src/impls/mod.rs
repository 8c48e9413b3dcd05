//! Impls - ports の in-memory 実装
//!
//! # 含まれる実装
//! - **InMemoryFrontier**: SegQueue ベースの FIFO
//! - **InMemoryRetryBuffer**: `(not_before, seq)` の min-heap
//! - **InMemorySeenStore**: DashMap ベースの重複排除
//! - **InMemoryDeadLetters**: dead letter の保持
//! - **MapParserRegistry**: content type → Parser
//! - **JsonLinkParser**: `{"links": [...]}` 形式のページ用 parser
//!
//! 永続化バックエンド（Redis, PostgreSQL など）は別クレートで ports を実装する想定です。

pub mod dead_letters;
pub mod inmem_frontier;
pub mod inmem_retry_buffer;
pub mod inmem_seen;
pub mod json_links;
pub mod parser_registry;

pub use self::dead_letters::InMemoryDeadLetters;
pub use self::inmem_frontier::InMemoryFrontier;
pub use self::inmem_retry_buffer::{InMemoryRetryBuffer, PendingRetry};
pub use self::inmem_seen::InMemorySeenStore;
pub use self::json_links::JsonLinkParser;
pub use self::parser_registry::MapParserRegistry;
