//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! frontier / retry buffer / seen store は本番では永続ストアに差し替える前提で、
//! このクレートは in-memory 実装（`impls`）だけを持ちます。

pub mod clock;
pub mod dead_letter;
pub mod fetcher;
pub mod frontier;
pub mod id_generator;
pub mod parser;
pub mod retry_buffer;
pub mod seen_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dead_letter::{DeadLetter, DeadLetterSink};
pub use self::fetcher::{FetchRequest, FetchResult, Fetcher};
pub use self::frontier::Frontier;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::parser::{ParseOutput, Parser, ParserRegistry};
pub use self::retry_buffer::RetryBuffer;
pub use self::seen_store::SeenStore;
