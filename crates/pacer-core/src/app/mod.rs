//! App - アプリケーション層
//!
//! ports / policy / scheduler / routing を組み合わせて crawl を動かします。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング（fail-fast）
//! - **Runner**: scheduler を回す pull loop と worker pool
//! - **RunStats**: 実行中の集計

pub mod builder;
pub mod runner;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::runner::{NO_ROUTE_REASON, Runner, RunnerHandle};
pub use self::status::{RunStats, RunSummary};
