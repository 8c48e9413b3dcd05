//! pacer-core
//!
//! Admission control and routing for polite crawling.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, decision, errors）
//! - **ports**: 抽象化レイヤー（Frontier, RetryBuffer, SeenStore, Fetcher, ParserRegistry, など）
//! - **impls**: ports の in-memory 実装
//! - **policy**: politeness（per-host / global rps）と retry の方針
//! - **scheduler**: 1 tick ごとの dispatch / defer / park 判断
//! - **routing**: Route 解決と Pipeline 実行
//! - **config**: TOML 設定
//! - **app**: builder, runner, status

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod policy;
pub mod ports;
pub mod routing;
pub mod scheduler;

pub use app::{App, AppBuilder, BuildError, RunSummary};
pub use config::PacerConfig;
pub use domain::{CrawlTask, PacerError, RouteHint};
pub use scheduler::Scheduler;
