//! Frontier port - 評価待ちタスクの FIFO キュー
//!
//! 永続化バックエンド（Redis list など）に差し替えられるよう、
//! すべての操作は `Result` を返します。

use crate::domain::{CrawlTask, PacerError};

/// Frontier は admission 評価を待つタスクを保持
///
/// # 並行性
/// - producer は複数（discovery, retry drain）
/// - consumer は scheduler 1 本
pub trait Frontier: Send + Sync {
    /// Enqueue at the tail.
    fn offer(&self, task: CrawlTask) -> Result<(), PacerError>;

    /// Dequeue from the head, `None` when empty.
    fn poll(&self) -> Result<Option<CrawlTask>, PacerError>;

    fn size(&self) -> Result<usize, PacerError>;
}
