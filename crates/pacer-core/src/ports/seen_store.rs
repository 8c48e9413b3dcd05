//! SeenStore port - URL の重複排除
//!
//! scheduler の「外側」で使います（runner が discovery 時と完了時に呼ぶ）。

use async_trait::async_trait;
use url::Url;

use crate::domain::PacerError;

/// SeenStore は discovered / processed の記録を持つ
///
/// `mark_*` は新しく記録した場合に `true` を返します。
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn mark_discovered(&self, url: &Url) -> Result<bool, PacerError>;

    async fn mark_processed(&self, url: &Url) -> Result<bool, PacerError>;

    async fn is_discovered(&self, url: &Url) -> Result<bool, PacerError>;

    async fn is_processed(&self, url: &Url) -> Result<bool, PacerError>;
}
