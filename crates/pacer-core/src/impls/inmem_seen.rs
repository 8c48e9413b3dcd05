//! InMemorySeenStore - DashMap による重複排除（開発用）

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use url::Url;

use crate::domain::PacerError;
use crate::ports::SeenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeenState {
    Discovered,
    Processed,
}

/// Keys are URLs with the fragment removed.
#[derive(Default)]
pub struct InMemorySeenStore {
    urls: DashMap<String, SeenState>,
}

impl InMemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    fn key(url: &Url) -> String {
        let mut url = url.clone();
        url.set_fragment(None);
        url.into()
    }
}

#[async_trait]
impl SeenStore for InMemorySeenStore {
    async fn mark_discovered(&self, url: &Url) -> Result<bool, PacerError> {
        match self.urls.entry(Self::key(url)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(SeenState::Discovered);
                Ok(true)
            }
        }
    }

    async fn mark_processed(&self, url: &Url) -> Result<bool, PacerError> {
        let previous = self.urls.insert(Self::key(url), SeenState::Processed);
        Ok(previous != Some(SeenState::Processed))
    }

    async fn is_discovered(&self, url: &Url) -> Result<bool, PacerError> {
        Ok(self.urls.contains_key(&Self::key(url)))
    }

    async fn is_processed(&self, url: &Url) -> Result<bool, PacerError> {
        Ok(self
            .urls
            .get(&Self::key(url))
            .is_some_and(|state| *state == SeenState::Processed))
    }
}
