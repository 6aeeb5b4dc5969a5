//! Pages of a multi-stream read and the store that owns them.

use tracing::debug;

use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::types::{ContinuationToken, Row};

/// One page of rows, either materialized or evicted.
///
/// A page can only be evicted if it knows how to fetch itself again, so
/// collectibility is exactly "has a continuation token".
#[derive(Debug)]
pub struct Page {
    number: usize,
    payload: Option<Vec<Row>>,
    token: Option<ContinuationToken>,
}

impl Page {
    /// Create a materialized page.
    pub fn new(number: usize, payload: Vec<Row>, token: Option<ContinuationToken>) -> Self {
        Self {
            number,
            payload: Some(payload),
            token,
        }
    }

    /// Position of this page in the response.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Rows of the page, `None` while evicted.
    pub fn payload(&self) -> Option<&[Row]> {
        self.payload.as_deref()
    }

    /// Token that fetches exactly this page.
    pub fn token(&self) -> Option<&ContinuationToken> {
        self.token.as_ref()
    }

    /// Returns true if the page may be evicted.
    pub fn is_collectible(&self) -> bool {
        self.token.is_some()
    }

    /// Returns true if the payload is in memory.
    pub fn is_active(&self) -> bool {
        self.payload.is_some()
    }

    /// Drop the payload.
    ///
    /// Callers decide whether anyone still reads the page; this only refuses
    /// pages that could never be reconstructed.
    pub fn evict(&mut self) -> Result<()> {
        if !self.is_collectible() {
            return Err(Error::NotCollectible { page: self.number });
        }
        self.payload = None;
        debug!(page = self.number, "evicted page");
        Ok(())
    }

    /// Fetch the payload again from the page's token.
    ///
    /// Fetch errors are returned unchanged and leave the page evicted.
    pub async fn reconstruct<F: PageFetcher>(&mut self, fetcher: &F) -> Result<()> {
        let token = self
            .token
            .as_ref()
            .ok_or(Error::NotCollectible { page: self.number })?;
        let data = fetcher.fetch_page(token).await?;
        debug!(page = self.number, rows = data.data.len(), "reconstructed page");
        self.payload = Some(data.data);
        Ok(())
    }
}

/// Growable sequence of pages. Pages are never removed, only emptied.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: Vec<Page>,
}

impl PageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a materialized page and return its number.
    pub fn push(&mut self, payload: Vec<Row>, token: Option<ContinuationToken>) -> usize {
        let number = self.pages.len();
        self.pages.push(Page::new(number, payload, token));
        number
    }

    /// Get a page by number.
    pub fn get(&self, number: usize) -> Option<&Page> {
        self.pages.get(number)
    }

    /// Get a page mutably by number.
    pub fn get_mut(&mut self, number: usize) -> Option<&mut Page> {
        self.pages.get_mut(number)
    }

    /// Number of known pages, evicted or not.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true if no page was ever stored.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of pages whose payload is in memory.
    pub fn materialized(&self) -> usize {
        self.pages.iter().filter(|p| p.is_active()).count()
    }

    /// Pages in ascending page order.
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    /// Pages in ascending page order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.pages.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PageData, StreamId};
    use crate::value::Value;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(v: i64) -> Row {
        let mut values = BTreeMap::new();
        values.insert(StreamId::from(1), Value::Long(v));
        Row {
            timestamp: chrono::DateTime::parse_from_rfc3339("2014-01-01T00:00:00Z").unwrap(),
            values,
        }
    }

    struct EchoFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl PageFetcher for EchoFetcher {
        async fn fetch_page(&self, token: &ContinuationToken) -> Result<PageData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Status { status: 503, body: "unavailable".to_string() });
            }
            let v = token.as_value()["value"].as_i64().unwrap_or_default();
            Ok(PageData::new(vec![row(v)], None))
        }
    }

    #[test]
    fn test_page_without_token_is_pinned() {
        let mut page = Page::new(0, vec![row(1)], None);
        assert!(!page.is_collectible());
        assert!(matches!(page.evict(), Err(Error::NotCollectible { page: 0 })));
        assert!(page.is_active());
    }

    #[test]
    fn test_evict_drops_payload() {
        let mut page = Page::new(3, vec![row(1)], Some(ContinuationToken::new(json!({}))));
        page.evict().unwrap();
        assert!(!page.is_active());
        assert!(page.payload().is_none());
    }

    #[tokio::test]
    async fn test_reconstruct_refetches_with_own_token() {
        let fetcher = EchoFetcher { calls: AtomicUsize::new(0), fail: false };
        let token = ContinuationToken::new(json!({"value": 42}));
        let mut page = Page::new(1, vec![row(0)], Some(token));
        page.evict().unwrap();

        page.reconstruct(&fetcher).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(page.payload().unwrap()[0].get(&StreamId::from(1)), Some(&Value::Long(42)));
    }

    #[tokio::test]
    async fn test_reconstruct_propagates_fetch_errors() {
        let fetcher = EchoFetcher { calls: AtomicUsize::new(0), fail: true };
        let mut page = Page::new(1, vec![row(0)], Some(ContinuationToken::new(json!({}))));
        page.evict().unwrap();

        let err = page.reconstruct(&fetcher).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 503, .. }));
        assert!(!page.is_active());
    }

    #[test]
    fn test_store_numbers_pages_in_order() {
        let mut store = PageStore::new();
        assert!(store.is_empty());
        assert_eq!(store.push(vec![row(1)], None), 0);
        assert_eq!(store.push(vec![row(2)], Some(ContinuationToken::new(json!(1)))), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.materialized(), 2);

        store.get_mut(1).unwrap().evict().unwrap();
        assert_eq!(store.materialized(), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.iter().map(Page::number).collect::<Vec<_>>(), vec![0, 1]);
    }
}
