//! Cursors over paginated responses.
//!
//! [`ResponseCursor`] fronts a multi-stream read: it owns the stream headers
//! and the shared [`PaginationManager`] and hands out one [`PointStream`] per
//! bound stream. [`PagedCursor`] is the plain single-sequence cursor used for
//! device searches and other flat listings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_stream::stream;
use futures::Stream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::manager::{InstanceId, PaginationManager};
use crate::registry::StreamRegistry;
use crate::selection::Selector;
use crate::stream::PointStream;
use crate::types::{ContinuationToken, PageData, StreamHeader};

/// Entry point to the streams of a multi-stream read response.
///
/// # Example
///
/// ```ignore
/// use tempoiq_client::selection::{device, equals};
///
/// let cursor = client.read(&query).await?;
/// let mut temperature = cursor.bind_stream(&equals(device::key(), "thermostat-1"))?;
/// while let Some(point) = temperature.next().await? {
///     println!("{}: {}", point.timestamp, point.value);
/// }
/// ```
pub struct ResponseCursor<F> {
    registry: StreamRegistry,
    manager: Arc<Mutex<PaginationManager<F>>>,
    next_instance: AtomicU64,
}

impl<F: PageFetcher> ResponseCursor<F> {
    /// Build a cursor from the first page of a read response.
    ///
    /// `origin` is the request that produced `first`; when given, the first
    /// page may be evicted and fetched again like any other page.
    pub fn new(
        mut first: PageData,
        origin: Option<ContinuationToken>,
        fetcher: F,
        config: PaginationConfig,
    ) -> Result<Self> {
        let headers = first.streams.take().ok_or(Error::MissingStreams)?;
        debug!(
            streams = headers.len(),
            page_size = first.data.len(),
            max_pages = config.max_pages,
            "opened read cursor"
        );
        Ok(Self {
            registry: StreamRegistry::new(headers),
            manager: Arc::new(Mutex::new(PaginationManager::new(first, origin, fetcher, config))),
            next_instance: AtomicU64::new(0),
        })
    }

    /// Stream headers of the response.
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// The shared pagination state, for inspection.
    pub fn manager(&self) -> &Arc<Mutex<PaginationManager<F>>> {
        &self.manager
    }

    /// One fresh stream per header, in server order.
    pub fn streams(&self) -> Vec<PointStream<F>> {
        self.registry
            .get_all()
            .iter()
            .map(|header| self.bind(header.clone()))
            .collect()
    }

    /// A fresh stream for the one header matching `selector`.
    ///
    /// Fails with [`Error::NoResult`] or [`Error::TooManyResults`] when the
    /// selector does not pick exactly one stream.
    pub fn bind_stream(&self, selector: &Selector) -> Result<PointStream<F>> {
        let header = self.registry.get_one(selector)?.clone();
        Ok(self.bind(header))
    }

    fn bind(&self, header: StreamHeader) -> PointStream<F> {
        let instance = InstanceId::new(self.next_instance.fetch_add(1, Ordering::Relaxed));
        PointStream::new(header, Arc::clone(&self.manager), instance)
    }
}

/// Cursor over a flat paginated listing.
///
/// Items of the current page are yielded first; the next page is fetched
/// only when they run out. Pages are not kept after they are consumed.
pub struct PagedCursor<T, F> {
    items: VecDeque<T>,
    next_token: Option<ContinuationToken>,
    fetcher: F,
}

impl<T: Send, F: PageFetcher<T>> PagedCursor<T, F> {
    /// Start from the first page of a listing.
    pub fn new(first: PageData<T>, fetcher: F) -> Self {
        Self {
            next_token: first.next_page.map(|n| n.next_query),
            items: first.data.into(),
            fetcher,
        }
    }

    /// Return the next item.
    ///
    /// Returns `Ok(None)` when the last page is consumed, either because it
    /// has no continuation or because the server returned an empty page.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.items.pop_front() {
                return Ok(Some(item));
            }
            let Some(token) = self.next_token.take() else {
                return Ok(None);
            };
            let page = match self.fetcher.fetch_page(&token).await {
                Ok(page) => page,
                Err(e) => {
                    self.next_token = Some(token);
                    return Err(e);
                }
            };
            debug!(items = page.data.len(), "fetched listing page");
            if page.data.is_empty() {
                return Ok(None);
            }
            self.next_token = page.next_page.map(|n| n.next_query);
            self.items = page.data.into();
        }
    }

    /// Convert into an async stream of items.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<T>> + Send
    where
        T: 'static,
        F: 'static,
    {
        stream! {
            loop {
                match self.next().await {
                    Ok(Some(item)) => yield Ok(item),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Read every remaining item into a Vec.
    ///
    /// **Warning**: this loads all remaining pages into memory.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Device;
    use serde_json::json;

    struct DevicePages;

    impl PageFetcher<Device> for DevicePages {
        async fn fetch_page(&self, token: &ContinuationToken) -> Result<PageData<Device>> {
            match token.as_value()["page"].as_u64() {
                Some(1) => Ok(PageData::new(
                    vec![Device::new("c"), Device::new("d")],
                    Some(ContinuationToken::new(json!({"page": 2}))),
                )),
                Some(2) => Ok(PageData::new(Vec::new(), None)),
                _ => Err(Error::Status { status: 404, body: "no page".to_string() }),
            }
        }
    }

    #[tokio::test]
    async fn test_paged_cursor_walks_pages_until_empty() {
        let first = PageData::new(
            vec![Device::new("a"), Device::new("b")],
            Some(ContinuationToken::new(json!({"page": 1}))),
        );
        let keys: Vec<_> = PagedCursor::new(first, DevicePages)
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_paged_cursor_single_page() {
        let mut cursor = PagedCursor::new(PageData::new(vec![Device::new("a")], None), DevicePages);
        assert_eq!(cursor.next().await.unwrap().unwrap().key, "a");
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paged_cursor_error_keeps_token() {
        let first = PageData::new(Vec::new(), Some(ContinuationToken::new(json!({"page": 9}))));
        let mut cursor = PagedCursor::new(first, DevicePages);
        assert!(matches!(cursor.next().await, Err(Error::Status { status: 404, .. })));
        assert!(cursor.next_token.is_some());
    }

    #[test]
    fn test_response_cursor_requires_stream_headers() {
        let first = PageData::new(Vec::new(), None);
        let result = ResponseCursor::new(first, None, NoFetch, PaginationConfig::default());
        assert!(matches!(result, Err(Error::MissingStreams)));
    }

    struct NoFetch;

    impl PageFetcher for NoFetch {
        async fn fetch_page(&self, _token: &ContinuationToken) -> Result<PageData> {
            Err(Error::Config("no fetch expected".to_string()))
        }
    }
}
