//! The page-fetching capability cursors are built on.

use std::future::Future;

use crate::error::Result;
use crate::types::{ContinuationToken, PageData, Row};

/// Fetches one page of a paginated response given its continuation token.
///
/// [`Client`](crate::Client) implements this over HTTP; tests and callers
/// with their own transport can implement it directly. Implementations must
/// return the same page for the same token, since evicted pages are
/// reconstructed by fetching their token again.
pub trait PageFetcher<T = Row>: Send + Sync {
    /// Fetch the page `token` points at.
    fn fetch_page(
        &self,
        token: &ContinuationToken,
    ) -> impl Future<Output = Result<PageData<T>>> + Send;
}
