//! Per-stream iteration over a shared read response.

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::fetch::PageFetcher;
use crate::manager::{InstanceId, PaginationManager};
use crate::types::{Point, StreamHeader};

/// Points of one logical stream, read lazily from a shared response.
///
/// Rows without a value for this stream are skipped. Each `PointStream`
/// has its own read pointer, so binding the same stream twice yields the
/// same points twice, independently.
pub struct PointStream<F> {
    header: StreamHeader,
    manager: Arc<Mutex<PaginationManager<F>>>,
    instance: InstanceId,
    done: bool,
}

impl<F: PageFetcher> PointStream<F> {
    pub(crate) fn new(
        header: StreamHeader,
        manager: Arc<Mutex<PaginationManager<F>>>,
        instance: InstanceId,
    ) -> Self {
        Self {
            header,
            manager,
            instance,
            done: false,
        }
    }

    /// Device, sensor and function this stream carries.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Identifier of this instantiation.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Return the next point.
    ///
    /// Returns:
    /// - `Ok(Some(point))` - The next point of this stream
    /// - `Ok(None)` - The response is exhausted
    /// - `Err(e)` - A page fetch failed
    pub async fn next(&mut self) -> Result<Option<Point>> {
        if self.done {
            return Ok(None);
        }

        let mut manager = self.manager.lock().await;
        loop {
            let Some(row) = manager.next(self.instance).await? else {
                self.done = true;
                return Ok(None);
            };
            if let Some(value) = row.get(&self.header.id) {
                return Ok(Some(Point {
                    timestamp: row.timestamp,
                    value: value.clone(),
                }));
            }
        }
    }

    /// Convert into an async stream of points.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Point>> + Send + 'static
    where
        F: 'static,
    {
        stream! {
            loop {
                match self.next().await {
                    Ok(Some(point)) => yield Ok(point),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Read every remaining point into a Vec.
    ///
    /// **Warning**: this holds the whole stream in memory.
    pub async fn collect_all(mut self) -> Result<Vec<Point>> {
        let mut points = Vec::new();
        while let Some(point) = self.next().await? {
            points.push(point);
        }
        Ok(points)
    }
}
