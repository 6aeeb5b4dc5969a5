//! # tempoiq-client
//!
//! Async client for the TempoIQ v2 time-series API with bounded-memory
//! multi-stream reads.
//!
//! ## Why?
//!
//! A TempoIQ read returns many logical streams interleaved in one paginated
//! response. Materializing every page to hand each stream its points would
//! hold the whole result in memory. `tempoiq-client` keeps at most a fixed
//! number of pages resident and fetches evicted pages again when a lagging
//! stream needs them:
//!
//! ```ignore
//! let cursor = client.read(&query).await?;
//! let mut streams = cursor.streams();
//! // Streams advance independently over the same shared pages.
//! while let Some(point) = streams[0].next().await? {
//!     process(point);
//! }
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use tempoiq_client::{Client, ClientConfig};
//! use tempoiq_client::query::QueryBuilder;
//! use tempoiq_client::selection::{device, equals};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::from_env()?)?;
//!
//!     let query = QueryBuilder::devices()
//!         .filter(equals(device::attribute("building"), "4"))?
//!         .read(start, stop);
//!
//!     let cursor = client.read(&query).await?;
//!     let mut points = cursor
//!         .bind_stream(&equals(device::key(), "thermostat-1"))?
//!         .into_stream();
//!
//!     while let Some(point) = points.next().await {
//!         let point = point?;
//!         println!("{}: {}", point.timestamp, point.value);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded memory**: A page budget caps resident pages; idle pages are evicted
//! - **Independent streams**: Each stream instantiation has its own read pointer
//! - **Selectors**: Nested and/or selectors over device, sensor and stream fields
//! - **Async native**: Built on tokio and futures
//! - **Error handling**: All errors are returned as Results, no panics

pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod page;
pub mod query;
pub mod registry;
pub mod rule;
pub mod selection;
pub mod stream;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use client::Client;
pub use config::{ClientConfig, PaginationConfig};
pub use cursor::{PagedCursor, ResponseCursor};
pub use error::{Error, Result};
pub use fetch::PageFetcher;
pub use manager::{InstanceId, PaginationManager};
pub use stream::PointStream;
pub use types::{ContinuationToken, Device, PageData, Point, Row, Sensor, StreamHeader, StreamId};
pub use value::Value;
