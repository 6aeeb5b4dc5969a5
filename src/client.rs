//! TempoIQ HTTP client.
//!
//! This module provides the main `Client` type for talking to the TempoIQ v2
//! API: device management, writes, multi-stream reads and monitoring rules.

use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::cursor::{PagedCursor, ResponseCursor};
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::query::ReadQuery;
use crate::rule::Rule;
use crate::selection::Search;
use crate::types::{ContinuationToken, Device, PageData, Row, WriteRequest};

/// Build a vendor media type, e.g. `application/prs.tempoiq.device.v2+json`.
pub fn media_type(resource: &str, version: &str) -> String {
    format!("application/prs.tempoiq.{}.{}+json", resource, version)
}

/// A vendor media type paired with the generic error type, used for `Accept`.
fn accept(resource: &str, version: &str) -> String {
    format!("{},{}", media_type(resource, version), media_type("error", "v1"))
}

/// TempoIQ v2 API client.
///
/// # Example
///
/// ```ignore
/// use tempoiq_client::{Client, ClientConfig};
/// use tempoiq_client::query::QueryBuilder;
/// use tempoiq_client::selection::{device, equals};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new(ClientConfig::new("my-env.backend.tempoiq.com", "key", "secret"))?;
///
///     let query = QueryBuilder::devices()
///         .filter(equals(device::attribute("building"), "4"))?
///         .read(start, stop);
///
///     let cursor = client.read(&query).await?;
///     for mut stream in cursor.streams() {
///         let header = stream.header().clone();
///         while let Some(point) = stream.next().await? {
///             println!("{}/{}: {:?}", header.device.key, header.sensor.key, point);
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    key: String,
    secret: String,
    config: ClientConfig,
}

impl Client {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Self::with_http_client(http, config)
    }

    /// Create a new client with a custom reqwest client.
    ///
    /// This allows you to configure proxies, TLS settings, etc. The
    /// configuration's timeout and user agent are not applied.
    pub fn with_http_client(http: reqwest::Client, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http,
            base_url: config.base_url()?,
            key: config.key.clone(),
            secret: config.secret.clone(),
            config,
        })
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Get the configuration the client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build the full URL for an API endpoint relative to `/v2/`.
    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// URL below `monitors/` with each of `segments` percent-encoded as one
    /// path segment.
    fn monitor_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint("monitors/")?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("cannot append to {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send an authenticated request and fail on non-success statuses.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        media: (&str, &str),
        body: Option<&B>,
    ) -> Result<Response> {
        debug!(%method, %url, "sending request");

        let mut request = self
            .http
            .request(method, url)
            .basic_auth(&self.key, Some(&self.secret))
            .header(ACCEPT, accept(media.0, media.1))
            .header(CONTENT_TYPE, media_type(media.0, media.1));
        if let Some(body) = body {
            request = request.body(serde_json::to_string(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            debug!(status = status.as_u16(), "request failed");
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        url: Url,
        media: (&str, &str),
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.send(method, url, media, body).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Create a device with its sensors.
    pub async fn create_device(&self, device: &Device) -> Result<Device> {
        let url = self.endpoint("devices/")?;
        self.send_json(Method::POST, url, ("device", "v1"), Some(device))
            .await
    }

    /// Delete every device matched by `search`.
    pub async fn delete_devices(&self, search: &Search) -> Result<()> {
        let url = self.endpoint("devices/")?;
        self.send(Method::DELETE, url, ("delete-devices", "v1"), Some(search))
            .await?;
        Ok(())
    }

    /// Look up devices matching `search`, paging lazily.
    pub async fn search_devices(&self, search: &Search) -> Result<PagedCursor<Device, Client>> {
        let token = ContinuationToken::new(serde_json::to_value(search)?);
        let first = PageFetcher::<Device>::fetch_page(self, &token).await?;
        Ok(PagedCursor::new(first, self.clone()))
    }

    /// Write points.
    pub async fn write(&self, request: &WriteRequest) -> Result<()> {
        debug!(points = request.len(), "writing points");
        let url = self.endpoint("write/")?;
        self.send(Method::POST, url, ("write-request", "v1"), Some(request))
            .await?;
        Ok(())
    }

    /// Run a read and return a cursor over its streams.
    ///
    /// The query itself is kept as the first page's token, so even the first
    /// page can be evicted under the configured page budget.
    pub async fn read(&self, query: &ReadQuery) -> Result<ResponseCursor<Client>> {
        let token = ContinuationToken::new(serde_json::to_value(query)?);
        let first = PageFetcher::<Row>::fetch_page(self, &token).await?;
        ResponseCursor::new(first, Some(token), self.clone(), self.config.pagination)
    }

    /// Create or replace a monitoring rule.
    pub async fn monitor(&self, rule: &Rule) -> Result<Rule> {
        let url = self.endpoint("monitors/")?;
        self.send_json(Method::POST, url, ("monitor", "v1"), Some(rule))
            .await
    }

    /// Get a monitoring rule by key.
    pub async fn get_rule(&self, key: &str) -> Result<Rule> {
        let url = self.monitor_url(&[key])?;
        self.send_json::<(), _>(Method::GET, url, ("monitor", "v1"), None)
            .await
    }

    /// List all monitoring rules.
    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        let url = self.endpoint("monitors/")?;
        self.send_json::<(), _>(Method::GET, url, ("monitor-collection", "v1"), None)
            .await
    }

    /// Delete a monitoring rule.
    pub async fn delete_rule(&self, key: &str) -> Result<()> {
        let url = self.monitor_url(&[key])?;
        self.send::<()>(Method::DELETE, url, ("monitor", "v1"), None)
            .await?;
        Ok(())
    }

    /// Alert log of a rule.
    pub async fn get_logs(&self, key: &str) -> Result<serde_json::Value> {
        self.rule_resource("logs", key).await
    }

    /// Change history of a rule.
    pub async fn get_changelog(&self, key: &str) -> Result<serde_json::Value> {
        self.rule_resource("changes", key).await
    }

    /// Usage statistics of a rule.
    pub async fn get_usage(&self, key: &str) -> Result<serde_json::Value> {
        self.rule_resource("usage", key).await
    }

    /// Annotations attached to a rule.
    pub async fn get_annotations(&self, key: &str) -> Result<serde_json::Value> {
        self.rule_resource("annotations", key).await
    }

    async fn rule_resource(&self, resource: &str, key: &str) -> Result<serde_json::Value> {
        let url = self.monitor_url(&[resource, key])?;
        self.send_json::<(), _>(Method::GET, url, ("monitor", "v1"), None)
            .await
    }
}

impl PageFetcher<Row> for Client {
    async fn fetch_page(&self, token: &ContinuationToken) -> Result<PageData<Row>> {
        let url = self.endpoint("read/")?;
        self.send_json(Method::GET, url, ("datapoint-collection", "v2"), Some(token.as_value()))
            .await
    }
}

impl PageFetcher<Device> for Client {
    async fn fetch_page(&self, token: &ContinuationToken) -> Result<PageData<Device>> {
        let url = self.endpoint("devices/")?;
        self.send_json(Method::GET, url, ("device-collection", "v2"), Some(token.as_value()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type() {
        assert_eq!(media_type("device", "v1"), "application/prs.tempoiq.device.v1+json");
        assert_eq!(
            accept("monitor", "v1"),
            "application/prs.tempoiq.monitor.v1+json,application/prs.tempoiq.error.v1+json"
        );
    }

    #[test]
    fn test_endpoint_joins_below_v2() {
        let client = Client::new(ClientConfig::new("api.tempoiq.com", "k", "s")).unwrap();
        assert_eq!(
            client.endpoint("monitors/rule-1").unwrap().as_str(),
            "https://api.tempoiq.com/v2/monitors/rule-1"
        );
        assert_eq!(client.url().as_str(), "https://api.tempoiq.com/v2/");
    }

    #[test]
    fn test_rule_keys_stay_inside_their_segment() {
        let client = Client::new(ClientConfig::new("api.tempoiq.com", "k", "s")).unwrap();
        assert_eq!(
            client.monitor_url(&["rule-1"]).unwrap().as_str(),
            "https://api.tempoiq.com/v2/monitors/rule-1"
        );
        assert_eq!(
            client.monitor_url(&["logs", "../devices/"]).unwrap().as_str(),
            "https://api.tempoiq.com/v2/monitors/logs/..%2Fdevices%2F"
        );
        assert_eq!(
            client.monitor_url(&["rule 1?x#y"]).unwrap().as_str(),
            "https://api.tempoiq.com/v2/monitors/rule%201%3Fx%23y"
        );
    }
}
