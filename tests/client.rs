//! HTTP tests for `Client` against a mock TempoIQ server.

use chrono::DateTime;
use futures::StreamExt;
use mockito::{Matcher, Server};
use serde_json::json;
use tempoiq_client::query::QueryBuilder;
use tempoiq_client::selection::{ObjectType, Search, device, equals, sensor};
use tempoiq_client::types::WriteRequest;
use tempoiq_client::{
    Client, ClientConfig, Device, Error, PaginationConfig, Point, Sensor, StreamId, Value,
};

fn client(server: &Server) -> Client {
    Client::new(ClientConfig::new(server.url(), "key", "secret")).unwrap()
}

fn read_query() -> tempoiq_client::query::ReadQuery {
    let start = DateTime::parse_from_rfc3339("2014-01-01T00:00:00Z").unwrap();
    let stop = DateTime::parse_from_rfc3339("2014-01-02T00:00:00Z").unwrap();
    QueryBuilder::devices()
        .filter(equals(device::attribute("building"), "4"))
        .unwrap()
        .read(start, stop)
}

#[tokio::test]
async fn test_read_follows_next_page() {
    let mut server = Server::new_async().await;

    let first = server
        .mock("GET", "/v2/read/")
        .match_header("authorization", "Basic a2V5OnNlY3JldA==")
        .match_header("accept", Matcher::Regex("prs.tempoiq.datapoint-collection.v2".into()))
        .match_body(Matcher::PartialJson(json!({"search": {"select": "devices"}})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [
                    {"t": "2014-01-01T00:00:00.000Z", "data": {"1": 1.5, "2": 10}},
                    {"t": "2014-01-01T01:00:00.000Z", "data": {"1": 2.5}}
                ],
                "streams": [
                    {"id": 1, "device": {"key": "d1"}, "sensor": {"key": "temp"}},
                    {"id": 2, "device": {"key": "d1"}, "sensor": {"key": "humidity"}}
                ],
                "next_page": {"next_query": {"cursor": "abc"}}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let second = server
        .mock("GET", "/v2/read/")
        .match_body(Matcher::Json(json!({"cursor": "abc"})))
        .with_status(200)
        .with_body(
            json!({"data": [{"t": "2014-01-01T02:00:00.000Z", "data": {"1": 3.5, "2": 11}}]})
                .to_string(),
        )
        .create_async()
        .await;

    let cursor = client(&server).read(&read_query()).await.unwrap();
    assert_eq!(cursor.registry().len(), 2);

    let temp: Vec<_> = cursor
        .bind_stream(&equals(sensor::key(), "temp"))
        .unwrap()
        .into_stream()
        .map(|p| p.unwrap().value)
        .collect()
        .await;
    assert_eq!(temp, vec![Value::from(1.5), Value::from(2.5), Value::from(3.5)]);

    let humidity = cursor
        .bind_stream(&equals(sensor::key(), "humidity"))
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    let values: Vec<_> = humidity.iter().map(|p| p.value.as_long().unwrap()).collect();
    assert_eq!(values, vec![10, 11]);
    assert_eq!(cursor.registry().get_all()[1].id, StreamId::from(2));

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_read_refetches_first_page_under_tight_budget() {
    let mut server = Server::new_async().await;

    let first = server
        .mock("GET", "/v2/read/")
        .match_body(Matcher::PartialJson(json!({"search": {"select": "devices"}})))
        .with_status(200)
        .with_body(
            json!({
                "data": [{"t": "2014-01-01T00:00:00Z", "data": {"1": 1}}],
                "streams": [{"id": 1, "device": {"key": "d1"}, "sensor": {"key": "temp"}}],
                "next_page": {"next_query": {"cursor": "p1"}}
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/v2/read/")
        .match_body(Matcher::Json(json!({"cursor": "p1"})))
        .with_status(200)
        .with_body(json!({"data": [{"t": "2014-01-01T01:00:00Z", "data": {"1": 2}}]}).to_string())
        .create_async()
        .await;

    let config = ClientConfig::new(server.url(), "key", "secret")
        .with_pagination(PaginationConfig::default().with_max_pages(1));
    let cursor = Client::new(config).unwrap().read(&read_query()).await.unwrap();
    let selector = equals(device::key(), "d1");

    let mut a = cursor.bind_stream(&selector).unwrap();
    assert_eq!(a.next().await.unwrap().unwrap().value, Value::Long(1));
    assert_eq!(a.next().await.unwrap().unwrap().value, Value::Long(2));

    // The first page was evicted; a new reader fetches it again.
    let mut b = cursor.bind_stream(&selector).unwrap();
    assert_eq!(b.next().await.unwrap().unwrap().value, Value::Long(1));

    first.assert_async().await;
}

#[tokio::test]
async fn test_read_without_stream_headers_fails() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/read/")
        .with_status(200)
        .with_body(r#"{"data": []}"#)
        .create_async()
        .await;

    let result = client(&server).read(&read_query()).await;
    assert!(matches!(result, Err(Error::MissingStreams)));
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/read/")
        .with_status(403)
        .with_body("invalid credentials")
        .create_async()
        .await;

    match client(&server).read(&read_query()).await {
        Err(Error::Status { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "invalid credentials");
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn test_search_devices_pages_lazily() {
    let mut server = Server::new_async().await;
    let _first = server
        .mock("GET", "/v2/devices/")
        .match_header("accept", Matcher::Regex("prs.tempoiq.device-collection.v2".into()))
        .match_body(Matcher::PartialJson(json!({"select": "devices"})))
        .with_status(200)
        .with_body(
            json!({
                "data": [{"key": "d1", "attributes": {"building": "4"}}],
                "next_page": {"next_query": {"cursor": "more"}}
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/v2/devices/")
        .match_body(Matcher::Json(json!({"cursor": "more"})))
        .with_status(200)
        .with_body(json!({"data": [{"key": "d2", "sensors": [{"key": "temp"}]}]}).to_string())
        .create_async()
        .await;

    let devices = client(&server)
        .search_devices(&Search::new(ObjectType::Devices))
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].attributes["building"], "4");
    assert!(devices[1].sensor("temp").is_some());
}

#[tokio::test]
async fn test_create_device() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/devices/")
        .match_header("content-type", "application/prs.tempoiq.device.v1+json")
        .match_body(Matcher::PartialJson(json!({"key": "d1"})))
        .with_status(200)
        .with_body(json!({"key": "d1", "name": "", "sensors": [{"key": "temp"}]}).to_string())
        .create_async()
        .await;

    let device = Device::new("d1").with_sensor(Sensor::new("temp"));
    let created = client(&server).create_device(&device).await.unwrap();
    assert_eq!(created, device);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_write_points() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/write/")
        .match_body(Matcher::Regex(r#"^\{"d1":\{"temp":\[\{"t":"[^"]+","v":1\.5\}\]\}\}$"#.into()))
        .with_status(200)
        .create_async()
        .await;

    let t = DateTime::parse_from_rfc3339("2014-01-01T00:00:00Z").unwrap();
    let request = WriteRequest::new().add("d1", "temp", Point::new(t, 1.5));
    client(&server).write(&request).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_rule() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/v2/monitors/rule-1")
        .with_status(200)
        .create_async()
        .await;

    client(&server).delete_rule("rule-1").await.unwrap();
    mock.assert_async().await;
}
