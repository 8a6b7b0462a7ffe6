//! FeedClient / ScheduleStore against a mock feed server

use rw_calendar::{FeedClient, IngestError, ScheduleStore};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = "BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//test//EN
BEGIN:VEVENT
SUMMARY:Bank
DTSTART:20000101T100000Z
DTEND:20000101T160000Z
END:VEVENT
BEGIN:VEVENT
SUMMARY:Bunker
DTSTART:29990105T103000Z
DTEND:29990105T160000Z
END:VEVENT
END:VCALENDAR
";

async fn client_for(server: &MockServer) -> FeedClient {
    FeedClient::new(&format!("{}/shifts.ics", server.uri()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shifts.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let body = client.fetch().await.unwrap();
    assert_eq!(body, FEED.as_bytes());
}

#[tokio::test]
async fn test_refresh_ingests_future_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shifts.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut store = ScheduleStore::new();
    let events = store.refresh(&client).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].summary, "Bunker");
}

#[tokio::test]
async fn test_bad_status_is_source_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result = client.fetch().await;
    assert!(matches!(result, Err(IngestError::SourceUnavailable(_))));
}

#[tokio::test]
async fn test_failed_refresh_keeps_cached_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut store = ScheduleStore::new();
    store.refresh(&client).await.unwrap();

    let result = store.refresh(&client).await;
    assert!(matches!(result, Err(IngestError::SourceUnavailable(_))));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_malformed_body_keeps_cached_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let mut store = ScheduleStore::new();
    store.refresh(&client).await.unwrap();

    let result = store.refresh(&client).await;
    assert!(matches!(result, Err(IngestError::MalformedFeed(_))));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_unreachable_source() {
    // Nothing listens on the discard port
    let client = FeedClient::new("http://127.0.0.1:9/shifts.ics", Duration::from_secs(2)).unwrap();
    let result = client.fetch().await;
    assert!(matches!(result, Err(IngestError::SourceUnavailable(_))));
}
