//! Artifact download against a live HTTP server, streamed through the
//! byte-budgeted sink the daemon uses.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ota_client::api::new_api_client;
use ota_client::sink::LimitedSink;
use ota_client::update::client::UpdateClient;
use ota_client::update::UpdateError;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn artifact_streams_into_the_store_file() {
    let mock_server = MockServer::start().await;
    let body = payload(8192);
    Mock::given(method("GET"))
        .and(path("/artifact/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = new_api_client().unwrap();
    let url = format!("{}/artifact/1", mock_server.uri());
    let (mut stream, size) = UpdateClient::with_min_artifact_size(4096)
        .fetch_update(api, &url, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(size, 8192);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("d1.artifact");
    let file = tokio::fs::File::create(&dest).await.unwrap();
    let mut sink = LimitedSink::new(file, size);

    while let Some(chunk) = stream.chunk().await.unwrap() {
        sink.write(&chunk).await.unwrap();
    }
    sink.close().await.unwrap();

    assert_eq!(stream.offset(), stream.total());
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn finished_stream_keeps_reporting_end_of_artifact() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/artifact/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload(4096)))
        .mount(&mock_server)
        .await;

    let api = new_api_client().unwrap();
    let url = format!("{}/artifact/1", mock_server.uri());
    let (mut stream, _) = UpdateClient::with_min_artifact_size(4096)
        .fetch_update(api, &url, Duration::from_secs(5))
        .await
        .unwrap();

    let mut got = 0u64;
    while let Some(chunk) = stream.chunk().await.unwrap() {
        got += chunk.len() as u64;
    }
    assert_eq!(got, 4096);
    assert_eq!(stream.remaining(), 0);
    assert!(stream.chunk().await.unwrap().is_none());
}

#[tokio::test]
async fn fetch_is_refused_when_the_server_answers_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/artifact/1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let api = new_api_client().unwrap();
    let url = format!("{}/artifact/1", mock_server.uri());
    let result = UpdateClient::new()
        .fetch_update(api, &url, Duration::from_secs(5))
        .await;
    match result {
        Err(UpdateError::FetchRejected(status)) => assert_eq!(status.as_u16(), 403),
        other => panic!("expected FetchRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn declared_size_below_the_default_floor_is_refused() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/artifact/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload(1024)))
        .mount(&mock_server)
        .await;

    let api = new_api_client().unwrap();
    let url = format!("{}/artifact/1", mock_server.uri());
    let result = UpdateClient::new()
        .fetch_update(api, &url, Duration::from_secs(5))
        .await;
    match result {
        Err(UpdateError::TooSmall { size, min }) => {
            assert_eq!(size, 1024);
            assert_eq!(min, 4 * 1024 * 1024);
        }
        other => panic!("expected TooSmall, got {other:?}"),
    }
}
