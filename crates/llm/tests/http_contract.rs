//! HTTP contract tests for the recommendation client.
//!
//! These pin down the wire format the sommelier service expects: a multipart
//! form with a `prompt` field and `images` file parts, answered by a raw text
//! body that is streamed back as fragments.

use std::future::Future;
use std::time::Duration;

use corki_llm::{
    HttpRecommendationProvider, ProviderConfig, ProviderError, RawAttachment,
    RecommendationProvider, RecommendationRequest, StreamEvent,
};
use futures::StreamExt;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> HttpRecommendationProvider {
    HttpRecommendationProvider::new(ProviderConfig::new(server.uri())).expect("provider")
}

async fn run(
    provider: &HttpRecommendationProvider,
    request: RecommendationRequest,
) -> Vec<StreamEvent> {
    let prepared = request.prepare().await.expect("prepare");
    provider.recommend(prepared).collect().await
}

fn chunk_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Chunk(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_is_multipart_with_prompt_and_image_parts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/recommend"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"prompt\""))
        .and(body_string_contains("Pinot or Merlot?"))
        .and(body_string_contains("name=\"images\"; filename=\"menu.png\""))
        .and(body_string_contains("name=\"images\"; filename=\"specials.jpg\""))
        .respond_with(ResponseTemplate::new(200).set_body_string("Go with the Pinot."))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let request = RecommendationRequest::new("Pinot or Merlot?").with_attachments(vec![
        RawAttachment::from_bytes("menu.png", b"fake-png".to_vec()),
        RawAttachment::from_bytes("specials.jpg", b"fake-jpg".to_vec()),
    ]);

    let events = run(&provider, request).await;

    assert!(matches!(events.first(), Some(StreamEvent::Opened)));
    assert!(matches!(events.last(), Some(StreamEvent::Completed)));
    assert_eq!(chunk_text(&events), "Go with the Pinot.");
}

#[tokio::test]
async fn request_without_attachments_sends_only_the_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/recommend"))
        .and(body_string_contains("Something bold"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let events = run(&provider_for(&server), RecommendationRequest::new("Something bold")).await;

    let requests = server.received_requests().await.expect("recording enabled");
    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    assert!(!body.contains("name=\"images\""));

    // An empty body is a valid, chunk-free completion.
    assert!(matches!(
        events.as_slice(),
        [StreamEvent::Opened, StreamEvent::Completed]
    ));
}

#[tokio::test]
async fn custom_recommend_path_is_used() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/sommelier"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Riesling."))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpRecommendationProvider::new(
        ProviderConfig::new(format!("{}/", server.uri())).with_recommend_path("v2/sommelier"),
    )
    .expect("provider");

    let events = run(&provider, RecommendationRequest::new("white?")).await;
    assert_eq!(chunk_text(&events), "Riesling.");
}

#[tokio::test]
async fn stream_is_lazy_until_polled() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let prepared = RecommendationRequest::new("unused")
        .prepare()
        .await
        .expect("prepare");

    drop(provider.recommend(prepared));
}

// ────────────────────────────────────────────────────────────────────────────
// Failure handling
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_success_status_fails_without_fragments() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/recommend"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let events = run(&provider_for(&server), RecommendationRequest::new("Cab?")).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Failed(ProviderError::UnexpectedStatus { status, body, .. }) => {
            assert_eq!(*status, 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("expected status failure, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_request_from_image_processing_is_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"detail": "Failed to process image: unreadable"})),
        )
        .mount(&server)
        .await;

    let request = RecommendationRequest::new("File upload initiated")
        .with_attachments(vec![RawAttachment::from_bytes("blurry.png", b"??".to_vec())]);
    let events = run(&provider_for(&server), request).await;

    assert!(matches!(
        events.as_slice(),
        [StreamEvent::Failed(ProviderError::UnexpectedStatus { status: 400, .. })]
    ));
}

#[tokio::test]
async fn unreachable_server_is_a_send_failure() {
    // Port 9 (discard) is not served by anything in the test environment.
    let provider =
        HttpRecommendationProvider::new(ProviderConfig::new("http://127.0.0.1:9")).expect("provider");

    let events = run(&provider, RecommendationRequest::new("Chianti?")).await;

    assert!(matches!(
        events.as_slice(),
        [StreamEvent::Failed(ProviderError::SendRequest { .. })]
    ));
}

#[tokio::test]
async fn slow_headers_hit_the_request_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("too late")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let provider = HttpRecommendationProvider::new(
        ProviderConfig::new(server.uri()).with_request_timeout(Some(Duration::from_millis(50))),
    )
    .expect("provider");

    let events = run(&provider, RecommendationRequest::new("Port?")).await;

    match events.as_slice() {
        [StreamEvent::Failed(error @ ProviderError::TimedOut { .. })] => {
            assert_eq!(error.stage(), "await-response-headers");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Streamed bodies
// ────────────────────────────────────────────────────────────────────────────
//
// wiremock answers with one complete body, so these use a bare socket that
// writes a chunked response piece by piece.

const CHUNKED_RESPONSE_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\n\
content-type: text/plain; charset=utf-8\r\n\
transfer-encoding: chunked\r\n\r\n";

const PAUSE: Duration = Duration::from_millis(50);

/// Accepts one connection, drains the request and hands the socket to `respond`.
async fn serve_once<F, Fut>(respond: F) -> String
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        drain_request(&mut socket).await;
        respond(socket).await;
    });

    format!("http://{address}")
}

async fn drain_request(socket: &mut TcpStream) {
    let mut received = Vec::new();
    let mut buffer = [0u8; 4096];

    while !request_complete(&received) {
        let read = socket.read(&mut buffer).await.expect("read request");
        if read == 0 {
            return;
        }
        received.extend_from_slice(&buffer[..read]);
    }
}

fn request_complete(received: &[u8]) -> bool {
    let Some(header_end) = received.windows(4).position(|window| window == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&received[..header_end]).to_ascii_lowercase();
    let body_len = received.len() - header_end - 4;

    match head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
    {
        Some(length) => body_len >= length.trim().parse::<usize>().unwrap_or(0),
        None => received.ends_with(b"0\r\n\r\n"),
    }
}

async fn write_chunk(socket: &mut TcpStream, data: &[u8]) {
    let size_line = format!("{:x}\r\n", data.len());
    let frame = [size_line.as_bytes(), data, b"\r\n".as_slice()].concat();
    socket.write_all(&frame).await.expect("write chunk");
    socket.flush().await.expect("flush chunk");
}

fn chunks(events: &[StreamEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Chunk(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn body_buffers_arrive_as_ordered_chunks() {
    let base_url = serve_once(|mut socket| async move {
        socket
            .write_all(CHUNKED_RESPONSE_HEAD)
            .await
            .expect("write head");
        // "Côtes" is split inside the two-byte 'ô'.
        for piece in [
            b"Start with ".as_slice(),
            b"a Chablis, ".as_slice(),
            b"then C\xC3".as_slice(),
            b"\xB4tes du Rh\xC3\xB4ne.".as_slice(),
        ] {
            write_chunk(&mut socket, piece).await;
            tokio::time::sleep(PAUSE).await;
        }
        socket.write_all(b"0\r\n\r\n").await.expect("write trailer");
        socket.flush().await.expect("flush trailer");
    })
    .await;

    let provider =
        HttpRecommendationProvider::new(ProviderConfig::new(base_url)).expect("provider");
    let events = run(&provider, RecommendationRequest::new("White to start?")).await;

    assert!(matches!(events.first(), Some(StreamEvent::Opened)));
    assert!(matches!(events.last(), Some(StreamEvent::Completed)));
    assert_eq!(
        chunks(&events),
        ["Start with ", "a Chablis, ", "then C", "ôtes du Rhône."]
    );
}

#[tokio::test]
async fn body_cut_after_opening_fails_with_read_error_after_earlier_chunks() {
    let base_url = serve_once(|mut socket| async move {
        socket
            .write_all(CHUNKED_RESPONSE_HEAD)
            .await
            .expect("write head");
        write_chunk(&mut socket, b"Try the Barolo").await;
        tokio::time::sleep(PAUSE).await;
        // Closing without the terminating chunk leaves the body incomplete.
        drop(socket);
    })
    .await;

    let provider =
        HttpRecommendationProvider::new(ProviderConfig::new(base_url)).expect("provider");
    let events = run(&provider, RecommendationRequest::new("Something from Piedmont?")).await;

    assert!(matches!(events.first(), Some(StreamEvent::Opened)));
    assert_eq!(chunks(&events), ["Try the Barolo"]);
    match events.last() {
        Some(StreamEvent::Failed(error @ ProviderError::ReadStream { .. })) => {
            assert_eq!(error.stage(), "read-stream-chunk");
        }
        other => panic!("expected read failure, got {other:?}"),
    }
    assert!(!events.iter().any(|event| matches!(event, StreamEvent::Completed)));
}

#[tokio::test]
async fn stall_between_buffers_hits_the_chunk_timeout() {
    let base_url = serve_once(|mut socket| async move {
        socket
            .write_all(CHUNKED_RESPONSE_HEAD)
            .await
            .expect("write head");
        write_chunk(&mut socket, b"Maybe a ").await;
        // Hold the connection open without sending anything else.
        futures::future::pending::<()>().await;
        drop(socket);
    })
    .await;

    let provider = HttpRecommendationProvider::new(
        ProviderConfig::new(base_url).with_request_timeout(Some(Duration::from_millis(200))),
    )
    .expect("provider");
    let events = run(&provider, RecommendationRequest::new("Dessert wine?")).await;

    assert!(matches!(events.first(), Some(StreamEvent::Opened)));
    assert_eq!(chunks(&events), ["Maybe a "]);
    match events.last() {
        Some(StreamEvent::Failed(error @ ProviderError::TimedOut { .. })) => {
            assert_eq!(error.stage(), "await-stream-chunk");
        }
        other => panic!("expected chunk timeout, got {other:?}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Health
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_server_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let status = provider_for(&server).health().await.expect("health");
    assert!(status.is_ok());
}

#[tokio::test]
async fn health_with_garbage_payload_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let error = provider_for(&server).health().await.expect_err("bad payload");
    assert!(matches!(error, ProviderError::HealthPayload { .. }));
}
