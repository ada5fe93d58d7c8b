//! End-to-end behaviour of the proxy against local upstreams.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ai_api_proxy::http::response::ErrorBody;

mod common;

use common::{client, config_with, start_echo_upstream, start_proxy, Echo};

#[tokio::test]
async fn forwards_with_prefix_stripped() {
    let upstream = start_echo_upstream().await;
    let proxy = start_proxy(config_with(&[("/openai", format!("http://{upstream}"))])).await;

    let res = client()
        .post(proxy.url("/openai/v1/chat/completions?stream=true"))
        .header("authorization", "Bearer X")
        .header("content-type", "application/json")
        .body(r#"{"model":"m"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let echo: Echo = res.json().await.unwrap();
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.path, "/v1/chat/completions");
    assert_eq!(echo.query.as_deref(), Some("stream=true"));
    assert_eq!(echo.headers["authorization"], "Bearer X");
    assert_eq!(echo.headers["host"], upstream.to_string());
    assert!(echo.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn longest_prefix_wins() {
    let upstream = start_echo_upstream().await;
    let proxy = start_proxy(config_with(&[
        ("/api", format!("http://{upstream}/short")),
        ("/api/v2", format!("http://{upstream}/long")),
    ]))
    .await;

    let echo: Echo = client()
        .get(proxy.url("/api/v2/x"))
        .header("x-api-key", "k")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo.path, "/long/x");

    let echo: Echo = client()
        .get(proxy.url("/api/v1/x"))
        .header("x-api-key", "k")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo.path, "/short/v1/x");
}

#[tokio::test]
async fn cdn_headers_never_reach_upstream() {
    let upstream = start_echo_upstream().await;
    let proxy = start_proxy(config_with(&[("/claude", format!("http://{upstream}"))])).await;

    let echo: Echo = client()
        .get(proxy.url("/claude/v1/messages"))
        .header("x-api-key", "sk-ant")
        .header("cf-connecting-ip", "198.51.100.7")
        .header("cf-ipcountry", "NL")
        .header("cf-ray", "8a1b")
        .header("cdn-loop", "cloudflare")
        .header("anthropic-version", "2023-06-01")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(echo.headers.keys().all(|k| !k.starts_with("cf-")));
    assert!(!echo.headers.contains_key("cdn-loop"));
    assert_eq!(echo.headers["x-api-key"], "sk-ant");
    assert_eq!(echo.headers["anthropic-version"], "2023-06-01");
}

#[tokio::test]
async fn fixed_egress_ip_replaces_client_address() {
    let upstream = start_echo_upstream().await;
    let mut config = config_with(&[("/openai", format!("http://{upstream}"))]);
    config.fixed_request_ip = Some("203.0.113.1".into());
    let proxy = start_proxy(config).await;

    let echo: Echo = client()
        .get(proxy.url("/openai/v1/models"))
        .header("authorization", "Bearer X")
        .header("x-forwarded-for", "9.9.9.9")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(echo.headers["x-forwarded-for"], "203.0.113.1");
    assert_eq!(echo.headers["x-real-ip"], "203.0.113.1");
}

#[tokio::test]
async fn health_check_bypasses_auth_and_headers() {
    let proxy = start_proxy(config_with(&[("/openai", "http://127.0.0.1:1".into())])).await;

    let res = client().get(proxy.url("/generate_204")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.headers().get("x-frame-options").is_none());
    assert!(res.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn unauthenticated_and_unknown_paths() {
    let proxy = start_proxy(config_with(&[("/openai", "http://127.0.0.1:1".into())])).await;

    let res = client().get(proxy.url("/nope")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    let body: ErrorBody = res.json().await.unwrap();
    assert_eq!(body.error, "Unauthorized");

    let res = client()
        .get(proxy.url("/nope"))
        .header("authorization", "Bearer X")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = res.json().await.unwrap();
    assert_eq!(body.error, "Unknown path: /nope");
}

#[tokio::test]
async fn dial_failure_is_502_envelope() {
    let proxy = start_proxy(config_with(&[("/openai", "http://127.0.0.1:1".into())])).await;

    let res = client()
        .get(proxy.url("/openai/v1/models"))
        .header("authorization", "Bearer X")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: ErrorBody = res.json().await.unwrap();
    assert!(body.error.starts_with("Proxy request failed: "), "{}", body.error);
}

#[tokio::test]
async fn upstream_status_and_security_headers_pass_through() {
    let upstream = common::start_raw_upstream(
        b"HTTP/1.1 429 Too Many Requests\r\nContent-Type: application/json\r\nX-Frame-Options: SAMEORIGIN\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
    )
    .await;
    let proxy = start_proxy(config_with(&[("/openai", format!("http://{upstream}"))])).await;

    let res = client()
        .get(proxy.url("/openai/v1/models"))
        .header("authorization", "Bearer X")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    assert_eq!(res.headers()["cache-control"], "no-store, no-cache, must-revalidate, proxy-revalidate, max-age=0");
    assert_eq!(res.text().await.unwrap(), "{}");
}

#[tokio::test]
async fn upgrade_response_loses_content_length() {
    let upstream = common::start_raw_upstream(
        b"HTTP/1.1 200 OK\r\nUpgrade: websocket\r\nContent-Length: 42\r\nConnection: close\r\n\r\n012345678901234567890123456789012345678901",
    )
    .await;
    let proxy = start_proxy(config_with(&[("/ws", format!("http://{upstream}"))])).await;

    let res = client()
        .get(proxy.url("/ws/stream"))
        .header("authorization", "Bearer X")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("content-length").is_none());
    assert_eq!(res.bytes().await.unwrap().len(), 42);
}

#[tokio::test]
async fn responses_stream_without_buffering() {
    let upstream = start_echo_upstream().await;
    let proxy = start_proxy(config_with(&[("/openai", format!("http://{upstream}"))])).await;

    let mut res = client()
        .get(proxy.url("/openai/stream"))
        .header("authorization", "Bearer X")
        .send()
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_millis(200), res.chunk())
        .await
        .expect("first chunk should arrive before the upstream finishes")
        .unwrap()
        .unwrap();
    assert_eq!(&first[..], b"data: first\n\n");

    let second = res.chunk().await.unwrap().unwrap();
    assert_eq!(&second[..], b"data: second\n\n");
}

#[tokio::test]
async fn websocket_upgrade_is_tunnelled() {
    let upstream = common::start_tunnel_upstream().await;
    let proxy = start_proxy(config_with(&[("/realtime", format!("http://{upstream}"))])).await;

    let (mut socket, head) = common::open_tunnel(proxy.addr, "/realtime/v1").await;
    assert!(head.starts_with("http/1.1 101"), "{head}");
    assert!(head.contains("upgrade: websocket"));
    assert!(!head.contains("content-length"));

    socket.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(2), socket.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed, b"ping");
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let upstream = start_echo_upstream().await;
    let mut config = config_with(&[("/openai", format!("http://{upstream}"))]);
    config.rate_limit = "2-M".into();
    let proxy = start_proxy(config).await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let res = client()
            .get(proxy.url("/openai/v1/models"))
            .header("authorization", "Bearer X")
            .send()
            .await
            .unwrap();
        statuses.push(res.status());
    }
    assert_eq!(
        statuses,
        [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}

#[tokio::test]
async fn streamed_body_over_limit_is_413() {
    let upstream = start_echo_upstream().await;
    let mut config = config_with(&[("/openai", format!("http://{upstream}"))]);
    config.max_request_body_size_mb = 1;
    let proxy = start_proxy(config).await;

    // 4 MiB in 64 KiB chunks, with no Content-Length.
    let chunks = futures_util::stream::iter(
        (0..64).map(|_| Ok::<_, std::io::Error>(vec![b'x'; 64 * 1024])),
    );
    let res = client()
        .post(proxy.url("/openai/consume"))
        .header("authorization", "Bearer X")
        .body(reqwest::Body::wrap_stream(chunks))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: ErrorBody = res.json().await.unwrap();
    assert_eq!(body.error, "Request body too large");
}

#[tokio::test]
async fn slow_upstream_headers_are_a_502_timeout() {
    let upstream = start_echo_upstream().await;
    let mut config = config_with(&[("/openai", format!("http://{upstream}"))]);
    config.transport.response_header_timeout_secs = 1;
    let proxy = start_proxy(config).await;

    let started = Instant::now();
    let res = client()
        .get(proxy.url("/openai/hang"))
        .header("authorization", "Bearer X")
        .send()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    let body: ErrorBody = res.json().await.unwrap();
    assert!(body.error.starts_with("Proxy request failed: "), "{}", body.error);
}

#[tokio::test]
async fn abandoned_request_frees_its_upstream_slot() {
    let upstream = start_echo_upstream().await;
    let mut config = config_with(&[("/openai", format!("http://{upstream}"))]);
    config.transport.max_conns_per_host = 1;
    let proxy = start_proxy(config).await;

    let abandoned = client()
        .get(proxy.url("/openai/hang"))
        .header("authorization", "Bearer X")
        .timeout(Duration::from_millis(300))
        .send()
        .await;
    assert!(abandoned.is_err());

    let res = client()
        .get(proxy.url("/openai/v1/models"))
        .header("authorization", "Bearer X")
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
