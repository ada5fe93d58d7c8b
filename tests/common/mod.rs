//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use ai_api_proxy::config::ProxyConfig;
use ai_api_proxy::lifecycle::Shutdown;
use ai_api_proxy::net::Listener;
use ai_api_proxy::HttpServer;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::routing::{any, get};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the echo upstream saw.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
}

async fn echo(request: Request) -> Json<Echo> {
    let headers = request
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    Json(Echo {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        headers,
    })
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(300)).await;
    "slow done"
}

async fn hang() -> &'static str {
    tokio::time::sleep(Duration::from_secs(30)).await;
    "too late"
}

/// Two chunks 300ms apart.
async fn stream() -> Body {
    let chunks = futures_util::stream::unfold(0u8, |n| async move {
        match n {
            0 => Some((Ok::<_, Infallible>(Bytes::from_static(b"data: first\n\n")), 1)),
            1 => {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Some((Ok(Bytes::from_static(b"data: second\n\n")), 2))
            }
            _ => None,
        }
    });
    Body::from_stream(chunks)
}

/// Reads the whole request body before answering with its length.
async fn consume(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    bytes.len().to_string()
}

/// Start an axum upstream on an ephemeral port.
///
/// `/slow` waits 300ms, `/hang` waits 30s, `/stream` sends two spaced chunks,
/// `/consume` reads the body; every other path echoes the request as JSON.
pub async fn start_echo_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/slow", get(slow))
        .route("/hang", get(hang))
        .route("/stream", get(stream))
        .route("/consume", any(consume))
        .fallback(echo);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Start an upstream that answers every request with `response` verbatim.
pub async fn start_raw_upstream(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_head(&mut socket).await;
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Start an upstream that switches to `websocket` and echoes raw bytes.
pub async fn start_tunnel_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                if !head.to_ascii_lowercase().contains("upgrade: websocket") {
                    let _ = socket
                        .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                        .await;
                    return;
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n",
                    )
                    .await;
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Send a websocket upgrade for `path` through the proxy at `addr`.
///
/// Returns the socket, positioned after the response head, and the head
/// lowercased.
pub async fn open_tunnel(addr: SocketAddr, path: &str) -> (TcpStream, String) {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: proxy\r\nAuthorization: Bearer X\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n"
    );
    socket.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut socket).await.to_ascii_lowercase();
    (socket, head)
}

/// Config routing each `(prefix, upstream)` pair, listening on an ephemeral port.
pub fn config_with(routes: &[(&str, String)]) -> ProxyConfig {
    let mut path_map = IndexMap::new();
    for (prefix, upstream) in routes {
        path_map.insert(prefix.to_string(), upstream.clone());
    }
    let mut config = ProxyConfig {
        path_map,
        ..ProxyConfig::default()
    };
    config.listener.bind_address = "127.0.0.1:0".into();
    config
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the proxy for `config`.
pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningProxy {
        addr,
        shutdown,
        task,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
