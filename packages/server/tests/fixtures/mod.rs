//! Shared helpers for integration tests.
//!
//! Each test runs its own in-process server on an ephemeral port with in-memory storage.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hiroba_server::{
    ServerSettings, serve,
    ui::{USER_ID_HEADER, USER_NAME_HEADER},
};
use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest, http::HeaderValue},
};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running server; shut down when dropped.
pub struct TestServer {
    addr: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let settings = ServerSettings {
            flush_interval: Duration::from_millis(20),
            ..ServerSettings::default()
        };
        Self::start_with(settings).await
    }

    pub async fn start_with(settings: ServerSettings) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener
            .local_addr()
            .expect("Failed to read local address")
            .to_string();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = serve(listener, settings, shutdown).await {
                eprintln!("test server failed: {e}");
            }
        });

        Self {
            addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Stop accepting connections and wait for the final flush.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// HTTP client for one caller identity.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl ApiClient {
    pub fn new(server: &TestServer, user_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: server.base_url(),
            user_id: user_id.to_string(),
        }
    }

    fn with_identity(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(USER_ID_HEADER, &self.user_id)
            .header(USER_NAME_HEADER, self.user_id.to_uppercase())
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.with_identity(self.client.get(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.with_identity(self.client.post(format!("{}{}", self.base_url, path)))
            .json(&body)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.with_identity(self.client.delete(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("Failed to send request")
    }
}

/// Open a WebSocket session as `user_id`.
pub async fn connect_ws(server: &TestServer, user_id: &str) -> WsStream {
    let mut request = server
        .ws_url()
        .into_client_request()
        .expect("Failed to build request");
    let headers = request.headers_mut();
    headers.insert(
        USER_ID_HEADER,
        HeaderValue::from_str(user_id).expect("invalid header"),
    );
    headers.insert(
        USER_NAME_HEADER,
        HeaderValue::from_str(&user_id.to_uppercase()).expect("invalid header"),
    );
    let (stream, _) = connect_async(request)
        .await
        .expect("Failed to connect WebSocket");
    stream
}

pub async fn send_json(ws: &mut WsStream, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Read frames until one with the given `type` arrives.
pub async fn recv_type(ws: &mut WsStream, frame_type: &str) -> Value {
    let wait = async {
        loop {
            let msg = ws
                .next()
                .await
                .expect("stream closed")
                .expect("WebSocket error");
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(text.as_str()).expect("invalid JSON");
                if value["type"] == frame_type {
                    return value;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {frame_type} frame"))
}
