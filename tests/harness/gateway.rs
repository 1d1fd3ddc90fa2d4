// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mock form API and gateway construction.

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use form_gateway::{
    config::{Config, Secret},
    csrf::generate_token,
    handlers::{router, AppState, SUBMIT_PATH},
};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

pub const CSRF_SECRET: &str = "integration-secret-0123456789abcdef";
pub const API_KEY: &str = "upstream-api-key";

/// A request the mock form API received.
#[derive(Debug, Clone)]
pub struct Received {
    pub authorization: Option<String>,
    pub body: Value,
}

/// Mock form API bound to an ephemeral port.
pub struct MockUpstream {
    pub url: String,
    pub received: Arc<Mutex<Vec<Received>>>,
}

impl MockUpstream {
    /// Serve a form API that answers every POST with `status`.
    pub async fn spawn(status: StatusCode) -> Self {
        let received: Arc<Mutex<Vec<Received>>> = Arc::default();
        let recorder = received.clone();
        let app = Router::new().route(
            "/forms",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let recorder = recorder.clone();
                async move {
                    let authorization = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    recorder.lock().unwrap().push(Received { authorization, body });
                    (status, Json(serde_json::json!({"id": "upstream-1"})))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self {
            url: format!("http://{}/forms", addr),
            received,
        }
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Received> {
        self.received.lock().unwrap().last().cloned()
    }
}

/// A valid configuration pointed at `endpoint`.
pub fn test_config(endpoint: &str) -> Config {
    let mut config = Config::default();
    config.bind_addr = "127.0.0.1:0".to_string();
    // Requests carry their address in x-nf-client-connection-ip
    config.trust_proxy_headers = true;
    config.csrf.secret = Secret::new(CSRF_SECRET);
    config.upstream.endpoint = endpoint.to_string();
    config.upstream.api_key = Secret::new(API_KEY);
    config
}

/// Router plus a handle on its state.
pub fn build_app(config: Config) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config).unwrap());
    (router(state.clone()), state)
}

/// Serve the gateway on an ephemeral port with peer addresses available.
pub async fn serve(config: Config) -> (String, Arc<AppState>) {
    let (app, state) = build_app(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap()
    });
    (format!("http://{}", addr), state)
}

/// A token for `ip` minted `age_ms` ago.
pub fn token_for(ip: IpAddr, age_ms: i64) -> String {
    generate_token(
        CSRF_SECRET.as_bytes(),
        ip,
        Utc::now().timestamp_millis() - age_ms,
    )
    .unwrap()
    .to_string()
}

/// POST `body` to the submit path as `ip`.
pub fn submit_request(ip: IpAddr, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(SUBMIT_PATH)
        .header("content-type", "application/json")
        .header("x-nf-client-connection-ip", ip.to_string())
        .header("user-agent", "harness/1.0");
    if let Some(token) = token {
        builder = builder.header("x-csrf-token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Read a JSON response body.
pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
