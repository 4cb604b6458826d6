//! Pretend web application for trying the relay locally.
//!
//! Run it, then start the relay in local mode and send events with
//! `relay-invoke request /hello`.

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route("/", get(|| async { "Hello from the pretend web app!" }))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/hello", get(|| async { Json(json!({ "message": "hello" })) }))
        .route("/echo", post(echo))
        .route("/events", post(echo))
        .route("/slow", get(slow))
        .route("/fail", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }));

    let addr = SocketAddr::from(([127, 0, 0, 1], 8080));
    println!("Pretend web app is listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn echo(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), Value::String(v.to_string())))
        })
        .collect();
    Json(json!({
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "finally"
}
