#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use delivery_tunnel_harness::prelude::{ApiConfig, EnvironmentConfig, MockWebhookConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

pub const SEND: i64 = 1_714_300_000_000;
/// `SEND + 20ms`, when the fake service ingests events.
pub const INGESTED_AT: &str = "2024-04-28T10:26:40.020Z";
/// `SEND + 50ms`, when the fake service starts delivering.
pub const DELIVERY_STARTED_AT: &str = "1714300000050";
/// `SEND + 120ms`, when the fake receiver gets the delivery.
pub const RECEIVED_AT: &str = "2024-04-28T10:26:40.120Z";

/// Delivery service and mock receiver in one router. Published events are delivered instantly
/// unless delivery is turned off.
#[derive(Debug, Default)]
pub struct FakeDeliveryPipeline {
    pub received: Mutex<HashMap<String, Value>>,
    pub receiver_hits: AtomicUsize,
    pub tenants: Mutex<Vec<String>>,
    pub deliver: bool,
}

impl FakeDeliveryPipeline {
    pub fn delivering() -> Arc<Self> {
        Arc::new(Self {
            deliver: true,
            ..Default::default()
        })
    }

    pub fn black_hole() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn receive(&self, event_id: &str, payload: Value) {
        self.received.lock().insert(
            event_id.to_string(),
            json!({
                "id": event_id,
                "received_at": RECEIVED_AT,
                "payload": payload,
                "headers": {
                    "Content-Type": "application/json",
                    "X-Outpost-Timestamp": DELIVERY_STARTED_AT,
                }
            }),
        );
    }

    /// Store a receiver record exactly as given, whatever its shape.
    pub fn receive_raw(&self, event_id: &str, record: Value) {
        self.received.lock().insert(event_id.to_string(), record);
    }

    pub fn receiver_hits(&self) -> usize {
        self.receiver_hits.load(Ordering::SeqCst)
    }
}

async fn publish(
    State(pipeline): State<Arc<FakeDeliveryPipeline>>,
    Json(body): Json<Value>,
) -> StatusCode {
    if body["topic"] == "rejected" {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }
    if pipeline.deliver {
        let id = body["id"].as_str().unwrap_or_default().to_string();
        pipeline.receive(&id, body["data"].clone());
    }
    StatusCode::OK
}

async fn upsert_tenant(
    State(pipeline): State<Arc<FakeDeliveryPipeline>>,
    Path(tenant): Path<String>,
) -> (StatusCode, Json<Value>) {
    pipeline.tenants.lock().push(tenant.clone());
    (StatusCode::CREATED, Json(json!({ "id": tenant })))
}

async fn create_destination(
    Path(tenant): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["type"] != "webhook" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "unsupported type" })));
    }
    (StatusCode::CREATED, Json(json!({ "id": format!("des_{tenant}") })))
}

async fn service_event(
    Path((_tenant, event_id)): Path<(String, String)>,
) -> Json<Value> {
    Json(json!({ "id": event_id, "topic": "user.created", "time": INGESTED_AT }))
}

async fn receiver_event(
    State(pipeline): State<Arc<FakeDeliveryPipeline>>,
    Path(event_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    pipeline.receiver_hits.fetch_add(1, Ordering::SeqCst);
    pipeline
        .received
        .lock()
        .get(&event_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub fn router(pipeline: Arc<FakeDeliveryPipeline>) -> Router {
    Router::new()
        .route("/api/v1/publish", post(publish))
        .route("/api/v1/:tenant", put(upsert_tenant))
        .route("/api/v1/:tenant/destinations", post(create_destination))
        .route("/api/v1/:tenant/events/:event_id", get(service_event))
        .route("/events/:event_id", get(receiver_event))
        .with_state(pipeline)
}

pub async fn serve(pipeline: Arc<FakeDeliveryPipeline>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(pipeline).into_make_service()).await;
    });
    addr
}

/// Serve the pipeline from a dedicated thread, for tests that drive a whole run and so cannot be
/// inside a Tokio runtime themselves.
pub fn serve_in_background(pipeline: Arc<FakeDeliveryPipeline>) -> SocketAddr {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            tx.send(serve(pipeline).await).unwrap();
            std::future::pending::<()>().await;
        });
    });
    rx.recv().unwrap()
}

pub fn environment(addr: SocketAddr) -> EnvironmentConfig {
    let base = Url::parse(&format!("http://{addr}")).unwrap();
    EnvironmentConfig {
        name: "test".to_string(),
        api: ApiConfig {
            base_url: base.clone(),
            timeout: Duration::from_secs(5),
        },
        mock_webhook: MockWebhookConfig {
            url: base,
            destination_url: "http://mock-webhook:8080/webhook".to_string(),
            verification_poll_timeout: Duration::from_secs(5),
            verification_poll_interval: Duration::from_secs(1),
        },
        redis: "redis://unused".to_string(),
    }
}
