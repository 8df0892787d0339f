use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::chunks::ChunkLimits;
use crate::config::{Config, CorsOrigins};
use crate::errors::Result;
use crate::ingest::{Ingestor, Transport};
use crate::metrics;
use crate::model::{DeviceRecord, MessageResponse, Reading, RegisterRequest, StatusResponse, Structure};
use crate::registry::SchemaRegistry;
use crate::store::DeviceStore;
use crate::ws::{ws_handler, RECEIVED_STATUS};

pub const ROOT_MESSAGE: &str = "HoloLens Communication Server is running";

#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<SchemaRegistry>,
    pub store: Arc<DeviceStore>,
    pub ingestor: Ingestor,
    pub ws_idle_timeout: Duration,
    pub chunk_limits: ChunkLimits,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(SchemaRegistry::new());
        let store = Arc::new(DeviceStore::new(config.store_policy));
        let ingestor = Ingestor::new(registry.clone(), store.clone(), config.ingest_validation);
        Self {
            registry,
            store,
            ingestor,
            ws_idle_timeout: config.ws_idle_timeout,
            chunk_limits: config.chunk_limits(),
        }
    }
}

/// Every route the server exposes, HTTP and WebSocket, with CORS, tracing
/// and the request timeout applied.
pub fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/hololens/data", post(receive_data))
        .route("/hololens/data/:device_id", get(get_data))
        .route("/message-types", get(list_message_types).post(add_message_type))
        .route("/message-types/:name", get(get_message_type))
        .route("/ws/hololens", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        // tower-http refuses a wildcard inside an origin list.
        CorsOrigins::List(list) if list.iter().any(|o| o.trim() == "*") => layer.allow_origin(Any),
        CorsOrigins::List(list) => {
            let parsed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("Skipping CORS origin {:?}: {}", origin, e);
                        None
                    }
                })
                .collect();
            layer.allow_origin(parsed)
        }
    }
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: ROOT_MESSAGE.to_string(),
    })
}

async fn receive_data(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Reading>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let Json(reading) = payload?;
    state.ingestor.ingest(reading, Transport::Http)?;
    Ok(Json(StatusResponse {
        status: RECEIVED_STATUS.to_string(),
    }))
}

async fn get_data(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceRecord>> {
    state.store.get(&device_id).map(Json)
}

async fn add_message_type(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let Json(request) = payload?;
    let message_type = request.into_message_type()?;
    state
        .registry
        .register(&message_type.name, message_type.structure)?;
    Ok(Json(StatusResponse {
        status: format!("Message type '{}' added successfully", message_type.name),
    }))
}

async fn list_message_types(State(state): State<AppState>) -> Json<BTreeMap<String, Structure>> {
    Json(state.registry.list())
}

async fn get_message_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Structure>> {
    state.registry.get(&name).map(Json)
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

/// Binds `config.http_addr` and serves until `shutdown` resolves.
pub async fn serve<F>(config: Config, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(&config);
    info!(
        "Store policy: {}, ingest validation: {}",
        state.store.policy(),
        state.ingestor.validation()
    );
    let app = create_router(state, &config);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("HTTP server listening on {}", config.http_addr);
    info!("WebSocket endpoint: ws://{}/ws/hololens", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
