//! HTTP and WebSocket surface for viewers
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | Liveness probe |
//! | `GET /api/sensors` | Sensor registry, in registry order |
//! | `GET /api/history/{sensor_id}` | History for one sensor, oldest-first |
//! | `GET /ws` | Live stream of `weather-update` events |

use crate::history::HistoryReader;
use crate::reading::{LiveEvent, Reading};
use crate::registry::{Sensor, SensorRegistry};
use crate::relay::BroadcastRelay;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: SensorRegistry,
    pub history: Arc<dyn HistoryReader>,
    pub relay: Arc<BroadcastRelay>,
    /// Per-session queue length before events are dropped for that session
    pub session_buffer: usize,
    pub shutdown: watch::Receiver<()>,
}

/// JSON body for failed requests
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/sensors - List the sensor registry
async fn list_sensors(State(state): State<AppState>) -> Json<Vec<Sensor>> {
    Json(state.registry.to_vec())
}

/// GET /api/history/{sensor_id} - Read one sensor's history
async fn get_history(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<Vec<Reading>>, (StatusCode, Json<ErrorResponse>)> {
    match state.history.read(&sensor_id).await {
        Ok(readings) => Ok(Json(readings)),
        Err(e) => {
            log::error!("History read failed for {}: {}", sensor_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// GET /ws - Upgrade to a live viewer session
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_viewer(socket, state))
}

async fn handle_viewer(socket: WebSocket, state: AppState) {
    let (id, mut rx) = state.relay.open_session(state.session_buffer);
    let (mut sink, mut stream) = socket.split();
    let mut shutdown = state.shutdown.clone();

    // Relay -> viewer
    let forward = async {
        while let Some(reading) = rx.recv().await {
            let text = match LiveEvent::WeatherUpdate(reading.as_ref().clone()).to_json() {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to encode event for session {}: {}", id, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                log::debug!("Send to session {} failed: {}", id, e);
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    };

    // Viewer -> server carries nothing but control frames
    let inbound = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    log::debug!("Session {} closed by viewer", id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Session {} read error: {}", id, e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        _ = inbound => {}
        _ = shutdown.changed() => {}
    }

    state.relay.unregister(id);
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    // Viewers may be served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/sensors", get(list_sensors))
        .route("/api/history/{sensor_id}", get(get_history))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until shutdown
pub async fn serve(
    listener: TcpListener,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut shutdown = state.shutdown.clone();
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            log::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

/// Run the HTTP server
pub async fn run_http_server(
    state: AppState,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    log::info!("HTTP server listening on port {}", port);

    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryError, HistoryWriter, MemoryHistory};
    use crate::reading::fixtures::reading;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct DownHistory;

    #[async_trait]
    impl HistoryReader for DownHistory {
        async fn read(&self, _sensor_id: &str) -> crate::history::Result<Vec<Reading>> {
            Err(HistoryError::Unavailable("connection refused".into()))
        }
    }

    fn state_with(history: Arc<dyn HistoryReader>) -> (AppState, watch::Sender<()>) {
        let (tx, rx) = watch::channel(());
        let state = AppState {
            registry: SensorRegistry::default(),
            history,
            relay: Arc::new(BroadcastRelay::new()),
            session_buffer: 8,
            shutdown: rx,
        };
        (state, tx)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _tx) = state_with(Arc::new(DownHistory));
        let response = create_router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_sensors_in_registry_order() {
        let (state, _tx) = state_with(Arc::new(DownHistory));
        let (status, body) = get_json(create_router(state), "/api/sensors").await;

        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec!["sensor-1", "sensor-2", "sensor-3", "sensor-4", "sensor-5"]
        );
    }

    #[tokio::test]
    async fn test_history_oldest_first() {
        let history = Arc::new(MemoryHistory::new(&SensorRegistry::default(), 10));
        for i in 0..3 {
            history
                .append("sensor-2", reading("sensor-2", i, i as f64))
                .unwrap();
        }
        let (state, _tx) = state_with(history);

        let (status, body) = get_json(create_router(state), "/api/history/sensor-2").await;

        assert_eq!(status, StatusCode::OK);
        let temps: Vec<f64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["temperature"].as_f64().unwrap())
            .collect();
        assert_eq!(temps, vec![0.0, 1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_unknown_sensor_history_is_empty() {
        let history = Arc::new(MemoryHistory::new(&SensorRegistry::default(), 10));
        let (state, _tx) = state_with(history);

        let (status, body) = get_json(create_router(state), "/api/history/sensor-99").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_history_backend_failure() {
        let (state, _tx) = state_with(Arc::new(DownHistory));

        let (status, body) = get_json(create_router(state), "/api/history/sensor-1").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }
}
