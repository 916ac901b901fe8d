//! HTTP surface of a camera process
//!
//! `GET /health` reports whether the worker loop is alive. When streaming is
//! enabled, `GET /ws/{camera_id}` mirrors every published payload to a
//! WebSocket client.

use crate::service::CameraService;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// JSON response for `GET /health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub camera: String,
    pub worker_running: bool,
}

#[derive(Clone)]
struct EndpointState {
    service: Arc<CameraService>,
}

async fn health(State(state): State<EndpointState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        camera: state.service.camera_id().to_string(),
        worker_running: state.service.is_running(),
    })
}

async fn stream_detections(
    Path(camera_id): Path<String>,
    State(state): State<EndpointState>,
    ws: WebSocketUpgrade,
) -> Response {
    if camera_id != state.service.camera_id() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(stream) = state.service.stream() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let rx = stream.subscribe();
    log::info!("Stream client connected to {}", camera_id);
    ws.on_upgrade(move |socket| forward_payloads(socket, rx, camera_id))
}

async fn forward_payloads(socket: WebSocket, mut rx: broadcast::Receiver<String>, camera_id: String) {
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            payload = rx.recv() => match payload {
                Ok(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("[{}] Stream client skipped {} payloads", camera_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    log::info!("Stream client disconnected from {}", camera_id);
}

/// Build the router for a camera process
pub fn create_router(service: Arc<CameraService>) -> Router {
    let streaming = service.stream().is_some();
    let router = Router::new().route("/health", get(health));
    let router = if streaming {
        router.route("/ws/{camera_id}", get(stream_detections))
    } else {
        router
    };
    router.with_state(EndpointState { service })
}

/// Serve the endpoint until `shutdown` resolves
pub async fn serve(
    service: Arc<CameraService>,
    bind_host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind_host, port)).await?;
    serve_on(listener, service, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    service: Arc<CameraService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    log::info!(
        "Endpoint for {} listening on {}",
        service.camera_id(),
        listener.local_addr()?
    );
    let app = create_router(service);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
