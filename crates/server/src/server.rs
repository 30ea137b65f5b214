// Collection endpoint: REST routes plus a WebSocket request/reply channel

use crate::store::{EmployeeStore, StoreError};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt}; // For split() and next()
use protocol::{ClientMessage, Employee, ErrorKind, NewEmployee, Reply, ServerMessage};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

// Server state shared across connections
#[derive(Clone)]
pub struct ServerState {
    pub store: EmployeeStore,

    // Simulated network latency
    response_delay: Duration,
}

impl ServerState {
    pub fn new(store: EmployeeStore, response_delay: Duration) -> Self {
        ServerState {
            store,
            response_delay,
        }
    }

    async fn simulate_latency(&self) {
        if !self.response_delay.is_zero() {
            tokio::time::sleep(self.response_delay).await;
        }
    }
}

// Errors returned by the REST routes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("path id {path} does not match body id {body}")]
    IdMismatch { path: i64, body: i64 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Invalid => StatusCode::BAD_REQUEST,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::IdMismatch { .. } => StatusCode::BAD_REQUEST,
        };

        tracing::debug!("Request failed with {}: {}", status, self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    name: Option<String>,
}

// GET /employees[?name=]
async fn list_employees(
    State(state): State<ServerState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Employee>> {
    state.simulate_latency().await;
    Json(state.store.list(params.name.as_deref()).await)
}

// GET /employees/{id}
async fn get_employee(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<Employee>, ApiError> {
    state.simulate_latency().await;
    Ok(Json(state.store.get(id).await?))
}

// POST /employees
async fn create_employee(
    State(state): State<ServerState>,
    Json(new_employee): Json<NewEmployee>,
) -> Result<(StatusCode, Json<Employee>), ApiError> {
    state.simulate_latency().await;
    let employee = state.store.create(&new_employee.name).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

// PUT /employees/{id}
async fn update_employee(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(employee): Json<Employee>,
) -> Result<StatusCode, ApiError> {
    state.simulate_latency().await;
    if employee.id != id {
        return Err(ApiError::IdMismatch {
            path: id,
            body: employee.id,
        });
    }
    state.store.update(employee).await?;
    Ok(StatusCode::NO_CONTENT)
}

// DELETE /employees/{id}
async fn delete_employee(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.simulate_latency().await;
    state.store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Handle WebSocket upgrade
pub async fn websocket_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: ServerState) {
    let client_id = Uuid::new_v4();
    tracing::info!("New WebSocket connection: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // SEND TASK: ServerMessage -> JSON text frame
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize ServerMessage: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Receiving loop
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(client_msg) => {
                    // Each request runs on its own task, so replies may overtake each other
                    let state = state.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let ClientMessage {
                            request_id,
                            request,
                        } = client_msg;
                        tracing::debug!("[{}] request {}: {:?}", client_id, request_id, request);

                        state.simulate_latency().await;
                        let reply = state.store.handle(request).await;
                        let _ = tx.send(ServerMessage { request_id, reply });
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to parse ClientMessage from {}: {}", client_id, e);
                    let _ = tx.send(ServerMessage {
                        request_id: 0,
                        reply: Reply::error(
                            ErrorKind::Invalid,
                            format!("Invalid message format: {}", e),
                        ),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {} // Only text frames carry requests
        }
    }

    // Let in-flight replies drain before the writer stops
    drop(tx);
    let _ = send_task.await;
    tracing::info!("WebSocket connection closed: {}", client_id);
}

// Build the router for the collection endpoint
pub fn router(state: ServerState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/employees", get(list_employees).post(create_employee))
        .route(
            "/employees/{id}",
            get(get_employee)
                .put(update_employee)
                .delete(delete_employee),
        )
        .route("/ws", get(websocket_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Create and run the server
pub async fn create_server(state: ServerState, addr: SocketAddr) -> Result<()> {
    let app = router(state);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
