use crate::audit::DecisionLog;
use crate::coalescer::{OutputCoalescer, DEFAULT_COALESCE};
use crate::connection::{Connection, ConnectionManager};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ApprovalRegistry, RegistryError};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Request, State, WebSocketUpgrade,
    },
    http::StatusCode,
    middleware as axum_mw,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::approval::{ApprovalOutcome, HookEvent};
use warden_pairing::{PairingAuthenticator, PairingEndpoint};

/// Gateway-level settings the handlers need at runtime.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Name shown to operator devices during pairing.
    pub gateway_name: String,
    /// Raw public key bytes, fingerprinted into the pairing payload.
    pub public_key: Vec<u8>,
    /// How the operator device reaches this gateway.
    pub endpoint: PairingEndpoint,
    /// How long a hook may wait before the registry times it out.
    pub approval_timeout: Duration,
    /// Output batching interval.
    pub coalesce_interval: Duration,
    /// Where decision logs go; `None` disables the on-disk log.
    pub data_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_name: "warden".to_string(),
            public_key: Vec::new(),
            endpoint: PairingEndpoint::Direct {
                host: "127.0.0.1".to_string(),
                port: 4750,
            },
            approval_timeout: Duration::from_secs(300),
            coalesce_interval: DEFAULT_COALESCE,
            data_dir: None,
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub registry: ApprovalRegistry,
    pub authenticator: PairingAuthenticator,
    pub connections: Arc<ConnectionManager>,
    pub coalescer: OutputCoalescer,
    pub decisions: Option<DecisionLog>,
    pub config: GatewayConfig,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway router.
    ///
    /// Serve the result with
    /// `into_make_service_with_connect_info::<SocketAddr>()`; the pairing
    /// guard and per-source rate limiting need the peer address.
    pub fn build(config: GatewayConfig, authenticator: PairingAuthenticator) -> Router {
        Self::build_with_state(config, authenticator).0
    }

    /// Build the router and also hand back the shared state, for callers
    /// that flush the output pipeline on shutdown.
    pub fn build_with_state(
        config: GatewayConfig,
        authenticator: PairingAuthenticator,
    ) -> (Router, Arc<AppState>) {
        let connections = ConnectionManager::new();
        let (coalescer, mut frames) = OutputCoalescer::new(config.coalesce_interval);
        let decisions = config
            .data_dir
            .as_ref()
            .map(|dir| DecisionLog::new(dir.clone()));

        // Forward coalesced frames to every authenticated operator.
        {
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Some(data) = frames.recv().await {
                    let msg = ServerMessage::Output { data };
                    connections.broadcast(&msg.to_json()).await;
                }
            });
        }

        let state = Arc::new(AppState {
            registry: ApprovalRegistry::new(),
            authenticator,
            connections,
            coalescer,
            decisions,
            config,
        });

        let pairing = Router::new()
            .route("/pairing", get(pairing_handler))
            .route("/pairing/rotate", post(rotate_handler))
            .route_layer(axum_mw::from_fn(loopback_guard));

        let app = Router::new()
            .route("/hook", post(hook_handler))
            .route("/session/end", post(session_end_handler))
            .route("/output", post(output_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .merge(pairing)
            .with_state(state.clone());

        (app, state)
    }
}

/// Pairing material and rotation are operator-console actions; only the
/// local machine may call them.
async fn loopback_guard(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if addr.ip().is_loopback() {
        next.run(request).await
    } else {
        warn!(peer = %addr, "Rejected non-loopback pairing request");
        (StatusCode::FORBIDDEN, "Pairing endpoints are local only").into_response()
    }
}

async fn health_handler() -> impl IntoResponse {
    serde_json::json!({"status": "ok", "service": "warden"}).to_string()
}

/// Suspends the caller until the request is approved, denied, timed out,
/// or cancelled with its session. The response body is the outcome the
/// hook launcher maps onto its exit status.
async fn hook_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<HookEvent>,
) -> Response {
    let rx = match state
        .registry
        .register(
            &event.request_id,
            &event.session_id,
            state.config.approval_timeout,
        )
        .await
    {
        Ok(rx) => rx,
        Err(RegistryError::DuplicateRequest(id)) => {
            let body = serde_json::json!({
                "error": format!("request '{id}' is already pending"),
            });
            return (StatusCode::CONFLICT, Json(body)).into_response();
        }
    };

    let prompt = ServerMessage::ApprovalRequest {
        request_id: event.request_id.clone(),
        session_id: event.session_id.clone(),
        tool_name: event.tool_name.clone(),
        description: event.description.clone(),
    };
    info!(request_id = %event.request_id, "Broadcasting approval request");
    state.connections.broadcast(&prompt.to_json()).await;

    let outcome = match rx.await {
        Ok(outcome) => outcome,
        Err(_) => ApprovalOutcome::denied("Approval channel closed unexpectedly"),
    };

    if let Some(log) = &state.decisions {
        log.record(
            &event.request_id,
            &event.session_id,
            event.tool_name.clone(),
            &outcome,
        );
    }
    Json(outcome).into_response()
}

#[derive(Debug, Deserialize)]
struct SessionEnd {
    session_id: String,
}

/// Cancels every pending approval of the named session and flushes any
/// buffered output so the operator sees the session's tail.
async fn session_end_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionEnd>,
) -> impl IntoResponse {
    let cancelled = state.registry.cancel_session(&req.session_id).await;
    state.coalescer.flush().await;

    let notice = ServerMessage::SessionEnded {
        session_id: req.session_id.clone(),
        cancelled,
    };
    state.connections.broadcast(&notice.to_json()).await;
    Json(serde_json::json!({"cancelled": cancelled}))
}

/// Raw terminal output from the agent process. Batched, not echoed back.
/// Terminal streams can split multi-byte sequences across chunks, so
/// decode lossily instead of rejecting.
async fn output_handler(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    state.coalescer.push(&String::from_utf8_lossy(&body)).await;
    StatusCode::ACCEPTED
}

async fn pairing_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let payload = state
        .authenticator
        .issue_payload(
            &state.config.gateway_name,
            &state.config.public_key,
            state.config.endpoint.clone(),
        )
        .await;
    Json(payload)
}

/// Rotate the shared secret and answer with the fresh pairing payload,
/// so the caller can re-render it in one round trip.
async fn rotate_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.authenticator.regenerate_secret().await {
        Ok(()) => {
            info!("Pairing secret rotated");
            let payload = state
                .authenticator
                .issue_payload(
                    &state.config.gateway_name,
                    &state.config.public_key,
                    state.config.endpoint.clone(),
                )
                .await;
            Json(payload).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Secret rotation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    use futures_util::{SinkExt, StreamExt};

    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages back to the WebSocket
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state
        .connections
        .add(Connection {
            id: connection_id,
            authenticated: false,
            tx: tx.clone(),
        })
        .await;
    info!(connection_id = %connection_id, peer = %addr, "WebSocket connected");

    let welcome = ServerMessage::Connected {
        connection_id: connection_id.to_string(),
    };
    let _ = tx.send(welcome.to_json());

    // Task: forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Task: receive client messages and act on them
    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_message(&recv_state, connection_id, addr, &text).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.connections.remove(connection_id).await;
    info!(connection_id = %connection_id, "WebSocket disconnected");
}

async fn handle_client_message(
    state: &Arc<AppState>,
    connection_id: Uuid,
    addr: SocketAddr,
    text: &str,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let reply = ServerMessage::Error {
                message: format!("Unrecognized message: {e}"),
            };
            state.connections.send_to(connection_id, &reply.to_json()).await;
            return;
        }
    };

    match msg {
        ClientMessage::Auth { code } => {
            let accepted = state.authenticator.verify_code(&code, addr.ip()).await;
            let reply = if accepted {
                state.connections.mark_authenticated(connection_id).await;
                ServerMessage::AuthOk
            } else {
                ServerMessage::AuthRejected
            };
            state.connections.send_to(connection_id, &reply.to_json()).await;
        }
        ClientMessage::Approve { request_id } => {
            if !require_auth(state, connection_id).await {
                return;
            }
            let delivered = state.registry.approve(&request_id).await;
            let ack = ServerMessage::Ack {
                request_id,
                delivered,
            };
            state.connections.send_to(connection_id, &ack.to_json()).await;
        }
        ClientMessage::Deny { request_id, reason } => {
            if !require_auth(state, connection_id).await {
                return;
            }
            let delivered = state.registry.deny(&request_id, reason).await;
            let ack = ServerMessage::Ack {
                request_id,
                delivered,
            };
            state.connections.send_to(connection_id, &ack.to_json()).await;
        }
    }
}

/// Decision messages from an unauthenticated connection get an error
/// reply and are otherwise ignored.
async fn require_auth(state: &Arc<AppState>, connection_id: Uuid) -> bool {
    if state.connections.is_authenticated(connection_id).await {
        return true;
    }
    warn!(connection_id = %connection_id, "Decision from unauthenticated connection");
    let reply = ServerMessage::Error {
        message: "Authentication required".to_string(),
    };
    state.connections.send_to(connection_id, &reply.to_json()).await;
    false
}
