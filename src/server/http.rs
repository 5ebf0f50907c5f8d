//! HTTP listeners for the lifecycle gateway
//!
//! One router, mounted behind either exposure policy: a single
//! authenticated listener, or an internal (trusted, no auth) plus an
//! external (bearer-authenticated) pair. `/health` is always exempt
//! from auth.

use crate::config::{ExposureMode, HostConfig};
use crate::error::{HostError, HostResult};
use crate::plugin::LifecycleGateway;
use axum::{
    Json, Router,
    extract::{Multipart, Path, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Bearer-auth state for the external listener
#[derive(Clone)]
struct AuthState {
    token: Option<Arc<String>>,
}

/// Build the route set without authentication (internal listener)
pub fn internal_router(gateway: Arc<LifecycleGateway>) -> Router {
    base_router(gateway)
}

/// Build the route set behind bearer authentication (external listener)
///
/// `token == None` means protected access is disabled: every non-health
/// request is rejected rather than allowed through.
pub fn external_router(gateway: Arc<LifecycleGateway>, token: Option<String>) -> Router {
    let auth = AuthState {
        token: token.map(Arc::new),
    };
    base_router(gateway).layer(middleware::from_fn_with_state(auth, require_bearer))
}

fn base_router(gateway: Arc<LifecycleGateway>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/plugins", get(list_plugins))
        .route("/plugins", post(upload_plugin))
        .route("/plugins/{plugin_id}", delete(delete_plugin))
        .route("/health", get(health))
        .with_state(gateway)
        .layer(ServiceBuilder::new().layer(cors).into_inner())
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_plugins(State(gateway): State<Arc<LifecycleGateway>>) -> Json<Vec<String>> {
    Json(gateway.list_active())
}

async fn upload_plugin(
    State(gateway): State<Arc<LifecycleGateway>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, bytes::Bytes)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        match field.bytes().await {
            Ok(content) => {
                upload = Some((file_name, content));
                break;
            }
            Err(e) => {
                warn!("Failed to read upload body: {}", e);
                return (StatusCode::BAD_REQUEST, format!("Failed to read upload: {e}"))
                    .into_response();
            }
        }
    }

    let Some((file_name, content)) = upload else {
        return (StatusCode::BAD_REQUEST, "No file".to_string()).into_response();
    };

    info!("Uploading plugin package {}", file_name);
    match gateway.upload_and_activate(&file_name, &content).await {
        Ok(descriptor) => (
            StatusCode::OK,
            format!("Uploaded and started plugin: {}", descriptor.id),
        )
            .into_response(),
        Err(e) => {
            error!("Upload of {} failed: {}", file_name, e);
            error_response(e)
        }
    }
}

async fn delete_plugin(
    State(gateway): State<Arc<LifecycleGateway>>,
    Path(plugin_id): Path<String>,
) -> Response {
    match gateway.deactivate_and_remove(&plugin_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!("Delete of {} failed: {}", plugin_id, e);
            error_response(e)
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

fn error_response(err: HostError) -> Response {
    let status = match err {
        HostError::NotFound(_) => StatusCode::NOT_FOUND,
        HostError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        HostError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        HostError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

// ============================================================================
// Bearer authentication
// ============================================================================

async fn require_bearer(State(auth): State<AuthState>, request: Request, next: Next) -> Response {
    // Liveness checks stay public
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let Some(expected) = auth.token.as_deref() else {
        return unauthorized("AUTH_TOKEN is not configured");
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(request).await,
        Some(_) => {
            warn!("Unauthorized access attempt");
            unauthorized("Invalid token")
        }
        None => unauthorized("Missing Authorization header"),
    }
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, message.to_string()).into_response()
}

// ============================================================================
// Listener lifecycle
// ============================================================================

/// A bound, serving HTTP listener
///
/// Serving runs in a spawned task; `stop` aborts it.
pub struct HttpServer {
    local_addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl HttpServer {
    /// Bind `addr` and start serving `router`
    pub async fn start(addr: SocketAddr, router: Router) -> HostResult<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HostError::internal(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HostError::internal(e.to_string()))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("HTTP server error: {}", e);
            }
        });

        info!("HTTP server started on {}", local_addr);
        Ok(Self { local_addr, handle })
    }

    /// The address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving
    pub fn stop(self) {
        self.handle.abort();
        info!("HTTP server on {} stopped", self.local_addr);
    }
}

/// Start the listener(s) dictated by the configured exposure mode
pub async fn serve(
    config: &HostConfig,
    gateway: Arc<LifecycleGateway>,
) -> HostResult<Vec<HttpServer>> {
    let mut servers = Vec::new();
    match config.exposure {
        ExposureMode::SinglePortAuthenticated => {
            let router = external_router(gateway, config.auth_token.clone());
            let addr = SocketAddr::from(([0, 0, 0, 0], config.external_port));
            servers.push(HttpServer::start(addr, router).await?);
        }
        ExposureMode::DualPortSplitAuth => {
            let internal = internal_router(gateway.clone());
            let internal_addr = SocketAddr::from(([0, 0, 0, 0], config.internal_port));
            servers.push(HttpServer::start(internal_addr, internal).await?);

            let external = external_router(gateway, config.auth_token.clone());
            let external_addr = SocketAddr::from(([0, 0, 0, 0], config.external_port));
            servers.push(HttpServer::start(external_addr, external).await?);
        }
    }
    Ok(servers)
}
