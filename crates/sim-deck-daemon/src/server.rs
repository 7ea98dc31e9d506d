//! HTTP transport for the touch deck.
//!
//! # Endpoints
//!
//! - `GET /` - Touch page
//! - `GET /health` - Backend and profile status
//! - `GET /api/buttons` - Buttons of the active profile (token)
//! - `POST /api/press` - Invoke `{id}`, `{combo}` or `{macro}` (token)
//! - `POST /invoke` - Alias of `/api/press` (token)
//!
//! The token is read from the `X-Token` header or the `token` query
//! parameter. An empty configured token disables the check.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sim_deck_config::ButtonDefinition;
use tower_http::trace::TraceLayer;

use crate::combo::ComboError;
use crate::gateway::{Invocation, InvocationGateway, InvocationRequest, InvokeError};

/// Header carrying the shared secret
pub const TOKEN_HEADER: &str = "x-token";

const INDEX_HTML: &str = include_str!("../assets/index.html");

// ============================================================================
// Application State
// ============================================================================

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<InvocationGateway>,
    /// Empty when authentication is disabled
    token: Arc<str>,
}

impl AppState {
    pub fn new(gateway: InvocationGateway, token: impl Into<String>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            token: Arc::from(token.into()),
        }
    }

    pub fn gateway(&self) -> &InvocationGateway {
        &self.gateway
    }

    pub fn auth_enabled(&self) -> bool {
        !self.token.is_empty()
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Body of a successful press.
#[derive(Debug, Serialize)]
pub struct PressResponse {
    pub ok: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combo: Option<String>,
    #[serde(rename = "macro", skip_serializing_if = "Option::is_none")]
    pub macro_name: Option<String>,
}

impl From<Invocation> for PressResponse {
    fn from(invocation: Invocation) -> Self {
        match invocation {
            Invocation::ComboExecuted(combo) => Self {
                ok: true,
                kind: "combo",
                combo: Some(combo),
                macro_name: None,
            },
            Invocation::MacroStarted(name) => Self {
                ok: true,
                kind: "macro",
                combo: None,
                macro_name: Some(name),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ButtonsResponse<'a> {
    pub profile: &'a str,
    pub buttons: &'a [ButtonDefinition],
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub profile: String,
    pub running_macros: usize,
}

/// Error body: `{"ok": false, "error": "..."}`
#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

/// An error response with its status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }
}

impl From<InvokeError> for ApiError {
    fn from(err: InvokeError) -> Self {
        let status = match &err {
            InvokeError::UnknownButton(_) | InvokeError::UnknownMacro(_) => StatusCode::NOT_FOUND,
            InvokeError::Malformed => StatusCode::BAD_REQUEST,
            // A bad token in a client-supplied combo is the client's fault
            InvokeError::Execution(ComboError::Resolve(_)) => StatusCode::BAD_REQUEST,
            InvokeError::Execution(ComboError::Press { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// `?token=` from the request URI; an unreadable query carries no token
fn query_token(request: &Request) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.token)
}

async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.auth_enabled() {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let supplied = header.or_else(|| query_token(&request));
    let authorized = supplied.as_deref() == Some(&*state.token);

    if !authorized {
        tracing::warn!(
            "Rejected {} {}: bad or missing token",
            request.method(),
            request.uri().path()
        );
        return Err(ApiError::unauthorized());
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = state.gateway();
    Json(HealthResponse {
        status: "ok",
        backend: gateway.backend_name(),
        profile: gateway.catalog().name().to_string(),
        running_macros: gateway.running_macros(),
    })
}

async fn list_buttons(State(state): State<AppState>) -> Response {
    let catalog = state.gateway().catalog();
    Json(ButtonsResponse {
        profile: catalog.name(),
        buttons: catalog.buttons(),
    })
    .into_response()
}

async fn press(State(state): State<AppState>, body: Bytes) -> Result<Json<PressResponse>, ApiError> {
    // Anything that is not a usable JSON object is treated as an empty request
    let request: InvocationRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        tracing::debug!("Unreadable press body: {}", e);
        InvocationRequest::default()
    });

    let invocation = state.gateway().invoke(request).await?;
    Ok(Json(invocation.into()))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/press", post(press))
        .route("/invoke", post(press))
        .route("/api/buttons", get(list_buttons))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::InjectError;
    use crate::keys::{resolve_combo, KeyId};
    use axum::body::Body;

    #[test]
    fn test_invoke_error_status_codes() {
        let status = |err: InvokeError| ApiError::from(err).status;

        assert_eq!(
            status(InvokeError::UnknownButton("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(InvokeError::UnknownMacro("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status(InvokeError::Malformed), StatusCode::BAD_REQUEST);

        let resolve = resolve_combo("ctrl+notakey").unwrap_err();
        assert_eq!(
            status(InvokeError::Execution(ComboError::Resolve(resolve))),
            StatusCode::BAD_REQUEST
        );

        let press = ComboError::Press {
            key: KeyId::Char('a'),
            source: InjectError::Backend("permission denied".into()),
        };
        assert_eq!(
            status(InvokeError::Execution(press)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_query_token() {
        let request = |uri: &str| {
            axum::http::Request::builder()
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(
            query_token(&request("/api/press?token=secret")).as_deref(),
            Some("secret")
        );
        assert_eq!(query_token(&request("/api/press?other=1")), None);
        assert_eq!(query_token(&request("/api/press")), None);
        // A repeated parameter does not deserialize; it counts as no token
        assert_eq!(query_token(&request("/api/press?token=x&token=y")), None);
    }

    #[test]
    fn test_press_response_shape() {
        let combo = serde_json::to_value(PressResponse::from(Invocation::ComboExecuted(
            "lctrl+home".into(),
        )))
        .unwrap();
        assert_eq!(
            combo,
            serde_json::json!({"ok": true, "type": "combo", "combo": "lctrl+home"})
        );

        let started =
            serde_json::to_value(PressResponse::from(Invocation::MacroStarted("cold_start".into())))
                .unwrap();
        assert_eq!(
            started,
            serde_json::json!({"ok": true, "type": "macro", "macro": "cold_start"})
        );
    }
}
