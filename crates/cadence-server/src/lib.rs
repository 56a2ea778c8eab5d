//! Cadence Web Server
//!
//! Axum-based REST API over the recurring-pattern engine.
//!
//! Every endpoint is scoped to a user id taken from the `X-Cadence-User`
//! header, falling back to a fixed id for single-user local deployments.
//! Error responses are sanitized: internal failures are logged in full and
//! reported to the client as a generic message.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use cadence_core::{AIBackend, AIClient, Database, Error as CoreError, RecurringEngine};

mod handlers;

/// Header carrying the caller's user id
const USER_ID_HEADER: &str = "x-cadence-user";

/// User id assumed when no header is present (single-user local deployments)
const DEFAULT_USER_ID: &str = "local";

/// Maximum transactions accepted in a single ingest request
pub const MAX_INGEST_BATCH: usize = 10_000;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as `Bearer <key>` in the Authorization header
    /// (empty = auth disabled)
    pub api_keys: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub engine: RecurringEngine,
    pub config: ServerConfig,
}

/// Extract the user id scoping a request
pub fn get_user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_USER_ID.to_string())
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Authentication middleware
///
/// When API keys are configured, every request must carry a valid key as a
/// `Bearer` token in the Authorization header. Keys are compared using
/// constant-time comparison to prevent timing attacks. With no keys
/// configured the server is open (single-user local deployments).
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.config.api_keys.is_empty() {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time
/// comparison to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() {
            if provided_bytes.ct_eq(key_bytes).into() {
                return true;
            }
        }
    }
    false
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    // Create AI client if configured
    let ai = AIClient::from_env();
    match ai {
        Some(ref client) => {
            info!(
                "AI backend configured: {} (model: {})",
                client.host(),
                client.model()
            );
        }
        None => {
            info!("AI backend not configured (set OLLAMA_HOST to enable AI analysis)");
        }
    }

    create_router_with_ai(db, config, ai)
}

/// Create the application router with an explicit AI client (for testing)
pub fn create_router_with_ai(db: Database, config: ServerConfig, ai: Option<AIClient>) -> Router {
    let state = Arc::new(AppState {
        engine: RecurringEngine::new(db, ai),
        config: config.clone(),
    });

    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Recurring overview and analysis
        .route("/recurring", get(handlers::get_recurring))
        .route("/recurring/analyze", post(handlers::analyze_recurring))
        .route(
            "/recurring/merchants/:merchant_key",
            get(handlers::analyze_merchant),
        )
        // Suggestions
        .route(
            "/recurring/suggestions",
            get(handlers::list_suggestions).post(handlers::apply_suggestion_actions),
        )
        // Manual patterns
        .route("/recurring/patterns", post(handlers::create_pattern))
        .route(
            "/recurring/patterns/:merchant_key",
            put(handlers::update_pattern).delete(handlers::remove_pattern),
        )
        // Income sources
        .route("/income-sources", get(handlers::list_income_sources))
        .route(
            "/income-sources/:merchant_key",
            axum::routing::delete(handlers::remove_income_source),
        )
        // Transactions
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::ingest_transactions),
        );

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        // Allow specified origins
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16, config: ServerConfig) -> anyhow::Result<()> {
    check_ai_connection().await;

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection() {
    match AIClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "AI backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "AI backend configured but not responding: {} (model: {}); analysis will fall back to the basic detector",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("AI backend not configured (set OLLAMA_HOST to enable AI analysis)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a core error to an HTTP status, keeping validation and lookup
    /// failures informative while sanitizing everything else
    pub fn from_core(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => Self::not_found(&msg),
            CoreError::InvalidInput(msg) => Self::bad_request(&msg),
            other => Self::from(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
