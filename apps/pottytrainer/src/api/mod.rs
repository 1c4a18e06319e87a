//! # Potty Trainer HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! Public:
//! - `GET /health` - Health check
//! - `POST /signin/external` - Exchange an external identity token for an API token
//!
//! Authenticated (`Authorization: Bearer <token>` or `?token=`), under `/api/v1`:
//! - `POST /eat`, `GET /eats`, `GET /eats/{id}/foods`
//! - `POST /poop`, `GET /poops`
//! - `POST /foods`, `POST /foods/{id}/names`, `POST /foods/{id}/ingredients`
//! - `GET /foods/{id}/closure`, `GET /foods/{id}/components`, `GET /foods/{id}/containing`
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `POTTY_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `POTTY_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{RejectingVerifier, auth_middleware, credential_from_parts};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    AddIngredientRequest, AddNameRequest, ApiError, ClosureResponse, CreateFoodRequest, EatJson,
    EatRequest, EffectiveFoodsResponse, ErrorResponse, ExternalSignInRequest, FoodNameJson,
    FoodResponse, HealthResponse, IngredientJson, PoopJson, PoopRequest, SignInResponse,
};

use crate::config::Config;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use pottytrainer_core::{Backend, IdentityVerifier, OpContext, PottyError};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state. Cheap to clone; the backend is shared read-only.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    /// External sign-in capability.
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Deadline for the store work of one request.
    pub request_timeout: Duration,
    /// Lifetime of tokens issued by sign-in.
    pub token_ttl: Option<chrono::Duration>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.backend)
            .field("provider", &self.verifier.provider())
            .field("request_timeout", &self.request_timeout)
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl AppState {
    /// State with the configured deadlines and a verifier that rejects every
    /// external assertion.
    #[must_use]
    pub fn new(backend: Arc<Backend>, config: &Config) -> Self {
        Self {
            backend,
            verifier: Arc::new(RejectingVerifier),
            request_timeout: config.request_timeout(),
            token_ttl: config.token_ttl(),
        }
    }

    /// Replace the external sign-in verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}

// =============================================================================
// BLOCKING STORE BRIDGE
// =============================================================================

/// Run synchronous store work on the blocking pool under the request
/// deadline.
///
/// The work sees an [`OpContext`] with the same deadline. If this future is
/// dropped or the deadline passes first, the context is cancelled and the
/// caller gets `Timeout` without waiting for the work to notice.
pub(crate) async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, PottyError>
where
    T: Send + 'static,
    F: FnOnce(&Backend, &OpContext) -> Result<T, PottyError> + Send + 'static,
{
    let ctx = OpContext::with_timeout(state.request_timeout);
    let _guard = ctx.cancel_guard();
    let backend = Arc::clone(&state.backend);

    let wait = ctx.remaining().unwrap_or(state.request_timeout);

    let task = tokio::task::spawn_blocking(move || work(&backend, &ctx));
    match tokio::time::timeout(wait, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(PottyError::Unavailable(format!("store task failed: {}", e))),
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.request_timeout.as_millis() as u64,
                "store work exceeded request deadline"
            );
            Err(PottyError::Timeout)
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `POTTY_CORS_ORIGINS` environment variable:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("POTTY_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (POTTY_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in POTTY_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No POTTY_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting - protects against DoS (if enabled)
/// 5. Authentication - `/api/v1` only; resolves the bearer token
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let journal = Router::new()
        .route("/eat", post(handlers::log_eat_handler))
        .route("/eats", get(handlers::list_eats_handler))
        .route("/eats/{id}/foods", get(handlers::effective_foods_handler))
        .route("/poop", post(handlers::log_poop_handler))
        .route("/poops", get(handlers::list_poops_handler))
        .route("/foods", post(handlers::create_food_handler))
        .route("/foods/{id}/names", post(handlers::add_name_handler))
        .route(
            "/foods/{id}/ingredients",
            post(handlers::add_ingredient_handler),
        )
        .route("/foods/{id}/closure", get(handlers::closure_handler))
        .route("/foods/{id}/components", get(handlers::components_handler))
        .route("/foods/{id}/containing", get(handlers::containing_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/signin/external", post(handlers::external_signin_handler))
        .nest("/api/v1", journal);

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), PottyError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PottyError::Unavailable(format!("Bind failed: {}", e)))?;

    tracing::info!("Potty Trainer HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| PottyError::Unavailable(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
