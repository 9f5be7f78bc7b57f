//! HTTP transport exposing the execution sandbox.
//!
//! ## Endpoints
//!
//! - `POST /execute` - Compile and run code
//! - `GET /languages` - Supported languages and starter templates
//! - `GET /health` - Health check with execution counters
//! - `GET /` - Liveness message

use crate::log::{self, ExecutionLog, ExecutionRecord};
use crate::types::{ExecuteRequest, ExecutionResponse, HealthResponse, LanguageInfo, RootResponse};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use kiln_core::Sandbox;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    sandbox: Sandbox,
    log: Arc<dyn ExecutionLog>,
    languages: Arc<Vec<LanguageInfo>>,
}

impl AppState {
    /// Create state from a sandbox and an execution log.
    ///
    /// Toolchain availability is checked here, once, with a `PATH` search
    /// per profile. `GET /languages` serves this snapshot.
    pub fn new(sandbox: Sandbox, log: Arc<dyn ExecutionLog>) -> Self {
        let registry = sandbox.registry();
        let languages: Vec<LanguageInfo> = registry
            .profiles()
            .iter()
            .map(|profile| LanguageInfo::new(profile, registry.is_available(profile)))
            .collect();
        Self {
            sandbox,
            log,
            languages: Arc::new(languages),
        }
    }

    /// Get the sandbox.
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Languages as listed by `GET /languages`.
    pub fn languages(&self) -> &[LanguageInfo] {
        &self.languages
    }
}

/// Build the HTTP router.
///
/// The returned router can be served directly with axum or composed
/// into a larger application.
pub fn build_router(state: AppState, body_limit: usize) -> Router {
    tracing::debug!(body_limit, "Building HTTP router");

    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/languages", get(languages_handler))
        .route("/execute", post(execute_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::debug!("HTTP router built with routes: /, /health, /languages, /execute");
    router
}

/// Root endpoint.
async fn root_handler() -> Json<RootResponse> {
    tracing::trace!("Root request");
    Json(RootResponse {
        message: "Server is running".to_string(),
    })
}

/// Health check endpoint.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    tracing::trace!("Health check request");
    Json(HealthResponse {
        status: "healthy",
        service: "kiln-server",
        stats: state.sandbox.stats().snapshot(),
    })
}

/// List registered languages.
async fn languages_handler(State(state): State<AppState>) -> Json<Vec<LanguageInfo>> {
    tracing::debug!(count = state.languages.len(), "Listing languages");
    Json(state.languages.as_ref().clone())
}

/// Compile and run code.
///
/// Every pipeline outcome is a 200; only malformed bodies are rejected.
async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Json<ExecutionResponse> {
    tracing::debug!(
        language = %request.language,
        code_len = request.code.len(),
        "Execute request"
    );
    let language = request.language.clone();
    let code_len = request.code.len();

    let result = state.sandbox.execute(request.into()).await;

    log::dispatch(&state.log, ExecutionRecord::new(language, code_len, &result));
    Json(result.into())
}

/// Start the HTTP server.
///
/// This function runs until the server is shut down via the provided
/// shutdown signal.
pub async fn serve(
    state: AppState,
    addr: std::net::SocketAddr,
    body_limit: usize,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let router = build_router(state, body_limit);

    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::debug!(%addr, "TCP listener bound");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::TracingLog;
    use kiln_core::SandboxConfig;

    #[test]
    fn test_build_router() {
        let sandbox = Sandbox::new(SandboxConfig::default()).unwrap();
        let state = AppState::new(sandbox, Arc::new(TracingLog));
        let _router = build_router(state, 1024);
        // Router builds without panic
    }

    #[test]
    fn test_languages_snapshot_matches_registry() {
        let sandbox = Sandbox::new(SandboxConfig::default()).unwrap();
        let state = AppState::new(sandbox.clone(), Arc::new(TracingLog));
        let registry = sandbox.registry();

        assert_eq!(state.languages().len(), registry.len());
        for (info, profile) in state.languages().iter().zip(registry.profiles()) {
            assert_eq!(info.id, profile.id);
            assert_eq!(info.available, registry.is_available(profile));
        }

        // Clones share the snapshot rather than re-probing.
        let clone = state.clone();
        assert!(Arc::ptr_eq(&state.languages, &clone.languages));
    }
}
