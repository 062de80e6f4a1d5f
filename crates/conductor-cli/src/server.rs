//! HTTP surface: `POST /api/chat` and `GET /health`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use conductor_agent::{ChatRequest, ErrorEnvelope, Orchestrator};
use conductor_core::ConductorError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = Arc::new(AppState { orchestrator });
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let model = state.orchestrator.model();
    Json(serde_json::json!({
        "status": "ok",
        "service": "conductor",
        "provider": model.provider.as_str(),
        "model": model.model_id,
    }))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Chat request rejected");
            return (rejection.status(), Json(rejected(&rejection))).into_response();
        }
    };

    // Dropped with the handler future when the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let user_id = request.user_id.clone();
    match state.orchestrator.handle(request, &cancel).await {
        Ok(response) => {
            info!(
                user_id = %user_id,
                conversation_id = %response.conversation_id,
                tools_executed = response.metadata.mcp_tools_executed,
                "Chat request completed"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(failure) => {
            warn!(user_id = %user_id, error = %failure.error, "Chat request failed");
            let status = status_for(&failure.error);
            (status, Json(failure.into_envelope())).into_response()
        }
    }
}

/// Envelope for a body that never reached the orchestrator.
fn rejected(rejection: &JsonRejection) -> ErrorEnvelope {
    ErrorEnvelope {
        success: false,
        error: rejection.body_text(),
        error_type: "invalid_request".into(),
        logs: Vec::new(),
    }
}

fn status_for(error: &ConductorError) -> StatusCode {
    match error {
        ConductorError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        ConductorError::CompletionProvider { .. } | ConductorError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        ConductorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
