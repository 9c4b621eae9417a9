use crate::app::dispatch::Dispatcher;
use crate::core::error::{Error, ErrorKind};
use crate::core::generation::{GenerationRequest, GenerationResult};
use crate::core::model::ModelInfo;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/model-info/:model_name", get(model_info))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

pub async fn serve<F>(listener: TcpListener, dispatcher: Dispatcher, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server on {} stopped", addr);
    Ok(())
}

pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding HTTP listener on {}: {}", addr, e))
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn from_error(dispatcher: &Dispatcher, err: Error) -> Self {
        let status = status_for(dispatcher.classify(&err));
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %err, "request failed");
        }
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidRequest => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::LoadFailed | ErrorKind::InferenceFailed | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn generate(
    State(dispatcher): State<Dispatcher>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResult>, ApiError> {
    let Json(req) = body?;
    dispatcher
        .generate(req)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&dispatcher, e))
}

async fn model_info(
    State(dispatcher): State<Dispatcher>,
    Path(model_name): Path<String>,
) -> Result<Json<ModelInfo>, ApiError> {
    dispatcher
        .model_info(&model_name)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&dispatcher, e))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    default_model: String,
    loaded_models: Vec<String>,
}

async fn health(State(dispatcher): State<Dispatcher>) -> Json<Health> {
    let service = dispatcher.service();
    Json(Health {
        status: "ok",
        default_model: service.default_model().to_string(),
        loaded_models: service.registry().loaded(),
    })
}
