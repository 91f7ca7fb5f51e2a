use crate::api::api_error::APIError;
use crate::api::model::{Empty, Envelope, PresentRequest, PresentResult};
use crate::api::server::AppState;
use crate::error::Error;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/present", post(present))
        .route("/cleanup", post(cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health() -> Json<Envelope<Empty>> {
    Json(Envelope::success(Empty {}))
}

async fn present(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<PresentRequest>, APIError>,
) -> Result<Json<Envelope<PresentResult>>, APIError> {
    if payload.token.is_empty() {
        tracing::debug!("rejected present with empty token");
        return Err(Error::EmptyToken.into());
    }
    state.challenge.present(&payload.token).await?;
    state.challenge.wait().await?;
    Ok(Json(Envelope::success(PresentResult {
        token: payload.token,
    })))
}

async fn cleanup(State(state): State<AppState>) -> Result<Json<Envelope<Empty>>, APIError> {
    state.challenge.clean_up().await?;
    Ok(Json(Envelope::success(Empty {})))
}
