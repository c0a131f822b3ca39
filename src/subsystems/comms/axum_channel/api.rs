//! Axum handlers for the web API.
//!
//! Errors use one JSON shape: `{ "error": code, "message": text }`.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::models::{Question, is_valid_user_id};
use crate::subsystems::assistant::AskOutcome;
use crate::subsystems::pipeline::{Node, preview};
use crate::subsystems::spec_kit::SpecKitError;

use super::AxumState;

const MAX_HISTORY_LIMIT: usize = 100;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub(super) struct SpecRequest {
    description: String,
}

#[derive(Serialize)]
struct LastRun {
    node: Node,
    at: chrono::DateTime<chrono::Utc>,
    commits_analyzed: usize,
    error: Option<String>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn json_error(status: StatusCode, code: &str, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": code, "message": format!("{msg}") }))).into_response()
}

fn spec_error(e: SpecKitError) -> Response {
    match e {
        SpecKitError::InvalidInput(m) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", m),
        SpecKitError::NotFound(m) => json_error(StatusCode::NOT_FOUND, "not_found", m),
        e @ SpecKitError::Llm(_) => json_error(StatusCode::BAD_GATEWAY, "llm_error", e),
        e @ SpecKitError::Io { .. } => {
            warn!("spec kit io failure: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e)
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /
pub(super) async fn root(State(state): State<AxumState>) -> Response {
    info!(channel_id = %state.channel_id, "root endpoint accessed");
    Json(json!({
        "message": "GitHub Activity Bot",
        "name": state.comms.bot_name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

/// GET /health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    info!(channel_id = %state.channel_id, "health check requested");
    Json(state.comms.health().await).into_response()
}

/// POST /ask
pub(super) async fn ask(
    State(state): State<AxumState>,
    payload: Result<Json<Question>, JsonRejection>,
) -> Response {
    let question = match payload {
        Ok(Json(q)) => q,
        Err(rejection) => {
            return json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", rejection.body_text());
        }
    };
    if let Err(reason) = question.validate() {
        return json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", reason);
    }
    info!(
        channel_id = %state.channel_id,
        user_id = %question.user_id,
        question = %preview(&question.question),
        "api ask request"
    );

    match state.comms.ask(&question.user_id, &question.question).await {
        AskOutcome::Answered(answer) => {
            info!(user_id = %question.user_id, "api ask completed");
            (StatusCode::OK, Json(answer)).into_response()
        }
        AskOutcome::NoCommits { hours } => json_error(
            StatusCode::NOT_FOUND,
            "no_commits",
            format!("No commits in last {hours} hours"),
        ),
        AskOutcome::Failed(e) => {
            warn!(user_id = %question.user_id, "pipeline error: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "pipeline_error", e)
        }
        AskOutcome::TimedOut => json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", "pipeline timed out"),
    }
}

/// GET /history/{user_id}?limit=N
pub(super) async fn history(
    State(state): State<AxumState>,
    Path(user_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(q)) => q,
        Err(rejection) => {
            return json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", rejection.body_text());
        }
    };
    if !is_valid_user_id(&user_id) {
        return json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", "invalid user_id");
    }
    let limit = query
        .limit
        .unwrap_or(state.comms.history_limit())
        .clamp(1, MAX_HISTORY_LIMIT);

    match state.comms.history(&user_id, limit).await {
        Ok(entries) => {
            let last_run = state.comms.last_run(&user_id).await.map(|c| LastRun {
                node: c.node,
                at: c.at,
                commits_analyzed: c.state.commits_analyzed,
                error: c.state.error,
            });
            Json(json!({ "user_id": user_id, "entries": entries, "last_run": last_run })).into_response()
        }
        Err(e) => {
            warn!(%user_id, "history lookup failed: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e)
        }
    }
}

/// GET /specs
pub(super) async fn list_specs(State(state): State<AxumState>) -> Response {
    match state.comms.spec_kit().list_features().await {
        Ok(features) => Json(json!({ "features": features })).into_response(),
        Err(e) => spec_error(e),
    }
}

/// POST /specs
pub(super) async fn create_spec(
    State(state): State<AxumState>,
    payload: Result<Json<SpecRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(r)) => r,
        Err(rejection) => {
            return json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", rejection.body_text());
        }
    };
    match state.comms.spec_kit().specify(&req.description).await {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(e) => spec_error(e),
    }
}

/// POST /specs/{feature}/plan
pub(super) async fn plan_spec(State(state): State<AxumState>, Path(feature): Path<String>) -> Response {
    match state.comms.spec_kit().plan(&feature).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => spec_error(e),
    }
}

/// POST /specs/{feature}/tasks
pub(super) async fn task_spec(State(state): State<AxumState>, Path(feature): Path<String>) -> Response {
    match state.comms.spec_kit().task(&feature).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => spec_error(e),
    }
}

/// POST /discord/interactions
#[cfg(feature = "channel-discord")]
pub(super) async fn discord_interactions(
    State(state): State<AxumState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    match state.discord {
        Some(bot) => bot.handle(&headers, &body).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
