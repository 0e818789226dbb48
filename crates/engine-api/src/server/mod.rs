use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use uuid::Uuid;

use contracts::api::{
    InitRequest, NarrateRequest, QuestAcceptRequest, QuestCompleteRequest, QuestProgressRequest,
    SaveRequest, SESSION_HEADER,
};
use contracts::{ApiError, ErrorCode};

use crate::SessionManager;

include!("error.rs");
include!("state.rs");
include!("routes/session.rs");
include!("routes/saves.rs");
include!("routes/quest.rs");
include!("util.rs");

pub async fn serve(addr: SocketAddr) -> Result<(), ServerError> {
    let state = AppState::new(SessionManager::from_env());
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/init", post(init_session))
        .route("/reset", post(reset_session))
        .route("/narrate", post(narrate))
        .route("/status", get(get_status))
        .route("/api/save", post(save_game))
        .route("/api/load", post(load_game))
        .route("/api/newsave", get(new_save_name))
        .route("/api/saves", get(list_saves))
        .route("/quest/available", get(quest_available))
        .route("/quest/accept", post(quest_accept))
        .route("/quest/progress", post(quest_progress))
        .route("/quest/complete", post(quest_complete))
        .route("/quest/active", get(quest_active))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
