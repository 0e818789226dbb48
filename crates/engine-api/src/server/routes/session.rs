async fn init_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Option<Json<InitRequest>>,
) -> Response {
    let session_id = resolve_session_id(&headers);
    let Json(body) = request.unwrap_or(Json(InitRequest {
        prompt: None,
        seed: None,
    }));
    let response = state
        .manager
        .init_session(&session_id, body.prompt, body.seed)
        .await;
    json_with_session(&session_id, &response)
}

async fn reset_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Option<Json<InitRequest>>,
) -> Response {
    init_session(State(state), headers, request).await
}

async fn narrate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NarrateRequest>,
) -> Response {
    let session_id = resolve_session_id(&headers);
    let response = state.manager.narrate(&session_id, &request.action).await;
    json_with_session(&session_id, &response)
}

async fn get_status(State(state): State<AppState>) -> Response {
    let status = state.manager.status().await;
    Json(status).into_response()
}
