async fn save_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SaveRequest>,
) -> Response {
    let Some(session_id) = header_session_id(&headers) else {
        return HttpApiError::missing_session_id().into_response();
    };
    let response = state
        .manager
        .save_state(&session_id, &request.save_name, request.game_state)
        .await;
    json_with_session(&session_id, &response)
}

async fn load_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<contracts::api::LoadRequest>,
) -> Response {
    let Some(session_id) = header_session_id(&headers) else {
        return HttpApiError::missing_session_id().into_response();
    };
    let response = state.manager.load_state(&session_id, &request.save_name).await;
    json_with_session(&session_id, &response)
}

async fn new_save_name(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_session_id(&headers) else {
        return HttpApiError::missing_session_id().into_response();
    };
    let response = state.manager.new_save_name(&session_id).await;
    json_with_session(&session_id, &response)
}

async fn list_saves(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_session_id(&headers) else {
        return HttpApiError::missing_session_id().into_response();
    };
    let response = state.manager.list_saves(&session_id).await;
    json_with_session(&session_id, &response)
}
