#[derive(Debug, serde::Deserialize)]
struct QuestAvailableQuery {
    #[serde(rename = "settlementId")]
    settlement_id: String,
}

async fn quest_available(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<QuestAvailableQuery>,
) -> Response {
    let session_id = resolve_session_id(&headers);
    let response = state
        .manager
        .quest_available(&session_id, &query.settlement_id)
        .await;
    json_with_session(&session_id, &response)
}

async fn quest_accept(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QuestAcceptRequest>,
) -> Response {
    let session_id = resolve_session_id(&headers);
    let response = state
        .manager
        .quest_accept(&session_id, &request.quest_id, request.npc_id.as_deref())
        .await;
    json_with_session(&session_id, &response)
}

async fn quest_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QuestProgressRequest>,
) -> Response {
    let session_id = resolve_session_id(&headers);
    let response = state
        .manager
        .quest_progress(&session_id, &request.quest_id, request.step)
        .await;
    json_with_session(&session_id, &response)
}

async fn quest_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QuestCompleteRequest>,
) -> Response {
    let session_id = resolve_session_id(&headers);
    let response = state
        .manager
        .quest_complete(&session_id, &request.quest_id)
        .await;
    json_with_session(&session_id, &response)
}

async fn quest_active(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session_id = resolve_session_id(&headers);
    let response = state.manager.quest_active(&session_id).await;
    json_with_session(&session_id, &response)
}
