fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-expose-headers"),
        HeaderValue::from_static("x-session-id"),
    );
}

fn header_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolves the session id from `X-Session-Id`, generating one when the
/// header is absent. Every turn response echoes the resolved id.
fn resolve_session_id(headers: &HeaderMap) -> String {
    header_session_id(headers).unwrap_or_else(|| format!("sess_{}", Uuid::new_v4()))
}

fn json_with_session<T: Serialize>(session_id: &str, payload: &T) -> Response {
    let mut response = Json(
        serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({})),
    )
    .into_response();
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-session-id"), value);
    }
    response
}
