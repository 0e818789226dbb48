use super::*;

#[test]
fn session_id_resolution_prefers_the_header() {
    let mut headers = HeaderMap::new();
    headers.insert(SESSION_HEADER, HeaderValue::from_static("sess_known"));
    assert_eq!(resolve_session_id(&headers), "sess_known");

    let generated = resolve_session_id(&HeaderMap::new());
    assert!(generated.starts_with("sess_"));
    assert_ne!(generated, resolve_session_id(&HeaderMap::new()));
}

#[test]
fn blank_header_counts_as_absent() {
    let mut headers = HeaderMap::new();
    headers.insert(SESSION_HEADER, HeaderValue::from_static("   "));
    assert_eq!(header_session_id(&headers), None);
}

#[test]
fn missing_session_error_uses_the_stable_code() {
    let error = HttpApiError::missing_session_id();
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error.error_code, ErrorCode::MissingSessionId);
}

#[test]
fn responses_echo_the_resolved_session_id() {
    let response = json_with_session("sess_echo", &serde_json::json!({ "ok": true }));
    assert_eq!(
        response
            .headers()
            .get("x-session-id")
            .and_then(|value| value.to_str().ok()),
        Some("sess_echo")
    );
}
