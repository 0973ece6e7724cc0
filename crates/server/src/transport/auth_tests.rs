// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(parsed) = value.parse() {
        headers.insert("authorization", parsed);
    }
    headers
}

#[test]
fn disabled_auth_accepts_anything() {
    assert!(validate_bearer(&HeaderMap::new(), None).is_ok());
    assert!(validate_ws_token(None, None).is_ok());
    assert!(validate_ws_token(Some("whatever"), None).is_ok());
}

#[test]
fn bearer_must_match() {
    assert!(validate_bearer(&headers_with("Bearer secret"), Some("secret")).is_ok());
    assert_eq!(
        validate_bearer(&headers_with("Bearer wrong"), Some("secret")),
        Err(ErrorCode::Unauthorized)
    );
    assert_eq!(
        validate_bearer(&HeaderMap::new(), Some("secret")),
        Err(ErrorCode::Unauthorized)
    );
    // Scheme matters.
    assert_eq!(
        validate_bearer(&headers_with("Basic secret"), Some("secret")),
        Err(ErrorCode::Unauthorized)
    );
}

#[test]
fn ws_token_must_match_when_required() {
    assert!(validate_ws_token(Some("secret"), Some("secret")).is_ok());
    assert_eq!(validate_ws_token(Some("nope"), Some("secret")), Err(ErrorCode::Unauthorized));
    assert_eq!(validate_ws_token(None, Some("secret")), Err(ErrorCode::Unauthorized));
}

#[test]
fn comparison_rejects_prefixes() {
    assert_eq!(validate_ws_token(Some("secre"), Some("secret")), Err(ErrorCode::Unauthorized));
    assert_eq!(validate_ws_token(Some("secretx"), Some("secret")), Err(ErrorCode::Unauthorized));
}
