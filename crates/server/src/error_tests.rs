// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
    assert_eq!(ErrorCode::BadRequest.http_status(), 400);
    assert_eq!(ErrorCode::QueueFull.http_status(), 429);
    assert_eq!(ErrorCode::NoProvider.http_status(), 503);
    assert_eq!(ErrorCode::Internal.http_status(), 500);
}

#[test]
fn display_matches_wire_string() {
    assert_eq!(ErrorCode::QueueFull.to_string(), "QUEUE_FULL");
    assert_eq!(ErrorCode::Interrupted.as_str(), "INTERRUPTED");
}
