// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_starts_uncancelled() {
    let token = CancelToken::new();
    assert!(!token.is_cancelled());
}

#[tokio::test]
async fn test_cancel_is_observable_and_idempotent() {
    let token = CancelToken::new();
    token.cancel();
    token.cancel();
    assert!(token.is_cancelled());
    // Already-fired tokens resolve immediately
    tokio::time::timeout(Duration::from_millis(100), token.cancelled())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_clones_share_the_signal() {
    let token = CancelToken::new();
    let clone = token.clone();

    let waiter = tokio::spawn(async move { clone.cancelled().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_unfired_token_never_resolves() {
    let token = CancelToken::new();
    let result =
        tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
    assert!(result.is_err());
}
