// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

const SALT: [u8; SALT_LEN] = *b"0123456789abcdef";

#[test]
fn test_set_then_get_all_round_trips() {
    let dir = tempdir().unwrap();
    let store = SecretsStore::for_stack(dir.path());

    store.set("API_KEY", "hunter2", "pw", &SALT).unwrap();
    store.set("DB_URL", "postgres://x", "pw", &SALT).unwrap();

    let secrets = store.get_all("pw", &SALT).unwrap();
    assert_eq!(secrets.len(), 2);
    assert_eq!(secrets.get("API_KEY"), Some("hunter2"));
    assert_eq!(secrets.get("DB_URL"), Some("postgres://x"));
}

#[test]
fn test_wrong_password_is_auth_failed() {
    let dir = tempdir().unwrap();
    let store = SecretsStore::for_stack(dir.path());
    store.set("API_KEY", "hunter2", "pw", &SALT).unwrap();

    let err = store.get_all("wrong", &SALT).unwrap_err();
    assert!(matches!(err, SecretsError::AuthFailed), "{err:?}");
}

#[test]
fn test_wrong_salt_is_auth_failed() {
    let dir = tempdir().unwrap();
    let store = SecretsStore::for_stack(dir.path());
    store.set("API_KEY", "hunter2", "pw", &SALT).unwrap();

    let other_salt = *b"fedcba9876543210";
    let err = store.get_all("pw", &other_salt).unwrap_err();
    assert!(matches!(err, SecretsError::AuthFailed));
}

#[test]
fn test_set_with_wrong_password_rejected() {
    let dir = tempdir().unwrap();
    let store = SecretsStore::for_stack(dir.path());
    store.set("A", "1", "pw", &SALT).unwrap();

    // A second writer with a different password must not corrupt the map
    let err = store.set("B", "2", "other", &SALT).unwrap_err();
    assert!(matches!(err, SecretsError::AuthFailed));

    let secrets = store.get_all("pw", &SALT).unwrap();
    assert_eq!(secrets.len(), 1);
}

#[test]
fn test_overwrite_rotates_nonce() {
    let dir = tempdir().unwrap();
    let store = SecretsStore::for_stack(dir.path());

    store.set("K", "v1", "pw", &SALT).unwrap();
    let first = std::fs::read_to_string(dir.path().join("secrets.json")).unwrap();
    store.set("K", "v2", "pw", &SALT).unwrap();
    let second = std::fs::read_to_string(dir.path().join("secrets.json")).unwrap();

    // Fresh nonce per write: the stored entry must differ entirely
    assert_ne!(first, second);
    let secrets = store.get_all("pw", &SALT).unwrap();
    assert_eq!(secrets.get("K"), Some("v2"));
}

#[test]
fn test_empty_store() {
    let dir = tempdir().unwrap();
    let store = SecretsStore::for_stack(dir.path());
    assert!(!store.has_secrets());

    // No secrets: any password yields an empty map (nothing to leak)
    let secrets = store.get_all("anything", &SALT).unwrap();
    assert!(secrets.is_empty());
}

#[test]
fn test_value_not_stored_in_plaintext() {
    let dir = tempdir().unwrap();
    let store = SecretsStore::for_stack(dir.path());
    store.set("API_KEY", "super-secret-value", "pw", &SALT).unwrap();

    let raw = std::fs::read_to_string(dir.path().join("secrets.json")).unwrap();
    assert!(!raw.contains("super-secret-value"));
}
