// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn backend(dir: &tempfile::TempDir) -> FileSecretBackend {
    FileSecretBackend::open(dir.path().join("secrets.json"))
}

#[tokio::test]
async fn set_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = backend(&dir);

    secrets.set("api_key", "s3cret", SecretMode::Upsert).await.unwrap();
    assert_eq!(secrets.get("api_key").await.unwrap().as_deref(), Some("s3cret"));
    assert_eq!(secrets.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn create_mode_rejects_existing_names() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = backend(&dir);

    secrets.set("k", "v1", SecretMode::Create).await.unwrap();
    let err = secrets.set("k", "v2", SecretMode::Create).await.unwrap_err();
    assert!(matches!(err, SecretError::AlreadyExists(_)));
    assert_eq!(secrets.get("k").await.unwrap().as_deref(), Some("v1"));
}

#[tokio::test]
async fn update_mode_requires_an_existing_name() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = backend(&dir);

    let err = secrets.set("k", "v", SecretMode::Update).await.unwrap_err();
    assert!(matches!(err, SecretError::NotFound(_)));

    secrets.set("k", "v1", SecretMode::Upsert).await.unwrap();
    secrets.set("k", "v2", SecretMode::Update).await.unwrap();
    assert_eq!(secrets.get("k").await.unwrap().as_deref(), Some("v2"));
}

#[tokio::test]
async fn delete_removes_and_errors_on_missing() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = backend(&dir);

    secrets.set("k", "v", SecretMode::Upsert).await.unwrap();
    secrets.delete("k").await.unwrap();
    assert_eq!(secrets.get("k").await.unwrap(), None);

    let err = secrets.delete("k").await.unwrap_err();
    assert!(matches!(err, SecretError::NotFound(_)));
}

#[tokio::test]
async fn list_returns_names_not_values() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = backend(&dir);

    secrets.set("b", "2", SecretMode::Upsert).await.unwrap();
    secrets.set("a", "1", SecretMode::Upsert).await.unwrap();

    let names = secrets.list().await.unwrap();
    assert_eq!(names, ["a", "b"]);
}

#[tokio::test]
async fn values_persist_across_reopen_with_private_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");
    {
        let secrets = FileSecretBackend::open(&path);
        secrets.set("k", "v", SecretMode::Upsert).await.unwrap();
    }

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    let secrets = FileSecretBackend::open(&path);
    assert_eq!(secrets.get("k").await.unwrap().as_deref(), Some("v"));
}
