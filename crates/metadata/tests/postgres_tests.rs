//! PostgreSQL integration tests using testcontainers.
//!
//! These tests require Docker to be running. Set SKIP_POSTGRES_TESTS=1 to skip.

mod common;

use common::{oid, postgres_or_skip, repo};
use lfs_core::HashAlgo;
use lfs_metadata::models::LfsObjectRow;
use lfs_metadata::{
    AccessPolicyRepo, AllowlistRepo, IsolationLevel, MetadataError, MetadataStore, ObjectRepo,
};

#[tokio::test]
async fn test_postgres_object_lifecycle() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store.clone();
    let oid = oid(0xab);

    assert!(store.find_object(&oid).await.unwrap().is_none());
    let row = LfsObjectRow::pending(&oid, 1024, HashAlgo::Sha256);
    store.create_object(&row).await.unwrap();
    assert!(matches!(
        store.create_object(&row).await,
        Err(MetadataError::AlreadyExists(_))
    ));

    let found = store.find_object(&oid).await.unwrap().unwrap();
    assert_eq!(found.storage_key, format!("objects/sha256/ab/ab/{oid}"));
    assert!(!found.uploaded);

    let uploaded = store.mark_uploaded(&oid).await.unwrap();
    assert!(uploaded.uploaded);
    let again = store.mark_uploaded(&oid).await.unwrap();
    assert_eq!(again.updated_at, uploaded.updated_at);

    let mut reverse = uploaded.clone();
    reverse.uploaded = false;
    assert!(matches!(
        store.update_object(&reverse).await,
        Err(MetadataError::InvalidStateTransition { .. })
    ));

    let mut resized = uploaded.clone();
    resized.size = 2048;
    assert!(matches!(
        store.update_object(&resized).await,
        Err(MetadataError::Constraint(_))
    ));

    assert!(matches!(
        store.mark_uploaded(&common::oid(0xcd)).await,
        Err(MetadataError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_postgres_prepare_upload_is_atomic_and_idempotent() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store.clone();
    let oid = oid(0x11);

    let first = store
        .prepare_upload(&oid, 10, HashAlgo::Sha256, &repo("octo/widgets"))
        .await
        .unwrap();
    assert_eq!(first.size, 10);

    // Pending rows take the latest size; the policy moves to the new repo.
    let second = store
        .prepare_upload(&oid, 12, HashAlgo::Sha256, &repo("octo/gadgets"))
        .await
        .unwrap();
    assert_eq!(second.size, 12);
    let policy = store.find_access_policy(&oid).await.unwrap().unwrap();
    assert_eq!(policy.repository, "octo/gadgets");

    store.mark_uploaded(&oid).await.unwrap();
    let third = store
        .prepare_upload(&oid, 99, HashAlgo::Sha256, &repo("octo/widgets"))
        .await
        .unwrap();
    assert!(third.uploaded);
    assert_eq!(third.size, 12);
}

#[tokio::test]
async fn test_postgres_access_policy_upsert_and_delete() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store.clone();
    let oid = oid(0x22);
    store
        .create_object(&LfsObjectRow::pending(&oid, 1, HashAlgo::Sha256))
        .await
        .unwrap();

    let first = store
        .save_access_policy(&oid, &repo("octo/widgets"))
        .await
        .unwrap();
    let second = store
        .save_access_policy(&oid, &repo("octo/gadgets"))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.repository, "octo/gadgets");

    store.delete_access_policy(&oid).await.unwrap();
    assert!(store.find_access_policy(&oid).await.unwrap().is_none());
    assert!(matches!(
        store.delete_access_policy(&oid).await,
        Err(MetadataError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_postgres_allowlist() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store.clone();

    assert!(store.add_repository(&repo("zeta/last")).await.unwrap());
    assert!(store.add_repository(&repo("alpha/first")).await.unwrap());
    assert!(!store.add_repository(&repo("alpha/first")).await.unwrap());

    assert!(store.is_repository_allowed(&repo("alpha/first")).await.unwrap());
    assert!(!store.is_repository_allowed(&repo("beta/none")).await.unwrap());

    let names: Vec<String> = store
        .list_repositories()
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.repository)
        .collect();
    assert_eq!(names, vec!["alpha/first", "zeta/last"]);

    store.remove_repository(&repo("zeta/last")).await.unwrap();
    assert!(matches!(
        store.remove_repository(&repo("zeta/last")).await,
        Err(MetadataError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_postgres_with_transaction_rolls_back_on_error() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    let store = metadata.store.clone();

    let result: Result<(), MetadataError> = store
        .with_transaction(IsolationLevel::Serializable, |tx| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO repository_allowlist (repository, created_at) VALUES ('tx/rollback', NOW())",
                )
                .execute(&mut **tx)
                .await?;
                Err(MetadataError::Internal("abort".to_string()))
            })
        })
        .await;
    assert!(result.is_err());
    assert!(
        !store
            .is_repository_allowed(&repo("tx/rollback"))
            .await
            .unwrap()
    );

    store
        .with_transaction(IsolationLevel::ReadCommitted, |tx| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO repository_allowlist (repository, created_at) VALUES ('tx/commit', NOW())",
                )
                .execute(&mut **tx)
                .await?;
                Ok(())
            })
        })
        .await
        .unwrap();
    assert!(store.is_repository_allowed(&repo("tx/commit")).await.unwrap());
}

#[tokio::test]
async fn test_postgres_migrate_is_idempotent() {
    let Some(metadata) = postgres_or_skip().await else {
        return;
    };
    metadata.store.migrate().await.unwrap();
    metadata.store.health_check().await.unwrap();
}
