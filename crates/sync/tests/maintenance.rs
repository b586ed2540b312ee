//! Cleanup, installed-flag refresh, linked accounts, catalogs and device
//! maintenance.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use vrfleet_client::EntityStore;
use vrfleet_core::error::CoreError;
use vrfleet_core::models::{
    Credentials, OptionCatalog, APP_ENTITY, ASSOCIATION_ENTITY, DEVICE_ENTITY,
    LINKED_ACCOUNT_ENTITY,
};
use vrfleet_sync::accounts::{upsert_linked_account, AccountAction};
use vrfleet_sync::catalog::{delete_option, ensure_options, list_options, option_usage};
use vrfleet_sync::cleanup::cleanup_associations;
use vrfleet_sync::devices::{delete_device_cascade, set_device_disabled};
use vrfleet_sync::installed::refresh_all_installed;
use vrfleet_sync::SyncError;

use common::{gateway, installed_flag, seed_apps, seed_devices, seed_links, FlakyStore};

async fn messy_fleet() -> Arc<FlakyStore> {
    let store = Arc::new(FlakyStore::default());
    seed_devices(&store, &[("d1", 1, false), ("d2", 2, false)]).await;
    seed_apps(&store, &[("a1", "Beat Saber", false), ("a2", "Superhot", true)]).await;
    seed_links(
        &store,
        &[
            ("r1", "d1", "a1"),
            ("r2", "d1", "a1"),
            ("r3", "gone", "a1"),
            ("r4", "d2", "missing-app"),
            ("r5", "d2", "a1"),
        ],
    )
    .await;
    store
}

/// A dry run counts stale rows without deleting anything.
#[tokio::test]
async fn test_cleanup_dry_run_only_counts() {
    let store = messy_fleet().await;
    let gw = gateway(&store);

    let report = cleanup_associations(&gw, true).await.unwrap();

    assert_eq!(report.scanned, 5);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.missing_device, 1);
    assert_eq!(report.missing_app, 1);
    assert_eq!(report.deleted, 0);
    assert!(report.refresh.is_none());
    assert_eq!(store.inner.count(ASSOCIATION_ENTITY).await, 5);
}

/// Cleanup deletes stale rows and fixes drifted flags.
#[tokio::test]
async fn test_cleanup_deletes_and_refreshes() {
    let store = messy_fleet().await;
    let gw = gateway(&store);

    let report = cleanup_associations(&gw, false).await.unwrap();

    assert_eq!(report.stale(), 3);
    assert_eq!(report.deleted, 3);
    assert_eq!(store.inner.count(ASSOCIATION_ENTITY).await, 2);
    let refresh = report.refresh.unwrap();
    assert_eq!(refresh.checked, 2);
    assert!(installed_flag(&store, "a1").await);
    assert!(!installed_flag(&store, "a2").await);
}

/// Only drifted flags are written.
#[tokio::test]
async fn test_refresh_all_writes_only_drift() {
    let store = Arc::new(FlakyStore::default());
    seed_devices(&store, &[("d1", 1, false)]).await;
    seed_apps(
        &store,
        &[("a1", "Beat Saber", true), ("a2", "Superhot", true), ("a3", "Moss", false)],
    )
    .await;
    seed_links(&store, &[("r1", "d1", "a1"), ("r2", "d1", "a3")]).await;
    let gw = gateway(&store);

    let report = refresh_all_installed(&gw).await.unwrap();

    assert_eq!(report.checked, 3);
    let mut updated = report.updated.clone();
    updated.sort();
    assert_eq!(updated, vec!["a2".to_string(), "a3".to_string()]);
    assert!(!installed_flag(&store, "a2").await);
    assert!(installed_flag(&store, "a3").await);
}

/// Create, then update, then no-op; extra rows for the key are removed.
#[tokio::test]
async fn test_linked_account_upsert() {
    let store = Arc::new(FlakyStore::default());
    let gw = gateway(&store);
    let creds = Credentials {
        email: Some("b1@school.org".into()),
        ..Default::default()
    };

    let created = upsert_linked_account(&gw, "d1", "meta", &creds).await.unwrap();
    assert_eq!(created.action, AccountAction::Created);

    let changed = Credentials {
        password: Some("hunter2".into()),
        ..creds.clone()
    };
    let updated = upsert_linked_account(&gw, "d1", "meta", &changed).await.unwrap();
    assert_eq!(updated.action, AccountAction::Updated);
    assert_eq!(updated.account_id, created.account_id);

    let again = upsert_linked_account(&gw, "d1", "meta", &changed).await.unwrap();
    assert_eq!(again.action, AccountAction::Unchanged);

    store
        .inner
        .seed(
            LINKED_ACCOUNT_ENTITY,
            vec![json!({"id": "dup", "device_id": "d1", "account_type": "meta"})],
        )
        .await;
    let deduped = upsert_linked_account(&gw, "d1", "meta", &changed).await.unwrap();
    assert_eq!(deduped.duplicates_removed, 1);
    assert_eq!(store.inner.count(LINKED_ACCOUNT_ENTITY).await, 1);
}

/// Blank account types are rejected before any call.
#[tokio::test]
async fn test_linked_account_requires_type() {
    let store = Arc::new(FlakyStore::default());
    let gw = gateway(&store);
    let err = upsert_linked_account(&gw, "d1", "  ", &Credentials::default())
        .await
        .unwrap_err();
    assert_matches!(err, SyncError::Core(CoreError::Validation(_)));
}

/// Options are created once per value, ignoring case.
#[tokio::test]
async fn test_ensure_options_is_case_insensitive() {
    let store = Arc::new(FlakyStore::default());
    store
        .inner
        .seed("GenreOption", vec![json!({"id": "g1", "value": "Music", "label": "Music"})])
        .await;
    let gw = gateway(&store);

    let values = vec!["music".to_string(), "Puzzle".to_string(), "puzzle".to_string()];
    let created = ensure_options(&gw, OptionCatalog::Genre, &values).await.unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].value, "Puzzle");
    assert_eq!(created[0].label.as_deref(), Some("Puzzle"));
    assert_eq!(list_options(&gw, OptionCatalog::Genre).await.unwrap().len(), 2);
}

/// Deleting an option needs confirmation and reports affected apps.
#[tokio::test]
async fn test_delete_option_requires_confirmation() {
    let store = Arc::new(FlakyStore::default());
    store
        .inner
        .seed("PlatformOption", vec![json!({"id": "p1", "value": "Quest"})])
        .await;
    store
        .inner
        .seed(
            APP_ENTITY,
            vec![
                json!({"id": "a1", "name": "Beat Saber", "platforms": ["quest", "PCVR"]}),
                json!({"id": "a2", "name": "Moss", "platforms": ["PCVR"]}),
            ],
        )
        .await;
    let gw = gateway(&store);

    assert_eq!(option_usage(&gw, OptionCatalog::Platform, "Quest").await.unwrap(), 1);

    let refused = delete_option(&gw, OptionCatalog::Platform, "p1", false).await;
    assert_matches!(refused, Err(SyncError::Core(CoreError::Validation(_))));
    assert_eq!(store.inner.count("PlatformOption").await, 1);

    let deleted = delete_option(&gw, OptionCatalog::Platform, "p1", true).await.unwrap();
    assert_eq!(deleted.value, "Quest");
    assert_eq!(deleted.apps_affected, 1);
    assert_eq!(store.inner.count("PlatformOption").await, 0);
}

/// Disabling requires a reason; enabling clears it.
#[tokio::test]
async fn test_disable_and_enable_device() {
    let store = Arc::new(FlakyStore::default());
    seed_devices(&store, &[("d1", 1, false)]).await;
    let gw = gateway(&store);

    assert_matches!(
        set_device_disabled(&gw, "d1", true, Some(" ")).await,
        Err(SyncError::Core(CoreError::Validation(_)))
    );

    let disabled = set_device_disabled(&gw, "d1", true, Some("cracked lens")).await.unwrap();
    assert!(disabled.is_disabled);
    assert_eq!(disabled.disable_reason.as_deref(), Some("cracked lens"));

    let enabled = set_device_disabled(&gw, "d1", false, None).await.unwrap();
    assert!(!enabled.is_disabled);
    assert!(enabled.disable_reason.is_none());
}

/// Cascade delete removes dependents, the device, and refreshes flags.
#[tokio::test]
async fn test_delete_device_cascade() {
    let store = Arc::new(FlakyStore::default());
    seed_devices(&store, &[("d1", 1, false), ("d2", 2, false)]).await;
    seed_apps(&store, &[("a1", "Beat Saber", true), ("a2", "Moss", true)]).await;
    seed_links(&store, &[("r1", "d1", "a1"), ("r2", "d1", "a2"), ("r3", "d2", "a2")]).await;
    store
        .inner
        .seed(
            LINKED_ACCOUNT_ENTITY,
            vec![json!({"id": "l1", "device_id": "d1", "account_type": "meta"})],
        )
        .await;
    let gw = gateway(&store);

    let report = delete_device_cascade(&gw, "d1").await.unwrap();

    assert_eq!(report.associations_deleted, 2);
    assert_eq!(report.accounts_deleted, 1);
    assert!(report.device_deleted);
    assert!(store.inner.get(DEVICE_ENTITY, "d1").await.is_err());
    assert!(!installed_flag(&store, "a1").await);
    assert!(installed_flag(&store, "a2").await);
}

/// The device survives when a dependent row cannot be deleted.
#[tokio::test]
async fn test_cascade_keeps_device_when_dependents_fail() {
    let store = Arc::new(FlakyStore::default());
    seed_devices(&store, &[("d1", 1, false)]).await;
    seed_apps(&store, &[("a1", "Beat Saber", true)]).await;
    seed_links(&store, &[("r1", "d1", "a1")]).await;
    store.fail_deletes(ASSOCIATION_ENTITY, "r1");
    let gw = gateway(&store);

    let report = delete_device_cascade(&gw, "d1").await.unwrap();

    assert!(!report.device_deleted);
    assert_eq!(report.failures.len(), 1);
    assert!(store.inner.get(DEVICE_ENTITY, "d1").await.is_ok());
}

/// A failed device delete is reported and flags are still refreshed.
#[tokio::test]
async fn test_cascade_refreshes_flags_when_device_delete_fails() {
    let store = Arc::new(FlakyStore::default());
    seed_devices(&store, &[("d1", 1, false)]).await;
    seed_apps(&store, &[("a1", "Beat Saber", true)]).await;
    seed_links(&store, &[("r1", "d1", "a1")]).await;
    store.fail_deletes(DEVICE_ENTITY, "d1");
    let gw = gateway(&store);

    let report = delete_device_cascade(&gw, "d1").await.unwrap();

    assert!(!report.device_deleted);
    assert_eq!(report.associations_deleted, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "d1");
    assert_eq!(report.refresh.updated, vec!["a1".to_string()]);
    assert_eq!(store.inner.count(ASSOCIATION_ENTITY).await, 0);
    assert!(!installed_flag(&store, "a1").await);
    assert!(store.inner.get(DEVICE_ENTITY, "d1").await.is_ok());
}

/// Stale rows that cannot be deleted are reported, not silently dropped.
#[tokio::test]
async fn test_cleanup_reports_failed_deletes() {
    let store = Arc::new(FlakyStore::default());
    seed_devices(&store, &[("d1", 1, false)]).await;
    seed_apps(&store, &[("a1", "Beat Saber", true)]).await;
    seed_links(&store, &[("r1", "d1", "a1"), ("r2", "d1", "a1")]).await;
    store.fail_deletes(ASSOCIATION_ENTITY, "r2");
    let gw = gateway(&store);

    let report = cleanup_associations(&gw, false).await.unwrap();

    assert_eq!(report.stale(), 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "r2");
    assert!(report.failures[0].message.contains("500"));
    assert!(report.is_partial());
    assert_eq!(store.inner.count(ASSOCIATION_ENTITY).await, 2);
}
