use std::path::Path;
use std::sync::Arc;

use sacmk_domain::{KeySource, StorageAccountRef};
use sacmk_driver::{Encryption, KeyVaultProperties, LocalDriver};
use sacmk_reconciler::{
    import_settings, reconcile, refresh, Change, EncryptionSettingsController, OperationScope,
    ReconcileRequest,
};
use sacmk_store::{AuditEvent, InMemoryStore, RedbStore, StateStore};
use tempfile::TempDir;

const SUB: &str = "/subscriptions/S/resourceGroups/G/providers";
const VAULT: &str = "/subscriptions/S/resourceGroups/G/providers/Microsoft.KeyVault/vaults/vault1";

fn account_id(name: &str) -> String {
    format!("{}/Microsoft.Storage/storageAccounts/{}", SUB, name)
}

fn account_ref(name: &str) -> StorageAccountRef {
    StorageAccountRef {
        resource_group: "G".into(),
        account_name: name.into(),
    }
}

fn platform_managed(name: &str, account: &str) -> String {
    format!(
        "  - name: {}\n    storage_account_id: {}\n",
        name,
        account_id(account)
    )
}

fn key_vault_managed(name: &str, account: &str, version: &str) -> String {
    format!(
        "  - name: {name}
    storage_account_id: {acct}
    key_vault:
      key_vault_policy_id: {vault}/objectId/abc
      key_vault_id: {vault}
      key_name: k1
      key_version: {version}
",
        name = name,
        acct = account_id(account),
        vault = VAULT,
        version = version
    )
}

fn write_declarations(dir: &Path, entries: &[String]) {
    let mut doc = String::from("encryption_settings:\n");
    for e in entries {
        doc.push_str(e);
    }
    std::fs::write(dir.join("settings.yml"), doc).unwrap();
}

struct Harness {
    dir: TempDir,
    driver: LocalDriver,
    store: Arc<dyn StateStore>,
    controller: EncryptionSettingsController,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    fn with_store(store: Arc<dyn StateStore>) -> Self {
        let driver = LocalDriver::new();
        let controller =
            EncryptionSettingsController::new(Arc::new(driver.clone()), Arc::new(driver.clone()));
        Self {
            dir: TempDir::new().unwrap(),
            driver,
            store,
            controller,
        }
    }

    fn declare(&self, entries: &[String]) {
        write_declarations(self.dir.path(), entries);
    }

    fn request(&self, dry_run: bool) -> ReconcileRequest {
        ReconcileRequest {
            declarations_dir: self.dir.path().to_path_buf(),
            dry_run,
        }
    }

    async fn apply(&self) -> sacmk_reconciler::ReconcileReport {
        reconcile(
            self.request(false),
            self.store.clone(),
            &self.controller,
            &OperationScope::detached(),
        )
        .await
        .unwrap()
    }

    async fn refresh(&self) -> sacmk_reconciler::ReconcileReport {
        refresh(self.store.clone(), &self.controller, &OperationScope::detached())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn dry_run_returns_changes_without_persisting() {
    let h = Harness::new();
    h.declare(&[platform_managed("data", "acct1")]);

    let report = reconcile(
        h.request(true),
        h.store.clone(),
        &h.controller,
        &OperationScope::detached(),
    )
    .await
    .unwrap();

    assert!(report.dry_run);
    assert_eq!(
        report.changes,
        vec![Change::Created {
            name: "data".into(),
            storage_account_id: account_id("acct1"),
        }]
    );
    assert!(h.store.list_resources().await.unwrap().is_empty());
    assert!(h.driver.updates().await.is_empty());
}

#[tokio::test]
async fn apply_persists_state() {
    let h = Harness::new();
    h.declare(&[
        platform_managed("logs", "acct2"),
        key_vault_managed("data", "acct1", "v1"),
    ]);

    let report = h.apply().await;
    assert!(report.is_clean(), "errors: {:?}", report.errors);
    assert_eq!(report.changes.len(), 2);

    let data = h.store.get_resource("data").await.unwrap().unwrap();
    assert_eq!(
        data.handle.as_ref().unwrap().as_str(),
        format!("{}/encryptionSettings", account_id("acct1"))
    );
    let observed = data.observed.unwrap().key_vault_ref.unwrap();
    assert_eq!(observed.key_vault_uri.as_deref(), Some("https://vault1.vault.azure.net/"));
    assert_eq!(observed.key_vault_id, VAULT);

    let logs = h.store.get_resource("logs").await.unwrap().unwrap();
    assert!(logs.observed.unwrap().key_vault_ref.is_none());

    let events = h.store.list_events(None, 100).await.unwrap();
    assert!(matches!(events.first(), Some(AuditEvent::ReconcileStarted { .. })));
    assert!(matches!(events.last(), Some(AuditEvent::ReconcileCompleted { changes: 2, .. })));
}

#[tokio::test]
async fn idempotent_apply() {
    let h = Harness::new();
    h.declare(&[key_vault_managed("data", "acct1", "v1")]);

    h.apply().await;
    let second = h.apply().await;

    assert!(second.changes.is_empty(), "got {:?}", second.changes);
    assert_eq!(h.driver.updates().await.len(), 1);
}

#[tokio::test]
async fn key_rotation_is_an_update() {
    let h = Harness::new();
    h.declare(&[key_vault_managed("data", "acct1", "v1")]);
    h.apply().await;

    h.declare(&[key_vault_managed("data", "acct1", "v2")]);
    let report = h.apply().await;

    assert_eq!(
        report.changes,
        vec![Change::Updated {
            name: "data".into(),
            storage_account_id: account_id("acct1"),
        }]
    );
    let updates = h.driver.updates().await;
    let last = updates.last().unwrap().1.encryption();
    assert_eq!(
        last.key_vault_properties.as_ref().unwrap().key_version.as_deref(),
        Some("v2")
    );
}

#[tokio::test]
async fn undeclared_record_is_reverted_and_dropped() {
    let h = Harness::new();
    h.declare(&[key_vault_managed("data", "acct1", "v1")]);
    h.apply().await;

    h.declare(&[]);
    let report = h.apply().await;

    assert_eq!(
        report.changes,
        vec![Change::Reverted {
            name: "data".into(),
            storage_account_id: account_id("acct1"),
        }]
    );
    assert!(h.store.get_resource("data").await.unwrap().is_none());

    let updates = h.driver.updates().await;
    let (account, payload) = updates.last().unwrap();
    assert_eq!(account, &account_ref("acct1"));
    assert_eq!(payload.encryption().key_source, KeySource::PlatformManaged);
    assert!(payload.encryption().key_vault_properties.is_none());

    let events = h.store.list_events(Some("data"), 100).await.unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, AuditEvent::SettingsReverted { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, AuditEvent::RecordDropped { .. })));
}

#[tokio::test]
async fn moving_to_another_account_replaces() {
    let h = Harness::new();
    h.declare(&[key_vault_managed("data", "acct1", "v1")]);
    h.apply().await;

    h.declare(&[key_vault_managed("data", "acct2", "v1")]);
    let report = h.apply().await;

    assert_eq!(
        report.changes,
        vec![Change::Replaced {
            name: "data".into(),
            from: account_id("acct1"),
            to: account_id("acct2"),
        }]
    );

    let updates = h.driver.updates().await;
    assert_eq!(updates.len(), 3);
    assert_eq!(updates[1].0, account_ref("acct1"));
    assert_eq!(updates[1].1.encryption().key_source, KeySource::PlatformManaged);
    assert_eq!(updates[2].0, account_ref("acct2"));
    assert_eq!(updates[2].1.encryption().key_source, KeySource::KeyVaultManaged);

    let state = h.store.get_resource("data").await.unwrap().unwrap();
    assert_eq!(state.desired.storage_account_id, account_id("acct2"));
}

#[tokio::test]
async fn move_to_missing_account_releases_old_account() {
    let h = Harness::new();
    h.declare(&[key_vault_managed("data", "acct1", "v1")]);
    h.apply().await;

    h.driver.remove_account(&account_ref("acct2")).await;
    h.declare(&[key_vault_managed("data", "acct2", "v1")]);
    let report = h.apply().await;

    assert!(matches!(report.changes.as_slice(), [Change::Replaced { .. }]));
    assert_eq!(report.errors.len(), 1, "got {:?}", report.errors);
    let state = h.store.get_resource("data").await.unwrap().unwrap();
    assert_eq!(state.desired.storage_account_id, account_id("acct2"));
    assert!(state.handle.is_none());

    // later runs retry the new account and leave acct1 alone
    let report = h.apply().await;
    assert_eq!(
        report.changes,
        vec![Change::Updated {
            name: "data".into(),
            storage_account_id: account_id("acct2"),
        }]
    );
    let acct1_writes = h
        .driver
        .updates()
        .await
        .iter()
        .filter(|(account, _)| account == &account_ref("acct1"))
        .count();
    assert_eq!(acct1_writes, 2, "one create and one revert");

    let refreshed = h.refresh().await;
    assert!(refreshed.changes.is_empty(), "got {:?}", refreshed.changes);
    assert!(refreshed.is_clean());
}

#[tokio::test]
async fn cancelled_run_writes_nothing() {
    let h = Harness::new();
    h.declare(&[
        platform_managed("data", "acct1"),
        platform_managed("logs", "acct2"),
    ]);
    let (handle, scope) = OperationScope::new();
    handle.cancel();

    let report = reconcile(h.request(false), h.store.clone(), &h.controller, &scope)
        .await
        .unwrap();

    assert_eq!(report.errors.len(), 1, "got {:?}", report.errors);
    assert!(report.errors[0].contains("cancelled by caller"), "got {:?}", report.errors);
    assert!(h.driver.updates().await.is_empty());
    assert!(h.store.list_resources().await.unwrap().is_empty());

    // a fresh scope picks up where the cancelled run stopped
    assert!(h.apply().await.is_clean());
    assert_eq!(h.store.list_resources().await.unwrap().len(), 2);
}

#[tokio::test]
async fn missing_account_is_reported_not_fatal() {
    let h = Harness::new();
    h.driver.remove_account(&account_ref("gone")).await;
    h.declare(&[
        platform_managed("gone", "gone"),
        platform_managed("ok", "acct1"),
    ]);

    let report = h.apply().await;

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("gone:"), "got {:?}", report.errors);
    assert!(h.store.get_resource("gone").await.unwrap().is_none());
    assert!(h.store.get_resource("ok").await.unwrap().is_some());
}

#[tokio::test]
async fn revert_of_deleted_account_still_drops_record() {
    let h = Harness::new();
    h.declare(&[platform_managed("data", "acct1")]);
    h.apply().await;

    h.driver.remove_account(&account_ref("acct1")).await;
    h.declare(&[]);
    let report = h.apply().await;

    assert!(report.is_clean(), "errors: {:?}", report.errors);
    assert!(h.store.get_resource("data").await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_reports_drift_and_drops_missing() {
    let h = Harness::new();
    h.declare(&[
        key_vault_managed("data", "acct1", "v1"),
        platform_managed("logs", "acct2"),
    ]);
    h.apply().await;

    // someone rotates the key by hand, and acct2 is deleted
    h.driver
        .seed(
            &account_ref("acct1"),
            Encryption {
                services: None,
                key_source: KeySource::KeyVaultManaged,
                key_vault_properties: Some(KeyVaultProperties {
                    key_name: Some("k1".into()),
                    key_version: Some("v7".into()),
                    key_vault_uri: Some("https://vault1.vault.azure.net/".into()),
                }),
            },
        )
        .await;
    h.driver.remove_account(&account_ref("acct2")).await;

    let report = h.refresh().await;

    assert_eq!(report.changes.len(), 2);
    match &report.changes[0] {
        Change::Drifted { name, detail } => {
            assert_eq!(name, "data");
            assert!(detail.contains("k1/v7"), "got {}", detail);
        }
        other => panic!("expected drift, got {:?}", other),
    }
    assert_eq!(report.changes[1], Change::Dropped { name: "logs".into() });

    let data = h.store.get_resource("data").await.unwrap().unwrap();
    assert_eq!(
        data.observed.unwrap().key_vault_ref.unwrap().key_version,
        "v7"
    );
    assert!(h.store.get_resource("logs").await.unwrap().is_none());
}

#[tokio::test]
async fn import_then_apply_fills_in_vault_ids() {
    let h = Harness::new();
    h.driver
        .seed(
            &account_ref("acct1"),
            Encryption {
                services: None,
                key_source: KeySource::KeyVaultManaged,
                key_vault_properties: Some(KeyVaultProperties {
                    key_name: Some("k1".into()),
                    key_version: Some("v1".into()),
                    key_vault_uri: Some("https://vault1.vault.azure.net/".into()),
                }),
            },
        )
        .await;

    let scope = OperationScope::detached();
    let imported = import_settings("data", &account_id("acct1"), h.store.clone(), &h.controller, &scope)
        .await
        .unwrap()
        .unwrap();
    let kv = imported.desired.key_vault_ref.as_ref().unwrap();
    assert_eq!(kv.key_vault_id, "");
    assert_eq!(kv.key_name, "k1");
    assert!(h.driver.updates().await.is_empty());

    // importing twice under one name is refused
    assert!(
        import_settings("data", &account_id("acct1"), h.store.clone(), &h.controller, &scope)
            .await
            .is_err()
    );

    h.declare(&[key_vault_managed("data", "acct1", "v1")]);
    let report = h.apply().await;
    assert!(matches!(report.changes.as_slice(), [Change::Updated { .. }]));
    let state = h.store.get_resource("data").await.unwrap().unwrap();
    assert_eq!(state.desired.key_vault_ref.unwrap().key_vault_id, VAULT);
}

#[tokio::test]
async fn import_of_missing_account_records_nothing() {
    let h = Harness::new();
    h.driver.remove_account(&account_ref("acct1")).await;

    let result = import_settings(
        "data",
        &account_id("acct1"),
        h.store.clone(),
        &h.controller,
        &OperationScope::detached(),
    )
    .await
    .unwrap();
    assert!(result.is_none());
    assert!(h.store.list_resources().await.unwrap().is_empty());
}

#[tokio::test]
async fn state_survives_reopening_redb() {
    let state_dir = TempDir::new().unwrap();
    let path = state_dir.path().join("state.redb");

    {
        let h = Harness::with_store(Arc::new(RedbStore::open(&path).unwrap()));
        h.declare(&[platform_managed("data", "acct1")]);
        assert!(h.apply().await.is_clean());
    }

    let store = RedbStore::open(&path).unwrap();
    let state = store.get_resource("data").await.unwrap().unwrap();
    assert!(state.handle.is_some());
}
