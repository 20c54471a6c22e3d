//! Crawl into a file-backed inventory and replay it onto backup and account groups

use pretty_assertions::assert_eq;
use regroup_framework::{Hardened, InventoryStore, JsonFileInventory, RateLimiter, RetryConfig, Threads};
use regroup_groups::{Destination, GroupMigrationState, MigrationGroupInfo};
use regroup_permissions::{
    EntitlementsSupport, GenericPermissionsSupport, Listing, PermissionManager,
    SecretScopesSupport, SupportRegistry, TableGrantsSupport, ENTITLEMENTS,
};
use regroup_sdk::{
    AclItem, AclPermission, ComplexValue, Grant, GrantsApi, GroupsApi, ObjectPermissionsApi,
    PermissionAssignmentsApi, Principal, SecretsApi, Securable, SecurableKind,
    WorkspacePermission,
};
use regroup_test_utils::{data_eng_workspace, FakeWorkspace, CLUSTER_POLICIES};
use std::sync::Arc;

fn registry(ws: &Arc<FakeWorkspace>) -> SupportRegistry {
    let updates = Hardened::new(RetryConfig::fast(3), RateLimiter::new("permissions", 30));
    let lister = Arc::clone(ws);
    SupportRegistry::new()
        .with(Arc::new(GenericPermissionsSupport::new(
            Arc::clone(ws) as Arc<dyn ObjectPermissionsApi>,
            vec![Listing::new(CLUSTER_POLICIES, move || {
                Ok(lister.object_ids(CLUSTER_POLICIES))
            })],
            RetryConfig::fast(3),
            updates.clone(),
        )))
        .unwrap()
        .with(Arc::new(SecretScopesSupport::new(
            Arc::clone(ws) as Arc<dyn SecretsApi>,
            RetryConfig::fast(3),
            updates.clone(),
        )))
        .unwrap()
        .with(Arc::new(TableGrantsSupport::new(
            Arc::clone(ws) as Arc<dyn GrantsApi>,
            RetryConfig::fast(3),
            updates.clone(),
        )))
        .unwrap()
        .with(Arc::new(EntitlementsSupport::new(
            Arc::clone(ws) as Arc<dyn GroupsApi>,
            RetryConfig::fast(3),
            updates,
        )))
        .unwrap()
}

fn manager(ws: &Arc<FakeWorkspace>, path: &std::path::Path) -> PermissionManager {
    PermissionManager::new(
        registry(ws),
        Arc::new(JsonFileInventory::new(path)),
        Threads::new(4),
    )
}

#[test]
fn inventory_survives_restarts_and_feeds_both_destinations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory").join("permissions.json");

    let ws = Arc::new(data_eng_workspace());
    let workspace = ws
        .workspace_group_named("data-eng")
        .unwrap()
        .with_entitlements(vec![ComplexValue::value("workspace-access")]);
    ws.put_workspace_group(workspace.clone());
    ws.add_scope("etl", vec![AclItem::new("data-eng", AclPermission::Write)]);
    let orders = Securable::new(SecurableKind::Table, "hive_metastore.sales.orders");
    ws.add_securable(orders.clone(), vec![Grant::new("data-eng", "SELECT")]);

    let crawl = manager(&ws, &path).inventorize_permissions().unwrap();
    assert_eq!(crawl.fetched, 4);
    assert!(crawl.is_complete());
    assert_eq!(JsonFileInventory::new(&path).load_all().unwrap().len(), 4);

    let backup = ws.add_workspace_group("db-temp-data-eng", Vec::new());
    let account = ws.account_group_named("data-eng").unwrap();
    let mut state = GroupMigrationState::new();
    state
        .add(MigrationGroupInfo {
            workspace: workspace.clone(),
            backup: backup.clone(),
            account: account.clone(),
        })
        .unwrap();

    let to_backup = manager(&ws, &path)
        .apply_group_permissions(&state, Destination::Backup)
        .unwrap();
    assert!(to_backup.is_success(), "{:?}", to_backup.failures);
    assert_eq!(to_backup.applied, 4);
    assert_eq!(
        ws.object_levels(CLUSTER_POLICIES, "policy-1", &Principal::Group(backup.display_name.clone())),
        vec!["CAN_USE".to_string()]
    );
    assert_eq!(ws.scope_acl("etl", "db-temp-data-eng"), Some(AclPermission::Write));
    assert!(ws
        .grants_on(&orders)
        .contains(&Grant::new("db-temp-data-eng", "SELECT")));

    // swap the groups by hand; the workspace group's grants vanish with it
    ws.delete(&workspace.id).unwrap();
    ws.assign(&account.id, &[WorkspacePermission::User]).unwrap();
    assert!(ws
        .object_levels(CLUSTER_POLICIES, "policy-1", &Principal::Group("data-eng".into()))
        .is_empty());

    let to_account = manager(&ws, &path)
        .apply_group_permissions(&state, Destination::Account)
        .unwrap();
    assert!(to_account.is_success(), "{:?}", to_account.failures);
    assert_eq!(
        ws.object_levels(CLUSTER_POLICIES, "policy-1", &Principal::Group("data-eng".into())),
        vec!["CAN_USE".to_string()]
    );
    assert_eq!(ws.scope_acl("etl", "data-eng"), Some(AclPermission::Write));
    assert!(ws.grants_on(&orders).contains(&Grant::new("data-eng", "SELECT")));
    let reflected = GroupsApi::get(ws.as_ref(), &account.id).unwrap();
    assert!(reflected
        .entitlements
        .iter()
        .any(|e| e.value.as_deref() == Some("workspace-access")));
    assert!(manager(&ws, &path).registry().contains(ENTITLEMENTS));
}

#[test]
fn rerunning_the_crawl_replaces_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("permissions.json");
    let ws = Arc::new(data_eng_workspace());

    manager(&ws, &path).inventorize_permissions().unwrap();
    ws.add_object(CLUSTER_POLICIES, "policy-2", Vec::new());
    manager(&ws, &path).inventorize_permissions().unwrap();

    let ids: Vec<String> = JsonFileInventory::new(&path)
        .load_all()
        .unwrap()
        .into_iter()
        .map(|row| row.object_id)
        .collect();
    assert_eq!(ids, vec!["policy-1".to_string(), "policy-2".to_string()]);
}
