//! Testing utilities for the regroup workspace
//!
//! [`FakeWorkspace`] simulates one workspace plus its account: SCIM groups at
//! both levels, permission assignments, object ACLs, secret scopes and table
//! grants. It behaves like the platform where the migration depends on it:
//! deleting a group drops its ACL entries, and group principals must resolve
//! to a visible group before they can be granted anything.

#![allow(missing_docs)]

mod workspace;

pub use workspace::{FakeWorkspace, Operation};

use regroup_sdk::{
    AccessControlResponse, ComplexValue, Permission, PermissionLevel, Principal,
};

/// Cluster-policy object type as named by the permissions endpoint
pub const CLUSTER_POLICIES: &str = "cluster-policies";

/// ACL entry granting `level` directly to the group `name`
pub fn group_entry(name: &str, level: PermissionLevel) -> AccessControlResponse {
    AccessControlResponse::new(
        Principal::Group(name.to_string()),
        vec![Permission::direct(level)],
    )
}

/// ACL entry granting `level` directly to the user `name`
pub fn user_entry(name: &str, level: PermissionLevel) -> AccessControlResponse {
    AccessControlResponse::new(
        Principal::User(name.to_string()),
        vec![Permission::direct(level)],
    )
}

/// Member references for `user_ids`
pub fn members(user_ids: &[&str]) -> Vec<ComplexValue> {
    user_ids.iter().map(|id| ComplexValue::value(*id)).collect()
}

/// Workspace with `data-eng` at both levels and a cluster policy `policy-1`
/// granting it `CAN_USE`
pub fn data_eng_workspace() -> FakeWorkspace {
    let ws = FakeWorkspace::new();
    ws.add_workspace_group("data-eng", members(&["u-1", "u-2"]));
    ws.add_account_group("data-eng", members(&["u-1", "u-2"]));
    ws.add_object(
        CLUSTER_POLICIES,
        "policy-1",
        vec![
            group_entry("data-eng", PermissionLevel::CanUse),
            user_entry("owner@example.com", PermissionLevel::CanManage),
        ],
    );
    ws
}
