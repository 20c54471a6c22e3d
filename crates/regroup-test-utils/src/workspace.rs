use indexmap::IndexMap;
use parking_lot::Mutex;
use regroup_sdk::{
    AccessControlRequest, AccessControlResponse, AclItem, AclPermission, ApiError,
    ComplexValue, CreateGroup, Grant, GrantsApi, Group, GroupsApi, ObjectPermissions,
    ObjectPermissionsApi, PatchOp, PatchOpKind, Permission, PermissionAssignmentsApi,
    Principal, ResourceMeta, SecretScope, SecretsApi, Securable, WorkspacePermission,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Remote call kinds, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListGroups,
    ListAccountGroups,
    GetGroup,
    CreateGroup,
    DeleteGroup,
    PatchGroup,
    AssignPermissions,
    GetPermissions,
    UpdatePermissions,
    ListScopes,
    ListAcls,
    PutAcl,
    ListSecurables,
    ListGrants,
    Grant,
}

#[derive(Debug, Default)]
struct State {
    workspace_groups: IndexMap<String, Group>,
    account_groups: IndexMap<String, Group>,
    assignments: IndexMap<String, Vec<WorkspacePermission>>,
    acls: BTreeMap<(String, String), IndexMap<Principal, Vec<Permission>>>,
    scopes: IndexMap<String, IndexMap<String, AclPermission>>,
    grants: IndexMap<Securable, Vec<Grant>>,
}

impl State {
    fn reflected_account_groups(&self) -> impl Iterator<Item = &Group> {
        self.account_groups
            .values()
            .filter(|g| self.assignments.contains_key(&g.id))
    }

    fn group_name_visible(&self, name: &str) -> bool {
        self.workspace_groups.values().any(|g| g.display_name == name)
            || self.reflected_account_groups().any(|g| g.display_name == name)
    }

    fn principal_valid(&self, principal: &Principal) -> bool {
        match principal {
            Principal::Group(name) => self.group_name_visible(name),
            Principal::User(_) | Principal::ServicePrincipal(_) => true,
        }
    }

    fn drop_group_references(&mut self, name: &str) {
        let principal = Principal::Group(name.to_string());
        for acl in self.acls.values_mut() {
            acl.shift_remove(&principal);
        }
        for scope in self.scopes.values_mut() {
            scope.shift_remove(name);
        }
        for grants in self.grants.values_mut() {
            grants.retain(|g| g.principal != name);
        }
    }

    fn object_permissions(&self, object_type: &str, object_id: &str) -> Option<ObjectPermissions> {
        let acl = self
            .acls
            .get(&(object_type.to_string(), object_id.to_string()))?;
        Some(ObjectPermissions {
            object_id: object_id.to_string(),
            object_type: object_type.to_string(),
            access_control_list: acl
                .iter()
                .map(|(principal, perms)| AccessControlResponse::new(principal.clone(), perms.clone()))
                .collect(),
        })
    }
}

/// In-memory workspace and account
#[derive(Debug)]
pub struct FakeWorkspace {
    state: Mutex<State>,
    faults: Mutex<HashMap<Operation, VecDeque<ApiError>>>,
    calls: Mutex<HashMap<Operation, usize>>,
    in_flight: Mutex<HashMap<Operation, (usize, usize)>>,
    latency: Mutex<HashMap<Operation, Duration>>,
    next_id: AtomicU64,
}

impl Default for FakeWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWorkspace {
    /// Workspace holding only the system groups
    pub fn new() -> Self {
        let ws = Self {
            state: Mutex::new(State::default()),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            latency: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1000),
        };
        ws.add_workspace_group("users", Vec::new());
        ws.add_workspace_group("admins", Vec::new());
        ws.add_account_group("account users", Vec::new());
        ws
    }

    fn new_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    // ----- seeding -----

    pub fn add_workspace_group(&self, name: &str, members: Vec<ComplexValue>) -> Group {
        let group = Group::new(self.new_id(), name)
            .with_meta(ResourceMeta::workspace_group())
            .with_members(members);
        self.state
            .lock()
            .workspace_groups
            .insert(group.id.clone(), group.clone());
        group
    }

    pub fn add_account_group(&self, name: &str, members: Vec<ComplexValue>) -> Group {
        let group = Group::new(self.new_id(), name)
            .with_meta(ResourceMeta {
                resource_type: Some("Group".to_string()),
            })
            .with_members(members);
        self.state
            .lock()
            .account_groups
            .insert(group.id.clone(), group.clone());
        group
    }

    /// Replace a stored workspace group, e.g. to add entitlements
    pub fn put_workspace_group(&self, group: Group) {
        self.state
            .lock()
            .workspace_groups
            .insert(group.id.clone(), group);
    }

    pub fn add_object(&self, object_type: &str, object_id: &str, acl: Vec<AccessControlResponse>) {
        let entries = acl
            .into_iter()
            .map(|entry| (entry.principal, entry.all_permissions))
            .collect();
        self.state
            .lock()
            .acls
            .insert((object_type.to_string(), object_id.to_string()), entries);
    }

    pub fn add_scope(&self, name: &str, acls: Vec<AclItem>) {
        let entries = acls
            .into_iter()
            .map(|item| (item.principal, item.permission))
            .collect();
        self.state.lock().scopes.insert(name.to_string(), entries);
    }

    pub fn add_securable(&self, securable: Securable, grants: Vec<Grant>) {
        self.state.lock().grants.insert(securable, grants);
    }

    // ----- inspection -----

    pub fn object_ids(&self, object_type: &str) -> Vec<String> {
        self.state
            .lock()
            .acls
            .keys()
            .filter(|(t, _)| t == object_type)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn object_acl(&self, object_type: &str, object_id: &str) -> Option<ObjectPermissions> {
        self.state.lock().object_permissions(object_type, object_id)
    }

    /// Levels held by `principal` on an object, in grant order
    pub fn object_levels(&self, object_type: &str, object_id: &str, principal: &Principal) -> Vec<String> {
        self.state
            .lock()
            .acls
            .get(&(object_type.to_string(), object_id.to_string()))
            .and_then(|acl| acl.get(principal))
            .map(|perms| perms.iter().map(|p| p.permission_level.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn workspace_group_named(&self, name: &str) -> Option<Group> {
        self.state
            .lock()
            .workspace_groups
            .values()
            .find(|g| g.display_name == name)
            .cloned()
    }

    pub fn workspace_group_names(&self) -> Vec<String> {
        self.state
            .lock()
            .workspace_groups
            .values()
            .map(|g| g.display_name.clone())
            .collect()
    }

    pub fn account_group_named(&self, name: &str) -> Option<Group> {
        self.state
            .lock()
            .account_groups
            .values()
            .find(|g| g.display_name == name)
            .cloned()
    }

    pub fn is_reflected(&self, principal_id: &str) -> bool {
        self.state.lock().assignments.contains_key(principal_id)
    }

    pub fn scope_acl(&self, scope: &str, principal: &str) -> Option<AclPermission> {
        self.state
            .lock()
            .scopes
            .get(scope)
            .and_then(|acl| acl.get(principal).copied())
    }

    pub fn grants_on(&self, securable: &Securable) -> Vec<Grant> {
        self.state
            .lock()
            .grants
            .get(securable)
            .cloned()
            .unwrap_or_default()
    }

    // ----- fault injection and accounting -----

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: Operation, error: ApiError) {
        self.fail_times(op, 1, error);
    }

    /// Fail the next `times` calls of `op` with `error`
    pub fn fail_times(&self, op: Operation, times: usize, error: ApiError) {
        let mut faults = self.faults.lock();
        let queue = faults.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Make every call of `op` take at least `latency`
    pub fn set_latency(&self, op: Operation, latency: Duration) {
        self.latency.lock().insert(op, latency);
    }

    /// Calls made to `op`, including failed ones
    pub fn calls(&self, op: Operation) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Highest number of concurrent `op` calls observed
    pub fn peak_in_flight(&self, op: Operation) -> usize {
        self.in_flight.lock().get(&op).map_or(0, |(_, peak)| *peak)
    }

    fn enter(&self, op: Operation) -> Result<InFlight<'_>, ApiError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        {
            let mut in_flight = self.in_flight.lock();
            let (now, peak) = in_flight.entry(op).or_insert((0, 0));
            *now += 1;
            *peak = (*peak).max(*now);
        }
        let guard = InFlight { ws: self, op };

        let latency = self.latency.lock().get(&op).copied();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        if let Some(error) = self.faults.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(guard)
    }
}

struct InFlight<'a> {
    ws: &'a FakeWorkspace,
    op: Operation,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some((now, _)) = self.ws.in_flight.lock().get_mut(&self.op) {
            *now -= 1;
        }
    }
}

impl GroupsApi for FakeWorkspace {
    fn list(&self, _attributes: &str) -> Result<Vec<Group>, ApiError> {
        let _call = self.enter(Operation::ListGroups)?;
        let state = self.state.lock();
        let mut groups: Vec<Group> = state.workspace_groups.values().cloned().collect();
        groups.extend(state.reflected_account_groups().cloned());
        Ok(groups)
    }

    fn list_account(&self, _attributes: &str) -> Result<Vec<Group>, ApiError> {
        let _call = self.enter(Operation::ListAccountGroups)?;
        Ok(self.state.lock().account_groups.values().cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Group, ApiError> {
        let _call = self.enter(Operation::GetGroup)?;
        let state = self.state.lock();
        state
            .workspace_groups
            .get(id)
            .or_else(|| state.account_groups.get(id))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("group {id}")))
    }

    fn create(&self, request: &CreateGroup) -> Result<Group, ApiError> {
        let _call = self.enter(Operation::CreateGroup)?;
        let mut state = self.state.lock();
        if state
            .workspace_groups
            .values()
            .any(|g| g.display_name == request.display_name)
        {
            return Err(ApiError::AlreadyExists(format!(
                "group {}",
                request.display_name
            )));
        }
        let group = Group::new(self.new_id(), request.display_name.clone())
            .with_meta(ResourceMeta::workspace_group())
            .with_members(request.members.clone())
            .with_entitlements(request.entitlements.clone())
            .with_roles(request.roles.clone());
        state
            .workspace_groups
            .insert(group.id.clone(), group.clone());
        Ok(group)
    }

    fn delete(&self, id: &str) -> Result<(), ApiError> {
        let _call = self.enter(Operation::DeleteGroup)?;
        let mut state = self.state.lock();
        let removed = state
            .workspace_groups
            .shift_remove(id)
            .ok_or_else(|| ApiError::NotFound(format!("group {id}")))?;
        if !state.group_name_visible(&removed.display_name) {
            state.drop_group_references(&removed.display_name);
        }
        Ok(())
    }

    fn patch(&self, id: &str, operations: &[PatchOp]) -> Result<(), ApiError> {
        let _call = self.enter(Operation::PatchGroup)?;
        let mut state = self.state.lock();
        let State {
            workspace_groups,
            account_groups,
            ..
        } = &mut *state;
        let group = workspace_groups
            .get_mut(id)
            .or_else(|| account_groups.get_mut(id))
            .ok_or_else(|| ApiError::NotFound(format!("group {id}")))?;

        for op in operations {
            let target = match op.path.as_str() {
                "members" => &mut group.members,
                "entitlements" => &mut group.entitlements,
                "roles" => &mut group.roles,
                other => {
                    return Err(ApiError::InvalidParameter(format!(
                        "unsupported patch path {other}"
                    )))
                }
            };
            match op.op {
                PatchOpKind::Add => {
                    for value in &op.value {
                        if !target.iter().any(|v| v.value == value.value) {
                            target.push(value.clone());
                        }
                    }
                }
                PatchOpKind::Remove => target.retain(|v| !op.value.iter().any(|r| r.value == v.value)),
                PatchOpKind::Replace => *target = op.value.clone(),
            }
        }
        Ok(())
    }
}

impl PermissionAssignmentsApi for FakeWorkspace {
    fn assign(
        &self,
        principal_id: &str,
        permissions: &[WorkspacePermission],
    ) -> Result<(), ApiError> {
        let _call = self.enter(Operation::AssignPermissions)?;
        let mut state = self.state.lock();
        if !state.account_groups.contains_key(principal_id) {
            return Err(ApiError::NotFound(format!("principal {principal_id}")));
        }
        state
            .assignments
            .insert(principal_id.to_string(), permissions.to_vec());
        Ok(())
    }
}

impl ObjectPermissionsApi for FakeWorkspace {
    fn get(&self, object_type: &str, object_id: &str) -> Result<ObjectPermissions, ApiError> {
        let _call = self.enter(Operation::GetPermissions)?;
        self.state
            .lock()
            .object_permissions(object_type, object_id)
            .ok_or_else(|| ApiError::NotFound(format!("{object_type}/{object_id}")))
    }

    fn update(
        &self,
        object_type: &str,
        object_id: &str,
        acl: &[AccessControlRequest],
    ) -> Result<ObjectPermissions, ApiError> {
        let _call = self.enter(Operation::UpdatePermissions)?;
        let mut state = self.state.lock();
        if let Some(invalid) = acl.iter().find(|r| !state.principal_valid(&r.principal)) {
            return Err(ApiError::InvalidParameter(format!(
                "principal {} does not exist",
                invalid.principal.name()
            )));
        }
        let key = (object_type.to_string(), object_id.to_string());
        let entries = state
            .acls
            .get_mut(&key)
            .ok_or_else(|| ApiError::NotFound(format!("{object_type}/{object_id}")))?;
        for request in acl {
            let perms = entries.entry(request.principal.clone()).or_default();
            if !perms
                .iter()
                .any(|p| p.permission_level == request.permission_level && !p.inherited)
            {
                perms.push(Permission::direct(request.permission_level));
            }
        }
        state
            .object_permissions(object_type, object_id)
            .ok_or_else(|| ApiError::NotFound(format!("{object_type}/{object_id}")))
    }
}

impl SecretsApi for FakeWorkspace {
    fn list_scopes(&self) -> Result<Vec<SecretScope>, ApiError> {
        let _call = self.enter(Operation::ListScopes)?;
        Ok(self
            .state
            .lock()
            .scopes
            .keys()
            .map(|name| SecretScope { name: name.clone() })
            .collect())
    }

    fn list_acls(&self, scope: &str) -> Result<Vec<AclItem>, ApiError> {
        let _call = self.enter(Operation::ListAcls)?;
        self.state
            .lock()
            .scopes
            .get(scope)
            .map(|acl| {
                acl.iter()
                    .map(|(principal, permission)| AclItem::new(principal.clone(), *permission))
                    .collect()
            })
            .ok_or_else(|| ApiError::NotFound(format!("scope {scope}")))
    }

    fn put_acl(
        &self,
        scope: &str,
        principal: &str,
        permission: AclPermission,
    ) -> Result<(), ApiError> {
        let _call = self.enter(Operation::PutAcl)?;
        let mut state = self.state.lock();
        if !state.group_name_visible(principal) {
            return Err(ApiError::InvalidParameter(format!(
                "principal {principal} does not exist"
            )));
        }
        let acl = state
            .scopes
            .get_mut(scope)
            .ok_or_else(|| ApiError::NotFound(format!("scope {scope}")))?;
        acl.insert(principal.to_string(), permission);
        Ok(())
    }
}

impl GrantsApi for FakeWorkspace {
    fn list_securables(&self) -> Result<Vec<Securable>, ApiError> {
        let _call = self.enter(Operation::ListSecurables)?;
        Ok(self.state.lock().grants.keys().cloned().collect())
    }

    fn grants(&self, securable: &Securable) -> Result<Vec<Grant>, ApiError> {
        let _call = self.enter(Operation::ListGrants)?;
        self.state
            .lock()
            .grants
            .get(securable)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(securable.to_string()))
    }

    fn grant(&self, securable: &Securable, principal: &str, action_type: &str) -> Result<(), ApiError> {
        let _call = self.enter(Operation::Grant)?;
        let mut state = self.state.lock();
        if !state.group_name_visible(principal) {
            return Err(ApiError::InvalidParameter(format!(
                "principal {principal} does not exist"
            )));
        }
        let grants = state
            .grants
            .get_mut(securable)
            .ok_or_else(|| ApiError::NotFound(securable.to_string()))?;
        let grant = Grant::new(principal, action_type);
        if !grants.contains(&grant) {
            grants.push(grant);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_eng_workspace, CLUSTER_POLICIES};
    use regroup_sdk::PermissionLevel;

    #[test]
    fn deleting_group_drops_its_acl_entries() {
        let ws = data_eng_workspace();
        let group = ws.workspace_group_named("data-eng").unwrap();
        GroupsApi::delete(&ws, &group.id).unwrap();

        let acl = ws.object_acl(CLUSTER_POLICIES, "policy-1").unwrap();
        assert!(acl.group_names().next().is_none());
        assert_eq!(acl.access_control_list.len(), 1);
    }

    #[test]
    fn unknown_group_principal_is_rejected() {
        let ws = data_eng_workspace();
        let err = ObjectPermissionsApi::update(
            &ws,
            CLUSTER_POLICIES,
            "policy-1",
            &[AccessControlRequest::group("ghost", PermissionLevel::CanUse)],
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidParameter(_)));
    }

    #[test]
    fn injected_faults_are_consumed_in_order() {
        let ws = FakeWorkspace::new();
        ws.fail_times(Operation::ListGroups, 2, ApiError::Unavailable("503".into()));

        assert!(GroupsApi::list(&ws, "id").is_err());
        assert!(GroupsApi::list(&ws, "id").is_err());
        assert!(GroupsApi::list(&ws, "id").is_ok());
        assert_eq!(ws.calls(Operation::ListGroups), 3);
    }
}
