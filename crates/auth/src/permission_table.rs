//! Static role → permission mapping.
//!
//! The table is built once at startup (from configuration, or the built-in
//! defaults) and shared read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Permission, Role};

/// Role → granted permissions.
///
/// Serialized as a plain map, e.g. `{ "agent": ["ticket.view", "task.view"] }`.
/// A role listing `"*"` is granted every permission. A role that is not in the
/// table has an empty permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable {
    roles: BTreeMap<Role, BTreeSet<Permission>>,
}

const MANAGER: &[&str] = &[
    "user.view",
    "user.edit",
    "hr.view",
    "hr.create",
    "hr.edit",
    "client.view",
    "client.create",
    "client.edit",
    "ticket.view",
    "ticket.create",
    "ticket.edit",
    "task.view",
    "task.create",
    "task.edit",
];

const SUPERVISOR: &[&str] = &[
    "user.view",
    "hr.view",
    "hr.create",
    "hr.edit",
    "client.view",
    "client.create",
    "ticket.view",
    "ticket.create",
    "ticket.edit",
    "task.view",
    "task.create",
    "task.edit",
];

const AGENT: &[&str] = &[
    "user.view",
    "ticket.view",
    "ticket.create",
    "ticket.edit",
    "task.view",
    "task.edit",
];

const HR: &[&str] = &[
    "user.view",
    "user.edit",
    "hr.view",
    "hr.create",
    "hr.edit",
    "hr.delete",
];

impl PermissionTable {
    /// An empty table: every role is denied everything.
    pub fn empty() -> Self {
        Self {
            roles: BTreeMap::new(),
        }
    }

    /// Add (or replace) a role's permission set.
    pub fn with_role<I, P>(mut self, role: Role, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.roles
            .insert(role, permissions.into_iter().map(Into::into).collect());
        self
    }

    /// Permissions configured for `role`, or `None` when the role is unknown.
    pub fn permissions_for(&self, role: &Role) -> Option<&BTreeSet<Permission>> {
        self.roles.get(role)
    }

    /// Whether `role` is granted `permission`, directly or via the wildcard.
    pub fn grants(&self, role: &Role, permission: &Permission) -> bool {
        match self.roles.get(role) {
            Some(perms) => perms.iter().any(Permission::is_wildcard) || perms.contains(permission),
            None => false,
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl Default for PermissionTable {
    /// The CMS's stock roles.
    fn default() -> Self {
        let static_perms = |perms: &'static [&'static str]| perms.iter().map(|p| Permission::new(*p));

        Self::empty()
            .with_role(Role::new("admin"), [Permission::WILDCARD])
            .with_role(Role::new("manager"), static_perms(MANAGER))
            .with_role(Role::new("supervisor"), static_perms(SUPERVISOR))
            .with_role(Role::new("agent"), static_perms(AGENT))
            .with_role(Role::new("hr"), static_perms(HR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn admin_has_wildcard() {
        let table = PermissionTable::default();
        assert!(table.grants(&Role::new("admin"), &Permission::new("hr.delete")));
        assert!(table.grants(&Role::new("admin"), &Permission::new("anything.at.all")));
    }

    #[test]
    fn agent_is_limited_to_its_set() {
        let table = PermissionTable::default();
        let agent = Role::new("agent");
        assert!(table.grants(&agent, &Permission::new("ticket.edit")));
        assert!(!table.grants(&agent, &Permission::new("hr.delete")));
        assert!(!table.grants(&agent, &Permission::new("task.create")));
    }

    #[test]
    fn unknown_role_gets_nothing() {
        let table = PermissionTable::default();
        let ghost = Role::new("ghost");
        assert!(table.permissions_for(&ghost).is_none());
        assert!(!table.grants(&ghost, &Permission::new("user.view")));
        assert!(!table.grants(&ghost, &Permission::WILDCARD));
    }

    #[test]
    fn requesting_the_wildcard_needs_the_wildcard() {
        let table = PermissionTable::default();
        assert!(!table.grants(&Role::new("manager"), &Permission::WILDCARD));
        assert!(table.grants(&Role::new("admin"), &Permission::WILDCARD));
    }

    #[test]
    fn deserializes_from_role_map() {
        let table: PermissionTable = serde_json::from_value(serde_json::json!({
            "editor": ["page.edit", "page.view"],
            "root": ["*"],
        }))
        .unwrap();

        assert!(table.grants(&Role::new("editor"), &Permission::new("page.edit")));
        assert!(!table.grants(&Role::new("editor"), &Permission::new("page.delete")));
        assert!(table.grants(&Role::new("root"), &Permission::new("page.delete")));
        assert!(!table.grants(&Role::new("admin"), &Permission::new("page.view")));
    }

    proptest! {
        #[test]
        fn admin_passes_any_permission(perm in "[a-z]{1,8}\\.[a-z]{1,8}") {
            let table = PermissionTable::default();
            prop_assert!(table.grants(&Role::new("admin"), &Permission::new(perm)));
        }

        #[test]
        fn agent_passes_exactly_its_configured_set(perm in "(user|hr|client|ticket|task)\\.(view|create|edit|delete)") {
            let table = PermissionTable::default();
            let expected = AGENT.contains(&perm.as_str());
            prop_assert_eq!(table.grants(&Role::new("agent"), &Permission::new(perm)), expected);
        }
    }
}
