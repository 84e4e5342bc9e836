use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC (e.g. `admin`, `manager`, `agent`).
///
/// Roles are opaque strings at this layer; the [`crate::PermissionTable`]
/// decides what each one grants. A role missing from the table grants nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Role assigned on registration when the caller does not name one.
    pub const DEFAULT: Role = Role(Cow::Borrowed("user"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
