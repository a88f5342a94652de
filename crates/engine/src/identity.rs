//! The acting caller, as resolved by the external identity provider.
//!
//! A guest is represented as `None` wherever an `Option<&Identity>` is taken.

use formflow_interchange::Id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<Id>,
    #[serde(default)]
    pub permissions: Vec<Id>,
    /// Preferred language for read paths.
    #[serde(default)]
    pub default_language_id: Option<Id>,
}

impl Identity {
    pub fn new(id: Id, email: impl Into<String>) -> Self {
        Identity {
            id,
            email: email.into(),
            ..Identity::default()
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Id>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Id>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }
}
