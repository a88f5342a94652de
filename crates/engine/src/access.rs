//! StageAccessGuard: who may view or act on a stage.
//!
//! An unconfigured policy is public. Once any restriction is configured the
//! caller must match at least one of them.

use std::collections::BTreeMap;

use formflow_interchange::{AccessPolicyDoc, Id};
use serde::Serialize;

use crate::identity::Identity;
use crate::types::{FieldType, FormVersion, Stage};

/// Restrictions attached to a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessPolicy {
    pub allowed_users: Vec<Id>,
    pub allowed_roles: Vec<Id>,
    pub allowed_permissions: Vec<Id>,
    pub allow_authenticated_users: bool,
    pub email_field_id: Option<Id>,
}

impl From<&AccessPolicyDoc> for AccessPolicy {
    fn from(doc: &AccessPolicyDoc) -> Self {
        AccessPolicy {
            allowed_users: doc.allowed_users.clone(),
            allowed_roles: doc.allowed_roles.clone(),
            allowed_permissions: doc.allowed_permissions.clone(),
            allow_authenticated_users: doc.allow_authenticated_users,
            email_field_id: doc.email_field_id,
        }
    }
}

impl AccessPolicy {
    pub fn has_restrictions(&self) -> bool {
        !self.allowed_users.is_empty()
            || !self.allowed_roles.is_empty()
            || !self.allowed_permissions.is_empty()
            || self.allow_authenticated_users
            || self.email_field_id.is_some()
    }
}

/// The entry an access check is made against, for the email-field rule.
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    pub form: &'a FormVersion,
    /// Stored values of the entry, by field id.
    pub values: &'a BTreeMap<Id, String>,
}

/// Decide whether `identity` may view or act on `stage`. First match wins.
pub fn can_access(stage: &Stage, identity: Option<&Identity>, entry: Option<EntryView<'_>>) -> bool {
    let Some(policy) = &stage.access_policy else {
        return true;
    };
    if !policy.has_restrictions() {
        return true;
    }
    let Some(identity) = identity else {
        return false;
    };
    if policy.allow_authenticated_users {
        return true;
    }
    if policy.allowed_users.contains(&identity.id) {
        return true;
    }
    if identity
        .roles
        .iter()
        .any(|r| policy.allowed_roles.contains(r))
    {
        return true;
    }
    if identity
        .permissions
        .iter()
        .any(|p| policy.allowed_permissions.contains(p))
    {
        return true;
    }
    if let (Some(field_id), Some(entry)) = (policy.email_field_id, entry) {
        return email_matches(field_id, identity, entry);
    }
    false
}

fn email_matches(field_id: Id, identity: &Identity, entry: EntryView<'_>) -> bool {
    let is_email_field = entry
        .form
        .get_field(field_id)
        .is_some_and(|f| f.field_type == Some(FieldType::EmailInput));
    if !is_email_field {
        return false;
    }
    let want = identity.email.trim().to_lowercase();
    if want.is_empty() {
        return false;
    }
    entry
        .values
        .get(&field_id)
        .is_some_and(|v| v.trim().to_lowercase() == want)
}

/// Published versions whose initial stage `identity` may access.
pub fn accessible_form_versions<'a>(
    forms: impl IntoIterator<Item = &'a FormVersion>,
    identity: Option<&Identity>,
) -> Vec<&'a FormVersion> {
    forms
        .into_iter()
        .filter(|f| f.status == formflow_interchange::VersionStatus::Published)
        .filter(|f| {
            f.initial_stage()
                .is_some_and(|stage| can_access(stage, identity, None))
        })
        .collect()
}
