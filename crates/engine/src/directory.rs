//! Local user records, as consulted by recipient resolution and submitter
//! lookup.

use std::collections::BTreeMap;

use async_trait::async_trait;
use formflow_interchange::Id;
use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<Id>,
    #[serde(default)]
    pub permissions: Vec<Id>,
}

/// Lookups return users ordered by id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Id) -> Result<Option<DirectoryUser>, DeliveryError>;

    async fn emails_for_users(&self, ids: &[Id]) -> Result<Vec<String>, DeliveryError>;

    /// Emails of users holding any of `role_ids`.
    async fn emails_for_roles(&self, role_ids: &[Id]) -> Result<Vec<String>, DeliveryError>;

    /// Emails of users holding any of `permission_ids`.
    async fn emails_for_permissions(
        &self,
        permission_ids: &[Id],
    ) -> Result<Vec<String>, DeliveryError>;

    /// Users whose email is one of `emails`. Unknown addresses are skipped.
    async fn users_by_email(&self, emails: &[String]) -> Result<Vec<DirectoryUser>, DeliveryError>;
}

// ──────────────────────────────────────────────
// In-memory directory
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryUserDirectory {
    users: BTreeMap<Id, DirectoryUser>,
}

impl MemoryUserDirectory {
    pub fn new(users: impl IntoIterator<Item = DirectoryUser>) -> Self {
        MemoryUserDirectory {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub fn insert(&mut self, user: DirectoryUser) {
        self.users.insert(user.id, user);
    }

    fn emails_where(&self, pred: impl Fn(&DirectoryUser) -> bool) -> Vec<String> {
        self.users
            .values()
            .filter(|u| pred(u))
            .map(|u| u.email.clone())
            .collect()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: Id) -> Result<Option<DirectoryUser>, DeliveryError> {
        Ok(self.users.get(&id).cloned())
    }

    async fn emails_for_users(&self, ids: &[Id]) -> Result<Vec<String>, DeliveryError> {
        Ok(self.emails_where(|u| ids.contains(&u.id)))
    }

    async fn emails_for_roles(&self, role_ids: &[Id]) -> Result<Vec<String>, DeliveryError> {
        Ok(self.emails_where(|u| u.roles.iter().any(|r| role_ids.contains(r))))
    }

    async fn emails_for_permissions(
        &self,
        permission_ids: &[Id],
    ) -> Result<Vec<String>, DeliveryError> {
        Ok(self.emails_where(|u| u.permissions.iter().any(|p| permission_ids.contains(p))))
    }

    async fn users_by_email(&self, emails: &[String]) -> Result<Vec<DirectoryUser>, DeliveryError> {
        Ok(self
            .users
            .values()
            .filter(|u| emails.iter().any(|e| e == &u.email))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MemoryUserDirectory {
        MemoryUserDirectory::new([
            DirectoryUser {
                id: 1,
                name: "Ada".into(),
                email: "ada@x.io".into(),
                roles: vec![10],
                permissions: vec![],
            },
            DirectoryUser {
                id: 2,
                name: "Bo".into(),
                email: "bo@x.io".into(),
                roles: vec![11],
                permissions: vec![20],
            },
        ])
    }

    #[tokio::test]
    async fn lookups() {
        let d = directory();
        assert_eq!(d.find_by_id(2).await.unwrap().unwrap().name, "Bo");
        assert!(d.find_by_id(3).await.unwrap().is_none());
        assert_eq!(d.emails_for_users(&[2, 3]).await.unwrap(), vec!["bo@x.io"]);
        assert_eq!(d.emails_for_roles(&[10, 11]).await.unwrap(), vec!["ada@x.io", "bo@x.io"]);
        assert_eq!(d.emails_for_permissions(&[20]).await.unwrap(), vec!["bo@x.io"]);
        let users = d
            .users_by_email(&["bo@x.io".to_string(), "nobody@x.io".to_string()])
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, 2);
    }
}
