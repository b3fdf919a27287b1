use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryFilter, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ACTIVE_FILTER: &str = "isActive";
pub const ROLE_FILTER: &str = "role";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: RecordId,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub last_login_time: Option<DateTime<Utc>>,
}

impl AdminUser {
    pub fn new(id: RecordId, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
            is_active: true,
            roles: Vec::new(),
            last_login_time: None,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[cfg(test)]
    pub(crate) fn sample(id: i64, is_active: bool, roles: &[&str]) -> Self {
        let mut user = Self::new(
            RecordId::from(id),
            format!("user{id}"),
            format!("user{id}@example.com"),
        )
        .with_roles(roles.iter().copied());
        user.is_active = is_active;
        user
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl AdminUserChanges {
    pub fn activation(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: Some(roles.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

impl CollectionRecord for AdminUser {
    type Changes = AdminUserChanges;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn apply(&self, changes: &Self::Changes) -> Self {
        let mut next = self.clone();
        if let Some(is_active) = changes.is_active {
            next.is_active = is_active;
        }
        if let Some(email) = &changes.email {
            next.email = email.clone();
        }
        if let Some(roles) = &changes.roles {
            next.roles = roles.clone();
        }
        next
    }

    fn aggregate_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.roles.len() + 1);
        keys.push(if self.is_active { "active" } else { "inactive" }.to_string());
        keys.extend(self.roles.iter().map(|role| format!("role:{role}")));
        keys
    }

    fn matches_filter(&self, filter: &QueryFilter) -> bool {
        if !filter.admits(ACTIVE_FILTER, &self.is_active.to_string()) {
            return false;
        }
        match filter.values(ROLE_FILTER) {
            Some(wanted) => self.roles.iter().any(|role| wanted.contains(role)),
            None => true,
        }
    }
}
