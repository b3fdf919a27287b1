use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryFilter, RecordId};
use serde::{Deserialize, Serialize};

pub const ACTIVE_FILTER: &str = "isActive";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_active: bool,
    // 所属ユーザー数はサーバーが数える
    #[serde(default)]
    pub member_count: u64,
}

impl Role {
    pub fn new(id: RecordId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            is_active: true,
            member_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl RoleChanges {
    pub fn activation(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }
}

impl CollectionRecord for Role {
    type Changes = RoleChanges;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn apply(&self, changes: &Self::Changes) -> Self {
        let mut next = self.clone();
        if let Some(name) = &changes.name {
            next.name = name.clone();
        }
        if let Some(description) = &changes.description {
            next.description = description.clone();
        }
        if let Some(is_active) = changes.is_active {
            next.is_active = is_active;
        }
        next
    }

    fn aggregate_keys(&self) -> Vec<String> {
        vec![if self.is_active { "active" } else { "inactive" }.to_string()]
    }

    fn matches_filter(&self, filter: &QueryFilter) -> bool {
        filter.admits(ACTIVE_FILTER, &self.is_active.to_string())
    }
}
