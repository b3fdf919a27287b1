use crate::domain::record::{CollectionRecord, TransientState};
use crate::domain::value_objects::{QueryFilter, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ENABLED_FILTER: &str = "isEnabled";

/// ジョブの実行状態（サーバーが管理する）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunState {
    #[default]
    Idle,
    Queued,
    Running,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: RecordId,
    pub name: String,
    pub cron_expression: String,
    pub is_enabled: bool,
    #[serde(default)]
    pub run_state: JobRunState,
    #[serde(default)]
    pub last_run_time: Option<DateTime<Utc>>,
}

impl ScheduledJob {
    pub fn new(id: RecordId, name: impl Into<String>, cron_expression: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cron_expression: cron_expression.into(),
            is_enabled: true,
            run_state: JobRunState::Idle,
            last_run_time: None,
        }
    }

    pub fn with_run_state(mut self, run_state: JobRunState) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn with_enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = is_enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
}

impl ScheduledJobChanges {
    pub fn toggle(is_enabled: bool) -> Self {
        Self {
            is_enabled: Some(is_enabled),
            ..Self::default()
        }
    }
}

impl CollectionRecord for ScheduledJob {
    type Changes = ScheduledJobChanges;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn apply(&self, changes: &Self::Changes) -> Self {
        let mut next = self.clone();
        if let Some(is_enabled) = changes.is_enabled {
            next.is_enabled = is_enabled;
        }
        if let Some(cron_expression) = &changes.cron_expression {
            next.cron_expression = cron_expression.clone();
        }
        next
    }

    fn aggregate_keys(&self) -> Vec<String> {
        let enabled = if self.is_enabled { "enabled" } else { "disabled" };
        vec![enabled.to_string()]
    }

    fn transient_state(&self) -> TransientState {
        match self.run_state {
            JobRunState::Queued => TransientState::Pending,
            JobRunState::Running => TransientState::Running,
            JobRunState::Idle | JobRunState::Failed => TransientState::Settled,
        }
    }

    fn matches_filter(&self, filter: &QueryFilter) -> bool {
        filter.admits(ENABLED_FILTER, &self.is_enabled.to_string())
    }
}
