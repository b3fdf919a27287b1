use crate::domain::record::{CollectionRecord, TransientState};
use crate::domain::value_objects::{QueryFilter, RecordId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_FILTER: &str = "statusId";

/// 食事申請のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl MealRequestStatus {
    pub fn from_id(status_id: i64) -> Option<Self> {
        match status_id {
            1 => Some(MealRequestStatus::Pending),
            2 => Some(MealRequestStatus::Approved),
            3 => Some(MealRequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            MealRequestStatus::Pending => 1,
            MealRequestStatus::Approved => 2,
            MealRequestStatus::Rejected => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MealRequestStatus::Pending => "pending",
            MealRequestStatus::Approved => "approved",
            MealRequestStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRequest {
    pub id: RecordId,
    pub requester: String,
    pub meal_date: NaiveDate,
    pub status_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    // 承認・却下の確定時刻。サーバーだけが設定する
    #[serde(default)]
    pub closed_time: Option<DateTime<Utc>>,
}

impl MealRequest {
    pub fn new(
        id: RecordId,
        requester: impl Into<String>,
        meal_date: NaiveDate,
        status_id: i64,
    ) -> Self {
        Self {
            id,
            requester: requester.into(),
            meal_date,
            status_id,
            remark: None,
            closed_time: None,
        }
    }

    pub fn status(&self) -> Option<MealRequestStatus> {
        MealRequestStatus::from_id(self.status_id)
    }

    #[cfg(test)]
    pub(crate) fn sample(id: i64, status_id: i64) -> Self {
        let meal_date = NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date");
        Self::new(RecordId::from(id), format!("requester-{id}"), meal_date, status_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRequestChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl MealRequestChanges {
    pub fn status(status_id: i64) -> Self {
        Self {
            status_id: Some(status_id),
            ..Self::default()
        }
    }

    pub fn approve() -> Self {
        Self::status(MealRequestStatus::Approved.id())
    }

    pub fn reject() -> Self {
        Self::status(MealRequestStatus::Rejected.id())
    }
}

impl CollectionRecord for MealRequest {
    type Changes = MealRequestChanges;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn apply(&self, changes: &Self::Changes) -> Self {
        let mut next = self.clone();
        if let Some(status_id) = changes.status_id {
            next.status_id = status_id;
        }
        if let Some(remark) = &changes.remark {
            next.remark = Some(remark.clone());
        }
        next
    }

    fn aggregate_keys(&self) -> Vec<String> {
        let name = self.status().map(MealRequestStatus::as_str).unwrap_or("unknown");
        vec![name.to_string()]
    }

    fn transient_state(&self) -> TransientState {
        match self.status() {
            Some(MealRequestStatus::Pending) => TransientState::Pending,
            _ => TransientState::Settled,
        }
    }

    fn matches_filter(&self, filter: &QueryFilter) -> bool {
        filter.admits(STATUS_FILTER, &self.status_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_only_touches_listed_fields() {
        let mut request = MealRequest::sample(1, 1);
        request.closed_time = Some(Utc::now());
        request.remark = Some("allergy".into());

        let approved = request.apply(&MealRequestChanges::approve());

        assert_eq!(approved.status_id, 2);
        assert_eq!(approved.remark.as_deref(), Some("allergy"));
        assert_eq!(approved.closed_time, request.closed_time);
        assert_eq!(approved.requester, request.requester);
    }

    #[test]
    fn test_status_filter_membership() {
        let filter = QueryFilter::new().with(STATUS_FILTER, "1");
        assert!(MealRequest::sample(1, 1).matches_filter(&filter));
        assert!(!MealRequest::sample(1, 2).matches_filter(&filter));
        assert!(MealRequest::sample(1, 2).matches_filter(&QueryFilter::new()));
    }

    #[test]
    fn test_changes_serialize_only_present_fields() {
        let json = serde_json::to_value(MealRequestChanges::reject()).unwrap();
        assert_eq!(json, serde_json::json!({ "statusId": 3 }));
    }

    #[test]
    fn test_deserializes_server_payload() {
        let request: MealRequest = serde_json::from_value(serde_json::json!({
            "id": 7,
            "requester": "sato",
            "mealDate": "2026-04-02",
            "statusId": 2,
            "closedTime": "2026-04-01T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(request.id, RecordId::from(7));
        assert_eq!(request.status(), Some(MealRequestStatus::Approved));
        assert!(request.closed_time.is_some());
        assert_eq!(request.transient_state(), TransientState::Settled);
    }
}
