use crate::domain::value_objects::RecordId;
use crate::shared::error::MutationError;

/// 対象レコードひとつ分の確定結果
///
/// 成功時の値はサーバーが返したレコード。削除の場合は None。
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome<R> {
    pub id: RecordId,
    pub result: Result<Option<R>, MutationError>,
}

impl<R> RecordOutcome<R> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// ミューテーション意図全体の確定結果（対象ごと）
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome<R> {
    records: Vec<RecordOutcome<R>>,
}

impl<R> MutationOutcome<R> {
    pub(crate) fn new(records: Vec<RecordOutcome<R>>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RecordOutcome<R>] {
        &self.records
    }

    pub fn get(&self, id: &RecordId) -> Option<&RecordOutcome<R>> {
        self.records.iter().find(|record| &record.id == id)
    }

    pub fn is_success(&self) -> bool {
        self.records.iter().all(RecordOutcome::is_success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RecordId> {
        self.records
            .iter()
            .filter(|record| record.is_success())
            .map(|record| &record.id)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&RecordId, &MutationError)> {
        self.records
            .iter()
            .filter_map(|record| record.result.as_ref().err().map(|err| (&record.id, err)))
    }

    /// 単一対象のミューテーションの結果を取り出す
    pub fn into_single(self) -> Result<Option<R>, MutationError> {
        match self.records.into_iter().next() {
            Some(record) => record.result,
            None => Err(MutationError::Internal(
                "mutation settled without any record outcome".to_string(),
            )),
        }
    }
}
