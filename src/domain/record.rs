use crate::domain::value_objects::{QueryFilter, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 処理中かどうかを示す一時的な状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientState {
    #[default]
    Settled,
    Pending,
    Running,
}

impl TransientState {
    pub fn is_active(self) -> bool {
        matches!(self, TransientState::Pending | TransientState::Running)
    }
}

/// キャッシュ対象となるドメインレコード
///
/// `Changes` はミューテーションで変更可能なフィールドだけを持つ型で、
/// `apply` は `Changes` に列挙されたフィールド以外を一切変更してはならない。
pub trait CollectionRecord:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Changes: Clone
        + fmt::Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    fn id(&self) -> &RecordId;

    /// `changes` に含まれるフィールドだけを上書きしたコピーを返す
    fn apply(&self, changes: &Self::Changes) -> Self;

    /// 集計で数えられる分類キー（ステータス名、有効フラグ、所属ロールなど）
    fn aggregate_keys(&self) -> Vec<String>;

    fn transient_state(&self) -> TransientState {
        TransientState::Settled
    }

    /// 現在のビューのフィルタ条件に一致するか
    fn matches_filter(&self, _filter: &QueryFilter) -> bool {
        true
    }
}
