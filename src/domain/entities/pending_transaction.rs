use crate::domain::entities::Snapshot;
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryKey, RecordId};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 投機的に適用した変更の種類
#[derive(Debug, Clone)]
pub enum PendingEffect<R: CollectionRecord> {
    /// ビューに残したまま `changes` を適用
    Replace(R::Changes),
    /// ビューから取り除いた。`changes` が None なら削除
    Remove { changes: Option<R::Changes> },
    /// 一時 ID で挿入した
    Insert(R),
}

/// レコード単位の保留中エントリ
///
/// `baseline` はロールバック時に戻す値で、保留中にリフレッシュが届いた場合は
/// サーバーの最新値に更新される。作成の場合は None。
#[derive(Debug, Clone)]
pub struct PendingEntry<R: CollectionRecord> {
    pub transaction: TransactionId,
    pub key: QueryKey,
    pub record_id: RecordId,
    pub baseline: Option<R>,
    pub position: usize,
    pub effect: PendingEffect<R>,
}

impl<R: CollectionRecord> PendingEntry<R> {
    /// 他のビューでも見せるべき投機的な値
    pub fn speculative_value(&self, fetched: &R) -> Option<R> {
        match &self.effect {
            PendingEffect::Replace(changes) => Some(fetched.apply(changes)),
            PendingEffect::Remove {
                changes: Some(changes),
            } => Some(fetched.apply(changes)),
            PendingEffect::Remove { changes: None } => None,
            PendingEffect::Insert(provisional) => Some(provisional.clone()),
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self.effect, PendingEffect::Remove { .. })
    }
}

/// 受け付けたミューテーション意図ひとつ分のトランザクション
#[derive(Debug, Clone)]
pub struct PendingTransaction<R: CollectionRecord> {
    pub id: TransactionId,
    pub key: QueryKey,
    pub targets: Vec<RecordId>,
    pub pre_snapshot: Snapshot<R>,
    pub speculative: Snapshot<R>,
    pub opened_at: DateTime<Utc>,
}
