use crate::domain::aggregates::{Aggregates, recompute};
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::RecordId;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// あるクエリキーに対してキャッシュされた一覧の不変スナップショット
///
/// 変更系メソッドはすべて新しいスナップショットを返し、`aggregates` はその都度
/// `items` から再計算される。`total` は挿入・削除でのみ増減する。
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<R: CollectionRecord> {
    items: Vec<R>,
    total: u64,
    aggregates: Aggregates,
    fetched_at: DateTime<Utc>,
    is_stale: bool,
}

impl<R: CollectionRecord> Snapshot<R> {
    pub fn new(items: Vec<R>, total: u64) -> Self {
        Self::fetched(items, total, Utc::now())
    }

    pub fn fetched(items: Vec<R>, total: u64, fetched_at: DateTime<Utc>) -> Self {
        Self::build(items, total, fetched_at, false)
    }

    fn build(items: Vec<R>, total: u64, fetched_at: DateTime<Utc>, is_stale: bool) -> Self {
        let aggregates = recompute(&items);
        Self {
            items,
            total,
            aggregates,
            fetched_at,
            is_stale,
        }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn get(&self, id: &RecordId) -> Option<&R> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    /// pending / running のアイテムが一つでもあるか
    pub fn has_active_items(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.transient_state().is_active())
    }

    /// 取得から `max_age` 以上経過しているか（古いとマーク済みなら常に true）
    pub fn needs_refetch(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if self.is_stale {
            return true;
        }
        let age = now.signed_duration_since(self.fetched_at);
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => age >= max_age,
            Err(_) => false,
        }
    }

    /// 同じ ID のレコードを置き換える。存在しなければ変更しない。
    pub fn with_record(&self, record: R) -> Self {
        let id = record.id().clone();
        self.with_record_replacing(&id, record)
    }

    /// `id` のレコードを別 ID のレコードで置き換える（一時 ID の確定用）
    pub fn with_record_replacing(&self, id: &RecordId, record: R) -> Self {
        let mut items = self.items.clone();
        if let Some(slot) = items.iter_mut().find(|item| item.id() == id) {
            *slot = record;
        }
        Self::build(items, self.total, self.fetched_at, self.is_stale)
    }

    /// レコードを取り除き、取り除いた位置と値を返す
    pub fn without_record(&self, id: &RecordId) -> (Self, Option<(usize, R)>) {
        let mut items = self.items.clone();
        match items.iter().position(|item| item.id() == id) {
            Some(index) => {
                let removed = items.remove(index);
                let snapshot = Self::build(
                    items,
                    self.total.saturating_sub(1),
                    self.fetched_at,
                    self.is_stale,
                );
                (snapshot, Some((index, removed)))
            }
            None => (self.clone(), None),
        }
    }

    /// `index` に挿入する（範囲外は末尾）
    pub fn with_inserted(&self, index: usize, record: R) -> Self {
        let mut items = self.items.clone();
        let index = index.min(items.len());
        items.insert(index, record);
        Self::build(items, self.total + 1, self.fetched_at, self.is_stale)
    }

    pub fn marked_stale(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.is_stale = true;
        snapshot
    }
}
