use crate::application::ports::remote_collection::RemotePage;
use crate::domain::entities::{
    PendingEffect, PendingEntry, PendingTransaction, Snapshot, TransactionId,
};
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryKey, RecordId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedLedger<R> = Arc<Mutex<TransactionLedger<R>>>;

/// 保留中トランザクションと論理クロックの台帳
///
/// ロック順は常に台帳 → キャッシュ。ミューテーションとフェッチ反映はどちらも
/// この台帳のロックを取ってからキャッシュに書き込む。
pub struct TransactionLedger<R: CollectionRecord> {
    entries: HashMap<RecordId, PendingEntry<R>>,
    transactions: HashMap<TransactionId, PendingTransaction<R>>,
    clock: u64,
    // レコードごとの最終ローカル書き込み時刻（論理時刻）
    touched: HashMap<RecordId, u64>,
    // 発行済みで未反映のフェッチ（発行時刻 → 件数）
    inflight_fetches: BTreeMap<u64, usize>,
}

impl<R: CollectionRecord> Default for TransactionLedger<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CollectionRecord> TransactionLedger<R> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            transactions: HashMap::new(),
            clock: 0,
            touched: HashMap::new(),
            inflight_fetches: BTreeMap::new(),
        }
    }

    pub fn shared() -> SharedLedger<R> {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// 保留中のトランザクションを持つ最初の対象
    pub fn busy_target<'a>(&self, targets: &'a [RecordId]) -> Option<&'a RecordId> {
        targets.iter().find(|id| self.entries.contains_key(*id))
    }

    pub fn open(&mut self, transaction: PendingTransaction<R>, entries: Vec<PendingEntry<R>>) {
        for entry in entries {
            self.entries.insert(entry.record_id.clone(), entry);
        }
        self.transactions.insert(transaction.id, transaction);
    }

    pub fn entry(&self, id: &RecordId) -> Option<&PendingEntry<R>> {
        self.entries.get(id)
    }

    pub fn transaction_for(&self, id: &RecordId) -> Option<&PendingTransaction<R>> {
        let entry = self.entries.get(id)?;
        self.transactions.get(&entry.transaction)
    }

    pub fn take_entry(&mut self, id: &RecordId) -> Option<PendingEntry<R>> {
        self.entries.remove(id)
    }

    /// トランザクションを破棄する。残っているエントリも一緒に取り除く
    pub fn close_transaction(&mut self, id: TransactionId) -> Option<PendingTransaction<R>> {
        self.entries.retain(|_, entry| entry.transaction != id);
        self.transactions.remove(&id)
    }

    pub fn is_pending(&self, id: &RecordId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn touch(&mut self, id: RecordId, stamp: u64) {
        self.touched.insert(id, stamp);
    }

    fn touched_since(&self, id: &RecordId, stamp: u64) -> bool {
        self.touched.get(id).is_some_and(|touched| *touched > stamp)
    }

    pub fn begin_fetch(&mut self) -> u64 {
        let stamp = self.tick();
        *self.inflight_fetches.entry(stamp).or_insert(0) += 1;
        stamp
    }

    pub fn finish_fetch(&mut self, stamp: u64) {
        if let Some(count) = self.inflight_fetches.get_mut(&stamp) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.inflight_fetches.remove(&stamp);
            }
        }
        // 未反映のフェッチより古い書き込み記録はもう参照されない
        match self.inflight_fetches.keys().next().copied() {
            Some(floor) => self.touched.retain(|_, touched| *touched > floor),
            None => self.touched.clear(),
        }
    }

    /// 発行済みで未反映のフェッチがあるか
    pub fn has_inflight_fetches(&self) -> bool {
        !self.inflight_fetches.is_empty()
    }

    /// フェッチ結果を現在の状態と突き合わせてスナップショットを作る
    ///
    /// - 保留中のレコードは投機的な値を重ね、ベースラインをサーバー値に更新する
    /// - フェッチ発行後にローカルで書き込まれたレコードはローカル値を優先する
    /// - 保留中の一時レコードは記録した位置に差し込む
    pub fn overlay_fetch(
        &mut self,
        key: &QueryKey,
        current: Option<&Snapshot<R>>,
        page: RemotePage<R>,
        issued_at: u64,
        fetched_at: DateTime<Utc>,
    ) -> Snapshot<R> {
        let RemotePage {
            items: fetched,
            mut total,
        } = page;
        let mut items: Vec<R> = Vec::with_capacity(fetched.len());

        for item in fetched {
            let id = item.id().clone();

            if let Some(entry) = self.entries.get_mut(&id) {
                entry.baseline = Some(item.clone());
                let hidden = if entry.key == *key {
                    entry.position = items.len();
                    entry.is_removal()
                } else {
                    matches!(entry.effect, PendingEffect::Remove { changes: None })
                };
                if hidden {
                    total = total.saturating_sub(1);
                } else if let Some(value) = entry.speculative_value(&item) {
                    items.push(value);
                }
                continue;
            }

            if self.touched_since(&id, issued_at) {
                if let Some(current) = current {
                    match current.get(&id) {
                        Some(local) => items.push(local.clone()),
                        None => total = total.saturating_sub(1),
                    }
                    continue;
                }
            }

            items.push(item);
        }

        let mut provisional: Vec<(usize, R)> = self
            .entries
            .values()
            .filter(|entry| entry.key == *key)
            .filter_map(|entry| match &entry.effect {
                PendingEffect::Insert(record) => Some((entry.position, record.clone())),
                _ => None,
            })
            .collect();
        provisional.sort_by_key(|(position, _)| *position);
        for (position, record) in provisional {
            if items.iter().any(|item| item.id() == record.id()) {
                continue;
            }
            let index = position.min(items.len());
            items.insert(index, record);
            total += 1;
        }

        Snapshot::fetched(items, total, fetched_at)
    }
}
