use crate::domain::entities::Snapshot;
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::QueryKey;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::{Mutex, watch};

/// クエリキーごとの最新スナップショットを保持するキャッシュ
///
/// `update` / `try_update` はロックを保持したまま同期クロージャを実行するため、
/// 同じキーへの並行更新に対して原子的。ネットワークアクセスは一切行わない。
pub struct QueryCache<R: CollectionRecord> {
    entries: Mutex<LruCache<QueryKey, Snapshot<R>>>,
    version: watch::Sender<u64>,
}

impl<R: CollectionRecord> QueryCache<R> {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        let (version, _) = watch::channel(0);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            version,
        }
    }

    /// スナップショットを取得（LRU の順序を更新する）
    pub async fn get(&self, key: &QueryKey) -> Option<Snapshot<R>> {
        let mut entries = self.entries.lock().await;
        entries.get(key).cloned()
    }

    /// LRU の順序を変えずに参照する
    pub async fn peek(&self, key: &QueryKey) -> Option<Snapshot<R>> {
        let entries = self.entries.lock().await;
        entries.peek(key).cloned()
    }

    pub async fn set(&self, key: QueryKey, snapshot: Snapshot<R>) {
        let mut entries = self.entries.lock().await;
        entries.put(key, snapshot);
        drop(entries);
        self.notify();
    }

    /// 既存のスナップショットを置き換える。キーがなければ None
    pub async fn update<F>(&self, key: &QueryKey, updater: F) -> Option<Snapshot<R>>
    where
        F: FnOnce(&Snapshot<R>) -> Snapshot<R>,
    {
        let mut entries = self.entries.lock().await;
        let slot = entries.get_mut(key)?;
        let next = updater(slot);
        *slot = next.clone();
        drop(entries);
        self.notify();
        Some(next)
    }

    /// 失敗しうる更新。`Err` の場合はキャッシュを変更しない
    pub async fn try_update<T, E, F>(&self, key: &QueryKey, updater: F) -> Option<Result<T, E>>
    where
        F: FnOnce(&Snapshot<R>) -> Result<(Snapshot<R>, T), E>,
    {
        let mut entries = self.entries.lock().await;
        let slot = entries.get_mut(key)?;
        match updater(slot) {
            Ok((next, value)) => {
                *slot = next;
                drop(entries);
                self.notify();
                Some(Ok(value))
            }
            Err(err) => Some(Err(err)),
        }
    }

    pub async fn invalidate(&self, key: &QueryKey) -> Option<Snapshot<R>> {
        let mut entries = self.entries.lock().await;
        let removed = entries.pop(key);
        drop(entries);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// 条件に一致するキーをすべて削除し、削除数を返す
    pub async fn invalidate_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&QueryKey) -> bool,
    {
        let mut entries = self.entries.lock().await;
        let keys: Vec<QueryKey> = entries
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            entries.pop(key);
        }
        drop(entries);
        if !keys.is_empty() {
            self.notify();
        }
        keys.len()
    }

    pub async fn mark_stale(&self, key: &QueryKey) -> bool {
        self.update(key, Snapshot::<R>::marked_stale).await.is_some()
    }

    /// 条件に一致するスナップショットを古いとマークする
    pub async fn mark_stale_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&QueryKey, &Snapshot<R>) -> bool,
    {
        let mut entries = self.entries.lock().await;
        let mut marked = 0;
        for (key, snapshot) in entries.iter_mut() {
            if !snapshot.is_stale() && predicate(key, snapshot) {
                *snapshot = snapshot.marked_stale();
                marked += 1;
            }
        }
        drop(entries);
        if marked > 0 {
            self.notify();
        }
        marked
    }

    pub async fn keys(&self) -> Vec<QueryKey> {
        let entries = self.entries.lock().await;
        entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        self.notify();
    }

    /// 書き込みのたびに値が進むチャネルを購読する
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn notify(&self) {
        self.version.send_modify(|version| *version = version.wrapping_add(1));
    }
}
