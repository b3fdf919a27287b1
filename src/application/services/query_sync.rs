use crate::application::ports::remote_collection::RemoteCollectionService;
use crate::application::services::transaction_ledger::SharedLedger;
use crate::domain::entities::Snapshot;
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::QueryKey;
use crate::infrastructure::cache::QueryCache;
use crate::shared::error::FetchError;
use crate::shared::metrics::SyncMetrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 一覧の取得とキャッシュへの反映
///
/// フェッチ結果は保留中のトランザクションと、フェッチ発行後のローカル書き込みを
/// 上書きしない。
#[derive(Clone)]
pub struct QuerySync<R: CollectionRecord> {
    cache: Arc<QueryCache<R>>,
    ledger: SharedLedger<R>,
    remote: Arc<dyn RemoteCollectionService<R>>,
    metrics: Arc<SyncMetrics>,
    stale_time: Duration,
}

impl<R: CollectionRecord> QuerySync<R> {
    pub fn new(
        cache: Arc<QueryCache<R>>,
        ledger: SharedLedger<R>,
        remote: Arc<dyn RemoteCollectionService<R>>,
        metrics: Arc<SyncMetrics>,
        stale_time: Duration,
    ) -> Self {
        Self {
            cache,
            ledger,
            remote,
            metrics,
            stale_time,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache<R>> {
        &self.cache
    }

    pub async fn snapshot(&self, key: &QueryKey) -> Option<Snapshot<R>> {
        self.cache.get(key).await
    }

    /// 常にリモートから取得してキャッシュを更新する
    ///
    /// 取得と反映は別タスクで行う。呼び出し側が途中で破棄しても反映までは走り、
    /// 台帳に発行中のフェッチが残らない。
    pub async fn refresh(&self, key: &QueryKey) -> Result<Snapshot<R>, FetchError> {
        let sync = self.clone();
        let key = key.clone();
        tokio::spawn(async move { sync.fetch_and_apply(&key).await })
            .await
            .map_err(|err| FetchError::Internal(format!("fetch task failed: {err}")))?
    }

    async fn fetch_and_apply(&self, key: &QueryKey) -> Result<Snapshot<R>, FetchError> {
        let issued_at = self.ledger.lock().await.begin_fetch();
        let fetched = self.remote.fetch(key).await;

        let mut ledger = self.ledger.lock().await;
        let page = match fetched {
            Ok(page) => page,
            Err(err) => {
                ledger.finish_fetch(issued_at);
                let err = err.into_fetch_error();
                warn!(key = %key, error = %err, "fetch failed");
                return Err(err);
            }
        };

        let current = self.cache.peek(key).await;
        let snapshot = ledger.overlay_fetch(key, current.as_ref(), page, issued_at, Utc::now());
        self.cache.set(key.clone(), snapshot.clone()).await;
        ledger.finish_fetch(issued_at);
        drop(ledger);

        self.metrics.record_fetch_applied();
        debug!(
            key = %key,
            items = snapshot.items().len(),
            total = snapshot.total(),
            "fetched snapshot applied"
        );
        Ok(snapshot)
    }

    /// キャッシュが新しければそれを返し、古ければ取得し直す
    pub async fn ensure_fresh(&self, key: &QueryKey) -> Result<Snapshot<R>, FetchError> {
        if let Some(snapshot) = self.cache.get(key).await {
            if !snapshot.needs_refetch(Utc::now(), self.stale_time) {
                return Ok(snapshot);
            }
        }
        self.refresh(key).await
    }

    /// 次回アクセス時に取得し直すよう古いとマークする
    pub async fn invalidate(&self, key: &QueryKey) -> bool {
        self.cache.mark_stale(key).await
    }
}
