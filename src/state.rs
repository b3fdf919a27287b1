use crate::application::ports::credential_provider::{Credential, CredentialProvider};
use crate::application::ports::remote_collection::RemoteCollectionService;
use crate::application::ports::transport::CollectionTransport;
use crate::application::services::credential_coordinator::{
    CredentialRefreshCoordinator, SessionStatus,
};
use crate::application::services::mutation_controller::{
    MutationOutcome, OptimisticMutationController,
};
use crate::application::services::poll_scheduler::{InteractionLock, PollPolicy, poll_interval};
use crate::application::services::query_sync::QuerySync;
use crate::application::services::transaction_ledger::{SharedLedger, TransactionLedger};
use crate::domain::entities::Snapshot;
use crate::domain::intent::MutationIntent;
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::QueryKey;
use crate::infrastructure::cache::QueryCache;
use crate::infrastructure::polling::{PollHandle, spawn_poller};
use crate::infrastructure::remote::RemoteCollectionClient;
use crate::shared::config::SyncConfig;
use crate::shared::error::{FetchError, MutationError, SessionError};
use crate::shared::metrics::{SyncMetrics, SyncMetricsSnapshot};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// レコード種別ごとにセッション内で共有するキャッシュと台帳
struct CollectionStore<R: CollectionRecord> {
    cache: Arc<QueryCache<R>>,
    ledger: SharedLedger<R>,
}

impl<R: CollectionRecord> Clone for CollectionStore<R> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            ledger: Arc::clone(&self.ledger),
        }
    }
}

type StoreMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// ログインセッション単位の同期状態
///
/// 資格情報の更新コーディネーター・操作ロック・メトリクスはセッションごとに一つ。
/// キャッシュと台帳はレコード種別ごとに一つで、同じ種別の `collection` は
/// すべて同じものを共有する。
#[derive(Clone)]
pub struct SyncSession {
    config: SyncConfig,
    credentials: CredentialRefreshCoordinator,
    interaction: InteractionLock,
    metrics: Arc<SyncMetrics>,
    stores: Arc<Mutex<StoreMap>>,
}

impl SyncSession {
    pub fn new(
        config: SyncConfig,
        provider: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::InvalidConfig)?;
        let metrics = Arc::new(SyncMetrics::new());
        let credentials = CredentialRefreshCoordinator::new(provider, Arc::clone(&metrics));

        info!(
            poll_interval_ms = config.poll.active_interval_ms,
            cache_entries = config.cache.max_entries,
            "sync session started"
        );
        Ok(Self {
            config,
            credentials,
            interaction: InteractionLock::new(),
            metrics,
            stores: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// 環境変数の設定でセッションを作る
    pub fn from_env(provider: Arc<dyn CredentialProvider>) -> Result<Self, SessionError> {
        Self::new(SyncConfig::from_env(), provider)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialRefreshCoordinator {
        &self.credentials
    }

    pub fn interaction_lock(&self) -> &InteractionLock {
        &self.interaction
    }

    pub fn status(&self) -> SessionStatus {
        self.credentials.status()
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn sign_in(&self, credential: Credential) {
        self.credentials.set_credential(credential).await;
    }

    /// トランスポート経由のリモートクライアントでコレクションを作る
    pub fn collection<R: CollectionRecord>(
        &self,
        resource: impl Into<String>,
        transport: Arc<dyn CollectionTransport>,
    ) -> CollectionHandle<R> {
        let client = RemoteCollectionClient::new(resource, transport, self.credentials.clone())
            .with_retry_on_unauthorized(self.config.remote.retry_on_unauthorized);
        self.collection_with_service(Arc::new(client))
    }

    pub fn collection_with_service<R: CollectionRecord>(
        &self,
        remote: Arc<dyn RemoteCollectionService<R>>,
    ) -> CollectionHandle<R> {
        let CollectionStore { cache, ledger } = self.store::<R>();
        let controller = OptimisticMutationController::new(
            Arc::clone(&cache),
            Arc::clone(&ledger),
            Arc::clone(&remote),
            Arc::clone(&self.metrics),
        );
        let sync = QuerySync::new(
            cache,
            ledger,
            remote,
            Arc::clone(&self.metrics),
            self.config.cache.stale_time(),
        );

        CollectionHandle {
            controller,
            sync,
            interaction: self.interaction.clone(),
            policy: PollPolicy::from(&self.config.poll),
        }
    }

    fn store<R: CollectionRecord>(&self) -> CollectionStore<R> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores
            .get(&TypeId::of::<R>())
            .and_then(|store| store.downcast_ref::<CollectionStore<R>>())
        {
            return store.clone();
        }

        let store = CollectionStore {
            cache: Arc::new(QueryCache::new(self.config.cache.max_entries)),
            ledger: TransactionLedger::shared(),
        };
        stores.insert(TypeId::of::<R>(), Box::new(store.clone()));
        store
    }

    /// 資格情報を破棄してセッションを閉じる
    pub async fn close(&self) {
        self.credentials.teardown().await;
        info!("sync session closed");
    }
}

/// あるレコード種別のキャッシュと同期操作一式
#[derive(Clone)]
pub struct CollectionHandle<R: CollectionRecord> {
    controller: OptimisticMutationController<R>,
    sync: QuerySync<R>,
    interaction: InteractionLock,
    policy: PollPolicy,
}

impl<R: CollectionRecord> CollectionHandle<R> {
    pub fn cache(&self) -> &Arc<QueryCache<R>> {
        self.sync.cache()
    }

    pub fn controller(&self) -> &OptimisticMutationController<R> {
        &self.controller
    }

    pub fn sync(&self) -> &QuerySync<R> {
        &self.sync
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub async fn mutate(
        &self,
        key: &QueryKey,
        intent: MutationIntent<R>,
    ) -> Result<MutationOutcome<R>, MutationError> {
        self.controller.mutate(key, intent).await
    }

    pub async fn refresh(&self, key: &QueryKey) -> Result<Snapshot<R>, FetchError> {
        self.sync.refresh(key).await
    }

    pub async fn ensure_fresh(&self, key: &QueryKey) -> Result<Snapshot<R>, FetchError> {
        self.sync.ensure_fresh(key).await
    }

    pub async fn snapshot(&self, key: &QueryKey) -> Option<Snapshot<R>> {
        self.sync.snapshot(key).await
    }

    /// 現在のキャッシュと操作ロックから求めたポーリング間隔
    pub async fn poll_interval(&self, key: &QueryKey) -> Duration {
        let snapshot = self.cache().peek(key).await;
        poll_interval(snapshot.as_ref(), self.interaction.state(), &self.policy)
    }

    /// `key` のポーリングを開始する。ハンドルを破棄すると止まる
    pub fn watch(&self, key: QueryKey) -> PollHandle {
        spawn_poller(
            self.sync.clone(),
            key,
            self.interaction.clone(),
            self.policy,
        )
    }
}
