use crate::application::ports::credential_provider::{
    Credential, CredentialError, CredentialProvider,
};
use crate::shared::metrics::SyncMetrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, warn};

type RefreshFuture = Shared<BoxFuture<'static, Result<Credential, CredentialError>>>;

enum RefreshState {
    Idle,
    RefreshInFlight(RefreshFuture),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    RefreshInFlight,
}

/// セッションの認証状態。UI 側はこれを購読して再ログイン画面へ遷移する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    ReauthenticationRequired,
    Closed,
}

struct Inner {
    provider: Arc<dyn CredentialProvider>,
    state: Mutex<RefreshState>,
    credential: RwLock<Option<Credential>>,
    status: watch::Sender<SessionStatus>,
    metrics: Arc<SyncMetrics>,
}

/// 資格情報の更新をセッション内で一本化するコーディネーター
///
/// 更新中に届いた呼び出しは新たな更新を始めず、進行中の結果を共有する。
/// ロック順は `state` → `credential`。
#[derive(Clone)]
pub struct CredentialRefreshCoordinator {
    inner: Arc<Inner>,
}

impl CredentialRefreshCoordinator {
    pub fn new(provider: Arc<dyn CredentialProvider>, metrics: Arc<SyncMetrics>) -> Self {
        Self::build(provider, metrics, None)
    }

    pub fn with_credential(
        provider: Arc<dyn CredentialProvider>,
        metrics: Arc<SyncMetrics>,
        credential: Credential,
    ) -> Self {
        Self::build(provider, metrics, Some(credential))
    }

    fn build(
        provider: Arc<dyn CredentialProvider>,
        metrics: Arc<SyncMetrics>,
        credential: Option<Credential>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Active);
        Self {
            inner: Arc::new(Inner {
                provider,
                state: Mutex::new(RefreshState::Idle),
                credential: RwLock::new(credential),
                status,
                metrics,
            }),
        }
    }

    pub async fn current(&self) -> Option<Credential> {
        self.inner.credential.read().await.clone()
    }

    /// ログイン直後などに外部から資格情報を設定する
    pub async fn set_credential(&self, credential: Credential) {
        *self.inner.credential.write().await = Some(credential);
        self.inner.status.send_replace(SessionStatus::Active);
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub async fn phase(&self) -> RefreshPhase {
        match &*self.inner.state.lock().await {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::RefreshInFlight(_) => RefreshPhase::RefreshInFlight,
        }
    }

    /// 資格情報を更新する。進行中の更新があればその結果を待つ
    pub async fn refresh(&self) -> Result<Credential, CredentialError> {
        let in_flight = {
            let mut state = self.inner.state.lock().await;
            if self.status() == SessionStatus::Closed {
                return Err(CredentialError::ReauthenticationRequired);
            }
            match &*state {
                RefreshState::RefreshInFlight(in_flight) => {
                    self.inner.metrics.record_refresh_join();
                    debug!("joining in-flight credential refresh");
                    in_flight.clone()
                }
                RefreshState::Idle => {
                    self.inner.metrics.record_refresh_started();
                    debug!("starting credential refresh");
                    let task = tokio::spawn(run_refresh(Arc::clone(&self.inner)));
                    let in_flight = async move {
                        task.await.unwrap_or_else(|err| {
                            Err(CredentialError::RefreshFailed(format!(
                                "refresh task failed: {err}"
                            )))
                        })
                    }
                    .boxed()
                    .shared();
                    *state = RefreshState::RefreshInFlight(in_flight.clone());
                    in_flight
                }
            }
        };
        in_flight.await
    }

    /// リクエストが 401 で拒否されたときの更新
    ///
    /// 拒否されたトークンが既に差し替わっていれば、更新せず現在の資格情報を返す。
    pub async fn refresh_after_rejection(
        &self,
        rejected_token: Option<&str>,
    ) -> Result<Credential, CredentialError> {
        if let Some(rejected) = rejected_token {
            if let Some(current) = self.current().await {
                if current.token() != rejected {
                    debug!("credential already rotated; retrying with current token");
                    return Ok(current);
                }
            }
        }
        self.refresh().await
    }

    /// セッション終了時の後始末
    pub async fn teardown(&self) {
        let mut state = self.inner.state.lock().await;
        *state = RefreshState::Idle;
        *self.inner.credential.write().await = None;
        self.inner.status.send_replace(SessionStatus::Closed);
        debug!("credential coordinator torn down");
    }
}

async fn run_refresh(inner: Arc<Inner>) -> Result<Credential, CredentialError> {
    let result = inner.provider.refresh().await;

    let mut state = inner.state.lock().await;
    let closed = *inner.status.borrow() == SessionStatus::Closed;
    if !closed {
        match &result {
            Ok(credential) => {
                *inner.credential.write().await = Some(credential.clone());
                inner.status.send_replace(SessionStatus::Active);
                debug!("credential refresh completed");
            }
            Err(err) => {
                *inner.credential.write().await = None;
                inner
                    .status
                    .send_replace(SessionStatus::ReauthenticationRequired);
                warn!(error = %err, "credential refresh failed; re-authentication required");
            }
        }
        *state = RefreshState::Idle;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    struct GatedProvider {
        calls: AtomicUsize,
        gate: Semaphore,
        fail: bool,
    }

    impl GatedProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl CredentialProvider for GatedProvider {
        async fn refresh(&self) -> Result<Credential, CredentialError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.gate.acquire().await.unwrap().forget();
            if self.fail {
                Err(CredentialError::RefreshFailed("refresh token revoked".into()))
            } else {
                Ok(Credential::new(format!("token-{call}")))
            }
        }
    }

    async fn join_callers(
        coordinator: &CredentialRefreshCoordinator,
        metrics: &SyncMetrics,
        callers: usize,
    ) -> Vec<tokio::task::JoinHandle<Result<Credential, CredentialError>>> {
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh().await })
            })
            .collect();
        while metrics.snapshot().refresh_joins < (callers as u64 - 1) {
            tokio::task::yield_now().await;
        }
        handles
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let provider = GatedProvider::new(false);
        let metrics = Arc::new(SyncMetrics::new());
        let coordinator = CredentialRefreshCoordinator::new(provider.clone(), Arc::clone(&metrics));

        let handles = join_callers(&coordinator, &metrics, 8).await;
        assert_eq!(coordinator.phase().await, RefreshPhase::RefreshInFlight);
        provider.gate.add_permits(1);

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().token(), "token-1");
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.phase().await, RefreshPhase::Idle);
        assert_eq!(coordinator.current().await.unwrap().token(), "token-1");
        assert_eq!(metrics.snapshot().refreshes_started, 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_requires_reauthentication() {
        let provider = GatedProvider::new(true);
        let metrics = Arc::new(SyncMetrics::new());
        let coordinator = CredentialRefreshCoordinator::with_credential(
            provider.clone(),
            Arc::clone(&metrics),
            Credential::new("expired"),
        );
        let mut status = coordinator.subscribe_status();

        let handles = join_callers(&coordinator, &metrics, 4).await;
        provider.gate.add_permits(1);

        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                Err(CredentialError::RefreshFailed("refresh token revoked".into()))
            );
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.current().await.is_none());
        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), SessionStatus::ReauthenticationRequired);
        assert_eq!(coordinator.phase().await, RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn test_rotated_token_skips_refresh() {
        let provider = GatedProvider::new(false);
        let coordinator = CredentialRefreshCoordinator::with_credential(
            provider.clone(),
            Arc::new(SyncMetrics::new()),
            Credential::new("token-fresh"),
        );

        let credential = coordinator
            .refresh_after_rejection(Some("token-stale"))
            .await
            .unwrap();

        assert_eq!(credential.token(), "token-fresh");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_teardown_closes_session() {
        let provider = GatedProvider::new(false);
        let coordinator = CredentialRefreshCoordinator::with_credential(
            provider.clone(),
            Arc::new(SyncMetrics::new()),
            Credential::new("token-1"),
        );

        coordinator.teardown().await;

        assert_eq!(coordinator.status(), SessionStatus::Closed);
        assert!(coordinator.current().await.is_none());
        assert_eq!(
            coordinator.refresh().await,
            Err(CredentialError::ReauthenticationRequired)
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
