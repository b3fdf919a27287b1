use crate::application::services::poll_scheduler::{
    InteractionLock, PollPolicy, interaction_from, poll_interval,
};
use crate::application::services::query_sync::QuerySync;
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::QueryKey;
use crate::shared::error::FetchError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

/// 実行中のポーラーのハンドル
///
/// ハンドルを破棄するとポーラーは次の待機で停止する。実行中のフェッチは
/// 中断せず、反映まで終えてから止まる。
#[derive(Debug)]
pub struct PollHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 停止を要求し、ポーラーが終わるまで待つ
    pub async fn shutdown(self) {
        self.stop();
        if let Err(err) = self.task.await {
            warn!(error = %err, "poller task ended abnormally");
        }
    }
}

/// `key` のポーリングを開始する
///
/// キャッシュか操作ロックが変わるたびに間隔を評価し直す。ロック中はフェッチしない。
/// 再認証が必要になった時点で停止する。
pub fn spawn_poller<R: CollectionRecord>(
    sync: QuerySync<R>,
    key: QueryKey,
    lock: InteractionLock,
    policy: PollPolicy,
) -> PollHandle {
    let (stop, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut cache_changes = sync.cache().subscribe();
        let mut lock_changes = lock.subscribe();
        let mut deadline: Option<Instant> = None;

        loop {
            let snapshot = sync.cache().peek(&key).await;
            let interaction = interaction_from(*lock_changes.borrow_and_update());
            let interval = poll_interval(snapshot.as_ref(), interaction, &policy);

            deadline = if interval.is_zero() {
                None
            } else {
                let candidate = Instant::now() + interval;
                match deadline {
                    Some(current) if current <= candidate => Some(current),
                    _ => Some(candidate),
                }
            };

            let due = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = stop_rx.changed() => break,
                changed = cache_changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                changed = lock_changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = due => {}
            }

            deadline = None;
            match sync.refresh(&key).await {
                Ok(snapshot) => {
                    debug!(key = %key, total = snapshot.total(), "poll refresh applied");
                }
                Err(FetchError::ReauthenticationRequired) => {
                    warn!(key = %key, "polling stopped: re-authentication required");
                    break;
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "poll refresh failed");
                }
            }
        }

        debug!(key = %key, "poller stopped");
    });

    PollHandle { stop, task }
}
