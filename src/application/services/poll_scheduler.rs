use crate::domain::entities::Snapshot;
use crate::domain::record::CollectionRecord;
use crate::shared::config::PollConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// ポーリング間隔の設定。`Duration::ZERO` はポーリングしないことを表す
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub active_interval: Duration,
    pub idle_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_secs(5),
            idle_interval: Duration::ZERO,
        }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            active_interval: config.active_interval(),
            idle_interval: config.idle_interval(),
        }
    }
}

/// UI 側の操作状態（モーダル表示中など）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Locked,
}

/// スナップショットと操作状態からポーリング間隔を決める
///
/// 操作中は常に 0。タブの表示状態は考慮しない。
pub fn poll_interval<R: CollectionRecord>(
    snapshot: Option<&Snapshot<R>>,
    interaction: Interaction,
    policy: &PollPolicy,
) -> Duration {
    if interaction == Interaction::Locked {
        return Duration::ZERO;
    }
    match snapshot {
        Some(snapshot) if snapshot.has_active_items() => policy.active_interval,
        _ => policy.idle_interval,
    }
}

/// セッション単位の操作ロック
///
/// `acquire` が返すガードが一つでも生きている間はロック状態になる。
#[derive(Debug, Clone)]
pub struct InteractionLock {
    holders: Arc<watch::Sender<usize>>,
}

impl Default for InteractionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionLock {
    pub fn new() -> Self {
        let (holders, _) = watch::channel(0);
        Self {
            holders: Arc::new(holders),
        }
    }

    pub fn acquire(&self) -> InteractionGuard {
        self.holders.send_modify(|count| *count += 1);
        InteractionGuard {
            holders: Arc::clone(&self.holders),
        }
    }

    pub fn state(&self) -> Interaction {
        interaction_from(*self.holders.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.holders.subscribe()
    }
}

pub(crate) fn interaction_from(holders: usize) -> Interaction {
    if holders > 0 {
        Interaction::Locked
    } else {
        Interaction::Idle
    }
}

#[derive(Debug)]
pub struct InteractionGuard {
    holders: Arc<watch::Sender<usize>>,
}

impl Drop for InteractionGuard {
    fn drop(&mut self) {
        self.holders
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}
