use tracing::info;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::credential_provider::{Credential, CredentialError, CredentialProvider};
pub use application::ports::remote_collection::{RemoteCollectionService, RemoteError, RemotePage};
pub use application::ports::transport::{
    CollectionTransport, HttpMethod, TransportError, TransportRequest, TransportResponse,
};
pub use application::services::credential_coordinator::{
    CredentialRefreshCoordinator, RefreshPhase, SessionStatus,
};
pub use application::services::mutation_controller::{
    MutationOutcome, OptimisticMutationController, RecordOutcome,
};
pub use application::services::poll_scheduler::{
    Interaction, InteractionGuard, InteractionLock, PollPolicy, poll_interval,
};
pub use application::services::query_sync::QuerySync;
pub use domain::aggregates::{Aggregates, recompute};
pub use domain::entities::{PendingTransaction, Snapshot};
pub use domain::intent::{MutationIntent, MutationKind, ViewEffect};
pub use domain::record::{CollectionRecord, TransientState};
pub use domain::value_objects::{QueryFilter, QueryKey, RecordId};
pub use infrastructure::cache::QueryCache;
pub use infrastructure::polling::{PollHandle, spawn_poller};
pub use infrastructure::remote::RemoteCollectionClient;
pub use shared::config::SyncConfig;
pub use shared::error::{FetchError, MutationError, SessionError};
pub use shared::metrics::{SyncMetrics, SyncMetricsSnapshot};
pub use state::{CollectionHandle, SyncSession};

/// ログ設定の初期化
///
/// `RUST_LOG` が未設定の場合は `console_sync=debug,info` を使う。
/// 既にグローバルなサブスクライバが登録済みなら何もしない。
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let initialized = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "console_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if initialized {
        info!("console-sync logging initialized");
    }
}
