use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryKey, RecordId};
use crate::shared::error::{FetchError, MutationError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePage<R> {
    pub items: Vec<R>,
    pub total: u64,
}

/// リモートサービスが返す失敗
///
/// 競合は他の失敗と区別できなければならない。`current` は争点となったフィールドの
/// サーバー側の現在値を `Changes` 型で表したもの。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError<R: CollectionRecord> {
    #[error("Conflict on {field}")]
    Conflict { field: String, current: R::Changes },

    #[error("Rejected ({status:?}): {message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Re-authentication required")]
    ReauthenticationRequired,
}

impl<R: CollectionRecord> RemoteError<R> {
    pub fn rejected(message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status: None,
            message: message.into(),
        }
    }

    pub fn into_mutation_error(self, id: &RecordId) -> MutationError {
        match self {
            RemoteError::Conflict { field, current } => MutationError::Conflict {
                id: id.clone(),
                field,
                current: serde_json::to_value(&current).unwrap_or(serde_json::Value::Null),
            },
            RemoteError::Rejected { message, .. } => MutationError::Rejected(message),
            RemoteError::Network(message) => MutationError::Network(message),
            RemoteError::ReauthenticationRequired => MutationError::ReauthenticationRequired,
        }
    }

    pub fn into_fetch_error(self) -> FetchError {
        match self {
            RemoteError::Conflict { field, .. } => {
                FetchError::Rejected(format!("unexpected conflict on {field}"))
            }
            RemoteError::Rejected { message, .. } => FetchError::Rejected(message),
            RemoteError::Network(message) => FetchError::Network(message),
            RemoteError::ReauthenticationRequired => FetchError::ReauthenticationRequired,
        }
    }
}

/// リモートのコレクションサービス
#[async_trait]
pub trait RemoteCollectionService<R: CollectionRecord>: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> Result<RemotePage<R>, RemoteError<R>>;

    /// `expected` が与えられた場合、サーバーは変更前の値が一致しなければ競合を返す
    async fn mutate(
        &self,
        id: &RecordId,
        changes: &R::Changes,
        expected: Option<&R::Changes>,
    ) -> Result<R, RemoteError<R>>;

    async fn create(&self, draft: &R) -> Result<R, RemoteError<R>>;

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError<R>>;
}
