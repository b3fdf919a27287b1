use crate::domain::value_objects::RecordId;
use serde_json::Value;
use thiserror::Error;

/// 楽観的ミューテーションの失敗分類
///
/// どの失敗も、呼び出し元に返る前に投機的な変更はロールバック済み。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    /// 対象レコードに未確定のトランザクションがある。キャッシュは変更していない
    #[error("Record {0} already has a mutation in flight")]
    Busy(RecordId),

    /// 対象レコードがキャッシュにない。呼び出し側はリフレッシュすること
    #[error("Record {0} is not present in the cached view")]
    NotFound(RecordId),

    /// サーバー側の変更前状態が想定と一致しなかった
    #[error("Conflict on {field} for record {id}: server has {current}")]
    Conflict {
        id: RecordId,
        field: String,
        current: Value,
    },

    #[error("Mutation rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Re-authentication required")]
    ReauthenticationRequired,

    #[error("Invalid mutation intent: {0}")]
    Invalid(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MutationError {
    /// UI で情報メッセージとして扱える想定内の失敗か
    pub fn is_expected(&self) -> bool {
        matches!(self, MutationError::Busy(_) | MutationError::Conflict { .. })
    }
}

/// 一覧取得（ポーリング・リフレッシュ）の失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Fetch rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Re-authentication required")]
    ReauthenticationRequired,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// セッション構築時の失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
