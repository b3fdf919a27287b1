use super::envelope::{ErrorBody, decode_page, unwrap_data};
use crate::application::ports::remote_collection::{
    RemoteCollectionService, RemoteError, RemotePage,
};
use crate::application::ports::transport::{
    CollectionTransport, HttpMethod, TransportRequest, TransportResponse,
};
use crate::application::services::credential_coordinator::CredentialRefreshCoordinator;
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryKey, RecordId};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// トランスポート上のリモートコレクションクライアント
///
/// 401 を受けたら資格情報の更新を一度だけ行い、同じリクエストを再送する。
pub struct RemoteCollectionClient<R> {
    resource: String,
    transport: Arc<dyn CollectionTransport>,
    credentials: CredentialRefreshCoordinator,
    retry_on_unauthorized: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R: CollectionRecord> RemoteCollectionClient<R> {
    pub fn new(
        resource: impl Into<String>,
        transport: Arc<dyn CollectionTransport>,
        credentials: CredentialRefreshCoordinator,
    ) -> Self {
        Self {
            resource: resource.into(),
            transport,
            credentials,
            retry_on_unauthorized: true,
            _record: PhantomData,
        }
    }

    pub fn with_retry_on_unauthorized(mut self, retry: bool) -> Self {
        self.retry_on_unauthorized = retry;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn collection_path(&self) -> String {
        format!("/{}", self.resource)
    }

    fn record_path(&self, id: &RecordId) -> String {
        format!("/{}/{}", self.resource, id)
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, RemoteError<R>> {
        let token = self
            .credentials
            .current()
            .await
            .map(|credential| credential.token().to_string());
        let response = self
            .transport
            .send(request.clone().with_bearer(token.clone()))
            .await
            .map_err(|err| RemoteError::Network(err.0))?;
        if response.status != 401 {
            return Ok(response);
        }
        if !self.retry_on_unauthorized {
            return Err(RemoteError::ReauthenticationRequired);
        }

        debug!(resource = %self.resource, "request unauthorized; refreshing credentials");
        let credential = self
            .credentials
            .refresh_after_rejection(token.as_deref())
            .await
            .map_err(|err| {
                warn!(resource = %self.resource, error = %err, "credential refresh failed");
                RemoteError::ReauthenticationRequired
            })?;

        let retried = self
            .transport
            .send(request.with_bearer(Some(credential.token().to_string())))
            .await
            .map_err(|err| RemoteError::Network(err.0))?;
        if retried.status == 401 {
            warn!(resource = %self.resource, "request still unauthorized after refresh");
            return Err(RemoteError::ReauthenticationRequired);
        }
        Ok(retried)
    }

    /// 応答をステータスで振り分ける
    ///
    /// 競合応答でも現在値が無い、または `Changes` として読めない場合は
    /// `Rejected`（ステータス付き）として返す。
    fn classify(&self, response: TransportResponse) -> Result<Value, RemoteError<R>> {
        if response.is_success() {
            return Ok(unwrap_data(response.body));
        }

        let status = response.status;
        let error = ErrorBody::from_body(&response.body);
        if error.is_conflict(status) {
            match error.current.clone().map(serde_json::from_value::<R::Changes>) {
                Some(Ok(current)) => {
                    return Err(RemoteError::Conflict {
                        field: error.field.unwrap_or_else(|| "unknown".to_string()),
                        current,
                    });
                }
                Some(Err(err)) => {
                    warn!(resource = %self.resource, status, error = %err, "conflict payload could not be decoded, reporting as rejected");
                }
                None => {
                    warn!(resource = %self.resource, status, "conflict without current value, reporting as rejected");
                }
            }
        }

        Err(RemoteError::Rejected {
            status: Some(status),
            message: error
                .message
                .unwrap_or_else(|| format!("request failed with status {status}")),
        })
    }

    async fn execute(&self, request: TransportRequest) -> Result<Value, RemoteError<R>> {
        let response = self.send(request).await?;
        self.classify(response)
    }
}

fn encode<R: CollectionRecord, T: Serialize + ?Sized>(value: &T) -> Result<Value, RemoteError<R>> {
    serde_json::to_value(value).map_err(|err| RemoteError::Rejected {
        status: None,
        message: format!("request could not be encoded: {err}"),
    })
}

fn decode<R: CollectionRecord, T: DeserializeOwned>(value: Value) -> Result<T, RemoteError<R>> {
    serde_json::from_value(value).map_err(|err| RemoteError::Rejected {
        status: None,
        message: format!("malformed response: {err}"),
    })
}

#[async_trait]
impl<R: CollectionRecord> RemoteCollectionService<R> for RemoteCollectionClient<R> {
    async fn fetch(&self, key: &QueryKey) -> Result<RemotePage<R>, RemoteError<R>> {
        let request = TransportRequest::new(HttpMethod::Get, self.collection_path())
            .with_query(key.to_query_params());
        let payload = self.execute(request).await?;
        decode_page(payload).map_err(|err| RemoteError::Rejected {
            status: None,
            message: format!("malformed page: {err}"),
        })
    }

    async fn mutate(
        &self,
        id: &RecordId,
        changes: &R::Changes,
        expected: Option<&R::Changes>,
    ) -> Result<R, RemoteError<R>> {
        let mut body = Map::new();
        body.insert("changes".to_string(), encode::<R, _>(changes)?);
        if let Some(expected) = expected {
            body.insert("expected".to_string(), encode::<R, _>(expected)?);
        }
        let request = TransportRequest::new(HttpMethod::Patch, self.record_path(id))
            .with_body(Value::Object(body));
        let payload = self.execute(request).await?;
        decode(payload)
    }

    async fn create(&self, draft: &R) -> Result<R, RemoteError<R>> {
        let mut body = encode::<R, _>(draft)?;
        if draft.id().is_provisional() {
            if let Value::Object(map) = &mut body {
                map.remove("id");
            }
        }
        let request =
            TransportRequest::new(HttpMethod::Post, self.collection_path()).with_body(body);
        let payload = self.execute(request).await?;
        decode(payload)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError<R>> {
        let request = TransportRequest::new(HttpMethod::Delete, self.record_path(id));
        self.execute(request).await.map(|_| ())
    }
}
