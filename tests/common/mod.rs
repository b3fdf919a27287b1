#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use console_sync::domain::entities::{
    JobRunState, MealRequest, MealRequestChanges, ScheduledJob, ScheduledJobChanges,
};
use console_sync::{
    CollectionRecord, CollectionTransport, Credential, CredentialError, CredentialProvider,
    QueryKey, RecordId, RemoteCollectionService, RemoteError, RemotePage, TransportError,
    TransportRequest, TransportResponse,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

type Projection<R> = Box<dyn Fn(&R) -> (String, <R as CollectionRecord>::Changes) + Send + Sync>;

/// 単一ライターのインメモリバックエンド
///
/// `expected` が与えられたミューテーションは、現在値が一致しなければ競合を返す。
pub struct MemoryBackend<R: CollectionRecord> {
    records: Mutex<Vec<R>>,
    failures: Mutex<HashMap<RecordId, RemoteError<R>>>,
    fetch_failure: Mutex<Option<RemoteError<R>>>,
    gates: Mutex<HashMap<RecordId, Arc<Semaphore>>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    created_gate: Mutex<Option<Arc<Semaphore>>>,
    fetches: AtomicUsize,
    mutations: AtomicUsize,
    next_id: AtomicI64,
    projection: Projection<R>,
}

impl<R: CollectionRecord> MemoryBackend<R> {
    pub fn new(
        records: Vec<R>,
        projection: impl Fn(&R) -> (String, R::Changes) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            failures: Mutex::new(HashMap::new()),
            fetch_failure: Mutex::new(None),
            gates: Mutex::new(HashMap::new()),
            fetch_gate: Mutex::new(None),
            created_gate: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
            next_id: AtomicI64::new(1000),
            projection: Box::new(projection),
        })
    }

    pub async fn fail(&self, id: i64, error: RemoteError<R>) {
        self.failures.lock().await.insert(RecordId::from(id), error);
    }

    pub async fn fail_fetches(&self, error: RemoteError<R>) {
        *self.fetch_failure.lock().await = Some(error);
    }

    /// `id` へのミューテーションの応答を保留する。`add_permits` で一件ずつ解放
    pub async fn hold(&self, id: i64) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .await
            .insert(RecordId::from(id), Arc::clone(&gate));
        gate
    }

    /// フェッチの応答を保留する。応答内容は保留前に読み取った値になる
    pub async fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    /// 作成を確定したあとで応答を保留する
    pub async fn hold_created(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.created_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    pub async fn record(&self, id: i64) -> Option<R> {
        let id = RecordId::from(id);
        self.records
            .lock()
            .await
            .iter()
            .find(|record| record.id() == &id)
            .cloned()
    }

    /// 他のクライアントによる書き込み
    pub async fn put(&self, record: R) {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|current| current.id() == record.id()) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    async fn gate_for(&self, id: &RecordId) -> Option<Arc<Semaphore>> {
        self.gates.lock().await.get(id).cloned()
    }

    async fn respond(&self, id: &RecordId) -> Result<(), RemoteError<R>> {
        if let Some(gate) = self.gate_for(id).await {
            gate.acquire().await.expect("gate open").forget();
        }
        match self.failures.lock().await.get(id).cloned() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: CollectionRecord> RemoteCollectionService<R> for MemoryBackend<R> {
    async fn fetch(&self, key: &QueryKey) -> Result<RemotePage<R>, RemoteError<R>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let matching: Vec<R> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| record.matches_filter(key.filter()))
            .cloned()
            .collect();

        let gate = self.fetch_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if let Some(error) = self.fetch_failure.lock().await.clone() {
            return Err(error);
        }

        let total = matching.len() as u64;
        let size = key.page_size() as usize;
        let start = (key.page() as usize - 1) * size;
        let items = matching.into_iter().skip(start).take(size).collect();
        Ok(RemotePage { items, total })
    }

    async fn mutate(
        &self,
        id: &RecordId,
        changes: &R::Changes,
        expected: Option<&R::Changes>,
    ) -> Result<R, RemoteError<R>> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.respond(id).await?;

        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|record| record.id() == id) else {
            return Err(RemoteError::Rejected {
                status: Some(404),
                message: format!("record {id} not found"),
            });
        };
        if let Some(expected) = expected {
            if record.apply(expected) != *record {
                let (field, current) = (self.projection)(record);
                return Err(RemoteError::Conflict { field, current });
            }
        }
        *record = record.apply(changes);
        Ok(record.clone())
    }

    async fn create(&self, draft: &R) -> Result<R, RemoteError<R>> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.respond(draft.id()).await?;

        let mut value = serde_json::to_value(draft).expect("serializable draft");
        value["id"] = json!(self.next_id.fetch_add(1, Ordering::SeqCst));
        let created: R = serde_json::from_value(value).expect("valid record");
        self.records.lock().await.insert(0, created.clone());

        let gate = self.created_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }
        Ok(created)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError<R>> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.respond(id).await?;
        self.records.lock().await.retain(|record| record.id() != id);
        Ok(())
    }
}

pub fn meal_request(id: i64, status_id: i64) -> MealRequest {
    let meal_date = NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date");
    MealRequest::new(RecordId::from(id), format!("requester{id}"), meal_date, status_id)
}

pub fn meal_backend(records: Vec<MealRequest>) -> Arc<MemoryBackend<MealRequest>> {
    MemoryBackend::new(records, |record: &MealRequest| {
        ("statusId".to_string(), MealRequestChanges::status(record.status_id))
    })
}

pub fn scheduled_job(id: i64, run_state: JobRunState) -> ScheduledJob {
    ScheduledJob::new(RecordId::from(id), format!("job-{id}"), "*/5 * * * *").with_run_state(run_state)
}

pub fn job_backend(records: Vec<ScheduledJob>) -> Arc<MemoryBackend<ScheduledJob>> {
    MemoryBackend::new(records, |job: &ScheduledJob| {
        ("isEnabled".to_string(), ScheduledJobChanges::toggle(job.is_enabled))
    })
}

/// 有効なトークンを一つだけ受け付けるトランスポート
pub struct TokenCheckingTransport {
    valid_token: Mutex<String>,
    body: Value,
    pub requests: Mutex<Vec<TransportRequest>>,
}

impl TokenCheckingTransport {
    pub fn new(valid_token: &str, body: Value) -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new(valid_token.to_string()),
            body,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub async fn rotate(&self, token: &str) {
        *self.valid_token.lock().await = token.to_string();
    }

    pub async fn unauthorized_count(&self) -> usize {
        let valid = self.valid_token.lock().await.clone();
        self.requests
            .lock()
            .await
            .iter()
            .filter(|request| request.bearer.as_deref() != Some(valid.as_str()))
            .count()
    }
}

#[async_trait]
impl CollectionTransport for TokenCheckingTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let authorized = request.bearer.as_deref() == Some(self.valid_token.lock().await.as_str());
        self.requests.lock().await.push(request);
        // 応答前に他の呼び出しが割り込めるようにする
        tokio::task::yield_now().await;
        if authorized {
            Ok(TransportResponse::new(200, json!({ "data": self.body.clone() })))
        } else {
            Ok(TransportResponse::new(401, json!({ "message": "token expired" })))
        }
    }
}

/// 呼び出し回数を数え、ゲートが開くまで応答しないプロバイダ
pub struct GatedProvider {
    pub calls: AtomicUsize,
    pub gate: Semaphore,
    outcome: Result<String, CredentialError>,
}

impl GatedProvider {
    pub fn issuing(token: &str) -> Arc<Self> {
        Self::with_outcome(Ok(token.to_string()))
    }

    pub fn failing(error: CredentialError) -> Arc<Self> {
        Self::with_outcome(Err(error))
    }

    fn with_outcome(outcome: Result<String, CredentialError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            outcome,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for GatedProvider {
    async fn refresh(&self) -> Result<Credential, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.expect("gate open").forget();
        self.outcome.clone().map(Credential::new)
    }
}

/// 条件が満たされるまで少しずつ時間を進めて待つ
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
