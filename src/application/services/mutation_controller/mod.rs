mod outcome;
mod settlement;
mod speculation;


pub use outcome::{MutationOutcome, RecordOutcome};

use crate::application::ports::remote_collection::{RemoteCollectionService, RemoteError};
use crate::application::services::transaction_ledger::SharedLedger;
use crate::domain::entities::{PendingTransaction, TransactionId};
use crate::domain::intent::{MutationIntent, MutationKind};
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryKey, RecordId};
use crate::infrastructure::cache::QueryCache;
use crate::shared::error::MutationError;
use crate::shared::metrics::SyncMetrics;
use chrono::Utc;
use futures::future::join_all;
use settlement::{Settled, apply_settlement};
use speculation::speculate;
use std::sync::Arc;
use tracing::{debug, warn};

/// 楽観的ミューテーションの制御
///
/// 投機的な変更をキャッシュに即時反映し、リモート呼び出しの結果で確定または
/// ロールバックする。リモート呼び出しと確定処理は別タスクで実行するため、
/// 呼び出し元の future が破棄されても保留中のトランザクションは必ず閉じられる。
#[derive(Clone)]
pub struct OptimisticMutationController<R: CollectionRecord> {
    cache: Arc<QueryCache<R>>,
    ledger: SharedLedger<R>,
    remote: Arc<dyn RemoteCollectionService<R>>,
    metrics: Arc<SyncMetrics>,
}

impl<R: CollectionRecord> OptimisticMutationController<R> {
    pub fn new(
        cache: Arc<QueryCache<R>>,
        ledger: SharedLedger<R>,
        remote: Arc<dyn RemoteCollectionService<R>>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            cache,
            ledger,
            remote,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache<R>> {
        &self.cache
    }

    pub async fn mutate(
        &self,
        key: &QueryKey,
        intent: MutationIntent<R>,
    ) -> Result<MutationOutcome<R>, MutationError> {
        let Some(first) = intent.targets().first().cloned() else {
            return Err(MutationError::Invalid(
                "mutation intent has no target records".to_string(),
            ));
        };
        let transaction = TransactionId::new();

        {
            let mut ledger = self.ledger.lock().await;
            if let Some(busy) = ledger.busy_target(intent.targets()) {
                self.metrics.record_busy_rejection();
                debug!(key = %key, record_id = %busy, "mutation rejected: record busy");
                return Err(MutationError::Busy(busy.clone()));
            }

            let plan = self
                .cache
                .try_update(key, |current| {
                    let plan = speculate(key, current, &intent, transaction)?;
                    Ok::<_, MutationError>((plan.speculative.clone(), plan))
                })
                .await
                .unwrap_or(Err(MutationError::NotFound(first)))?;

            ledger.open(
                PendingTransaction {
                    id: transaction,
                    key: key.clone(),
                    targets: intent.targets().to_vec(),
                    pre_snapshot: plan.pre_snapshot,
                    speculative: plan.speculative,
                    opened_at: Utc::now(),
                },
                plan.entries,
            );
        }

        self.metrics.record_speculative_install();
        debug!(
            key = %key,
            transaction = %transaction,
            targets = intent.targets().len(),
            "speculative snapshot installed"
        );

        let controller = self.clone();
        let key = key.clone();
        tokio::spawn(async move { controller.settle(key, transaction, intent).await })
            .await
            .map_err(|err| MutationError::Internal(format!("settlement task failed: {err}")))
    }

    /// レコードの保留中トランザクション
    pub async fn pending_transaction(&self, id: &RecordId) -> Option<PendingTransaction<R>> {
        self.ledger.lock().await.transaction_for(id).cloned()
    }

    pub async fn is_pending(&self, id: &RecordId) -> bool {
        self.ledger.lock().await.is_pending(id)
    }

    async fn call_remote(
        &self,
        id: &RecordId,
        kind: &MutationKind<R>,
    ) -> Result<Option<R>, RemoteError<R>> {
        match kind {
            MutationKind::Update { changes, expected } => self
                .remote
                .mutate(id, changes, expected.as_ref())
                .await
                .map(Some),
            MutationKind::Delete => self.remote.delete(id).await.map(|_| None),
            MutationKind::Create { provisional } => self.remote.create(provisional).await.map(Some),
        }
    }

    async fn settle(
        &self,
        key: QueryKey,
        transaction: TransactionId,
        intent: MutationIntent<R>,
    ) -> MutationOutcome<R> {
        let calls = intent
            .targets()
            .iter()
            .map(|id| self.call_remote(id, intent.kind()));
        let results = join_all(calls).await;

        let mut ledger = self.ledger.lock().await;
        let stamp = ledger.tick();
        let mut settled = Vec::with_capacity(results.len());
        let mut records = Vec::with_capacity(results.len());
        let mut written: Vec<RecordId> = Vec::new();

        for (id, result) in intent.targets().iter().zip(results) {
            let outcome = match &result {
                Ok(record) => Ok(record.clone()),
                Err(err) => Err(err.clone().into_mutation_error(id)),
            };
            if let Ok(Some(record)) = &result {
                if record.id() != id {
                    ledger.touch(record.id().clone(), stamp);
                    written.push(record.id().clone());
                }
            }
            ledger.touch(id.clone(), stamp);
            written.push(id.clone());

            match ledger.take_entry(id) {
                Some(entry) => settled.push(Settled { entry, result }),
                None => warn!(record_id = %id, "pending entry vanished before settlement"),
            }
            records.push(RecordOutcome {
                id: id.clone(),
                result: outcome,
            });
        }
        ledger.close_transaction(transaction);
        self.cache
            .update(&key, |current| apply_settlement(&key, current, &settled))
            .await;
        drop(ledger);

        for record in &records {
            match &record.result {
                Ok(_) => {
                    self.metrics.record_confirmation();
                    debug!(key = %key, record_id = %record.id, "mutation confirmed");
                }
                Err(MutationError::Conflict { field, .. }) => {
                    self.metrics.record_rollback(true);
                    warn!(
                        key = %key,
                        record_id = %record.id,
                        field = %field,
                        "mutation conflicted; rolled back to server value"
                    );
                }
                Err(err) => {
                    self.metrics.record_rollback(false);
                    warn!(key = %key, record_id = %record.id, error = %err, "mutation rolled back");
                }
            }
        }

        let marked = self
            .cache
            .mark_stale_where(|other, snapshot| {
                other != &key && written.iter().any(|id| snapshot.contains(id))
            })
            .await;
        if marked > 0 {
            debug!(key = %key, views = marked, "marked overlapping views stale");
        }

        MutationOutcome::new(records)
    }
}
