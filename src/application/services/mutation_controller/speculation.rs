use crate::domain::entities::{PendingEffect, PendingEntry, Snapshot, TransactionId};
use crate::domain::intent::{MutationIntent, MutationKind, ViewEffect};
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::{QueryKey, RecordId};
use crate::shared::error::MutationError;

pub(super) struct SpeculativePlan<R: CollectionRecord> {
    pub(super) pre_snapshot: Snapshot<R>,
    pub(super) speculative: Snapshot<R>,
    pub(super) entries: Vec<PendingEntry<R>>,
}

/// 現在のスナップショットに意図を投機的に適用する
///
/// 対象がひとつでも見つからなければ何も変更せず `NotFound` を返す。
pub(super) fn speculate<R: CollectionRecord>(
    key: &QueryKey,
    current: &Snapshot<R>,
    intent: &MutationIntent<R>,
    transaction: TransactionId,
) -> Result<SpeculativePlan<R>, MutationError> {
    let mut next = current.clone();
    let mut entries = Vec::with_capacity(intent.targets().len());

    match intent.kind() {
        MutationKind::Update { changes, .. } => {
            for id in intent.targets() {
                let (position, baseline) = locate(current, id)?;
                let speculative = baseline.apply(changes);
                let leaves_view = match intent.view_effect() {
                    ViewEffect::FollowFilter => !speculative.matches_filter(key.filter()),
                    ViewEffect::KeepInView => false,
                    ViewEffect::RemoveFromView => true,
                };
                let effect = if leaves_view {
                    next = next.without_record(id).0;
                    PendingEffect::Remove {
                        changes: Some(changes.clone()),
                    }
                } else {
                    next = next.with_record(speculative);
                    PendingEffect::Replace(changes.clone())
                };
                entries.push(PendingEntry {
                    transaction,
                    key: key.clone(),
                    record_id: id.clone(),
                    baseline: Some(baseline),
                    position,
                    effect,
                });
            }
        }
        MutationKind::Delete => {
            for id in intent.targets() {
                let (position, baseline) = locate(current, id)?;
                next = next.without_record(id).0;
                entries.push(PendingEntry {
                    transaction,
                    key: key.clone(),
                    record_id: id.clone(),
                    baseline: Some(baseline),
                    position,
                    effect: PendingEffect::Remove { changes: None },
                });
            }
        }
        MutationKind::Create { provisional } => {
            let id = provisional.id();
            if current.contains(id) {
                return Err(MutationError::Invalid(format!(
                    "record {id} is already present in the view"
                )));
            }
            next = next.with_inserted(0, provisional.clone());
            entries.push(PendingEntry {
                transaction,
                key: key.clone(),
                record_id: id.clone(),
                baseline: None,
                position: 0,
                effect: PendingEffect::Insert(provisional.clone()),
            });
        }
    }

    Ok(SpeculativePlan {
        pre_snapshot: current.clone(),
        speculative: next,
        entries,
    })
}

fn locate<R: CollectionRecord>(
    snapshot: &Snapshot<R>,
    id: &RecordId,
) -> Result<(usize, R), MutationError> {
    let position = snapshot
        .position(id)
        .ok_or_else(|| MutationError::NotFound(id.clone()))?;
    let record = snapshot
        .get(id)
        .cloned()
        .ok_or_else(|| MutationError::NotFound(id.clone()))?;
    Ok((position, record))
}
