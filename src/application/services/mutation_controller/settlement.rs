use crate::application::ports::remote_collection::RemoteError;
use crate::domain::entities::{PendingEffect, PendingEntry, Snapshot};
use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::QueryKey;

/// リモート呼び出しが戻ったエントリ
pub(super) struct Settled<R: CollectionRecord> {
    pub(super) entry: PendingEntry<R>,
    pub(super) result: Result<Option<R>, RemoteError<R>>,
}

/// 確定結果を現在のスナップショットに反映する
///
/// 成功はサーバーの値で置き換え、失敗はベースラインに戻す。取り除いていた
/// レコードは元の位置に戻す（位置の小さい順に戻すので複数でも順序が保たれる）。
/// 作成の確定時、サーバーの行がフェッチで既に載っていれば一時レコードを外し、
/// 一時レコード分の `total` も戻す。
pub(super) fn apply_settlement<R: CollectionRecord>(
    key: &QueryKey,
    current: &Snapshot<R>,
    settled: &[Settled<R>],
) -> Snapshot<R> {
    let mut ordered: Vec<&Settled<R>> = settled.iter().collect();
    ordered.sort_by_key(|item| item.entry.position);

    let mut next = current.clone();
    for item in ordered {
        let entry = &item.entry;
        next = match (&entry.effect, &item.result) {
            (PendingEffect::Insert(provisional), Ok(Some(server))) => {
                if next.contains(server.id()) {
                    next.without_record(provisional.id())
                        .0
                        .with_record(server.clone())
                } else {
                    next.with_record_replacing(provisional.id(), server.clone())
                }
            }
            (PendingEffect::Replace(_), Ok(Some(server))) => next.with_record(server.clone()),
            (_, Ok(_)) => next,
            (_, Err(error)) => rollback(key, next, entry, error),
        };
    }
    next
}

fn rollback<R: CollectionRecord>(
    key: &QueryKey,
    snapshot: Snapshot<R>,
    entry: &PendingEntry<R>,
    error: &RemoteError<R>,
) -> Snapshot<R> {
    if let PendingEffect::Insert(provisional) = &entry.effect {
        return snapshot.without_record(provisional.id()).0;
    }
    let Some(baseline) = &entry.baseline else {
        return snapshot;
    };

    let (restored, in_view) = match error {
        RemoteError::Conflict { current, .. } => {
            let restored = baseline.apply(current);
            let in_view = restored.matches_filter(key.filter());
            (restored, in_view)
        }
        _ => (baseline.clone(), baseline.matches_filter(key.filter())),
    };

    let present = snapshot.contains(&entry.record_id);
    match (present, in_view) {
        (true, true) => snapshot.with_record(restored),
        (true, false) => snapshot.without_record(&entry.record_id).0,
        (false, true) if entry.is_removal() => snapshot.with_inserted(entry.position, restored),
        _ => snapshot,
    }
}
