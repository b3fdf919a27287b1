use crate::domain::record::CollectionRecord;
use crate::domain::value_objects::RecordId;

/// ミューテーション後にレコードを現在のビューに残すかどうか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewEffect {
    /// 投機的な値がキーのフィルタに一致するかで判断する
    #[default]
    FollowFilter,
    KeepInView,
    RemoveFromView,
}

#[derive(Debug, Clone)]
pub enum MutationKind<R: CollectionRecord> {
    Update {
        changes: R::Changes,
        expected: Option<R::Changes>,
    },
    Delete,
    Create {
        provisional: R,
    },
}

/// UI から要求される変更内容
#[derive(Debug, Clone)]
pub struct MutationIntent<R: CollectionRecord> {
    targets: Vec<RecordId>,
    kind: MutationKind<R>,
    view_effect: ViewEffect,
}

impl<R: CollectionRecord> MutationIntent<R> {
    pub fn update(id: RecordId, changes: R::Changes) -> Self {
        Self::bulk_update([id], changes)
    }

    pub fn bulk_update<I>(ids: I, changes: R::Changes) -> Self
    where
        I: IntoIterator<Item = RecordId>,
    {
        Self {
            targets: dedup(ids),
            kind: MutationKind::Update {
                changes,
                expected: None,
            },
            view_effect: ViewEffect::default(),
        }
    }

    pub fn delete(id: RecordId) -> Self {
        Self::bulk_delete([id])
    }

    pub fn bulk_delete<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = RecordId>,
    {
        Self {
            targets: dedup(ids),
            kind: MutationKind::Delete,
            view_effect: ViewEffect::RemoveFromView,
        }
    }

    /// `provisional` の ID は `RecordId::provisional()` で発行したものを使う
    pub fn create(provisional: R) -> Self {
        Self {
            targets: vec![provisional.id().clone()],
            kind: MutationKind::Create { provisional },
            view_effect: ViewEffect::KeepInView,
        }
    }

    /// 競合検出用に、呼び出し側が想定している変更前の値を添える
    ///
    /// Update 以外では意味を持たないため無視される。
    pub fn expecting(mut self, pre_state: R::Changes) -> Self {
        if let MutationKind::Update { expected, .. } = &mut self.kind {
            *expected = Some(pre_state);
        }
        self
    }

    pub fn with_view_effect(mut self, effect: ViewEffect) -> Self {
        if matches!(self.kind, MutationKind::Update { .. }) {
            self.view_effect = effect;
        }
        self
    }

    pub fn targets(&self) -> &[RecordId] {
        &self.targets
    }

    pub fn kind(&self) -> &MutationKind<R> {
        &self.kind
    }

    pub fn view_effect(&self) -> ViewEffect {
        self.view_effect
    }
}

fn dedup<I>(ids: I) -> Vec<RecordId>
where
    I: IntoIterator<Item = RecordId>,
{
    let mut targets: Vec<RecordId> = Vec::new();
    for id in ids {
        if !targets.contains(&id) {
            targets.push(id);
        }
    }
    targets
}
