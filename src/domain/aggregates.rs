use crate::domain::record::CollectionRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// 分類キーごとの件数
///
/// 常に `recompute` から作られ、個別に値を設定する手段は持たない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregates(BTreeMap<String, u64>);

impl Aggregates {
    pub fn count(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(key, count)| (key.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// アイテム一覧から集計を導出する
pub fn recompute<R: CollectionRecord>(items: &[R]) -> Aggregates {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for item in items {
        for key in item.aggregate_keys() {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    Aggregates(counts)
}
