use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// フィルタ条件の集合
///
/// 名前もその値もソート済み集合で保持するため、指定順序に依存しない。
/// 空文字や空白のみの値は保持しない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFilter(BTreeMap<String, BTreeSet<String>>);

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        for value in values {
            self.insert(name.clone(), value);
        }
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            return;
        }
        self.0
            .entry(name.to_string())
            .or_default()
            .insert(value.to_string());
    }

    pub fn values(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name)
    }

    /// 条件が未指定なら常に true、指定済みなら値が含まれるかどうか
    pub fn admits(&self, name: &str, value: &str) -> bool {
        match self.0.get(name) {
            Some(values) => values.contains(value),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

/// キャッシュされた一覧ビューを一意に表すキー
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryKey {
    resource: String,
    filter: QueryFilter,
    page: u32,
    page_size: u32,
}

impl QueryKey {
    /// `page` は 1 始まり。0 は 1 に、`page_size` の 0 は既定値に正規化する。
    pub fn new(resource: impl Into<String>, filter: QueryFilter, page: u32, page_size: u32) -> Self {
        Self {
            resource: resource.into().trim().to_string(),
            filter,
            page: page.max(1),
            page_size: if page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                page_size
            },
        }
    }

    pub fn first_page(resource: impl Into<String>, filter: QueryFilter) -> Self {
        Self::new(resource, filter, 1, DEFAULT_PAGE_SIZE)
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// リモート呼び出し用のクエリパラメータ（安定順）
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filter
            .iter()
            .map(|(name, values)| {
                let joined = values
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(",");
                (name.clone(), joined)
            })
            .collect();
        params.push(("page".to_string(), self.page.to_string()));
        params.push(("pageSize".to_string(), self.page_size.to_string()));
        params
    }

    /// 正規化済みの文字列表現
    pub fn canonical(&self) -> String {
        let mut parts: Vec<String> = self
            .filter
            .iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .map(|value| escape(value))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}={}", escape(name), values)
            })
            .collect();
        parts.push(format!("page={}", self.page));
        parts.push(format!("pageSize={}", self.page_size));
        format!("{}?{}", escape(&self.resource), parts.join("&"))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '&' => escaped.push_str("%26"),
            '=' => escaped.push_str("%3D"),
            ',' => escaped.push_str("%2C"),
            '?' => escaped.push_str("%3F"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_order_does_not_change_key() {
        let left = QueryFilter::new()
            .with("statusId", "2")
            .with("statusId", "1")
            .with("requester", "tanaka");
        let right = QueryFilter::new()
            .with("requester", "tanaka")
            .with_values("statusId", ["1", "2"]);

        let left_key = QueryKey::first_page("meal-requests", left);
        let right_key = QueryKey::first_page("meal-requests", right);

        assert_eq!(left_key, right_key);
        assert_eq!(left_key.canonical(), right_key.canonical());
        assert_eq!(
            left_key.canonical(),
            "meal-requests?requester=tanaka&statusId=1,2&page=1&pageSize=20"
        );
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let filter = QueryFilter::new()
            .with("statusId", "")
            .with("keyword", "   ")
            .with("", "x");
        assert!(filter.is_empty());
        assert_eq!(
            QueryKey::first_page("jobs", filter),
            QueryKey::first_page("jobs", QueryFilter::new())
        );
    }

    #[test]
    fn test_pagination_is_normalized() {
        let key = QueryKey::new("users", QueryFilter::new(), 0, 0);
        assert_eq!(key.page(), 1);
        assert_eq!(key.page_size(), DEFAULT_PAGE_SIZE);
        assert_ne!(key, QueryKey::new("users", QueryFilter::new(), 2, 0));
    }

    #[test]
    fn test_values_with_separators_are_escaped() {
        let key = QueryKey::first_page("roles", QueryFilter::new().with("name", "a,b&c"));
        assert_eq!(key.canonical(), "roles?name=a%2Cb%26c&page=1&pageSize=20");
    }

    #[test]
    fn test_admits_unset_filters() {
        let filter = QueryFilter::new().with("statusId", "1");
        assert!(filter.admits("statusId", "1"));
        assert!(!filter.admits("statusId", "2"));
        assert!(filter.admits("isEnabled", "true"));
    }
}
