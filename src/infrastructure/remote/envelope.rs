use crate::application::ports::remote_collection::RemotePage;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// `{"data": …}` で包まれていれば中身を取り出す
pub(crate) fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => data,
            None => Value::Object(map),
        },
        other => other,
    }
}

#[derive(Deserialize)]
struct WirePage<R> {
    items: Vec<R>,
    #[serde(default)]
    total: Option<u64>,
}

/// 一覧レスポンス。`{items, total}` と素の配列の両方を受け付ける
pub(crate) fn decode_page<R: DeserializeOwned>(payload: Value) -> Result<RemotePage<R>, serde_json::Error> {
    if payload.is_array() {
        let items: Vec<R> = serde_json::from_value(payload)?;
        let total = items.len() as u64;
        return Ok(RemotePage { items, total });
    }
    let page: WirePage<R> = serde_json::from_value(payload)?;
    let total = page.total.unwrap_or(page.items.len() as u64);
    Ok(RemotePage {
        items: page.items,
        total,
    })
}

/// エラーレスポンスの本文
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub current: Option<Value>,
}

impl ErrorBody {
    pub(crate) fn from_body(body: &Value) -> Self {
        let source = match body.get("error") {
            Some(Value::String(message)) => {
                return Self {
                    message: Some(message.clone()),
                    ..Self::default()
                };
            }
            Some(error @ Value::Object(_)) => error,
            _ => body,
        };
        serde_json::from_value(source.clone()).unwrap_or_default()
    }

    pub(crate) fn is_conflict(&self, status: u16) -> bool {
        status == 409 || self.code.as_deref() == Some("conflict")
    }
}
