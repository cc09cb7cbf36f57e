//! Webhook REST implementation of [`BatchClient`].
//!
//! The remote CRM exposes a webhook base URL; creates go through the
//! `crm.item.batchImport` endpoint, link updates and fetches through the
//! `batch` endpoint as command maps. Batch calls get a 60 s upper bound,
//! beyond which the call is treated as failed, not retried.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{BatchClient, EntityKind, EntityRecord, LinkPair};
use crate::error::RemoteError;

const SINGLE_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const BATCH_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Batch client speaking the remote CRM's webhook REST protocol.
pub struct HttpBatchClient {
    http: Client,
    webhook_url: String,
}

impl HttpBatchClient {
    /// Create a client for the given webhook base URL (trailing slash).
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(SINGLE_CALL_TIMEOUT)
            .build()
            .map_err(RemoteError::Http)?;
        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
        })
    }

    /// POST a JSON payload to `{webhook_url}{method}.json` and return the
    /// parsed body, surfacing remote-reported errors.
    async fn post(&self, method: &str, payload: &Value) -> Result<Value, RemoteError> {
        let url = format!("{}{}.json", self.webhook_url, method);

        let response = self
            .http
            .post(&url)
            .timeout(BATCH_CALL_TIMEOUT)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(format!(
                "{} returned {}: {}",
                method,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let data: Value = response.json().await?;
        if let Some(err) = data.get("error") {
            return Err(RemoteError::Api(format!("{}: {}", method, err)));
        }
        Ok(data)
    }

    /// Execute a `batch` command map and return the per-command results.
    async fn execute_batch(&self, commands: Value) -> Result<Value, RemoteError> {
        let payload = json!({ "halt": 0, "cmd": commands });
        let data = self.post("batch", &payload).await?;
        data.pointer("/result/result")
            .cloned()
            .ok_or_else(|| RemoteError::Shape("batch response missing result.result".into()))
    }
}

#[async_trait]
impl BatchClient for HttpBatchClient {
    async fn create_batch(
        &self,
        kind: EntityKind,
        items: Vec<Value>,
    ) -> Result<Vec<Option<i64>>, RemoteError> {
        let requested = items.len();
        let payload = json!({
            "entityTypeId": kind.type_id(),
            "data": items,
        });
        let data = self.post("crm.item.batchImport", &payload).await?;

        let returned = data
            .pointer("/result/items")
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::Shape("batchImport response missing result.items".into()))?;

        // One entry per requested item; the remote reports rejects in place.
        let mut ids: Vec<Option<i64>> = returned
            .iter()
            .map(|entry| entry.pointer("/item/id").and_then(value_to_i64))
            .collect();
        if ids.len() < requested {
            warn!(
                kind = kind.as_str(),
                requested,
                returned = ids.len(),
                "Batch import returned fewer entries than requested"
            );
            ids.resize(requested, None);
        }
        debug!(
            kind = kind.as_str(),
            requested,
            created = ids.iter().filter(|id| id.is_some()).count(),
            "Batch import finished"
        );
        Ok(ids)
    }

    async fn link_batch(&self, pairs: &[LinkPair]) -> Result<HashSet<LinkPair>, RemoteError> {
        let mut commands = serde_json::Map::new();
        for (i, (contact_id, company_id)) in pairs.iter().enumerate() {
            commands.insert(
                format!("update_{}", i),
                Value::String(format!(
                    "crm.contact.update?id={}&fields[COMPANY_ID]={}&params[REGISTER_SONET_EVENT]=N",
                    contact_id, company_id
                )),
            );
        }

        let results = self.execute_batch(Value::Object(commands)).await?;
        let mut confirmed = HashSet::new();
        for (i, pair) in pairs.iter().enumerate() {
            let key = format!("update_{}", i);
            if results.get(key.as_str()).and_then(Value::as_bool) == Some(true) {
                confirmed.insert(*pair);
            }
        }
        Ok(confirmed)
    }

    async fn fetch_batch(
        &self,
        kind: EntityKind,
        ids: &[i64],
    ) -> Result<HashMap<i64, EntityRecord>, RemoteError> {
        let mut commands = serde_json::Map::new();
        for (i, id) in ids.iter().enumerate() {
            let cmd = match kind {
                EntityKind::Company => format!(
                    "crm.company.get?id={}&select[0]=ID&select[1]=TITLE&select[2]=PHONE&select[3]=EMAIL",
                    id
                ),
                EntityKind::Contact => format!(
                    "crm.contact.get?id={}&select[0]=ID&select[1]=NAME&select[2]=LAST_NAME&select[3]=PHONE&select[4]=EMAIL&select[5]=POST&select[6]=COMPANY_ID",
                    id
                ),
            };
            commands.insert(format!("{}_{}", kind.as_str(), i), Value::String(cmd));
        }

        let results = self.execute_batch(Value::Object(commands)).await?;
        let map = results
            .as_object()
            .ok_or_else(|| RemoteError::Shape("batch get results are not an object".into()))?;

        let mut records = HashMap::new();
        for value in map.values() {
            if let Some(record) = parse_record(value) {
                records.insert(record.id, record);
            }
        }
        debug!(
            kind = kind.as_str(),
            requested = ids.len(),
            fetched = records.len(),
            "Batch fetch finished"
        );
        Ok(records)
    }
}

/// The remote serializes numeric ids inconsistently (numbers or strings).
fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// First VALUE out of a `[{VALUE, VALUE_TYPE}]` multi-field list.
fn first_multi_field(value: Option<&Value>) -> Option<String> {
    value?
        .as_array()?
        .first()?
        .get("VALUE")?
        .as_str()
        .map(str::to_string)
}

fn parse_record(value: &Value) -> Option<EntityRecord> {
    let id = value_to_i64(value.get("ID")?)?;
    Some(EntityRecord {
        id,
        title: value.get("TITLE").and_then(Value::as_str).map(str::to_string),
        name: value.get("NAME").and_then(Value::as_str).map(str::to_string),
        last_name: value
            .get("LAST_NAME")
            .and_then(Value::as_str)
            .map(str::to_string),
        phone: first_multi_field(value.get("PHONE")),
        email: first_multi_field(value.get("EMAIL")),
        post: value.get("POST").and_then(Value::as_str).map(str::to_string),
        company_id: value.get("COMPANY_ID").and_then(value_to_i64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_i64_accepts_both_shapes() {
        assert_eq!(value_to_i64(&json!(42)), Some(42));
        assert_eq!(value_to_i64(&json!("42")), Some(42));
        assert_eq!(value_to_i64(&json!("nope")), None);
        assert_eq!(value_to_i64(&json!(null)), None);
    }

    #[test]
    fn test_parse_contact_record() {
        let raw = json!({
            "ID": "7",
            "NAME": "Anna",
            "LAST_NAME": "Keller",
            "PHONE": [{"VALUE": "+1 555 0100", "VALUE_TYPE": "WORK"}],
            "EMAIL": [{"VALUE": "anna@example.com", "VALUE_TYPE": "WORK"}],
            "POST": "Engineer",
            "COMPANY_ID": "12"
        });
        let record = parse_record(&raw).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.name.as_deref(), Some("Anna"));
        assert_eq!(record.phone.as_deref(), Some("+1 555 0100"));
        assert_eq!(record.company_id, Some(12));
        assert_eq!(record.title, None);
    }

    #[test]
    fn test_parse_record_requires_id() {
        assert!(parse_record(&json!({"TITLE": "Acme"})).is_none());
    }
}
