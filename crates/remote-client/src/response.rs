//! Response envelopes of the CRM REST API.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use sync_core::{DeletedPage, RecordPage, RemoteRecord, SaveResult};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    info: Info,
}

#[derive(Debug, Default, Deserialize)]
struct Info {
    #[serde(default)]
    more_records: bool,
}

#[derive(Debug, Deserialize)]
struct DeletedEntry {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct ActionResult {
    #[serde(default)]
    status: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Map<String, Value>,
}

/// Ids come back as strings, but older endpoints send numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a record listing. An empty body is an empty last page.
pub fn parse_record_page(body: &str) -> Result<RecordPage> {
    if body.trim().is_empty() {
        return Ok(RecordPage::default());
    }
    let envelope: Envelope<Map<String, Value>> =
        serde_json::from_str(body).context("Malformed record listing")?;

    let records = envelope
        .data
        .into_iter()
        .map(|mut fields| {
            let id = fields
                .remove("id")
                .as_ref()
                .and_then(id_string)
                .ok_or_else(|| anyhow!("Record without id in listing"))?;
            Ok(RemoteRecord { id, fields })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RecordPage {
        records,
        more_records: envelope.info.more_records,
    })
}

/// Parse a deleted-records listing. An empty body is an empty last page.
pub fn parse_deleted_page(body: &str) -> Result<DeletedPage> {
    if body.trim().is_empty() {
        return Ok(DeletedPage::default());
    }
    let envelope: Envelope<DeletedEntry> =
        serde_json::from_str(body).context("Malformed deleted records listing")?;

    Ok(DeletedPage {
        ids: envelope
            .data
            .iter()
            .filter_map(|entry| id_string(&entry.id))
            .collect(),
        more_records: envelope.info.more_records,
    })
}

/// Parse the per-record results of an insert, update or delete call.
pub fn parse_save_results(body: &str, expected: usize) -> Result<Vec<SaveResult>> {
    let envelope: Envelope<ActionResult> =
        serde_json::from_str(body).context("Malformed save response")?;
    if envelope.data.len() != expected {
        bail!(
            "Expected {expected} results, the service returned {}",
            envelope.data.len()
        );
    }

    Ok(envelope
        .data
        .into_iter()
        .map(|result| {
            let id = result.details.get("id").and_then(id_string);
            match id {
                Some(id) if result.status == "success" => SaveResult::Success { id },
                _ => SaveResult::Failure {
                    message: failure_message(&result),
                },
            }
        })
        .collect())
}

fn failure_message(result: &ActionResult) -> String {
    let mut message = format!("{}: {}", result.code, result.message);
    if let Some(field) = result.details.get("api_name").and_then(Value::as_str) {
        message.push_str(&format!(" ({field})"));
    }
    message
}
