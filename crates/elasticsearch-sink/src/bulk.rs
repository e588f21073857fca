//! Bulk API wire format.

use std::collections::HashMap;

use anyhow::{Context, Result};
use search_sink::{BulkItem, BulkRequest, BulkResponse};
use serde::Deserialize;
use serde_json::{json, Value};

/// Encode a bulk request as NDJSON: one action line and one source line per
/// document, each terminated by `\n`.
pub fn encode_bulk_body(request: &BulkRequest, include_type: bool) -> String {
    let mut body = String::new();
    for (id, source) in &request.documents {
        let mut action = json!({ "_index": request.index, "_id": id });
        if include_type {
            action["_type"] = Value::String(request.doc_type.clone());
        }
        body.push_str(&json!({ "index": action }).to_string());
        body.push('\n');
        body.push_str(source);
        body.push('\n');
    }
    body
}

#[derive(Debug, Deserialize)]
struct BulkApiResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkApiItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkApiItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Parse a bulk API response body.
///
/// Items come back in request order, so ids missing from an item are taken
/// from the request.
pub fn parse_bulk_response(request: &BulkRequest, body: &str) -> Result<BulkResponse> {
    let parsed: BulkApiResponse =
        serde_json::from_str(body).context("Failed to parse bulk response")?;

    let mut ids = request.documents.keys();
    let items = parsed
        .items
        .into_iter()
        .filter_map(|entry| entry.into_values().next())
        .map(|item| {
            let fallback_id = ids.next().cloned().unwrap_or_default();
            let id = item.id.unwrap_or(fallback_id);
            match item.error {
                Some(error) => BulkItem::failed(id, item.status, render_error(&error)),
                None => BulkItem::ok(id, item.status),
            }
        })
        .collect::<Vec<_>>();

    if parsed.errors {
        tracing::debug!(
            "Bulk response for '{}' reported errors ({} items)",
            request.index,
            items.len()
        );
    }

    Ok(BulkResponse { items })
}

/// `type: reason` when the engine gives both, the raw JSON otherwise.
fn render_error(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (None, Some(reason)) => reason.to_string(),
        _ => match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}
