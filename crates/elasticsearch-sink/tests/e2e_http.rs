//! End-to-end tests for the HTTP search sink
//!
//! These tests run the sink against an in-process HTTP server that mimics
//! the parts of the search engine REST API the sink uses.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use elasticsearch_sink::{ElasticsearchOpts, ElasticsearchSink};
use search_sink::{submit_documents, SearchSink};
use serde_json::{json, Map, Value};
use sync_core::Document;
use tokio::net::TcpListener;

/// Requests seen by the fake cluster
#[derive(Default)]
struct FakeCluster {
    indices: Mutex<HashSet<String>>,
    mappings: Mutex<Vec<(String, Value)>>,
    bulk_bodies: Mutex<Vec<String>>,
    content_types: Mutex<Vec<String>>,
    authorizations: Mutex<Vec<String>>,
}

/// Documents whose source carries this marker are rejected by the fake bulk API
const REJECT_MARKER: &str = "not-a-number";

async fn handle(
    State(cluster): State<Arc<FakeCluster>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        cluster.authorizations.lock().unwrap().push(auth.to_string());
    }

    let segments: Vec<&str> = uri.path().trim_start_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("POST", ["_bulk"]) => {
            if let Some(ct) = headers.get("content-type").and_then(|v| v.to_str().ok()) {
                cluster.content_types.lock().unwrap().push(ct.to_string());
            }
            cluster.bulk_bodies.lock().unwrap().push(body.clone());
            (StatusCode::OK, bulk_reply(&body)).into_response()
        }
        ("HEAD", [index]) => {
            if cluster.indices.lock().unwrap().contains(*index) {
                StatusCode::OK.into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        ("PUT", [index]) => {
            if !cluster.indices.lock().unwrap().insert(index.to_string()) {
                return (
                    StatusCode::BAD_REQUEST,
                    r#"{"error":{"type":"resource_already_exists_exception"}}"#,
                )
                    .into_response();
            }
            (StatusCode::OK, r#"{"acknowledged":true}"#).into_response()
        }
        ("PUT", [_index, "_mapping", ..]) => {
            let mapping: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            cluster
                .mappings
                .lock()
                .unwrap()
                .push((uri.path().to_string(), mapping));
            (StatusCode::OK, r#"{"acknowledged":true}"#).into_response()
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "unexpected request").into_response(),
    }
}

/// Build a bulk API reply for an NDJSON request body
fn bulk_reply(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let mut items = Vec::new();
    let mut errors = false;
    for pair in lines.chunks(2) {
        let action: Value = serde_json::from_str(pair[0]).unwrap();
        let id = action["index"]["_id"].clone();
        if pair[1].contains(REJECT_MARKER) {
            errors = true;
            items.push(json!({"index": {"_id": id, "status": 400, "error": {
                "type": "mapper_parsing_exception",
                "reason": "failed to parse field [price] of type [long]"
            }}}));
        } else {
            items.push(json!({"index": {"_id": id, "status": 201}}));
        }
    }
    json!({"took": 1, "errors": errors, "items": items}).to_string()
}

/// Start the fake cluster on any available port
async fn start_test_server() -> anyhow::Result<(String, Arc<FakeCluster>)> {
    let cluster = Arc::new(FakeCluster::default());
    let app = Router::new().fallback(handle).with_state(cluster.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok((format!("http://{addr}"), cluster))
}

fn order_doc(id: u32, price: Value) -> Document {
    let mut fields = Map::new();
    fields.insert("id".to_string(), json!(id));
    fields.insert("price".to_string(), price);
    Document::new("order", "_doc", id.to_string(), fields)
}

#[tokio::test]
async fn test_index_lifecycle() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();

    let (endpoint, cluster) = start_test_server().await.unwrap();
    let sink = ElasticsearchSink::new(&ElasticsearchOpts::new(endpoint)).unwrap();

    assert!(!sink.index_exists("order").await.unwrap());
    sink.create_index("order").await.unwrap();
    assert!(sink.index_exists("order").await.unwrap());

    // A concurrent creator finding the index already there is not an error
    sink.create_index("order").await.unwrap();

    let mapping = json!({"properties": {"id": {"type": "long"}}});
    sink.put_mapping("order", "_doc", &mapping).await.unwrap();

    let mappings = cluster.mappings.lock().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].0, "/order/_mapping");
    assert_eq!(mappings[0].1, mapping);
}

#[tokio::test]
async fn test_typed_mapping_url() {
    let (endpoint, cluster) = start_test_server().await.unwrap();
    let mut opts = ElasticsearchOpts::new(endpoint);
    opts.include_type = true;
    let sink = ElasticsearchSink::new(&opts).unwrap();

    sink.put_mapping("order", "item", &json!({"properties": {}}))
        .await
        .unwrap();

    assert_eq!(cluster.mappings.lock().unwrap()[0].0, "/order/_mapping/item");
}

#[tokio::test]
async fn test_bulk_reports_rejected_documents() {
    let (endpoint, cluster) = start_test_server().await.unwrap();
    let sink = ElasticsearchSink::new(&ElasticsearchOpts::new(endpoint)).unwrap();

    let docs = vec![
        order_doc(1, json!(10)),
        order_doc(2, json!(20)),
        order_doc(3, json!(30)),
        order_doc(4, json!(REJECT_MARKER)),
        order_doc(5, json!(50)),
    ];

    let report = submit_documents(&sink, "order", "_doc", &docs).await;
    assert_eq!(report.submitted, 5);
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);

    let bodies = cluster.bulk_bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].lines().count(), 10);
    assert!(bodies[0].ends_with('\n'));
    assert_eq!(
        cluster.content_types.lock().unwrap()[0],
        "application/x-ndjson"
    );
}

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let (endpoint, cluster) = start_test_server().await.unwrap();
    let mut opts = ElasticsearchOpts::new(endpoint);
    opts.username = Some("elastic".to_string());
    opts.password = Some("changeme".to_string());
    let sink = ElasticsearchSink::new(&opts).unwrap();

    sink.index_exists("order").await.unwrap();

    let auths = cluster.authorizations.lock().unwrap();
    assert_eq!(auths.len(), 1);
    // base64("elastic:changeme")
    assert_eq!(auths[0], "Basic ZWxhc3RpYzpjaGFuZ2VtZQ==");
}

#[tokio::test]
async fn test_unreachable_cluster_is_error() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = ElasticsearchSink::new(&ElasticsearchOpts::new(format!("http://{addr}"))).unwrap();
    assert!(sink.index_exists("order").await.is_err());

    let report = submit_documents(&sink, "order", "_doc", &[order_doc(1, json!(1))]).await;
    assert!(report.is_total_failure());
}
