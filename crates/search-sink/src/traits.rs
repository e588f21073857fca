//! SearchSink trait definition.

use anyhow::Result;
use serde_json::Value;

use crate::bulk::{BulkRequest, BulkResponse};

/// Trait for writing documents to a search engine.
///
/// # Usage Pattern
///
/// The extraction engine holds the sink as `Arc<dyn SearchSink>` so one
/// client is shared by every relation worker:
///
/// ```ignore
/// let sink: Arc<dyn SearchSink> = Arc::new(ElasticsearchSink::new(&opts)?);
/// let report = submit_documents(sink.as_ref(), "order", "_doc", &documents).await;
/// ```
#[async_trait::async_trait]
pub trait SearchSink: Send + Sync {
    /// Whether the index already exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create an empty index.
    async fn create_index(&self, index: &str) -> Result<()>;

    /// Attach a field mapping to an index for the given document type.
    ///
    /// `mapping` is the `{"properties": {...}}` object produced by
    /// `Scheme::to_mapping`.
    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> Result<()>;

    /// Index (upsert) a batch of documents in one request.
    ///
    /// A transport failure is an `Err`; per-document rejections are reported
    /// in the returned [`BulkResponse`].
    async fn bulk_index(&self, request: &BulkRequest) -> Result<BulkResponse>;
}
