//! Bulk indexer: submits one page of documents and reports outcomes.

use std::collections::BTreeMap;

use sync_core::Document;

use crate::SearchSink;

/// One bulk request: documents keyed by id with their serialized bodies.
///
/// Keying by id means a page with two rows mapping to the same id sends the
/// last one only, which is what an upsert would have stored anyway.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    pub index: String,
    pub doc_type: String,
    pub documents: BTreeMap<String, String>,
}

impl BulkRequest {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            documents: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, id: impl Into<String>, body: impl Into<String>) {
        self.documents.insert(id.into(), body.into());
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Per-document outcome of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub id: String,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItem {
    pub fn ok(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItem>,
}

/// Counts for one submitted page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkReport {
    /// Something was sent and nothing was acknowledged.
    pub fn is_total_failure(&self) -> bool {
        self.submitted > 0 && self.succeeded == 0
    }
}

/// Submit documents for one (index, type) as a single bulk request.
///
/// Never returns an error: a transport failure counts every document as
/// failed, and each rejected document is logged with its reason.
pub async fn submit_documents<S>(
    sink: &S,
    index: &str,
    doc_type: &str,
    documents: &[Document],
) -> BulkReport
where
    S: SearchSink + ?Sized,
{
    if documents.is_empty() {
        return BulkReport::default();
    }

    let mut request = BulkRequest::new(index, doc_type);
    for doc in documents {
        request.push(doc.id.clone(), doc.body());
    }
    let submitted = request.len();

    let response = match sink.bulk_index(&request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Bulk request to index '{index}' failed ({submitted} documents): {e:#}");
            return BulkReport {
                submitted,
                succeeded: 0,
                failed: submitted,
            };
        }
    };

    let mut succeeded = 0;
    for item in &response.items {
        if item.succeeded() {
            succeeded += 1;
        } else {
            tracing::warn!(
                "Document '{}' rejected by index '{index}' (status {}): {}",
                item.id,
                item.status,
                item.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    // Items the engine did not report on count as failed
    let succeeded = succeeded.min(submitted);

    tracing::debug!("Bulk indexed {succeeded}/{submitted} documents into '{index}'");

    BulkReport {
        submitted,
        succeeded,
        failed: submitted - succeeded,
    }
}
