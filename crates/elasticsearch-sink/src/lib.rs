//! Elasticsearch-compatible search sink.
//!
//! Talks to the engine's REST API over HTTP:
//!
//! - `HEAD /{index}` to check for an index
//! - `PUT /{index}` to create one
//! - `PUT /{index}/_mapping[/{type}]` to attach a field mapping
//! - `POST /_bulk` with an NDJSON body to upsert documents
//!
//! Document types are only sent when [`ElasticsearchOpts::include_type`] is
//! set, for engines that still support mapping types.

mod bulk;
mod client;

pub use bulk::{encode_bulk_body, parse_bulk_response};
pub use client::ElasticsearchSink;

/// Search engine connection options
#[derive(Clone, Debug)]
pub struct ElasticsearchOpts {
    /// Base URL, e.g. `http://localhost:9200`
    pub endpoint: String,
    /// Basic-auth username
    pub username: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Send `_type` in bulk actions and use typed mapping URLs
    pub include_type: bool,
}

impl ElasticsearchOpts {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: None,
            password: None,
            timeout_secs: 60,
            include_type: false,
        }
    }
}
