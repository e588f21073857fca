//! HTTP client implementing `SearchSink`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use search_sink::{BulkRequest, BulkResponse, SearchSink};
use serde_json::Value;

use crate::bulk::{encode_bulk_body, parse_bulk_response};
use crate::ElasticsearchOpts;

/// Search sink backed by the engine's REST API.
#[derive(Clone)]
pub struct ElasticsearchSink {
    client: Client,
    opts: ElasticsearchOpts,
}

impl ElasticsearchSink {
    pub fn new(opts: &ElasticsearchOpts) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        tracing::debug!("Search sink targeting {}", opts.endpoint);

        Ok(Self {
            client,
            opts: opts.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.opts.endpoint.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.opts.username {
            Some(username) => builder.basic_auth(username, self.opts.password.as_deref()),
            None => builder,
        }
    }

    /// Send a request and fail on any non-success status, keeping the body
    /// in the error for diagnosis.
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<String> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| anyhow!("{what} failed: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response to {what}: {e}"))?;

        if !status.is_success() {
            return Err(anyhow!("{what} returned status {status}: {body}"));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl SearchSink for ElasticsearchSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .authorize(self.client.head(self.url(index)))
            .send()
            .await
            .map_err(|e| anyhow!("Checking index '{index}' failed: {e}"))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(anyhow!(
                "Checking index '{index}' returned status {status}"
            )),
        }
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        let result = self
            .send(self.client.put(self.url(index)), &format!("Creating index '{index}'"))
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Created index '{index}'");
                Ok(())
            }
            // Another worker won the race
            Err(e) if e.to_string().contains("resource_already_exists_exception") => {
                tracing::debug!("Index '{index}' already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> Result<()> {
        let path = if self.opts.include_type {
            format!("{index}/_mapping/{doc_type}")
        } else {
            format!("{index}/_mapping")
        };

        self.send(
            self.client.put(self.url(&path)).json(mapping),
            &format!("Putting mapping on '{index}'"),
        )
        .await?;

        tracing::info!("Put mapping on '{index}/{doc_type}'");
        Ok(())
    }

    async fn bulk_index(&self, request: &BulkRequest) -> Result<BulkResponse> {
        let body = encode_bulk_body(request, self.opts.include_type);

        let response_body = self
            .send(
                self.client
                    .post(self.url("_bulk"))
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
                &format!("Bulk request to '{}'", request.index),
            )
            .await?;

        parse_bulk_response(request, &response_body)
    }
}
