//! Search engine sink abstraction.
//!
//! This crate defines the `SearchSink` trait that abstracts over the search
//! engine client. `elasticsearch-sink` implements it over HTTP; tests use
//! in-memory implementations.
//!
//! The [`submit_documents`] bulk indexer sits on top of the trait and turns
//! a page of documents into one bulk request, reporting per-document outcomes
//! instead of failing the page.

mod bulk;
mod traits;

pub use bulk::{submit_documents, BulkItem, BulkReport, BulkRequest, BulkResponse};
pub use traits::SearchSink;
