//! Core types for the search-sync framework.
//!
//! This crate provides the foundational types shared by the source, sink
//! and orchestration crates:
//!
//! - [`Relation`] - Declarative table-to-index synchronization unit
//! - [`SourceRow`] / [`SourceValue`] - Rows as handed back by the relational client
//! - [`Document`] - One addressable unit written to the search engine
//! - [`Scheme`] / [`FieldType`] - Field-type mapping attached to an index
//! - [`SyncError`] - Error taxonomy of the extraction engine
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── checkpoint              (cursor persistence)
//!    ├─── search-sink             (SearchSink trait, bulk indexer)
//!    │       └── elasticsearch-sink
//!    └─── mysql-increment-source  (SQL generation, extraction loop)
//! ```

pub mod document;
pub mod error;
pub mod relation;
pub mod schema;
pub mod types;
pub mod values;

pub use document::Document;
pub use error::SyncError;
pub use relation::{
    column_to_field_name, FieldOptions, Relation, CURSOR_DELIMITER, DEFAULT_BIG_OFFSET_THRESHOLD,
    DEFAULT_DOC_TYPE, DEFAULT_LIMIT,
};
pub use schema::{FieldSpec, Scheme};
pub use types::FieldType;
pub use values::{SourceRow, SourceValue, CURSOR_DATETIME_FORMAT};
