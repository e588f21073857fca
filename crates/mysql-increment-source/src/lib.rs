//! Cursor-based incremental extraction from MySQL for search-sync
//!
//! Rows are pulled in pages ordered by an increment column, mapped to
//! documents and bulk-indexed. After every page that indexed at least one
//! document the last increment value is persisted as the checkpoint, so the
//! next page (or the next scheduled cycle) resumes after it.
//!
//! The relational client sits behind the [`RowSource`] trait; the
//! `mysql_async` implementation is [`MySqlRowSource`].

mod client;
pub mod document;
mod extract;
pub mod schema;
mod source;
pub mod sql;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{new_mysql_pool, sanitize_connection_string};
pub use document::DocumentMapper;
pub use extract::{Extractor, RelationReport, StopReason, SubRunReport};
pub use schema::{column_type_to_field_type, ColumnDescription};
pub use source::{MySqlRowSource, RowSource};
pub use sql::{cursor_from_row, Comparator, SqlGenerator};
