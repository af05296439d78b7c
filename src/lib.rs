//! # memindex
//!
//! An in-memory inverted index that takes concurrent document inserts and
//! removes while serving term lookups with point-in-time consistency.
//!
//! ## Features
//!
//! - Parallel per-field inversion on sequenced executors
//! - Double-buffered commit pipeline
//! - Copy-on-write term dictionaries published by generation
//! - Lock-free readers pinned by generation guards
//! - Schema pruning and dumping to a persistent index builder
//!
//! ```no_run
//! use memindex::{Document, MemoryIndex, Schema};
//! use memindex::query::{FieldSpec, RequestContext, TermNode};
//!
//! # fn main() -> memindex::Result<()> {
//! let schema = Schema::builder().add_text_field("title").build();
//! let index = MemoryIndex::new(schema)?;
//!
//! index.insert_document(1, Document::new().add_text("title", "red shoes"));
//! index.commit(|_| {})?;
//! index.sync()?;
//!
//! let blueprint = index.create_blueprint(
//!     &RequestContext::new(),
//!     &FieldSpec::new("title"),
//!     &TermNode::String("shoes".into()),
//! );
//! assert_eq!(blueprint.create_leaf_search().doc_ids(), vec![1]);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
mod data;
mod error;
pub mod executor;
pub mod generation;
pub mod memory;
pub mod memoryindex;
pub mod query;
pub mod schema;
mod util;

// Re-exports for the public API
pub use config::MemoryIndexConfig;
pub use data::{DataValue, Document, DocumentBuilder};
pub use error::{MemIndexError, Result};
pub use memory::MemoryUsage;
pub use memoryindex::{DocId, IndexBuilder, MemoryIndex, MemoryIndexBuilder};
pub use schema::{CollectionType, DataType, IndexField, Schema, SchemaBuilder};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
