//! The in-memory inverted index.
//!
//! ```text
//! MemoryIndex
//!  ├── DocumentInverter x2 (active / pushing)
//!  │    └── FieldInverter per field  ── invert executor
//!  └── FieldIndexCollection
//!       └── FieldIndex per field      ── push executor
//!            └── GenerationHandler<FieldSnapshot>
//!                 ├── TermDictionary  (chunks -> PostingList)
//!                 └── FeatureStore    (sealed feature buffers)
//! ```

pub mod dictionary;
pub mod document_inverter;
pub mod feature_store;
pub mod field_index;
pub mod field_index_collection;
pub mod field_inverter;
pub mod index_builder;
pub mod memory_index;
pub mod posting;

/// Identifier of a document within one memory index. Id 0 is reserved.
pub type DocId = u32;

pub use document_inverter::{DocumentInverter, WriteDoneNotifier};
pub use feature_store::{DocFeatures, ElementFeatures, EntryRef, FeatureStore};
pub use field_index::{FieldGuard, FieldIndex, FieldPushBatch, FieldSnapshot, FrozenPostingList};
pub use field_index_collection::FieldIndexCollection;
pub use field_inverter::FieldInverter;
pub use index_builder::IndexBuilder;
pub use memory_index::{MemoryIndex, MemoryIndexBuilder};
pub use posting::{Posting, PostingList};
