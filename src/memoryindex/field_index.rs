//! Index of one field: term dictionary and feature store behind a
//! generation handler.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use parking_lot::Mutex;

use crate::error::Result;
use crate::generation::{Generation, GenerationGuard, GenerationHandler};
use crate::memory::MemoryUsage;
use crate::memoryindex::DocId;
use crate::memoryindex::dictionary::{TermDictionary, TermUpdate};
use crate::memoryindex::feature_store::{DocFeatures, FeatureStore};
use crate::memoryindex::index_builder::IndexBuilder;
use crate::memoryindex::posting::{Posting, PostingList};

/// Dead feature bytes below this are never compacted.
const COMPACTION_MIN_DEAD_BYTES: usize = 1024;

/// Everything a reader of one field can see at one generation.
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    dictionary: TermDictionary,
    features: FeatureStore,
    dead_feature_bytes: usize,
}

impl FieldSnapshot {
    fn new(chunk_size: usize) -> Self {
        Self {
            dictionary: TermDictionary::new(chunk_size),
            features: FeatureStore::new(),
            dead_feature_bytes: 0,
        }
    }

    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    pub fn features(&self) -> &FeatureStore {
        &self.features
    }

    pub fn num_terms(&self) -> usize {
        self.dictionary.num_terms()
    }

    pub fn find(&self, term: &str) -> FrozenPostingList {
        FrozenPostingList {
            postings: self.dictionary.find(term).cloned(),
        }
    }

    fn should_compact(&self) -> bool {
        self.dead_feature_bytes >= COMPACTION_MIN_DEAD_BYTES
            && self.dead_feature_bytes * 2 >= self.features.data_bytes()
    }

    /// Copy the live feature entries into one fresh buffer and point every
    /// posting at its copy. Readers of older generations keep the old buffers.
    fn compact(&self) -> Result<FieldSnapshot> {
        let fresh = FeatureStore::new();
        let mut batch = fresh.begin_batch();
        let dictionary = self
            .dictionary
            .remap_features(|entry| batch.copy_entry(&self.features, entry))?;
        Ok(FieldSnapshot {
            dictionary,
            features: fresh.seal(batch)?,
            dead_feature_bytes: 0,
        })
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.features.memory_usage(self.dead_feature_bytes);
        let dictionary_bytes = self.dictionary.memory_bytes();
        usage.inc_allocated_bytes(dictionary_bytes);
        usage.inc_used_bytes(dictionary_bytes);
        usage
    }
}

pub type FieldGuard = GenerationGuard<FieldSnapshot>;

/// Posting list of one term as of the generation pinned by a guard.
#[derive(Debug, Clone, Default)]
pub struct FrozenPostingList {
    postings: Option<Arc<PostingList>>,
}

impl FrozenPostingList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the term exists.
    pub fn is_valid(&self) -> bool {
        self.postings.is_some()
    }

    pub fn size(&self) -> usize {
        self.postings.as_ref().map_or(0, |p| p.len())
    }

    pub fn postings(&self) -> Option<&Arc<PostingList>> {
        self.postings.as_ref()
    }
}

/// Staged changes for one field, ready to be pushed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPushBatch {
    /// Documents whose previous postings must be dropped, sorted.
    pub removes: Vec<DocId>,
    /// New postings sorted by term, then doc id.
    pub postings: Vec<(String, DocId, DocFeatures)>,
}

impl FieldPushBatch {
    pub fn is_empty(&self) -> bool {
        self.removes.is_empty() && self.postings.is_empty()
    }
}

#[derive(Debug, Default)]
struct FieldIndexWriter {
    /// Terms each document currently has postings under.
    doc_terms: AHashMap<DocId, Vec<String>>,
}

/// Term index of one field.
///
/// Pushes are applied copy-on-write and published as a new generation;
/// readers take a [`FieldGuard`] and never block on a push.
#[derive(Debug)]
pub struct FieldIndex {
    field_id: u32,
    name: String,
    snapshots: GenerationHandler<FieldSnapshot>,
    writer: Mutex<FieldIndexWriter>,
}

impl FieldIndex {
    pub fn new(field_id: u32, name: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            field_id,
            name: name.into(),
            snapshots: GenerationHandler::new(FieldSnapshot::new(chunk_size)),
            writer: Mutex::new(FieldIndexWriter::default()),
        }
    }

    pub fn field_id(&self) -> u32 {
        self.field_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pin the current generation of this field.
    pub fn take_generation_guard(&self) -> FieldGuard {
        self.snapshots.take_guard()
    }

    /// Look up `term` in the generation pinned by `guard`.
    pub fn find_frozen(&self, guard: &FieldGuard, term: &str) -> FrozenPostingList {
        guard.find(term)
    }

    pub fn generation(&self) -> Generation {
        self.snapshots.current_generation()
    }

    pub fn oldest_used_generation(&self) -> Generation {
        self.snapshots.oldest_used_generation()
    }

    pub fn num_held_generations(&self) -> usize {
        self.snapshots.num_held_generations()
    }

    pub fn num_unique_words(&self) -> usize {
        self.snapshots.take_guard().num_terms()
    }

    /// Number of documents with at least one posting in this field.
    pub fn num_docs(&self) -> usize {
        self.writer.lock().doc_terms.len()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.snapshots.take_guard().memory_usage();
        let static_bytes = mem::size_of::<Self>() + self.name.capacity();
        usage.inc_allocated_bytes(static_bytes);
        usage.inc_used_bytes(static_bytes);
        usage
    }

    /// Apply one batch and publish it as a single new generation.
    ///
    /// Removes drop every posting the document had in this field; the
    /// batch's postings are then added. Returns `None` for an empty batch,
    /// which publishes nothing.
    pub fn push(&self, batch: FieldPushBatch) -> Result<Option<Generation>> {
        if batch.is_empty() {
            return Ok(None);
        }
        let mut writer = self.writer.lock();
        let current = self.snapshots.take_guard();

        let mut updates: BTreeMap<String, TermUpdate> = BTreeMap::new();
        for doc_id in &batch.removes {
            for term in writer.doc_terms.get(doc_id).into_iter().flatten() {
                updates.entry(term.clone()).or_default().removes.push(*doc_id);
            }
        }

        let mut feature_batch = current.features.begin_batch();
        let mut added_terms: AHashMap<DocId, Vec<String>> = AHashMap::new();
        let num_postings = batch.postings.len();
        for (term, doc_id, features) in batch.postings {
            let entry = feature_batch.add(&features)?;
            added_terms.entry(doc_id).or_default().push(term.clone());
            updates.entry(term).or_default().adds.push(Posting {
                doc_id,
                features: entry,
            });
        }

        let (dictionary, dropped) = current.dictionary.apply(&updates);
        let mut dead_feature_bytes = current.dead_feature_bytes;
        for entry in dropped {
            dead_feature_bytes += current.features.entry_size(entry)?;
        }
        let features = if feature_batch.is_empty() {
            current.features.clone()
        } else {
            current.features.seal(feature_batch)?
        };
        let mut snapshot = FieldSnapshot {
            dictionary,
            features,
            dead_feature_bytes,
        };
        if snapshot.should_compact() {
            snapshot = snapshot.compact()?;
            debug!(
                "Field '{}' compacted features from {} bytes in {} buffers to {} bytes",
                self.name,
                current.features.data_bytes(),
                current.features.num_buffers(),
                snapshot.features.data_bytes()
            );
        }

        for doc_id in &batch.removes {
            writer.doc_terms.remove(doc_id);
        }
        for (doc_id, terms) in added_terms {
            let doc_terms = writer.doc_terms.entry(doc_id).or_default();
            doc_terms.extend(terms);
            doc_terms.sort_unstable();
            doc_terms.dedup();
        }
        drop(current);

        let generation = self.snapshots.publish(snapshot);
        debug!(
            "Field '{}' published generation {generation}: {} removes, {num_postings} postings",
            self.name,
            batch.removes.len()
        );
        Ok(Some(generation))
    }

    /// Write every posting of the current generation to `builder`.
    pub fn dump(&self, builder: &mut dyn IndexBuilder) -> Result<()> {
        let snapshot = self.snapshots.take_guard();
        builder.start_field(self.field_id, &self.name)?;
        for (term, postings) in snapshot.dictionary.iter() {
            builder.start_word(term)?;
            for posting in postings.postings() {
                let features = snapshot.features.decode(posting.features)?;
                builder.add_document(posting.doc_id, &features)?;
            }
            builder.end_word()?;
        }
        builder.end_field()
    }
}
