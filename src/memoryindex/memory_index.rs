//! The memory index orchestrator.
//!
//! Feeding goes through one of two [`DocumentInverter`]s. `commit` drains the
//! active inverter's inversion, waits until the previous push has landed,
//! pushes the active inverter and flips to the other one:
//!
//! ```text
//!            commit #1              commit #2
//! inverter 0 ──invert──> push ───────────────────────> invert ...
//! inverter 1             invert ───────> push
//!                                  ▲
//!                  waits for push of inverter 0
//! ```
//!
//! New documents can therefore be inverted while the previous batch is still
//! being pushed, but two pushes never interleave.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use ahash::AHashSet;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::MemoryIndexConfig;
use crate::data::Document;
use crate::error::Result;
use crate::executor::SequencedTaskExecutor;
use crate::memory::MemoryUsage;
use crate::memoryindex::DocId;
use crate::memoryindex::document_inverter::{DocumentInverter, WriteDoneNotifier};
use crate::memoryindex::field_index_collection::FieldIndexCollection;
use crate::memoryindex::index_builder::IndexBuilder;
use crate::query::blueprint::{Blueprint, EmptyBlueprint, MemTermBlueprint};
use crate::query::term::{FieldSpec, RequestContext, TermNode};
use crate::schema::{Schema, UNKNOWN_FIELD_ID};

#[derive(Debug, Default)]
struct WriterState {
    indexed_docs: AHashSet<DocId>,
}

/// An in-memory inverted index over the fields of one schema.
///
/// Inserts and removes become visible to queries after the next
/// [`commit`](MemoryIndex::commit) has pushed them. Queries never block and
/// always see whole pushed batches.
#[derive(Debug)]
pub struct MemoryIndex {
    schema: Arc<Schema>,
    field_indexes: Arc<FieldIndexCollection>,
    inverters: [DocumentInverter; 2],
    active_inverter: AtomicUsize,
    writer: Mutex<WriterState>,
    frozen: AtomicBool,
    num_docs: AtomicUsize,
    max_doc_id: AtomicU32,
    hidden_fields: Vec<AtomicBool>,
    pruned_schema: Mutex<Option<Arc<Schema>>>,
    static_memory_footprint: usize,
}

impl MemoryIndex {
    pub fn builder(schema: Schema) -> MemoryIndexBuilder {
        MemoryIndexBuilder::new(schema)
    }

    /// Create an index with the default configuration.
    pub fn new(schema: Schema) -> Result<Self> {
        Self::builder(schema).build()
    }

    fn active(&self) -> &DocumentInverter {
        &self.inverters[self.active_inverter.load(Ordering::Acquire)]
    }

    /// Queue `document` for inversion under `doc_id`.
    ///
    /// Inserting an id that is already indexed replaces its content. Ignored
    /// once the index is frozen.
    ///
    /// Never waits for inversion, but shares the feed lock with
    /// [`commit`](MemoryIndex::commit): a call made while a commit drains
    /// blocks until that commit has queued its push.
    pub fn insert_document(&self, doc_id: DocId, document: Document) {
        let mut writer = self.writer.lock();
        if self.frozen.load(Ordering::Acquire) {
            warn!("Memory index is frozen, ignoring insert of document {doc_id}");
            return;
        }
        if doc_id == 0 {
            warn!("Ignoring insert of reserved document id 0");
            return;
        }
        self.max_doc_id.fetch_max(doc_id, Ordering::AcqRel);
        self.active().invert_document(doc_id, Arc::new(document));
        if writer.indexed_docs.insert(doc_id) {
            self.num_docs.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Queue a remove of `doc_id`. Ignored once the index is frozen.
    ///
    /// Blocks during a commit like [`insert_document`](MemoryIndex::insert_document).
    pub fn remove_document(&self, doc_id: DocId) {
        let mut writer = self.writer.lock();
        if self.frozen.load(Ordering::Acquire) {
            warn!("Memory index is frozen, ignoring remove of document {doc_id}");
            return;
        }
        if doc_id == 0 {
            warn!("Ignoring remove of reserved document id 0");
            return;
        }
        self.active().remove_document(doc_id);
        if writer.indexed_docs.remove(&doc_id) {
            self.num_docs.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Make everything inserted or removed so far visible to queries.
    ///
    /// Blocks until the active inverter has inverted all queued documents and
    /// the previous commit's push has completed, then queues the push of the
    /// active inverter and switches feeding to the other one. `on_write_done`
    /// runs once that push has completed, with the first push failure if any.
    ///
    /// Returns the first failure of an invert task of this batch or a push
    /// task of the previous commit. The batch is pushed either way.
    pub fn commit<F>(&self, on_write_done: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let _writer = self.writer.lock();
        let active = self.active_inverter.load(Ordering::Acquire);
        let inverter = &self.inverters[active];

        debug!(
            "Commit waits for {} invert tasks of inverter {active} and {} push tasks",
            inverter.pending_invert_tasks(),
            self.inverters[1 - active].pending_push_tasks()
        );
        let inverted = inverter.wait_invert();
        let previous_pushed = self.inverters[1 - active].wait_push();
        let own_pushed = inverter.wait_push();
        let drained = inverted.and(previous_pushed).and(own_pushed);
        if let Err(err) = &drained {
            warn!("Commit observed a failed task: {err}");
        }

        inverter.push_documents(
            Arc::clone(&self.field_indexes),
            WriteDoneNotifier::new(on_write_done),
        );
        self.active_inverter.store(1 - active, Ordering::Release);
        debug!(
            "Committed inverter {active} ({} push tasks queued), feeding goes to inverter {}",
            inverter.pending_push_tasks(),
            1 - active
        );
        drained
    }

    /// Reject all further inserts and removes. Idempotent.
    pub fn freeze(&self) {
        let _writer = self.writer.lock();
        if !self.frozen.swap(true, Ordering::AcqRel) {
            info!("Memory index frozen with {} documents", self.num_docs());
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Wait for every queued invert and push task.
    pub fn sync(&self) -> Result<()> {
        let mut result = Ok(());
        for inverter in &self.inverters {
            let drained = inverter.wait_invert().and(inverter.wait_push());
            if result.is_ok() {
                result = drained;
            }
        }
        result
    }

    /// Write all pushed postings of visible fields to `builder`.
    ///
    /// Meant to run after [`freeze`](MemoryIndex::freeze). Pushes still in
    /// flight are awaited first.
    pub fn dump(&self, builder: &mut dyn IndexBuilder) -> Result<()> {
        if !self.is_frozen() {
            warn!("Dumping a memory index that is not frozen");
        }
        for inverter in &self.inverters {
            inverter.wait_push()?;
        }
        let hidden: Vec<bool> = self
            .hidden_fields
            .iter()
            .map(|flag| flag.load(Ordering::Acquire))
            .collect();
        self.field_indexes.dump(builder, &hidden)
    }

    /// Build a leaf blueprint for `term` in the field named by `field`.
    ///
    /// Unknown and hidden fields, and predicate terms, give an empty
    /// blueprint.
    pub fn create_blueprint(
        &self,
        request: &RequestContext,
        field: &FieldSpec,
        term: &TermNode,
    ) -> Box<dyn Blueprint> {
        let field_id = self.schema.index_field_id(&field.name);
        if field_id == UNKNOWN_FIELD_ID || self.is_hidden(field_id) {
            debug!("{request}: field '{}' is not searchable here", field.name);
            return Box::new(EmptyBlueprint::new(field.clone()));
        }
        let (Some(index_field), Some(field_index)) = (
            self.schema.index_field(field_id),
            self.field_indexes.field_index(field_id),
        ) else {
            return Box::new(EmptyBlueprint::new(field.clone()));
        };
        let Some(lookup) = term.lookup_term(index_field) else {
            debug!("{request}: {} terms are not supported", term.kind_name());
            return Box::new(EmptyBlueprint::new(field.clone()));
        };

        let guard = field_index.take_generation_guard();
        let postings = field_index.find_frozen(&guard, &lookup);
        debug!(
            "{request}: {} term '{lookup}' in field '{}' at generation {}: {} hits",
            term.kind_name(),
            field.name,
            guard.generation(),
            postings.size()
        );
        Box::new(MemTermBlueprint::new(field.clone(), field_id, guard, postings))
    }

    fn is_hidden(&self, field_id: u32) -> bool {
        self.hidden_fields
            .get(field_id as usize)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Hide every field that `schema` no longer declares with the same type.
    ///
    /// Pruning only ever narrows: the current pruned schema is intersected
    /// with `schema`. Hidden fields keep their postings.
    pub fn prune_removed_fields(&self, schema: &Schema) {
        let mut pruned = self.pruned_schema.lock();
        let current = pruned.as_deref().unwrap_or(self.schema.as_ref());
        let narrowed = Schema::intersect(current, schema);
        if narrowed == *current {
            return;
        }

        let mut hidden = Vec::new();
        for field in self.schema.index_fields() {
            let is_hidden = narrowed.index_field_id(&field.name) == UNKNOWN_FIELD_ID;
            self.hidden_fields[field.id as usize].store(is_hidden, Ordering::Release);
            if is_hidden {
                hidden.push(field.name.as_str());
            }
        }
        info!("Pruned schema hides fields {hidden:?}");
        *pruned = Some(Arc::new(narrowed));
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn pruned_schema(&self) -> Option<Arc<Schema>> {
        self.pruned_schema.lock().clone()
    }

    /// Number of documents currently indexed or queued for indexing.
    pub fn num_docs(&self) -> usize {
        self.num_docs.load(Ordering::Acquire)
    }

    /// One past the largest doc id ever inserted.
    pub fn doc_id_limit(&self) -> DocId {
        self.max_doc_id.load(Ordering::Acquire).saturating_add(1)
    }

    pub fn num_words(&self) -> usize {
        self.field_indexes.num_unique_words()
    }

    pub fn field_indexes(&self) -> &Arc<FieldIndexCollection> {
        &self.field_indexes
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.field_indexes.memory_usage();
        usage.inc_allocated_bytes(self.static_memory_footprint);
        usage.inc_used_bytes(self.static_memory_footprint);
        usage
    }

    /// Bytes owned by the index itself, measured at construction.
    pub fn static_memory_footprint(&self) -> usize {
        self.static_memory_footprint
    }

    /// Estimated bytes of staged data not yet pushed.
    pub fn transient_memory_usage(&self) -> usize {
        self.inverters
            .iter()
            .map(DocumentInverter::transient_memory_usage)
            .sum()
    }
}

impl Drop for MemoryIndex {
    fn drop(&mut self) {
        if let Err(err) = self.sync() {
            warn!("Memory index dropped with failed tasks: {err}");
        }
    }
}

/// Builder for [`MemoryIndex`].
#[derive(Debug)]
pub struct MemoryIndexBuilder {
    schema: Schema,
    config: MemoryIndexConfig,
    invert_executor: Option<Arc<SequencedTaskExecutor>>,
    push_executor: Option<Arc<SequencedTaskExecutor>>,
}

impl MemoryIndexBuilder {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            config: MemoryIndexConfig::default(),
            invert_executor: None,
            push_executor: None,
        }
    }

    pub fn config(mut self, config: MemoryIndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing invert executor instead of spawning one.
    pub fn invert_executor(mut self, executor: Arc<SequencedTaskExecutor>) -> Self {
        self.invert_executor = Some(executor);
        self
    }

    /// Share an existing push executor instead of spawning one.
    pub fn push_executor(mut self, executor: Arc<SequencedTaskExecutor>) -> Self {
        self.push_executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<MemoryIndex> {
        self.config.validate()?;
        let invert_executor = match self.invert_executor {
            Some(executor) => executor,
            None => Arc::new(SequencedTaskExecutor::new(
                "memindex-invert",
                self.config.invert_threads,
            )?),
        };
        let push_executor = match self.push_executor {
            Some(executor) => executor,
            None => Arc::new(SequencedTaskExecutor::new(
                "memindex-push",
                self.config.push_threads,
            )?),
        };

        let schema = Arc::new(self.schema);
        let field_indexes = Arc::new(FieldIndexCollection::new(
            &schema,
            self.config.dictionary_chunk_size,
        ));
        let inverters = [
            DocumentInverter::new(
                Arc::clone(&schema),
                Arc::clone(&invert_executor),
                Arc::clone(&push_executor),
            ),
            DocumentInverter::new(Arc::clone(&schema), invert_executor, push_executor),
        ];
        let hidden_fields = (0..schema.num_index_fields())
            .map(|_| AtomicBool::new(false))
            .collect::<Vec<_>>();

        let static_memory_footprint = mem::size_of::<MemoryIndex>()
            + hidden_fields.capacity() * mem::size_of::<AtomicBool>()
            + field_indexes.memory_usage().allocated_bytes;

        Ok(MemoryIndex {
            schema,
            field_indexes,
            inverters,
            active_inverter: AtomicUsize::new(0),
            writer: Mutex::new(WriterState::default()),
            frozen: AtomicBool::new(false),
            num_docs: AtomicUsize::new(0),
            max_doc_id: AtomicU32::new(0),
            hidden_fields,
            pruned_schema: Mutex::new(None),
            static_memory_footprint,
        })
    }
}
