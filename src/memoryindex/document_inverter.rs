//! Parallel inversion of documents into per-field staging areas.
//!
//! Tasks of one field always go to the same executor thread, so each
//! [`FieldInverter`] is driven sequentially while different fields progress in
//! parallel. Invert and push work of one inverter are tracked by separate
//! barriers:
//!
//! ```text
//! invert_document ─┬─> invert executor (field 0) ─┐
//!                  ├─> invert executor (field 1) ─┼─ invert barrier
//!                  └─> ...                       ─┘
//! push_documents  ─┬─> push executor   (field 0) ─┐
//!                  └─> ...                       ─┴─ push barrier ─> WriteDoneNotifier
//! ```

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::data::Document;
use crate::error::{MemIndexError, Result};
use crate::executor::{SequencedTaskExecutor, TaskBarrier};
use crate::memory::TransientMemoryUsageProvider;
use crate::memoryindex::DocId;
use crate::memoryindex::field_index_collection::FieldIndexCollection;
use crate::memoryindex::field_inverter::FieldInverter;
use crate::schema::Schema;

type WriteDoneCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

#[derive(Default)]
struct NotifierState {
    callback: Option<WriteDoneCallback>,
    failure: Option<MemIndexError>,
}

/// Invokes a commit's completion callback once the last push task holding it
/// lets go.
///
/// The callback receives the first push failure, if any.
pub struct WriteDoneNotifier {
    state: Mutex<NotifierState>,
}

impl WriteDoneNotifier {
    pub fn new<F>(callback: F) -> Arc<Self>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Arc::new(Self {
            state: Mutex::new(NotifierState {
                callback: Some(Box::new(callback)),
                failure: None,
            }),
        })
    }

    pub fn fail(&self, err: MemIndexError) {
        let mut state = self.state.lock();
        if state.failure.is_none() {
            state.failure = Some(err);
        }
    }
}

impl Drop for WriteDoneNotifier {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(callback) = state.callback.take() {
            let result = match state.failure.take() {
                Some(err) => Err(err),
                None => Ok(()),
            };
            callback(result);
        }
    }
}

impl fmt::Debug for WriteDoneNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteDoneNotifier").finish_non_exhaustive()
    }
}

/// Stages inserts and removes for every field of a schema.
#[derive(Debug)]
pub struct DocumentInverter {
    schema: Arc<Schema>,
    fields: Vec<Arc<Mutex<FieldInverter>>>,
    invert_executor: Arc<SequencedTaskExecutor>,
    push_executor: Arc<SequencedTaskExecutor>,
    invert_barrier: TaskBarrier,
    push_barrier: TaskBarrier,
    transient: Arc<TransientMemoryUsageProvider>,
}

impl DocumentInverter {
    pub fn new(
        schema: Arc<Schema>,
        invert_executor: Arc<SequencedTaskExecutor>,
        push_executor: Arc<SequencedTaskExecutor>,
    ) -> Self {
        let fields = schema
            .index_fields()
            .iter()
            .map(|field| Arc::new(Mutex::new(FieldInverter::new(field.clone()))))
            .collect();
        Self {
            schema,
            fields,
            invert_executor,
            push_executor,
            invert_barrier: TaskBarrier::new(),
            push_barrier: TaskBarrier::new(),
            transient: Arc::new(TransientMemoryUsageProvider::new()),
        }
    }

    /// Queue inversion of every index field of `document`.
    ///
    /// Index fields the document does not carry are staged as removes, so the
    /// document's previous content in them disappears on push.
    pub fn invert_document(&self, doc_id: DocId, document: Arc<Document>) {
        for (field, inverter) in self.schema.index_fields().iter().zip(&self.fields) {
            let inverter = Arc::clone(inverter);
            let document = Arc::clone(&document);
            let transient = Arc::clone(&self.transient);
            let name = field.name.clone();
            self.invert_executor
                .execute(field.id, &self.invert_barrier, move || {
                    let delta = inverter
                        .lock()
                        .invert(doc_id, document.get(&name))
                        .map_err(|e| {
                            let message = format!("doc {doc_id}, field '{name}': {e}");
                            MemIndexError::invert_failed(message)
                        })?;
                    apply_delta(&transient, delta);
                    Ok(())
                });
        }
    }

    /// Queue a remove of `doc_id` in every field.
    pub fn remove_document(&self, doc_id: DocId) {
        for (field, inverter) in self.schema.index_fields().iter().zip(&self.fields) {
            let inverter = Arc::clone(inverter);
            let transient = Arc::clone(&self.transient);
            self.invert_executor
                .execute(field.id, &self.invert_barrier, move || {
                    let delta = inverter.lock().remove(doc_id);
                    apply_delta(&transient, delta);
                    Ok(())
                });
        }
    }

    /// Queue a push of every field's staged data into `field_indexes`.
    ///
    /// All invert tasks of this inverter must have drained. `notifier` fires
    /// once the last push task completes.
    pub fn push_documents(
        &self,
        field_indexes: Arc<FieldIndexCollection>,
        notifier: Arc<WriteDoneNotifier>,
    ) {
        let staged_docs: usize = self.fields.iter().map(|f| f.lock().num_staged_docs()).sum();
        debug!(
            "Pushing {} staged field documents across {} fields",
            staged_docs,
            self.fields.len()
        );

        for (field, inverter) in self.schema.index_fields().iter().zip(&self.fields) {
            let inverter = Arc::clone(inverter);
            let field_indexes = Arc::clone(&field_indexes);
            let notifier = Arc::clone(&notifier);
            let transient = Arc::clone(&self.transient);
            let field_id = field.id;
            let name = field.name.clone();
            self.push_executor
                .execute(field_id, &self.push_barrier, move || {
                    let (batch, staged_bytes) = {
                        let mut inverter = inverter.lock();
                        let staged_bytes = inverter.staged_bytes();
                        (inverter.take_batch(), staged_bytes)
                    };
                    if batch.is_empty() {
                        return Ok(());
                    }

                    let result = match field_indexes.field_index(field_id) {
                        Some(field_index) => field_index.push(batch).map(|_| ()),
                        None => Err(MemIndexError::other(format!("no index for field {field_id}"))),
                    };
                    transient.sub(staged_bytes);

                    result.map_err(|e| {
                        let message = format!("field '{name}': {e}");
                        notifier.fail(MemIndexError::push_failed(message.clone()));
                        MemIndexError::push_failed(message)
                    })
                });
        }
    }

    /// Block until all queued invert tasks have completed.
    pub fn wait_invert(&self) -> Result<()> {
        self.invert_barrier.wait()
    }

    /// Block until all queued push tasks have completed.
    pub fn wait_push(&self) -> Result<()> {
        self.push_barrier.wait()
    }

    pub fn pending_invert_tasks(&self) -> usize {
        self.invert_barrier.pending()
    }

    pub fn pending_push_tasks(&self) -> usize {
        self.push_barrier.pending()
    }

    /// Estimated bytes of staged data not yet pushed.
    pub fn transient_memory_usage(&self) -> usize {
        self.transient.get()
    }
}

fn apply_delta(transient: &TransientMemoryUsageProvider, delta: isize) {
    if delta >= 0 {
        transient.add(delta as usize);
    } else {
        transient.sub(delta.unsigned_abs());
    }
}

impl Drop for DocumentInverter {
    fn drop(&mut self) {
        let drained = self.invert_barrier.wait().and(self.push_barrier.wait());
        if let Err(err) = drained {
            warn!("Document inverter dropped with failed tasks: {err}");
        }
    }
}
