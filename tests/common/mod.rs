#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::Duration;

use memindex::memoryindex::DocFeatures;
use memindex::query::{FieldSpec, RequestContext, SearchIterator, TermNode};
use memindex::{DocId, IndexBuilder, MemIndexError, MemoryIndex, MemoryIndexConfig, Result, Schema};

/// Records everything a dump emits, in call order.
#[derive(Debug, Default)]
pub struct CollectingIndexBuilder {
    pub fields: Vec<DumpedField>,
    current_word: Option<(String, Vec<(DocId, DocFeatures)>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DumpedField {
    pub field_id: u32,
    pub name: String,
    pub words: Vec<(String, Vec<(DocId, DocFeatures)>)>,
}

impl CollectingIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Option<&DumpedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field name -> word -> doc ids.
    pub fn postings(&self) -> BTreeMap<String, BTreeMap<String, Vec<DocId>>> {
        self.fields
            .iter()
            .map(|field| {
                let words = field
                    .words
                    .iter()
                    .map(|(word, docs)| (word.clone(), docs.iter().map(|(d, _)| *d).collect()))
                    .collect();
                (field.name.clone(), words)
            })
            .collect()
    }
}

impl IndexBuilder for CollectingIndexBuilder {
    fn start_field(&mut self, field_id: u32, name: &str) -> Result<()> {
        self.fields.push(DumpedField {
            field_id,
            name: name.to_string(),
            words: Vec::new(),
        });
        Ok(())
    }

    fn start_word(&mut self, word: &str) -> Result<()> {
        if self.current_word.is_some() {
            return Err(MemIndexError::dump("start_word inside a word"));
        }
        self.current_word = Some((word.to_string(), Vec::new()));
        Ok(())
    }

    fn add_document(&mut self, doc_id: DocId, features: &DocFeatures) -> Result<()> {
        match self.current_word.as_mut() {
            Some((_, docs)) => {
                docs.push((doc_id, features.clone()));
                Ok(())
            }
            None => Err(MemIndexError::dump("add_document outside a word")),
        }
    }

    fn end_word(&mut self) -> Result<()> {
        let word = self
            .current_word
            .take()
            .ok_or_else(|| MemIndexError::dump("end_word without start_word"))?;
        let field = self
            .fields
            .last_mut()
            .ok_or_else(|| MemIndexError::dump("word outside a field"))?;
        field.words.push(word);
        Ok(())
    }

    fn end_field(&mut self) -> Result<()> {
        if self.current_word.is_some() {
            return Err(MemIndexError::dump("end_field inside a word"));
        }
        Ok(())
    }
}

pub fn small_config() -> MemoryIndexConfig {
    MemoryIndexConfig::new()
        .with_invert_threads(3)
        .with_push_threads(2)
        .with_dictionary_chunk_size(4)
}

pub fn title_index() -> Result<MemoryIndex> {
    let schema = Schema::builder().add_text_field("title").build();
    MemoryIndex::builder(schema).config(small_config()).build()
}

/// Doc ids matching `term` in `field`.
pub fn search(index: &MemoryIndex, field: &str, term: TermNode) -> Vec<DocId> {
    index
        .create_blueprint(&RequestContext::new(), &FieldSpec::new(field), &term)
        .create_leaf_search()
        .doc_ids()
}

pub fn search_string(index: &MemoryIndex, field: &str, term: &str) -> Vec<DocId> {
    search(index, field, TermNode::String(term.to_string()))
}

/// Commit and block until the pushed batch is visible.
pub fn commit_and_wait(index: &MemoryIndex) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    index.commit(move |result| {
        let _ = tx.send(result);
    })?;
    rx.recv_timeout(Duration::from_secs(30))
        .map_err(|e| MemIndexError::other(format!("write done callback not invoked: {e}")))?
}
