//! Leaf search iterators over memory index posting lists.

use std::sync::Arc;

use crate::error::{MemIndexError, Result};
use crate::generation::Generation;
use crate::memoryindex::DocId;
use crate::memoryindex::field_index::FieldGuard;
use crate::memoryindex::posting::PostingList;
use crate::query::match_data::TermFieldMatchData;

/// Iterator over matching doc ids in ascending order.
///
/// A fresh iterator is positioned on its first match.
pub trait SearchIterator: Send {
    /// The current doc id, or `None` once exhausted.
    fn doc_id(&self) -> Option<DocId>;

    /// Advance to the next match.
    fn next_doc(&mut self) -> Option<DocId>;

    /// Advance to the first match at or after `target`. Never moves backwards.
    fn seek(&mut self, target: DocId) -> Option<DocId>;

    /// Fill `match_data` for the current doc id.
    fn unpack(&mut self, match_data: &mut TermFieldMatchData) -> Result<()>;

    /// Collect the remaining matches, current one included.
    fn doc_ids(&mut self) -> Vec<DocId> {
        let mut doc_ids = Vec::new();
        let mut current = self.doc_id();
        while let Some(doc_id) = current {
            doc_ids.push(doc_id);
            current = self.next_doc();
        }
        doc_ids
    }
}

/// Walks one posting list and decodes features on unpack.
///
/// Holds a guard on the generation the list belongs to, so the list and its
/// features stay readable until the iterator is dropped.
pub struct PostingIterator {
    guard: FieldGuard,
    postings: Arc<PostingList>,
    index: usize,
}

impl PostingIterator {
    pub fn new(guard: FieldGuard, postings: Arc<PostingList>) -> Self {
        Self {
            guard,
            postings,
            index: 0,
        }
    }

    /// Generation this iterator reads.
    pub fn generation(&self) -> Generation {
        self.guard.generation()
    }
}

impl SearchIterator for PostingIterator {
    fn doc_id(&self) -> Option<DocId> {
        self.postings.postings().get(self.index).map(|p| p.doc_id)
    }

    fn next_doc(&mut self) -> Option<DocId> {
        if self.index < self.postings.len() {
            self.index += 1;
        }
        self.doc_id()
    }

    fn seek(&mut self, target: DocId) -> Option<DocId> {
        let remaining = &self.postings.postings()[self.index..];
        self.index += remaining.partition_point(|p| p.doc_id < target);
        self.doc_id()
    }

    fn unpack(&mut self, match_data: &mut TermFieldMatchData) -> Result<()> {
        let posting = self
            .postings
            .postings()
            .get(self.index)
            .ok_or_else(|| MemIndexError::invalid_argument("unpack on an exhausted iterator"))?;
        let features = self.guard.features().decode(posting.features)?;
        match_data.reset(posting.doc_id);
        match_data.append_features(&features);
        Ok(())
    }
}

/// Wraps an iterator so that unpack reports only the doc id.
pub struct BooleanMatchIterator<S> {
    inner: S,
}

impl<S: SearchIterator> BooleanMatchIterator<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: SearchIterator> SearchIterator for BooleanMatchIterator<S> {
    fn doc_id(&self) -> Option<DocId> {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Option<DocId> {
        self.inner.next_doc()
    }

    fn seek(&mut self, target: DocId) -> Option<DocId> {
        self.inner.seek(target)
    }

    fn unpack(&mut self, match_data: &mut TermFieldMatchData) -> Result<()> {
        let doc_id = self
            .inner
            .doc_id()
            .ok_or_else(|| MemIndexError::invalid_argument("unpack on an exhausted iterator"))?;
        match_data.reset(doc_id);
        Ok(())
    }
}

/// Matches nothing.
#[derive(Debug, Default)]
pub struct EmptySearch;

impl SearchIterator for EmptySearch {
    fn doc_id(&self) -> Option<DocId> {
        None
    }

    fn next_doc(&mut self) -> Option<DocId> {
        None
    }

    fn seek(&mut self, _target: DocId) -> Option<DocId> {
        None
    }

    fn unpack(&mut self, _match_data: &mut TermFieldMatchData) -> Result<()> {
        Err(MemIndexError::invalid_argument("unpack on an empty search"))
    }
}
