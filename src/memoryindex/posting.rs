use std::mem;

use crate::memoryindex::DocId;
use crate::memoryindex::feature_store::EntryRef;

/// One document in a posting list, with a reference to its features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub features: EntryRef,
}

/// Postings of one term, sorted by doc id without duplicates.
///
/// Lists are immutable once built; updates produce a new list through
/// [`PostingList::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from postings already sorted by doc id.
    pub fn from_sorted(postings: Vec<Posting>) -> Self {
        debug_assert!(postings.windows(2).all(|w| w[0].doc_id < w[1].doc_id));
        Self { postings }
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.postings.iter().map(|p| p.doc_id)
    }

    pub fn find(&self, doc_id: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|index| &self.postings[index])
    }

    /// Index of the first posting with a doc id not below `doc_id`.
    pub fn lower_bound(&self, doc_id: DocId) -> usize {
        self.postings.partition_point(|p| p.doc_id < doc_id)
    }

    pub fn memory_bytes(&self) -> usize {
        mem::size_of::<Self>() + self.postings.capacity() * mem::size_of::<Posting>()
    }

    /// Merge `removes` and `adds` (both sorted by doc id) into a new list.
    ///
    /// An add for a doc id already present replaces the old posting. Returns
    /// `None` for the list if nothing remains, together with the feature
    /// references of every posting that was dropped or replaced.
    pub fn apply(
        &self,
        removes: &[DocId],
        adds: &[Posting],
    ) -> (Option<PostingList>, Vec<EntryRef>) {
        let mut merged = Vec::with_capacity(self.postings.len() + adds.len());
        let mut dropped = Vec::new();
        let mut removes = removes.iter().peekable();
        let mut adds = adds.iter().peekable();

        for posting in &self.postings {
            while let Some(add) = adds.next_if(|add| add.doc_id < posting.doc_id) {
                merged.push(*add);
            }
            while removes.next_if(|&&doc_id| doc_id < posting.doc_id).is_some() {}

            let removed = removes.next_if(|&&doc_id| doc_id == posting.doc_id).is_some();
            let replacement = adds.next_if(|add| add.doc_id == posting.doc_id);
            if removed || replacement.is_some() {
                dropped.push(posting.features);
            } else {
                merged.push(*posting);
            }
            if let Some(add) = replacement {
                merged.push(*add);
            }
        }
        merged.extend(adds.copied());

        let list = if merged.is_empty() {
            None
        } else {
            merged.shrink_to_fit();
            Some(PostingList::from_sorted(merged))
        };
        (list, dropped)
    }
}
