//! Persistent sorted term dictionary.
//!
//! Terms are kept in byte order, split into chunks of roughly
//! `chunk_size` entries:
//!
//! ```text
//! chunk table: [ chunk 0 | chunk 1 | chunk 2 ]
//!                 │          │         │
//!              a..f       g..p      q..z     (term -> Arc<PostingList>)
//! ```
//!
//! [`TermDictionary::apply`] builds a new dictionary that shares every chunk
//! the update does not touch with the old one. Touched chunks are rebuilt;
//! a rebuilt chunk that grew past twice the chunk size is split and adjacent
//! rebuilt chunks that shrank are coalesced.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use crate::error::Result;
use crate::memoryindex::DocId;
use crate::memoryindex::feature_store::EntryRef;
use crate::memoryindex::posting::{Posting, PostingList};

/// Pending changes to one term's posting list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermUpdate {
    /// Documents to drop, sorted.
    pub removes: Vec<DocId>,
    /// Postings to add or replace, sorted by doc id.
    pub adds: Vec<Posting>,
}

type Entry = (String, Arc<PostingList>);

#[derive(Debug)]
struct DictionaryChunk {
    entries: Vec<Entry>,
    memory_bytes: usize,
}

impl DictionaryChunk {
    fn new(entries: Vec<Entry>) -> Self {
        let memory_bytes = mem::size_of::<Self>()
            + entries.capacity() * mem::size_of::<Entry>()
            + entries
                .iter()
                .map(|(term, postings)| term.capacity() + postings.memory_bytes())
                .sum::<usize>();
        Self {
            entries,
            memory_bytes,
        }
    }

    fn first_term(&self) -> &str {
        self.entries.first().map(|(term, _)| term.as_str()).unwrap_or("")
    }

    fn find(&self, term: &str) -> Option<&Arc<PostingList>> {
        self.entries
            .binary_search_by(|(key, _)| key.as_str().cmp(term))
            .ok()
            .map(|index| &self.entries[index].1)
    }
}

/// Sorted map from term to posting list with structural sharing.
#[derive(Debug, Clone)]
pub struct TermDictionary {
    chunks: Arc<Vec<Arc<DictionaryChunk>>>,
    chunk_size: usize,
    num_terms: usize,
}

impl TermDictionary {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: Arc::new(Vec::new()),
            chunk_size: chunk_size.max(2),
            num_terms: 0,
        }
    }

    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    pub fn is_empty(&self) -> bool {
        self.num_terms == 0
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn find(&self, term: &str) -> Option<&Arc<PostingList>> {
        let after = self.chunks.partition_point(|chunk| chunk.first_term() <= term);
        let chunk = self.chunks.get(after.checked_sub(1)?)?;
        chunk.find(term)
    }

    /// All entries in term order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<PostingList>)> + '_ {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.entries.iter())
            .map(|(term, postings)| (term.as_str(), postings))
    }

    pub fn memory_bytes(&self) -> usize {
        mem::size_of::<Self>()
            + self.chunks.capacity() * mem::size_of::<Arc<DictionaryChunk>>()
            + self.chunks.iter().map(|c| c.memory_bytes).sum::<usize>()
    }

    /// Apply `updates` and return the new dictionary together with the feature
    /// references of all postings that were dropped or replaced.
    ///
    /// Terms whose posting list becomes empty are removed.
    pub fn apply(
        &self,
        updates: &BTreeMap<String, TermUpdate>,
    ) -> (TermDictionary, Vec<EntryRef>) {
        if updates.is_empty() {
            return (self.clone(), Vec::new());
        }

        let mut table = ChunkTableBuilder::new(self.chunk_size, self.chunks.len());
        let mut dropped = Vec::new();
        let mut pending = updates.iter().peekable();
        let mut chunk_updates = Vec::new();

        for index in 0..self.chunks.len().max(1) {
            let chunk = self.chunks.get(index);
            let next_first = self.chunks.get(index + 1).map(|c| c.first_term());

            // Chunk `index` owns every term below the first term of the next chunk.
            chunk_updates.clear();
            while let Some((term, update)) =
                pending.next_if(|(term, _)| next_first.is_none_or(|first| term.as_str() < first))
            {
                chunk_updates.push((term.as_str(), update));
            }

            match chunk {
                Some(chunk) if chunk_updates.is_empty() => table.push_shared(Arc::clone(chunk)),
                _ => {
                    let existing = chunk.map(|c| c.entries.as_slice()).unwrap_or(&[]);
                    let entries = merge_entries(existing, &chunk_updates, &mut dropped);
                    table.push_rebuilt(entries);
                }
            }
        }

        (table.build(), dropped)
    }

    /// Rebuild every posting list with its feature references passed through
    /// `remap`. Terms and chunk boundaries stay the same.
    pub fn remap_features<F>(&self, mut remap: F) -> Result<TermDictionary>
    where
        F: FnMut(EntryRef) -> Result<EntryRef>,
    {
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for chunk in self.chunks.iter() {
            let mut entries = Vec::with_capacity(chunk.entries.len());
            for (term, postings) in &chunk.entries {
                let remapped = postings
                    .postings()
                    .iter()
                    .map(|posting| {
                        Ok(Posting {
                            doc_id: posting.doc_id,
                            features: remap(posting.features)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                entries.push((term.clone(), Arc::new(PostingList::from_sorted(remapped))));
            }
            chunks.push(Arc::new(DictionaryChunk::new(entries)));
        }
        Ok(TermDictionary {
            chunks: Arc::new(chunks),
            chunk_size: self.chunk_size,
            num_terms: self.num_terms,
        })
    }
}

fn merge_entries(
    existing: &[Entry],
    updates: &[(&str, &TermUpdate)],
    dropped: &mut Vec<EntryRef>,
) -> Vec<Entry> {
    let mut merged = Vec::with_capacity(existing.len() + updates.len());
    let mut updates = updates.iter().peekable();

    for (term, postings) in existing {
        while let Some((new_term, update)) = updates.next_if(|u| u.0 < term.as_str()) {
            push_updated(&mut merged, new_term, &PostingList::new(), update, dropped);
        }
        match updates.next_if(|u| u.0 == term.as_str()) {
            Some((_, update)) => push_updated(&mut merged, term, postings, update, dropped),
            None => merged.push((term.clone(), Arc::clone(postings))),
        }
    }
    for (new_term, update) in updates {
        push_updated(&mut merged, new_term, &PostingList::new(), update, dropped);
    }
    merged
}

fn push_updated(
    merged: &mut Vec<Entry>,
    term: &str,
    current: &PostingList,
    update: &TermUpdate,
    dropped: &mut Vec<EntryRef>,
) {
    let (postings, removed) = current.apply(&update.removes, &update.adds);
    dropped.extend(removed);
    if let Some(postings) = postings {
        merged.push((term.to_string(), Arc::new(postings)));
    }
}

struct ChunkTableBuilder {
    chunk_size: usize,
    chunks: Vec<Arc<DictionaryChunk>>,
    last_rebuilt: bool,
}

impl ChunkTableBuilder {
    fn new(chunk_size: usize, capacity: usize) -> Self {
        Self {
            chunk_size,
            chunks: Vec::with_capacity(capacity + 1),
            last_rebuilt: false,
        }
    }

    fn push_shared(&mut self, chunk: Arc<DictionaryChunk>) {
        self.chunks.push(chunk);
        self.last_rebuilt = false;
    }

    fn push_rebuilt(&mut self, mut entries: Vec<Entry>) {
        if entries.is_empty() {
            return;
        }
        if self.last_rebuilt {
            if let Some(last) = self.chunks.last() {
                if last.entries.len() + entries.len() <= self.chunk_size {
                    let mut combined = last.entries.clone();
                    combined.append(&mut entries);
                    entries = combined;
                    self.chunks.pop();
                }
            }
        }

        if entries.len() > 2 * self.chunk_size {
            for piece in entries.chunks(self.chunk_size) {
                self.chunks.push(Arc::new(DictionaryChunk::new(piece.to_vec())));
            }
        } else {
            self.chunks.push(Arc::new(DictionaryChunk::new(entries)));
        }
        self.last_rebuilt = true;
    }

    fn build(self) -> TermDictionary {
        let num_terms = self.chunks.iter().map(|c| c.entries.len()).sum();
        TermDictionary {
            chunks: Arc::new(self.chunks),
            chunk_size: self.chunk_size,
            num_terms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemIndexError;

    fn add(doc_id: DocId) -> TermUpdate {
        TermUpdate {
            removes: Vec::new(),
            adds: vec![Posting {
                doc_id,
                features: EntryRef::new(0, doc_id),
            }],
        }
    }

    fn remove(doc_id: DocId) -> TermUpdate {
        TermUpdate {
            removes: vec![doc_id],
            adds: Vec::new(),
        }
    }

    fn terms(dictionary: &TermDictionary) -> Vec<String> {
        dictionary.iter().map(|(term, _)| term.to_string()).collect()
    }

    fn updates(entries: Vec<(String, TermUpdate)>) -> BTreeMap<String, TermUpdate> {
        entries.into_iter().collect()
    }

    #[test]
    fn test_insert_and_find() {
        let dictionary = TermDictionary::new(4);
        let (dictionary, dropped) = dictionary.apply(&updates(vec![
            ("shoes".to_string(), add(1)),
            ("red".to_string(), add(1)),
        ]));

        assert!(dropped.is_empty());
        assert_eq!(terms(&dictionary), vec!["red", "shoes"]);
        assert_eq!(dictionary.find("red").map(|p| p.len()), Some(1));
        assert!(dictionary.find("blue").is_none());
        assert!(dictionary.find("").is_none());
        assert!(dictionary.find("zzz").is_none());
    }

    #[test]
    fn test_large_batch_is_split_into_chunks() {
        let dictionary = TermDictionary::new(4);
        let batch = updates((0..40).map(|i| (format!("t{i:03}"), add(1))).collect());
        let (dictionary, _) = dictionary.apply(&batch);

        assert_eq!(dictionary.num_terms(), 40);
        assert_eq!(dictionary.num_chunks(), 10);
        for i in 0..40 {
            assert!(dictionary.find(&format!("t{i:03}")).is_some());
        }
    }

    #[test]
    fn test_untouched_chunks_are_shared() {
        let base = TermDictionary::new(4);
        let batch = updates((0..40).map(|i| (format!("t{i:03}"), add(1))).collect());
        let (base, _) = base.apply(&batch);

        let (updated, _) = base.apply(&updates(vec![("t021".to_string(), add(2))]));

        let shared = base
            .chunks
            .iter()
            .zip(updated.chunks.iter())
            .filter(|(a, b)| Arc::ptr_eq(a, b))
            .count();
        assert_eq!(shared, base.num_chunks() - 1);
        // The old dictionary still reports the old posting list.
        assert_eq!(base.find("t021").map(|p| p.len()), Some(1));
        assert_eq!(updated.find("t021").map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_removing_last_posting_drops_term() {
        let (dictionary, _) =
            TermDictionary::new(4).apply(&updates(vec![("red".to_string(), add(1))]));
        let (dictionary, dropped) =
            dictionary.apply(&updates(vec![("red".to_string(), remove(1))]));

        assert!(dictionary.is_empty());
        assert_eq!(dictionary.num_chunks(), 0);
        assert_eq!(dropped, vec![EntryRef::new(0, 1)]);
    }

    #[test]
    fn test_shrunk_neighbours_coalesce() {
        let batch = updates((0..12).map(|i| (format!("t{i:02}"), add(1))).collect());
        let (dictionary, _) = TermDictionary::new(4).apply(&batch);
        assert_eq!(dictionary.num_chunks(), 3);

        // Remove most terms of the first two chunks in one batch.
        let removals = updates(
            ["t00", "t01", "t02", "t04", "t05", "t06"]
                .iter()
                .map(|t| (t.to_string(), remove(1)))
                .collect(),
        );
        let (dictionary, _) = dictionary.apply(&removals);

        assert_eq!(terms(&dictionary)[..2], ["t03".to_string(), "t07".to_string()]);
        assert_eq!(dictionary.num_chunks(), 2);
        assert_eq!(dictionary.num_terms(), 6);
    }

    #[test]
    fn test_terms_below_first_chunk_go_to_first_chunk() {
        let batch = updates((0..6).map(|i| (format!("m{i}"), add(1))).collect());
        let (dictionary, _) = TermDictionary::new(2).apply(&batch);
        let (dictionary, _) = dictionary.apply(&updates(vec![("a".to_string(), add(3))]));

        assert_eq!(terms(&dictionary).first().map(String::as_str), Some("a"));
        assert!(dictionary.find("a").is_some());
        assert!(dictionary.find("m5").is_some());
    }

    #[test]
    fn test_remap_features_keeps_terms() {
        let batch = updates((0..10).map(|i| (format!("t{i}"), add(i + 1))).collect());
        let (dictionary, _) = TermDictionary::new(4).apply(&batch);

        let remapped = dictionary
            .remap_features(|entry| Ok(EntryRef::new(9, entry.offset() * 2)))
            .unwrap();

        assert_eq!(terms(&remapped), terms(&dictionary));
        assert_eq!(remapped.num_chunks(), dictionary.num_chunks());
        let postings = remapped.find("t3").unwrap().postings();
        assert_eq!(postings[0].doc_id, 4);
        assert_eq!(postings[0].features, EntryRef::new(9, 8));
        // The source dictionary is unchanged.
        assert_eq!(dictionary.find("t3").unwrap().postings()[0].features, EntryRef::new(0, 4));

        let failed = dictionary.remap_features(|_| Err(MemIndexError::feature_store("gone")));
        assert!(failed.is_err());
    }
}
