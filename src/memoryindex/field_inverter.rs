//! Tokenization and staging of one field's values.

use std::collections::BTreeMap;
use std::mem;

use ahash::{AHashMap, AHashSet};

use crate::analysis::{self, format_float, normalize_exact};
use crate::data::DataValue;
use crate::error::{MemIndexError, Result};
use crate::memoryindex::DocId;
use crate::memoryindex::feature_store::DocFeatures;
use crate::memoryindex::field_index::FieldPushBatch;
use crate::schema::IndexField;

/// Stages inverted values of one field until the next push.
///
/// Every staged document is also staged as a remove, so a push first drops
/// whatever the document had indexed before and then adds its new terms.
#[derive(Debug)]
pub struct FieldInverter {
    field: IndexField,
    pending: AHashMap<DocId, Vec<(String, DocFeatures)>>,
    removed: AHashSet<DocId>,
    staged_bytes: usize,
}

impl FieldInverter {
    pub fn new(field: IndexField) -> Self {
        Self {
            field,
            pending: AHashMap::new(),
            removed: AHashSet::new(),
            staged_bytes: 0,
        }
    }

    pub fn field(&self) -> &IndexField {
        &self.field
    }

    /// Bytes held by staged, not yet taken, data.
    pub fn staged_bytes(&self) -> usize {
        self.staged_bytes
    }

    pub fn num_staged_docs(&self) -> usize {
        self.removed.len()
    }

    /// Stage the value of this field for `doc_id`, replacing anything staged
    /// for it earlier. A missing value only removes the document.
    ///
    /// Returns the change in staged bytes.
    pub fn invert(&mut self, doc_id: DocId, value: Option<&DataValue>) -> Result<isize> {
        let terms = match value {
            Some(value) => self.collect_terms(value)?,
            None => Vec::new(),
        };
        let before = self.staged_bytes;

        if self.removed.insert(doc_id) {
            self.staged_bytes += mem::size_of::<DocId>();
        }
        if let Some(replaced) = self.pending.remove(&doc_id) {
            self.staged_bytes -= terms_bytes(&replaced);
        }
        if !terms.is_empty() {
            self.staged_bytes += terms_bytes(&terms);
            self.pending.insert(doc_id, terms);
        }
        Ok(self.staged_bytes as isize - before as isize)
    }

    /// Stage a remove of `doc_id`.
    pub fn remove(&mut self, doc_id: DocId) -> isize {
        // A remove never fails to invert.
        self.invert(doc_id, None).unwrap_or(0)
    }

    /// Take everything staged, sorted for [`crate::memoryindex::FieldIndex::push`].
    pub fn take_batch(&mut self) -> FieldPushBatch {
        let mut removes: Vec<DocId> = self.removed.drain().collect();
        removes.sort_unstable();

        let mut postings: Vec<(String, DocId, DocFeatures)> = self
            .pending
            .drain()
            .flat_map(|(doc_id, terms)| {
                terms
                    .into_iter()
                    .map(move |(term, features)| (term, doc_id, features))
            })
            .collect();
        postings.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        self.staged_bytes = 0;
        FieldPushBatch { removes, postings }
    }

    /// Terms of `value` in term order, each with its occurrences.
    fn collect_terms(&self, value: &DataValue) -> Result<Vec<(String, DocFeatures)>> {
        let mut terms: BTreeMap<String, DocFeatures> = BTreeMap::new();
        match value {
            DataValue::Array(values) => {
                for (element_id, element) in values.iter().enumerate() {
                    self.add_element(&mut terms, element_id as u32, 1, element)?;
                }
            }
            DataValue::WeightedSet(entries) => {
                for (element_id, (key, weight)) in entries.iter().enumerate() {
                    let term = normalize_exact(self.field.data_type, key);
                    add_exact(&mut terms, element_id as u32, *weight, term);
                }
            }
            single => self.add_element(&mut terms, 0, 1, single)?,
        }
        Ok(terms.into_iter().collect())
    }

    fn add_element(
        &self,
        terms: &mut BTreeMap<String, DocFeatures>,
        element_id: u32,
        weight: i32,
        value: &DataValue,
    ) -> Result<()> {
        match value {
            DataValue::Null => {}
            DataValue::Text(text) if self.field.is_tokenized() => {
                let tokens: Vec<_> = analysis::tokenize(text).collect();
                let element_len = tokens.len() as u32;
                for token in tokens {
                    terms.entry(token.text).or_default().add_occurrence(
                        element_id,
                        weight,
                        element_len,
                        token.position,
                    );
                }
            }
            DataValue::Text(text) | DataValue::String(text) => {
                let term = normalize_exact(self.field.data_type, text);
                add_exact(terms, element_id, weight, term);
            }
            DataValue::Int64(number) => {
                add_exact(terms, element_id, weight, number.to_string());
            }
            DataValue::Float64(number) => {
                add_exact(terms, element_id, weight, format_float(*number));
            }
            DataValue::Bool(flag) => add_exact(terms, element_id, weight, flag.to_string()),
            DataValue::Array(_) | DataValue::WeightedSet(_) => {
                return Err(MemIndexError::invert_failed(format!(
                    "field '{}' does not support nested collections",
                    self.field.name
                )));
            }
        }
        Ok(())
    }
}

fn add_exact(
    terms: &mut BTreeMap<String, DocFeatures>,
    element_id: u32,
    weight: i32,
    term: String,
) {
    if !term.is_empty() {
        terms
            .entry(term)
            .or_default()
            .add_occurrence(element_id, weight, 1, 0);
    }
}

fn terms_bytes(terms: &[(String, DocFeatures)]) -> usize {
    terms
        .iter()
        .map(|(term, features)| term.len() + features.estimated_bytes())
        .sum()
}
