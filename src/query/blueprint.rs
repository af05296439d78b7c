//! Leaf blueprints handed to the query planner.

use std::fmt;
use std::sync::Arc;

use crate::memoryindex::field_index::{FieldGuard, FrozenPostingList};
use crate::query::search::{BooleanMatchIterator, EmptySearch, PostingIterator, SearchIterator};
use crate::query::term::FieldSpec;

/// Cardinality estimate the planner orders leaves by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitEstimate {
    pub est_hits: usize,
    pub empty: bool,
}

impl HitEstimate {
    pub fn new(est_hits: usize, empty: bool) -> Self {
        Self { est_hits, empty }
    }

    pub fn empty() -> Self {
        Self::new(0, true)
    }
}

/// A query plan leaf for one term in one field.
pub trait Blueprint: Send + Sync + fmt::Debug {
    fn field(&self) -> &FieldSpec;

    fn estimate(&self) -> HitEstimate;

    /// Create an iterator over the matching documents. May be called more
    /// than once; every iterator starts at the first match.
    fn create_leaf_search(&self) -> Box<dyn SearchIterator>;
}

/// Blueprint that matches nothing.
#[derive(Debug, Clone)]
pub struct EmptyBlueprint {
    field: FieldSpec,
}

impl EmptyBlueprint {
    pub fn new(field: FieldSpec) -> Self {
        Self { field }
    }
}

impl Blueprint for EmptyBlueprint {
    fn field(&self) -> &FieldSpec {
        &self.field
    }

    fn estimate(&self) -> HitEstimate {
        HitEstimate::empty()
    }

    fn create_leaf_search(&self) -> Box<dyn SearchIterator> {
        Box::new(EmptySearch)
    }
}

/// Blueprint over a posting list of a memory index field.
///
/// Owns the generation guard the list was looked up under; every search
/// iterator it creates holds its own clone of that guard.
pub struct MemTermBlueprint {
    field: FieldSpec,
    field_id: u32,
    guard: FieldGuard,
    postings: FrozenPostingList,
    estimate: HitEstimate,
    use_bit_vector: bool,
}

impl MemTermBlueprint {
    pub fn new(
        field: FieldSpec,
        field_id: u32,
        guard: FieldGuard,
        postings: FrozenPostingList,
    ) -> Self {
        let estimate = HitEstimate::new(postings.size(), !postings.is_valid());
        let use_bit_vector = field.is_filter;
        Self {
            field,
            field_id,
            guard,
            postings,
            estimate,
            use_bit_vector,
        }
    }

    pub fn field_id(&self) -> u32 {
        self.field_id
    }

    /// Whether searches skip feature data.
    pub fn uses_bit_vector(&self) -> bool {
        self.use_bit_vector
    }
}

impl Blueprint for MemTermBlueprint {
    fn field(&self) -> &FieldSpec {
        &self.field
    }

    fn estimate(&self) -> HitEstimate {
        self.estimate
    }

    fn create_leaf_search(&self) -> Box<dyn SearchIterator> {
        let Some(postings) = self.postings.postings() else {
            return Box::new(EmptySearch);
        };
        let iterator = PostingIterator::new(self.guard.clone(), Arc::clone(postings));
        if self.use_bit_vector {
            Box::new(BooleanMatchIterator::new(iterator))
        } else {
            Box::new(iterator)
        }
    }
}

impl fmt::Debug for MemTermBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTermBlueprint")
            .field("field", &self.field.name)
            .field("field_id", &self.field_id)
            .field("generation", &self.guard.generation())
            .field("estimate", &self.estimate)
            .field("use_bit_vector", &self.use_bit_vector)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memoryindex::feature_store::DocFeatures;
    use crate::memoryindex::field_index::{FieldIndex, FieldPushBatch};
    use crate::query::match_data::TermFieldMatchData;

    fn field() -> FieldIndex {
        let index = FieldIndex::new(2, "tags", 4);
        let mut features = DocFeatures::new();
        features.add_occurrence(0, 5, 1, 0);
        index
            .push(FieldPushBatch {
                removes: vec![3],
                postings: vec![("red".to_string(), 3, features)],
            })
            .unwrap();
        index
    }

    fn blueprint(index: &FieldIndex, spec: FieldSpec, term: &str) -> MemTermBlueprint {
        let guard = index.take_generation_guard();
        let postings = index.find_frozen(&guard, term);
        MemTermBlueprint::new(spec, index.field_id(), guard, postings)
    }

    #[test]
    fn test_estimate_reflects_posting_list() {
        let index = field();
        let hit = blueprint(&index, FieldSpec::new("tags"), "red");
        assert_eq!(hit.estimate(), HitEstimate::new(1, false));

        let miss = blueprint(&index, FieldSpec::new("tags"), "blue");
        assert_eq!(miss.estimate(), HitEstimate::empty());
        assert!(miss.create_leaf_search().doc_ids().is_empty());
    }

    #[test]
    fn test_filter_field_uses_boolean_match() {
        let index = field();
        let full = blueprint(&index, FieldSpec::new("tags"), "red");
        let filter = blueprint(&index, FieldSpec::filter("tags"), "red");
        assert!(!full.uses_bit_vector());
        assert!(filter.uses_bit_vector());

        let mut match_data = TermFieldMatchData::new(2);
        full.create_leaf_search().unpack(&mut match_data).unwrap();
        assert_eq!(match_data.positions[0].element_weight, 5);

        filter.create_leaf_search().unpack(&mut match_data).unwrap();
        assert_eq!(match_data.doc_id, 3);
        assert!(!match_data.has_positions());
    }

    #[test]
    fn test_empty_blueprint() {
        let empty = EmptyBlueprint::new(FieldSpec::new("missing"));
        assert!(empty.estimate().empty);
        assert_eq!(empty.field().name, "missing");
        assert_eq!(empty.create_leaf_search().doc_id(), None);
    }
}
