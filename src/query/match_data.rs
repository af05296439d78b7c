use crate::memoryindex::DocId;
use crate::memoryindex::feature_store::DocFeatures;

/// One occurrence of the matched term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPosition {
    pub element_id: u32,
    pub position: u32,
    pub element_weight: i32,
    pub element_len: u32,
}

/// Match details of one term in one field for the current document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermFieldMatchData {
    pub field_id: u32,
    pub doc_id: DocId,
    pub positions: Vec<MatchPosition>,
}

impl TermFieldMatchData {
    pub fn new(field_id: u32) -> Self {
        Self {
            field_id,
            ..Self::default()
        }
    }

    /// Point at `doc_id` without any positions.
    pub fn reset(&mut self, doc_id: DocId) {
        self.doc_id = doc_id;
        self.positions.clear();
    }

    pub fn append_features(&mut self, features: &DocFeatures) {
        for element in &features.elements {
            self.positions
                .extend(element.positions.iter().map(|&position| MatchPosition {
                    element_id: element.element_id,
                    position,
                    element_weight: element.weight,
                    element_len: element.element_len,
                }));
        }
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }
}
