use crate::error::Result;
use crate::memoryindex::DocId;
use crate::memoryindex::feature_store::DocFeatures;

/// Sink for the contents of a memory index, typically the builder of a
/// persistent index.
///
/// Calls arrive strictly nested:
///
/// ```text
/// start_field (start_word add_document* end_word)* end_field
/// ```
///
/// Fields come in field id order, words in byte order within a field and
/// documents in doc id order within a word.
pub trait IndexBuilder {
    fn start_field(&mut self, field_id: u32, name: &str) -> Result<()>;

    fn start_word(&mut self, word: &str) -> Result<()>;

    fn add_document(&mut self, doc_id: DocId, features: &DocFeatures) -> Result<()>;

    fn end_word(&mut self) -> Result<()>;

    fn end_field(&mut self) -> Result<()>;
}
