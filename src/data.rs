use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The value of one field in a document.
///
/// Values arrive already parsed; the memory index only tokenizes and
/// normalizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),

    /// Keyword content indexed as one exact term.
    String(String),

    /// Free text split into words before indexing.
    Text(String),

    /// Ordered values, each indexed as its own element.
    Array(Vec<DataValue>),

    /// Weighted keys, each indexed as an element carrying its weight.
    WeightedSet(Vec<(String, i32)>),
}

impl DataValue {
    /// Returns the text value if this is a Text or String variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) | DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value if this is an Int64 variant.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float value if this is a Float64 variant.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean value if this is a Bool variant.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }
}

// --- Conversions ---

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Text(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Text(v.to_string())
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int64(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int64(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float64(v)
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl From<Vec<DataValue>> for DataValue {
    fn from(v: Vec<DataValue>) -> Self {
        DataValue::Array(v)
    }
}

/// A document: a collection of named fields, each holding a [`DataValue`].
///
/// Fields not declared in the index schema are ignored by the inverter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Field data.
    pub fields: HashMap<String, DataValue>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    /// Add a field to the document.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Add a text field.
    pub fn add_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), DataValue::Text(text.into()));
        self
    }

    /// Add a keyword field indexed as a single exact term.
    pub fn add_keyword(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(name.into(), DataValue::String(value.into()));
        self
    }

    /// Add an integer field.
    pub fn add_integer(mut self, name: impl Into<String>, value: i64) -> Self {
        self.fields.insert(name.into(), DataValue::Int64(value));
        self
    }

    /// Add a float field.
    pub fn add_float(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), DataValue::Float64(value));
        self
    }

    /// Add a boolean field.
    pub fn add_boolean(mut self, name: impl Into<String>, value: bool) -> Self {
        self.fields.insert(name.into(), DataValue::Bool(value));
        self
    }

    /// Add an array field of text values.
    pub fn add_text_array<I, T>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|v| DataValue::Text(v.into()))
            .collect();
        self.fields.insert(name.into(), DataValue::Array(values));
        self
    }

    /// Add a weighted set field.
    pub fn add_weighted_set<I, T>(mut self, name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (T, i32)>,
        T: Into<String>,
    {
        let entries = entries.into_iter().map(|(k, w)| (k.into(), w)).collect();
        self.fields
            .insert(name.into(), DataValue::WeightedSet(entries));
        self
    }

    /// Get a reference to a field's value.
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.get(name)
    }

    /// Check if the document has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Get all field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A builder for constructing documents in a fluent manner.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.document = self.document.add_field(name, value);
        self
    }

    pub fn build(self) -> Document {
        self.document
    }
}
