use serde::{Deserialize, Serialize};

use crate::error::{MemIndexError, Result};

/// Sentinel returned by lookups for names that are not index fields.
pub const UNKNOWN_FIELD_ID: u32 = u32::MAX;

/// Value type of an index field.
///
/// `String` fields are tokenized into words; all other types index each value
/// as one exact term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Int64,
    Float64,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    #[default]
    Single,
    Array,
    WeightedSet,
}

/// One indexed field. The id is the field's position in its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub id: u32,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub collection: CollectionType,
}

impl IndexField {
    /// Whether values of this field are split into words.
    pub fn is_tokenized(&self) -> bool {
        self.data_type == DataType::String
    }

    fn same_definition(&self, other: &IndexField) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.collection == other.collection
    }
}

/// The set of index fields a memory index is built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    index_fields: Vec<IndexField>,
}

impl Schema {
    pub fn new() -> Self {
        Self {
            index_fields: Vec::new(),
        }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Parse a schema from its JSON form, e.g.
    /// `{"index_fields":[{"id":0,"name":"title","data_type":"string"}]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)
            .map_err(|e| MemIndexError::schema(format!("Failed to parse schema: {e}")))?;
        for (pos, field) in schema.index_fields.iter().enumerate() {
            if field.id as usize != pos {
                return Err(MemIndexError::schema(format!(
                    "field '{}' has id {} but position {}",
                    field.name, field.id, pos
                )));
            }
        }
        Ok(schema)
    }

    pub fn index_fields(&self) -> &[IndexField] {
        &self.index_fields
    }

    pub fn num_index_fields(&self) -> usize {
        self.index_fields.len()
    }

    pub fn index_field(&self, id: u32) -> Option<&IndexField> {
        self.index_fields.get(id as usize)
    }

    /// Returns the id of the named index field, or [`UNKNOWN_FIELD_ID`].
    pub fn index_field_id(&self, name: &str) -> u32 {
        self.index_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.id)
            .unwrap_or(UNKNOWN_FIELD_ID)
    }

    /// Fields of `lhs` that `rhs` declares with the same type, in `lhs` order.
    pub fn intersect(lhs: &Schema, rhs: &Schema) -> Schema {
        let mut builder = Schema::builder();
        for field in &lhs.index_fields {
            let kept = rhs
                .index_fields
                .iter()
                .any(|other| field.same_definition(other));
            if kept {
                builder = builder.add_collection_field(
                    field.name.clone(),
                    field.data_type,
                    field.collection,
                );
            }
        }
        builder.build()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    index_fields: Vec<IndexField>,
}

impl SchemaBuilder {
    pub fn add_field(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.add_collection_field(name, data_type, CollectionType::Single)
    }

    pub fn add_text_field(self, name: impl Into<String>) -> Self {
        self.add_field(name, DataType::String)
    }

    pub fn add_collection_field(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        collection: CollectionType,
    ) -> Self {
        let name = name.into();
        // Redeclaring a name replaces its definition in place.
        if let Some(existing) = self.index_fields.iter_mut().find(|f| f.name == name) {
            existing.data_type = data_type;
            existing.collection = collection;
            return self;
        }
        let id = self.index_fields.len() as u32;
        self.index_fields.push(IndexField {
            id,
            name,
            data_type,
            collection,
        });
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            index_fields: self.index_fields,
        }
    }
}
