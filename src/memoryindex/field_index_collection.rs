use std::mem;

use crate::error::Result;
use crate::memory::MemoryUsage;
use crate::memoryindex::field_index::FieldIndex;
use crate::memoryindex::index_builder::IndexBuilder;
use crate::schema::Schema;

/// One [`FieldIndex`] per schema field, addressed by field id.
#[derive(Debug)]
pub struct FieldIndexCollection {
    fields: Vec<FieldIndex>,
}

impl FieldIndexCollection {
    pub fn new(schema: &Schema, chunk_size: usize) -> Self {
        let fields = schema
            .index_fields()
            .iter()
            .map(|field| FieldIndex::new(field.id, field.name.clone(), chunk_size))
            .collect();
        Self { fields }
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_index(&self, field_id: u32) -> Option<&FieldIndex> {
        self.fields.get(field_id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldIndex> {
        self.fields.iter()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let own = mem::size_of::<Self>() + self.fields.capacity() * mem::size_of::<FieldIndex>();
        let mut usage = MemoryUsage::new(own, own, 0);
        for field in &self.fields {
            usage.merge(&field.memory_usage());
        }
        usage
    }

    pub fn num_unique_words(&self) -> usize {
        self.fields.iter().map(FieldIndex::num_unique_words).sum()
    }

    /// Dump all fields not flagged in `hidden`, in field id order.
    pub fn dump(&self, builder: &mut dyn IndexBuilder, hidden: &[bool]) -> Result<()> {
        for field in &self.fields {
            if hidden.get(field.field_id() as usize).copied().unwrap_or(false) {
                continue;
            }
            field.dump(builder)?;
        }
        Ok(())
    }
}
