//! Append-only storage for per-occurrence features.
//!
//! Each push batch encodes the features of its postings into one new buffer.
//! Once sealed a buffer is never written again, so readers holding an older
//! [`FeatureStore`] keep reading the same bytes.
//!
//! Entry layout inside a buffer:
//!
//! ```text
//! [len: varint][num_elements: varint]
//!   ([element_id][weight: zigzag][element_len][num_positions][position deltas..])*
//! ```

use std::mem;
use std::sync::Arc;

use crate::error::{MemIndexError, Result};
use crate::memory::MemoryUsage;
use crate::util::varint;

/// Occurrences of one term in one element of a field value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementFeatures {
    pub element_id: u32,
    pub weight: i32,
    /// Number of tokens in the element.
    pub element_len: u32,
    /// Token positions, ascending.
    pub positions: Vec<u32>,
}

/// Occurrences of one term in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocFeatures {
    pub elements: Vec<ElementFeatures>,
}

impl DocFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an occurrence at `position` of element `element_id`.
    ///
    /// Occurrences must arrive grouped by element.
    pub fn add_occurrence(
        &mut self,
        element_id: u32,
        weight: i32,
        element_len: u32,
        position: u32,
    ) {
        match self.elements.last_mut() {
            Some(element) if element.element_id == element_id => {
                element.positions.push(position)
            }
            _ => self.elements.push(ElementFeatures {
                element_id,
                weight,
                element_len,
                positions: vec![position],
            }),
        }
    }

    pub fn num_occurrences(&self) -> usize {
        self.elements.iter().map(|e| e.positions.len()).sum()
    }

    /// Rough heap size of the decoded form.
    pub fn estimated_bytes(&self) -> usize {
        self.elements.len() * mem::size_of::<ElementFeatures>()
            + self.num_occurrences() * mem::size_of::<u32>()
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        varint::write_u64(buf, self.elements.len() as u64);
        for element in &self.elements {
            varint::write_u32(buf, element.element_id);
            varint::write_i32(buf, element.weight);
            varint::write_u32(buf, element.element_len);
            varint::write_u64(buf, element.positions.len() as u64);
            let mut previous = 0;
            for &position in &element.positions {
                varint::write_u32(buf, position.wrapping_sub(previous));
                previous = position;
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let num_elements = varint::read_u64(bytes, &mut offset)? as usize;
        let mut elements = Vec::with_capacity(num_elements.min(bytes.len()));
        for _ in 0..num_elements {
            let element_id = varint::read_u32(bytes, &mut offset)?;
            let weight = varint::read_i32(bytes, &mut offset)?;
            let element_len = varint::read_u32(bytes, &mut offset)?;
            let num_positions = varint::read_u64(bytes, &mut offset)? as usize;
            let mut positions = Vec::with_capacity(num_positions.min(bytes.len()));
            let mut position = 0u32;
            for _ in 0..num_positions {
                position = position.wrapping_add(varint::read_u32(bytes, &mut offset)?);
                positions.push(position);
            }
            elements.push(ElementFeatures {
                element_id,
                weight,
                element_len,
                positions,
            });
        }
        if offset != bytes.len() {
            return Err(MemIndexError::feature_store(format!(
                "{} trailing bytes after features",
                bytes.len() - offset
            )));
        }
        Ok(Self { elements })
    }
}

/// Reference to one encoded entry: buffer id in the high half, byte offset in
/// the low half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef(u64);

impl EntryRef {
    pub fn new(buffer: u32, offset: u32) -> Self {
        EntryRef(((buffer as u64) << 32) | offset as u64)
    }

    pub fn buffer(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn offset(self) -> u32 {
        self.0 as u32
    }
}

/// The sealed feature buffers of one field.
///
/// Cloning shares the buffers.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    buffers: Vec<Arc<[u8]>>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start encoding the entries of the next buffer.
    pub fn begin_batch(&self) -> FeatureBatch {
        FeatureBatch {
            buffer: self.buffers.len() as u32,
            bytes: Vec::new(),
        }
    }

    /// Return a store that also contains the entries of `batch`.
    pub fn seal(&self, batch: FeatureBatch) -> Result<FeatureStore> {
        if batch.buffer as usize != self.buffers.len() {
            return Err(MemIndexError::feature_store(format!(
                "batch for buffer {} sealed into a store with {} buffers",
                batch.buffer,
                self.buffers.len()
            )));
        }
        let mut buffers = self.buffers.clone();
        buffers.push(Arc::from(batch.bytes));
        Ok(FeatureStore { buffers })
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Bytes of the whole entry and the length of its header.
    fn raw_entry(&self, entry: EntryRef) -> Result<(&[u8], usize)> {
        let buffer = self
            .buffers
            .get(entry.buffer() as usize)
            .ok_or_else(|| {
                MemIndexError::feature_store(format!("unknown feature buffer {}", entry.buffer()))
            })?;
        let start = entry.offset() as usize;
        let mut offset = start;
        let len = varint::read_u64(buffer, &mut offset)? as usize;
        let raw = offset
            .checked_add(len)
            .and_then(|end| buffer.get(start..end))
            .ok_or_else(|| {
                MemIndexError::feature_store(format!(
                    "entry at {start} overruns buffer {}",
                    entry.buffer()
                ))
            })?;
        Ok((raw, offset - start))
    }

    /// Decode the features stored at `entry`.
    pub fn decode(&self, entry: EntryRef) -> Result<DocFeatures> {
        let (raw, header) = self.raw_entry(entry)?;
        DocFeatures::decode(&raw[header..])
    }

    /// Encoded size of the entry, length prefix included.
    pub fn entry_size(&self, entry: EntryRef) -> Result<usize> {
        Ok(self.raw_entry(entry)?.0.len())
    }

    /// Bytes held by the buffers themselves.
    pub fn data_bytes(&self) -> usize {
        self.buffers.iter().map(|b| b.len()).sum()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.data_bytes() + self.buffers.capacity() * mem::size_of::<Arc<[u8]>>()
    }

    /// Usage given `dead_bytes` of entries no posting refers to anymore.
    pub fn memory_usage(&self, dead_bytes: usize) -> MemoryUsage {
        let allocated = self.allocated_bytes();
        MemoryUsage::new(allocated, allocated.saturating_sub(dead_bytes), dead_bytes)
    }
}

/// Entries encoded for the next buffer of a [`FeatureStore`].
#[derive(Debug)]
pub struct FeatureBatch {
    buffer: u32,
    bytes: Vec<u8>,
}

impl FeatureBatch {
    fn next_offset(&self) -> Result<u32> {
        u32::try_from(self.bytes.len()).map_err(|_| {
            MemIndexError::feature_store(format!("feature buffer {} is full", self.buffer))
        })
    }

    pub fn add(&mut self, features: &DocFeatures) -> Result<EntryRef> {
        let offset = self.next_offset()?;
        let mut payload = Vec::new();
        features.encode(&mut payload);
        varint::write_u64(&mut self.bytes, payload.len() as u64);
        self.bytes.extend_from_slice(&payload);
        Ok(EntryRef::new(self.buffer, offset))
    }

    /// Copy the encoded entry at `entry` of `store` without decoding it.
    pub fn copy_entry(&mut self, store: &FeatureStore, entry: EntryRef) -> Result<EntryRef> {
        let offset = self.next_offset()?;
        let (raw, _) = store.raw_entry(entry)?;
        self.bytes.extend_from_slice(raw);
        Ok(EntryRef::new(self.buffer, offset))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
