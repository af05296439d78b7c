//! Memory accounting types.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Byte counts reported by the index structures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Bytes reserved by the structures.
    pub allocated_bytes: usize,
    /// Bytes holding live data.
    pub used_bytes: usize,
    /// Bytes still allocated but no longer referenced by live data.
    pub dead_bytes: usize,
}

impl MemoryUsage {
    pub fn new(allocated_bytes: usize, used_bytes: usize, dead_bytes: usize) -> Self {
        Self {
            allocated_bytes,
            used_bytes,
            dead_bytes,
        }
    }

    pub fn merge(&mut self, other: &MemoryUsage) {
        self.allocated_bytes += other.allocated_bytes;
        self.used_bytes += other.used_bytes;
        self.dead_bytes += other.dead_bytes;
    }

    pub fn inc_allocated_bytes(&mut self, bytes: usize) {
        self.allocated_bytes += bytes;
    }

    pub fn inc_used_bytes(&mut self, bytes: usize) {
        self.used_bytes += bytes;
    }
}

/// Estimated memory held by work that is staged but not yet part of the index.
///
/// Reads and writes are relaxed: the value is a monitoring hint, not a
/// synchronization point.
#[derive(Debug, Default)]
pub struct TransientMemoryUsageProvider {
    transient_memory_usage: AtomicUsize,
}

impl TransientMemoryUsageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.transient_memory_usage.load(Ordering::Relaxed)
    }

    pub fn set(&self, bytes: usize) {
        self.transient_memory_usage.store(bytes, Ordering::Relaxed);
    }

    pub fn add(&self, bytes: usize) {
        self.transient_memory_usage
            .fetch_add(bytes, Ordering::Relaxed);
    }

    /// Subtract `bytes`, saturating at zero.
    pub fn sub(&self, bytes: usize) {
        let _ = self.transient_memory_usage.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| Some(current.saturating_sub(bytes)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut usage = MemoryUsage::new(100, 80, 5);
        usage.merge(&MemoryUsage::new(10, 10, 1));
        assert_eq!(usage, MemoryUsage::new(110, 90, 6));
    }

    #[test]
    fn test_transient_provider_saturates() {
        let provider = TransientMemoryUsageProvider::new();
        provider.add(64);
        provider.sub(16);
        assert_eq!(provider.get(), 48);
        provider.sub(1000);
        assert_eq!(provider.get(), 0);
        provider.set(7);
        assert_eq!(provider.get(), 7);
    }
}
