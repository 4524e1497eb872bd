//! Batch Accumulator and Batch Writer

use crate::db::store::RecordStore;
use crate::error::{IngestError, Result};
use crate::ingestion::transform::TargetRecord;
use std::sync::Arc;

/// An ordered group of records persisted in one write
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// 1-based, in file order
    pub sequence: u64,
    pub records: Vec<TargetRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Buffers records until `capacity` is reached. Flushing is up to the caller.
pub struct BatchAccumulator {
    capacity: usize,
    buffer: Vec<TargetRecord>,
    next_sequence: u64,
}

impl BatchAccumulator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
            next_sequence: 1,
        }
    }

    /// Append a record; `true` means the batch is full and should be drained
    pub fn add(&mut self, record: TargetRecord) -> bool {
        self.buffer.push(record);
        self.buffer.len() >= self.capacity
    }

    /// Take everything buffered so far and start a fresh buffer.
    /// Sequence numbers only advance for non-empty batches.
    pub fn drain(&mut self) -> Batch {
        let records = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        let sequence = self.next_sequence;
        if !records.is_empty() {
            self.next_sequence += 1;
        }
        Batch { sequence, records }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Persists one batch as a single multi-row write
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn RecordStore>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Write the whole batch or none of it. Returns the number of rows written.
    pub async fn write(&self, batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        self.store
            .insert_batch(&batch.records)
            .await
            .map_err(|e| IngestError::Write {
                sequence: batch.sequence,
                rows: batch.len(),
                source: Box::new(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MemoryRecordStore;

    fn record(name: &str) -> TargetRecord {
        TargetRecord {
            name: name.to_string(),
            age: 0,
            address: None,
            additional_info: None,
        }
    }

    #[test]
    fn test_add_signals_full_at_capacity() {
        let mut acc = BatchAccumulator::new(2);
        assert!(!acc.add(record("a")));
        assert!(acc.add(record("b")));
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_drain_resets_and_numbers_batches() {
        let mut acc = BatchAccumulator::new(2);
        acc.add(record("a"));
        acc.add(record("b"));
        let first = acc.drain();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.len(), 2);
        assert!(acc.is_empty());

        acc.add(record("c"));
        let second = acc.drain();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.records[0].name, "c");

        let empty = acc.drain();
        assert!(empty.is_empty());
        assert_eq!(empty.sequence, 3);
        assert_eq!(acc.drain().sequence, 3);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(BatchAccumulator::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = Arc::new(MemoryRecordStore::new());
        let writer = BatchWriter::new(store.clone());
        let written = writer
            .write(&Batch {
                sequence: 1,
                records: vec![],
            })
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_names_the_batch() {
        let store = Arc::new(MemoryRecordStore::new().fail_on_calls(&[1]));
        let writer = BatchWriter::new(store.clone());
        let err = writer
            .write(&Batch {
                sequence: 4,
                records: vec![record("a"), record("b")],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Write { sequence: 4, rows: 2, .. }));
        assert!(store.records().is_empty());
    }
}
