//! Result aggregator: every extracted record in the order it arrived.

use crate::error::IngestError;
use crate::fields::{coerce_edit, Fields};
use crate::types::ExtractedRecord;

/// Flat, ordered collection of extracted records.
///
/// Only [`remove`](ResultAggregator::remove) and
/// [`clear`](ResultAggregator::clear) take records out; nothing reorders them.
#[derive(Debug, Default, Clone)]
pub struct ResultAggregator {
    records: Vec<ExtractedRecord>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records from one document, giving each a fresh id.
    ///
    /// Returns the new ids in order.
    pub fn append(&mut self, source_file_name: &str, records: Vec<Fields>) -> Vec<String> {
        records
            .into_iter()
            .map(|fields| {
                let record = ExtractedRecord::new(source_file_name, fields);
                let id = record.id.clone();
                self.records.push(record);
                id
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&ExtractedRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Replace a record's fields wholesale.
    pub fn update(&mut self, id: &str, fields: Fields) -> Result<(), IngestError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| IngestError::RecordNotFound(id.to_string()))?;
        record.fields = fields;
        Ok(())
    }

    /// Apply a single text edit with basic type coercion.
    pub fn update_from_text(&mut self, id: &str, key: &str, raw: &str) -> Result<(), IngestError> {
        let value = coerce_edit(key, raw)?;
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| IngestError::RecordNotFound(id.to_string()))?;
        record.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Delete one record, returning it.
    pub fn remove(&mut self, id: &str) -> Result<ExtractedRecord, IngestError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| IngestError::RecordNotFound(id.to_string()))?;
        Ok(self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
