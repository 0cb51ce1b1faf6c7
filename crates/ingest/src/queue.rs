//! Ingestion queue: documents in arrival order with their status.

use crate::error::IngestError;
use crate::types::{DocumentUnit, QueueStats, UnitStatus};

/// Ordered collection of queued documents.
///
/// Units are only ever appended; nothing is removed except by [`clear`].
/// Status changes go through [`set_status`], which the dispatcher owns, and
/// [`retry`], which is the user's way back from `Failed`.
///
/// [`clear`]: IngestionQueue::clear
/// [`set_status`]: IngestionQueue::set_status
/// [`retry`]: IngestionQueue::retry
#[derive(Debug, Default, Clone)]
pub struct IngestionQueue {
    units: Vec<DocumentUnit>,
}

impl IngestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit at the back. Returns its id.
    pub fn enqueue(&mut self, unit: DocumentUnit) -> String {
        let id = unit.id.clone();
        self.units.push(unit);
        id
    }

    pub fn get(&self, id: &str) -> Option<&DocumentUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut DocumentUnit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    /// Set a unit's status. Setting the status it already has is a no-op.
    ///
    /// Returns `true` if the status changed.
    pub fn set_status(&mut self, id: &str, status: UnitStatus) -> Result<bool, IngestError> {
        let unit = self
            .get_mut(id)
            .ok_or_else(|| IngestError::UnitNotFound(id.to_string()))?;

        if unit.status == status {
            return Ok(false);
        }
        unit.status = status;
        Ok(true)
    }

    /// Mark a unit failed and keep the message for display.
    pub fn fail(&mut self, id: &str, message: impl Into<String>) -> Result<bool, IngestError> {
        let changed = self.set_status(id, UnitStatus::Failed)?;
        if let Some(unit) = self.get_mut(id) {
            unit.error = Some(message.into());
        }
        Ok(changed)
    }

    /// Put a failed unit back in line.
    ///
    /// It keeps its original position, so it runs before any unit that
    /// arrived after it and is still pending.
    ///
    /// # Errors
    ///
    /// `UnitNotFound` for unknown ids, `NotRetryable` unless the unit failed.
    pub fn retry(&mut self, id: &str) -> Result<(), IngestError> {
        let unit = self
            .get_mut(id)
            .ok_or_else(|| IngestError::UnitNotFound(id.to_string()))?;

        if unit.status != UnitStatus::Failed {
            return Err(IngestError::NotRetryable {
                id: id.to_string(),
                status: unit.status.to_string(),
            });
        }

        unit.status = UnitStatus::Pending;
        unit.error = None;
        Ok(())
    }

    /// Oldest unit still waiting.
    pub fn next_pending(&self) -> Option<&DocumentUnit> {
        self.units.iter().find(|u| u.status == UnitStatus::Pending)
    }

    /// The unit being extracted right now, if any.
    pub fn in_flight(&self) -> Option<&DocumentUnit> {
        self.units.iter().find(|u| u.status == UnitStatus::InFlight)
    }

    pub fn has_pending(&self) -> bool {
        self.next_pending().is_some()
    }

    /// Drop every unit.
    pub fn clear(&mut self) {
        self.units.clear();
    }

    /// All units in arrival order.
    pub fn units(&self) -> &[DocumentUnit] {
        &self.units
    }

    /// Units with the given status, in arrival order.
    pub fn with_status(&self, status: UnitStatus) -> impl Iterator<Item = &DocumentUnit> {
        self.units.iter().filter(move |u| u.status == status)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for unit in &self.units {
            match unit.status {
                UnitStatus::Pending => stats.pending += 1,
                UnitStatus::InFlight => stats.in_flight += 1,
                UnitStatus::Done => stats.done += 1,
                UnitStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}
