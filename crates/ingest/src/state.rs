//! Shared session state: the queue plus the aggregated results.

use crate::config::EmptyExtractionPolicy;
use crate::decode::EncodedDocument;
use crate::error::ExtractionError;
use crate::fields::Fields;
use crate::queue::IngestionQueue;
use crate::results::ResultAggregator;
use crate::types::{DocumentUnit, UnitStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared by the dispatcher and user actions.
pub type SharedState = Arc<Mutex<SystemState>>;

/// Everything a session knows.
///
/// Every transition is a method here, so the dispatcher and user actions
/// mutate it the same way.
#[derive(Debug, Default)]
pub struct SystemState {
    pub queue: IngestionQueue,
    pub results: ResultAggregator,
}

/// A unit taken by the dispatcher for extraction.
#[derive(Debug, Clone)]
pub struct Claim {
    pub id: String,
    pub name: String,
    pub content: EncodedDocument,
}

/// What applying an extraction outcome did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Unit marked done; ids of the appended records
    Done { record_ids: Vec<String> },
    /// Unit marked failed with this message
    Failed { error: String },
    /// The unit is gone (cleared) or no longer in flight; nothing was written
    Stale,
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append units in order, returning their ids.
    pub fn enqueue_all(&mut self, units: Vec<DocumentUnit>) -> Vec<String> {
        units.into_iter().map(|u| self.queue.enqueue(u)).collect()
    }

    /// Take the oldest pending unit and mark it in flight.
    ///
    /// Returns `None` when nothing is pending or another unit is already in
    /// flight.
    pub fn claim_next(&mut self) -> Option<Claim> {
        if let Some(busy) = self.queue.in_flight() {
            debug!(unit = %busy.name, "extraction already in flight");
            return None;
        }

        let unit = self.queue.next_pending()?;
        let claim = Claim {
            id: unit.id.clone(),
            name: unit.name.clone(),
            content: unit.content.clone(),
        };

        // The unit was just found, so this cannot miss.
        let _ = self.queue.set_status(&claim.id, UnitStatus::InFlight);
        Some(claim)
    }

    /// Record the outcome of extracting a claimed unit.
    pub fn apply_outcome(
        &mut self,
        claim: &Claim,
        outcome: Result<Vec<Fields>, ExtractionError>,
        policy: EmptyExtractionPolicy,
    ) -> Applied {
        match self.queue.get(&claim.id) {
            Some(unit) if unit.status == UnitStatus::InFlight => {}
            Some(unit) => {
                warn!(unit = %claim.name, status = %unit.status, "ignoring result for unit that is no longer in flight");
                return Applied::Stale;
            }
            None => {
                warn!(unit = %claim.name, "ignoring result for cleared unit");
                return Applied::Stale;
            }
        }

        let outcome = match outcome {
            Ok(records) if records.is_empty() && policy == EmptyExtractionPolicy::Fail => {
                Err(ExtractionError::Empty)
            }
            other => other,
        };

        match outcome {
            Ok(records) => {
                let record_ids = self.results.append(&claim.name, records);
                let _ = self.queue.set_status(&claim.id, UnitStatus::Done);
                Applied::Done { record_ids }
            }
            Err(e) => {
                let error = e.to_string();
                let _ = self.queue.fail(&claim.id, error.clone());
                Applied::Failed { error }
            }
        }
    }

    /// Drop every unit and every record.
    ///
    /// An extraction still running keeps running; its result will come back
    /// as [`Applied::Stale`].
    pub fn clear_all(&mut self) {
        self.queue.clear();
        self.results.clear();
    }
}
