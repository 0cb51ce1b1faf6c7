//! A processing session: shared state, its dispatcher and the user actions.

use crate::config::IngestConfig;
use crate::dispatcher::{Dispatcher, DrainOutcome};
use crate::error::IngestError;
use crate::events::QueueObserver;
use crate::export::{self, ExportFormat};
use crate::extraction::InvoiceExtractor;
use crate::fields::Fields;
use crate::ingest::{units_from_path, units_from_upload, Upload};
use crate::state::{SharedState, SystemState};
use crate::types::{DocumentUnit, ExtractedRecord, QueueStats, UnitStatus};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point for callers.
///
/// Ingestion only queues documents; call [`drain`](Self::drain) (or
/// [`submit`](Self::submit), which also starts one in the background) to
/// run extraction. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    state: SharedState,
    dispatcher: Dispatcher,
    observer: Arc<dyn QueueObserver>,
    config: Arc<IngestConfig>,
}

impl Session {
    pub fn new(
        config: IngestConfig,
        extractor: Arc<dyn InvoiceExtractor>,
        observer: Arc<dyn QueueObserver>,
    ) -> Self {
        let state = SystemState::shared();
        let dispatcher = Dispatcher::new(
            state.clone(),
            extractor,
            observer.clone(),
            config.empty_extraction,
        );

        Self {
            state,
            dispatcher,
            observer,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Queue an uploaded document or archive. Returns the new unit ids.
    pub async fn ingest_upload(&self, upload: Upload) -> Result<Vec<String>, IngestError> {
        let units = units_from_upload(upload, self.config.archive_size_limit_bytes).await?;
        Ok(self.enqueue(units))
    }

    /// Queue a local file or directory. Returns the new unit ids.
    pub async fn ingest_path(&self, path: &Path) -> Result<Vec<String>, IngestError> {
        let units = units_from_path(path, self.config.archive_size_limit_bytes).await?;
        Ok(self.enqueue(units))
    }

    /// Queue an upload and start draining in the background.
    pub async fn submit(&self, upload: Upload) -> Result<Vec<String>, IngestError> {
        let ids = self.ingest_upload(upload).await?;
        if !ids.is_empty() {
            self.trigger_drain();
        }
        Ok(ids)
    }

    fn enqueue(&self, units: Vec<DocumentUnit>) -> Vec<String> {
        let queued: Vec<(String, String)> = units
            .iter()
            .map(|u| (u.id.clone(), u.name.clone()))
            .collect();
        {
            self.state.lock().enqueue_all(units);
        }

        for (id, name) in &queued {
            self.observer.on_unit_queued(id, name);
        }
        queued.into_iter().map(|(id, _)| id).collect()
    }

    /// Run extraction until nothing is pending.
    pub async fn drain(&self) -> DrainOutcome {
        self.dispatcher.drain().await
    }

    /// Put a failed unit back in the queue and start draining in the
    /// background.
    pub fn retry(&self, unit_id: &str) -> Result<(), IngestError> {
        self.state.lock().queue.retry(unit_id)?;
        self.trigger_drain();
        Ok(())
    }

    /// Put every failed unit back in the queue. Returns how many.
    pub fn retry_failed(&self) -> usize {
        let retried = {
            let mut state = self.state.lock();
            let failed: Vec<String> = state
                .queue
                .with_status(UnitStatus::Failed)
                .map(|u| u.id.clone())
                .collect();
            failed
                .iter()
                .filter(|id| state.queue.retry(id).is_ok())
                .count()
        };
        if retried > 0 {
            self.trigger_drain();
        }
        retried
    }

    /// Start a background drain if called from inside a runtime. Outside
    /// one, queued units wait for the next [`drain`](Self::drain).
    fn trigger_drain(&self) {
        if tokio::runtime::Handle::try_current().is_ok() {
            self.dispatcher.spawn_drain();
        } else {
            debug!("no runtime; pending units wait for the next drain");
        }
    }

    pub fn update_record(&self, record_id: &str, fields: Fields) -> Result<(), IngestError> {
        self.state.lock().results.update(record_id, fields)
    }

    /// Edit one field from user text, coercing numeric fields.
    pub fn update_record_field(
        &self,
        record_id: &str,
        key: &str,
        raw: &str,
    ) -> Result<(), IngestError> {
        self.state.lock().results.update_from_text(record_id, key, raw)
    }

    /// Delete one record. Unit statuses are untouched.
    pub fn remove_record(&self, record_id: &str) -> Result<ExtractedRecord, IngestError> {
        self.state.lock().results.remove(record_id)
    }

    /// Forget every unit and record. An extraction already running is not
    /// interrupted, but its result is discarded.
    pub fn clear_all(&self) {
        self.state.lock().clear_all();
        info!("session cleared");
    }

    pub fn units(&self) -> Vec<DocumentUnit> {
        self.state.lock().queue.units().to_vec()
    }

    pub fn records(&self) -> Vec<ExtractedRecord> {
        self.state.lock().results.records().to_vec()
    }

    pub fn stats(&self) -> QueueStats {
        self.state.lock().queue.stats()
    }

    /// Render an export from a snapshot of the current records and units.
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, IngestError> {
        let (records, units) = {
            let state = self.state.lock();
            (
                state.results.records().to_vec(),
                match format {
                    ExportFormat::Zip => state.queue.units().to_vec(),
                    _ => Vec::new(),
                },
            )
        };
        export::render(format, &records, &units)
    }

    /// File name for an export made today (UTC).
    pub fn export_file_name(&self, format: ExportFormat) -> String {
        format.file_name(&self.config.export_prefix, chrono::Utc::now().date_naive())
    }
}
