use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::ports::ImportOutputPort;
use crate::constants::DEFAULT_SOURCE;
use crate::domain::NormalizedContact;
use crate::pipeline::batch::{BatchProcessingOptions, BatchProcessingResult, BatchProcessor};
use crate::pipeline::ingestion::{fetch_all, ContactStore};

/// Summary of one import run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub run_id: Uuid,
    pub contacts_fetched: usize,
    pub total_processed: usize,
    pub similarity_groups: usize,
    /// Groups with more than one member
    pub duplicate_groups: usize,
    pub failed_batches: usize,
    pub fetch_time_ms: u64,
    pub processing_time_ms: u64,
}

impl ImportReport {
    fn from_result(contacts_fetched: usize, fetch_time_ms: u64, result: &BatchProcessingResult) -> Self {
        Self {
            run_id: result.run_id,
            contacts_fetched,
            total_processed: result.total_processed,
            similarity_groups: result.similarity_groups.len(),
            duplicate_groups: result.duplicate_groups().count(),
            failed_batches: result.batch_stats.failed_batches,
            fetch_time_ms,
            processing_time_ms: result.processing_time_ms,
        }
    }
}

/// Use case for pulling every contact out of a store and grouping duplicates
pub struct ImportUseCase {
    store: Arc<dyn ContactStore>,
    processor: Arc<BatchProcessor>,
    output_port: Option<Arc<dyn ImportOutputPort>>,
    page_size: usize,
    source: String,
}

impl ImportUseCase {
    pub fn new(store: Arc<dyn ContactStore>, processor: Arc<BatchProcessor>, page_size: usize) -> Self {
        Self {
            store,
            processor,
            output_port: None,
            page_size,
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    /// Source tag stamped on every projected contact
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_output(mut self, output_port: Arc<dyn ImportOutputPort>) -> Self {
        self.output_port = Some(output_port);
        self
    }

    /// Fetch, project, and batch-process every contact in the store
    pub async fn run(&self, options: BatchProcessingOptions) -> Result<(ImportReport, BatchProcessingResult)> {
        let fetch_start = Instant::now();
        let contacts = fetch_all(self.store.as_ref(), self.page_size)
            .await
            .context("Failed to fetch contacts from store")?;
        let fetch_time_ms = fetch_start.elapsed().as_millis() as u64;
        info!("Fetched {} contacts in {}ms", contacts.len(), fetch_time_ms);

        let projected: Vec<NormalizedContact> = contacts
            .into_iter()
            .map(|contact| NormalizedContact::from_contact_with_source(contact, &self.source))
            .collect();

        let result = self
            .processor
            .process_contacts(&projected, options)
            .await
            .context("Batch processing rejected its options")?;
        let report = ImportReport::from_result(projected.len(), fetch_time_ms, &result);

        if report.failed_batches > 0 {
            warn!(
                "Import {} finished with {} failed batches",
                report.run_id, report.failed_batches
            );
        }

        if let Some(output) = &self.output_port {
            if let Err(e) = output.write_result(&result).await {
                error!("Failed to write import result: {}", e);
                return Err(e);
            }
        }

        info!(
            "Import {} completed: {}/{} contacts processed, {} duplicate groups",
            report.run_id, report.total_processed, report.contacts_fetched, report.duplicate_groups
        );
        Ok((report, result))
    }
}
