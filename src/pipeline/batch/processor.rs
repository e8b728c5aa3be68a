use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pause::PauseHandle;
use super::state::{
    BatchCheckpoint, BatchProcessingError, BatchProcessingResult, BatchProcessingState,
    BatchProcessingStatus, BatchStats, CompletedBatch, NormalizationSummary,
};
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_SIMILARITY_THRESHOLD, STAGE_NORMALIZING, STAGE_PROCESSING};
use crate::domain::NormalizedContact;
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::pipeline::processing::normalize::{NormalizationOutcome, NormalizationService};
use crate::pipeline::processing::similarity::SimilarityGrouper;

pub type ProgressCallback = Box<dyn Fn(u32, &str) + Send + Sync>;
pub type BatchCallback = Box<dyn Fn(&[NormalizedContact], &str) + Send + Sync>;
pub type NormalizationCallback = Box<dyn Fn(&[NormalizedContact]) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&BatchProcessingError) + Send + Sync>;

/// Options for one `process_contacts` run.
///
/// Unset sizes fall back to the crate defaults; explicitly invalid values are
/// rejected when the run starts.
#[derive(Default)]
pub struct BatchProcessingOptions {
    pub batch_size: Option<usize>,
    pub similarity_threshold: Option<f64>,
    pub cross_batch_reconciliation: bool,
    on_progress: Option<ProgressCallback>,
    on_batch_processed: Option<BatchCallback>,
    on_normalization_complete: Option<NormalizationCallback>,
    on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for BatchProcessingOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessingOptions")
            .field("batch_size", &self.batch_size)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("cross_batch_reconciliation", &self.cross_batch_reconciliation)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_batch_processed", &self.on_batch_processed.is_some())
            .field("on_normalization_complete", &self.on_normalization_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl BatchProcessingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn cross_batch_reconciliation(mut self, enabled: bool) -> Self {
        self.cross_batch_reconciliation = enabled;
        self
    }

    pub fn on_progress(mut self, f: impl Fn(u32, &str) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_batch_processed(
        mut self,
        f: impl Fn(&[NormalizedContact], &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_batch_processed = Some(Box::new(f));
        self
    }

    pub fn on_normalization_complete(
        mut self,
        f: impl Fn(&[NormalizedContact]) + Send + Sync + 'static,
    ) -> Self {
        self.on_normalization_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&BatchProcessingError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Effective batch size and threshold
    pub fn resolve(&self) -> Result<(usize, f64)> {
        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        let threshold = self.similarity_threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok((batch_size, threshold))
    }
}

#[derive(Debug, Default)]
struct RunState {
    state: BatchProcessingState,
    completed: bool,
    completed_batches: Vec<CompletedBatch>,
    resume_from: Option<BatchCheckpoint>,
}

/// Drives contacts through normalization and similarity grouping in
/// fixed-size, strictly sequential batches.
pub struct BatchProcessor {
    grouper: Arc<dyn SimilarityGrouper>,
    normalizer: Option<Arc<NormalizationService>>,
    pause: PauseHandle,
    run: Mutex<RunState>,
}

impl BatchProcessor {
    pub fn new(grouper: Arc<dyn SimilarityGrouper>) -> Self {
        Self {
            grouper,
            normalizer: None,
            pause: PauseHandle::new(),
            run: Mutex::new(RunState::default()),
        }
    }

    /// Pass every batch through `normalizer` before grouping
    pub fn with_normalizer(mut self, normalizer: Arc<NormalizationService>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn pause(&self) {
        info!("Batch processing paused");
        self.pause.pause();
    }

    pub fn resume(&self) {
        info!("Batch processing resumed");
        self.pause.resume();
    }

    pub fn is_currently_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Handle that can pause or resume this processor from elsewhere
    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn state(&self) -> BatchProcessingState {
        let mut state = self.run_guard().state.clone();
        state.is_paused = self.pause.is_paused();
        state
    }

    pub fn status(&self) -> BatchProcessingStatus {
        let run = self.run_guard();
        if run.state.is_processing {
            if self.pause.is_paused() {
                BatchProcessingStatus::Paused
            } else {
                BatchProcessingStatus::Processing
            }
        } else if run.completed {
            BatchProcessingStatus::Completed
        } else {
            BatchProcessingStatus::Idle
        }
    }

    /// Snapshot of the batches completed by the current or last run
    pub fn save_intermediate_results(&self) -> BatchCheckpoint {
        let run = self.run_guard();
        BatchCheckpoint {
            processed_batches: run.completed_batches.clone(),
            current_batch_index: run.state.current_batch,
            saved_at: Some(Utc::now()),
        }
    }

    /// Make the next run reuse the batches recorded in `checkpoint`.
    ///
    /// A recorded batch is reused only when its contact ids match the batch at
    /// the same index in the new input.
    pub fn load_intermediate_results(&self, checkpoint: BatchCheckpoint) {
        info!(
            "Loaded checkpoint with {} completed batches",
            checkpoint.processed_batches.len()
        );
        self.run_guard().resume_from = Some(checkpoint);
    }

    fn run_guard(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Process `contacts` batch by batch.
    ///
    /// Only invalid options produce an `Err`; failures inside a batch are
    /// reported through `on_error` and the result, and the run continues.
    pub async fn process_contacts(
        &self,
        contacts: &[NormalizedContact],
        options: BatchProcessingOptions,
    ) -> Result<BatchProcessingResult> {
        let (batch_size, threshold) = options.resolve()?;
        let start_time = Instant::now();
        let run_id = Uuid::new_v4();
        let total_batches = contacts.len().div_ceil(batch_size);

        let resume_from = {
            let mut run = self.run_guard();
            run.state = BatchProcessingState {
                is_processing: true,
                total_batches,
                ..Default::default()
            };
            run.completed = false;
            run.completed_batches.clear();
            run.resume_from.take()
        };

        info!(
            "Starting batch run {}: {} contacts in {} batches of {} (threshold {}, grouper {})",
            run_id,
            contacts.len(),
            total_batches,
            batch_size,
            threshold,
            self.grouper.name()
        );
        metrics::batch::run_started();

        let mut processed_contacts = Vec::with_capacity(contacts.len());
        let mut similarity_groups = Vec::new();
        let mut duplicates_found = 0;
        let mut batch_stats = BatchStats {
            total_batches,
            ..Default::default()
        };
        let mut errors = Vec::new();

        for (batch_index, batch) in contacts.chunks(batch_size).enumerate() {
            if self.pause.is_paused() {
                info!("Run {} paused before batch {}", run_id, batch_index);
                metrics::batch::pause_wait();
                self.pause.wait_until_resumed().await;
                info!("Run {} resuming at batch {}", run_id, batch_index);
            }
            self.run_guard().state.current_batch = batch_index;

            let reused = resume_from
                .as_ref()
                .and_then(|checkpoint| checkpoint.batch(batch_index))
                .filter(|done| done.matches(batch))
                .cloned();

            let completed = match reused {
                Some(done) => {
                    debug!("Reusing checkpointed batch {}", batch_index);
                    done
                }
                None => {
                    if let Some(callback) = &options.on_batch_processed {
                        callback(batch, STAGE_NORMALIZING);
                    }
                    match self.process_batch(batch_index, batch, threshold) {
                        Ok(done) => done,
                        Err(e) => {
                            error!("Batch {} of run {} failed: {}", batch_index, run_id, e);
                            metrics::batch::batch_failed();
                            batch_stats.failed_batches += 1;
                            let failure = BatchProcessingError::new(
                                error_code(&e),
                                e.to_string(),
                                Some(batch_index),
                            );
                            if let Some(callback) = &options.on_error {
                                callback(&failure);
                            }
                            errors.push(failure.clone());
                            self.run_guard().state.errors.push(failure);
                            continue;
                        }
                    }
                }
            };

            let group_count = completed.groups.len();
            duplicates_found += group_count;
            batch_stats.duplicates_per_batch.insert(batch_index, group_count);
            similarity_groups.extend(completed.groups.iter().cloned());
            processed_contacts.extend(completed.contacts.iter().cloned());
            batch_stats.processed_batches += 1;
            metrics::batch::batch_processed(group_count);

            let progress = progress_percent(batch_stats.processed_batches, total_batches);
            {
                let mut run = self.run_guard();
                run.state.progress = progress;
                run.completed_batches.push(completed.clone());
            }
            if let Some(callback) = &options.on_progress {
                callback(progress, STAGE_PROCESSING);
            }
            if let Some(callback) = &options.on_normalization_complete {
                callback(completed.contacts.as_slice());
            }
        }

        let reconciled_groups = if options.cross_batch_reconciliation {
            match self.reconcile(&similarity_groups, threshold) {
                Ok(groups) => Some(groups),
                Err(e) => {
                    warn!("Cross-batch reconciliation of run {} failed: {}", run_id, e);
                    let failure = BatchProcessingError::new(error_code(&e), e.to_string(), None);
                    if let Some(callback) = &options.on_error {
                        callback(&failure);
                    }
                    errors.push(failure.clone());
                    self.run_guard().state.errors.push(failure);
                    None
                }
            }
        } else {
            None
        };

        let normalization_stats = summarize_normalization(contacts, &processed_contacts);
        let elapsed = start_time.elapsed();

        {
            let mut run = self.run_guard();
            run.state.is_processing = false;
            run.completed = true;
        }
        metrics::batch::run_completed(elapsed.as_secs_f64());
        info!(
            "Batch run {} completed: {}/{} batches, {} contacts, {} groups in {}ms",
            run_id,
            batch_stats.processed_batches,
            total_batches,
            processed_contacts.len(),
            duplicates_found,
            elapsed.as_millis()
        );
        if batch_stats.failed_batches > 0 {
            warn!(
                "Batch run {} had {} failed batches out of {}",
                run_id, batch_stats.failed_batches, total_batches
            );
        }

        Ok(BatchProcessingResult {
            run_id,
            total_processed: processed_contacts.len(),
            contacts: processed_contacts,
            similarity_groups,
            reconciled_groups,
            processing_time_ms: elapsed.as_millis() as u64,
            duplicates_found,
            normalization_stats,
            batch_stats,
            errors,
        })
    }

    /// Normalize (if configured) and group one batch. Normalization changes
    /// reach the service log only once grouping and the partition check pass.
    fn process_batch(
        &self,
        batch_index: usize,
        batch: &[NormalizedContact],
        threshold: f64,
    ) -> Result<CompletedBatch> {
        let outcomes: Vec<NormalizationOutcome> = match &self.normalizer {
            Some(normalizer) => batch
                .iter()
                .map(|c| normalizer.preview_normalization(&c.contact))
                .collect(),
            None => Vec::new(),
        };
        let contacts: Vec<NormalizedContact> = if outcomes.is_empty() {
            batch.to_vec()
        } else {
            batch
                .iter()
                .zip(&outcomes)
                .map(|(c, outcome)| c.reproject(outcome.normalized.clone()))
                .collect()
        };

        let groups = self
            .grouper
            .group(&contacts, threshold)
            .map_err(|e| PipelineError::Grouping {
                batch_index,
                message: format!("{:#}", e),
            })?;
        ensure_partition(&contacts, &groups).map_err(|message| PipelineError::Grouping {
            batch_index,
            message,
        })?;

        if let Some(normalizer) = &self.normalizer {
            for outcome in &outcomes {
                normalizer.record(outcome);
            }
        }

        debug!(
            "Batch {} produced {} groups from {} contacts",
            batch_index,
            groups.len(),
            contacts.len()
        );
        Ok(CompletedBatch {
            batch_index,
            contacts,
            groups,
        })
    }

    /// Group the first member of every batch-local group once more and merge
    /// the groups whose representatives matched.
    fn reconcile(
        &self,
        groups: &[Vec<NormalizedContact>],
        threshold: f64,
    ) -> Result<Vec<Vec<NormalizedContact>>> {
        let representatives: Vec<NormalizedContact> =
            groups.iter().filter_map(|group| group.first().cloned()).collect();
        let rep_groups = self
            .grouper
            .group(&representatives, threshold)
            .map_err(|e| PipelineError::Grouping {
                batch_index: groups.len(),
                message: format!("reconciliation: {:#}", e),
            })?;
        ensure_partition(&representatives, &rep_groups).map_err(|message| {
            PipelineError::Grouping {
                batch_index: groups.len(),
                message: format!("reconciliation: {}", message),
            }
        })?;

        // Contact ids are unique within a tenant, so each id leads one group
        let by_rep: HashMap<&str, &Vec<NormalizedContact>> = groups
            .iter()
            .filter_map(|group| group.first().map(|rep| (rep.id(), group)))
            .collect();

        let reconciled: Vec<Vec<NormalizedContact>> = rep_groups
            .iter()
            .map(|reps| {
                reps.iter()
                    .filter_map(|rep| by_rep.get(rep.id()))
                    .flat_map(|group| group.iter().cloned())
                    .collect()
            })
            .collect();

        info!(
            "Cross-batch reconciliation merged {} groups into {}",
            groups.len(),
            reconciled.len()
        );
        Ok(reconciled)
    }
}

fn error_code(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::Grouping { .. } => "GROUPING_FAILED",
        PipelineError::InvalidConfiguration(_) | PipelineError::Config(_) => "INVALID_CONFIGURATION",
        _ => "BATCH_PROCESSING_FAILED",
    }
}

fn progress_percent(processed: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (processed as f64 / total as f64 * 100.0).round() as u32
}

/// Check that `groups` is a partition of `batch` by contact id
fn ensure_partition(
    batch: &[NormalizedContact],
    groups: &[Vec<NormalizedContact>],
) -> std::result::Result<(), String> {
    let mut remaining: HashMap<&str, usize> = HashMap::with_capacity(batch.len());
    for contact in batch {
        *remaining.entry(contact.id()).or_default() += 1;
    }

    for group in groups {
        if group.is_empty() {
            return Err("grouper returned an empty group".to_string());
        }
        for contact in group {
            match remaining.get_mut(contact.id()) {
                Some(count) if *count > 0 => *count -= 1,
                Some(_) => return Err(format!("contact {} appears in more than one group", contact.id())),
                None => return Err(format!("contact {} is not part of the batch", contact.id())),
            }
        }
    }

    match remaining.iter().find(|(_, count)| **count > 0) {
        Some((id, _)) => Err(format!("contact {} is missing from the groups", id)),
        None => Ok(()),
    }
}

/// Count processed contacts whose fields differ from the input with the same id
fn summarize_normalization(
    input: &[NormalizedContact],
    processed: &[NormalizedContact],
) -> NormalizationSummary {
    let originals: HashMap<&str, &NormalizedContact> =
        input.iter().map(|contact| (contact.id(), contact)).collect();

    let mut summary = NormalizationSummary::default();
    for contact in processed {
        let Some(original) = originals.get(contact.id()) else {
            continue;
        };
        let (before, after) = (&original.contact, &contact.contact);
        if before.email != after.email {
            summary.emails_normalized += 1;
        }
        if before.phone != after.phone {
            summary.phones_normalized += 1;
        }
        if before.first_name != after.first_name || before.last_name != after.last_name {
            summary.names_normalized += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Contact;

    fn contacts(n: usize) -> Vec<NormalizedContact> {
        (0..n)
            .map(|i| {
                NormalizedContact::from_contact(Contact {
                    id: format!("c{}", i),
                    ..Default::default()
                })
            })
            .collect()
    }

    #[test]
    fn test_options_resolve_defaults_and_reject_invalid_values() {
        assert_eq!(BatchProcessingOptions::new().resolve().unwrap(), (50, 0.8));
        assert!(matches!(
            BatchProcessingOptions::new().batch_size(0).resolve(),
            Err(PipelineError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            BatchProcessingOptions::new().similarity_threshold(1.5).resolve(),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_progress_rounds_to_nearest_percent() {
        let steps: Vec<u32> = (1..=3).map(|i| progress_percent(i, 3)).collect();
        assert_eq!(steps, vec![33, 67, 100]);
    }

    #[test]
    fn test_partition_check() {
        let batch = contacts(3);
        let good = vec![vec![batch[0].clone(), batch[2].clone()], vec![batch[1].clone()]];
        let missing = vec![vec![batch[0].clone()], vec![batch[1].clone()]];
        let doubled = vec![vec![batch[0].clone(), batch[1].clone()], vec![batch[1].clone(), batch[2].clone()]];
        let foreign = vec![contacts(4)];

        assert!(ensure_partition(&batch, &good).is_ok());
        assert!(ensure_partition(&batch, &missing).is_err());
        assert!(ensure_partition(&batch, &doubled).is_err());
        assert!(ensure_partition(&batch, &foreign).is_err());
        assert!(ensure_partition(&batch, &[vec![]]).is_err());
    }

    #[test]
    fn test_summary_counts_changed_fields_by_id() {
        let input = vec![NormalizedContact::from_contact(Contact {
            id: "a".to_string(),
            email: Some("a@x.io".to_string()),
            first_name: Some("Ann".to_string()),
            ..Default::default()
        })];
        let mut changed = input[0].clone();
        changed.contact.first_name = Some("ann".to_string());

        let summary = summarize_normalization(&input, &[changed]);

        assert_eq!(summary.emails_normalized, 0);
        assert_eq!(summary.names_normalized, 1);
    }
}
