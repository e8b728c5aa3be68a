use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::NormalizedContact;

/// Coarse lifecycle of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchProcessingStatus {
    Idle,
    Processing,
    Paused,
    Completed,
}

/// A failure attached to one batch (or to the reconciliation pass, which has
/// no batch index). Recording one never changes the run's path to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessingError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl BatchProcessingError {
    pub fn new(code: &str, message: impl Into<String>, batch_index: Option<usize>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            batch_index,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for BatchProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.batch_index {
            Some(index) => write!(f, "[{}] batch {}: {}", self.code, index, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessingState {
    pub is_paused: bool,
    pub is_processing: bool,
    pub current_batch: usize,
    pub total_batches: usize,
    /// Rounded percentage of batches completed
    pub progress: u32,
    pub errors: Vec<BatchProcessingError>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total_batches: usize,
    pub processed_batches: usize,
    pub failed_batches: usize,
    /// Group count returned for each successfully processed batch
    pub duplicates_per_batch: BTreeMap<usize, usize>,
}

/// How many processed contacts differ from their input by field family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationSummary {
    pub emails_normalized: usize,
    pub phones_normalized: usize,
    pub names_normalized: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessingResult {
    pub run_id: Uuid,
    /// Contacts of every completed batch, in input order
    pub contacts: Vec<NormalizedContact>,
    pub similarity_groups: Vec<Vec<NormalizedContact>>,
    /// Groups after the cross-batch pass, when it was requested and succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_groups: Option<Vec<Vec<NormalizedContact>>>,
    pub total_processed: usize,
    pub processing_time_ms: u64,
    pub duplicates_found: usize,
    pub normalization_stats: NormalizationSummary,
    pub batch_stats: BatchStats,
    pub errors: Vec<BatchProcessingError>,
}

impl BatchProcessingResult {
    /// Groups with more than one member
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &Vec<NormalizedContact>> {
        self.similarity_groups.iter().filter(|group| group.len() > 1)
    }
}

/// A batch whose grouping already completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedBatch {
    pub batch_index: usize,
    pub contacts: Vec<NormalizedContact>,
    pub groups: Vec<Vec<NormalizedContact>>,
}

impl CompletedBatch {
    /// Whether this record was produced from `batch`, compared by contact ids
    pub fn matches(&self, batch: &[NormalizedContact]) -> bool {
        self.contacts.len() == batch.len()
            && self
                .contacts
                .iter()
                .zip(batch)
                .all(|(done, input)| done.id() == input.id())
    }
}

/// Serializable intermediate results of a run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckpoint {
    pub processed_batches: Vec<CompletedBatch>,
    pub current_batch_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl BatchCheckpoint {
    pub fn batch(&self, batch_index: usize) -> Option<&CompletedBatch> {
        self.processed_batches
            .iter()
            .find(|done| done.batch_index == batch_index)
    }
}
