// Batch processing: sequential, pausable batches over a contact list

pub mod pause;
pub mod processor;
pub mod state;

pub use pause::PauseHandle;
pub use processor::{BatchProcessingOptions, BatchProcessor};
pub use state::{
    BatchCheckpoint, BatchProcessingError, BatchProcessingResult, BatchProcessingState,
    BatchProcessingStatus, BatchStats, CompletedBatch, NormalizationSummary,
};
