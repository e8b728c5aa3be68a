// Contact pipeline: ingestion, processing, and batch orchestration

pub mod batch;
pub mod ingestion;
pub mod processing;

// Re-export key types from each stage
pub use batch::{BatchProcessingOptions, BatchProcessor};
pub use processing::normalize::NormalizationService;
pub use processing::similarity::{FeatureGrouper, SimilarityGrouper};
