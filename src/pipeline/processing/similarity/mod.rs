// Similarity grouping: partition a batch of contacts into duplicate clusters

pub mod features;
pub mod grouper;
pub mod merge;

use crate::domain::NormalizedContact;

pub use features::ContactFeatures;
pub use grouper::{detect_duplicates, group_similar_contacts, FeatureGrouper, ScoredPair};
pub use merge::{merge_contacts, MergePlan};

/// Partitions a batch into groups of contacts judged to be the same person.
///
/// Implementations must return a partition of `batch`: every input contact in
/// exactly one group, singleton groups meaning "no duplicate in this batch".
pub trait SimilarityGrouper: Send + Sync {
    fn group(
        &self,
        batch: &[NormalizedContact],
        threshold: f64,
    ) -> anyhow::Result<Vec<Vec<NormalizedContact>>>;

    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> SimilarityGrouper for F
where
    F: Fn(&[NormalizedContact], f64) -> anyhow::Result<Vec<Vec<NormalizedContact>>> + Send + Sync,
{
    fn group(
        &self,
        batch: &[NormalizedContact],
        threshold: f64,
    ) -> anyhow::Result<Vec<Vec<NormalizedContact>>> {
        self(batch, threshold)
    }
}
