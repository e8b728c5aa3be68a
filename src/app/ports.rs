use async_trait::async_trait;

use crate::pipeline::batch::BatchProcessingResult;

/// Destination for the outcome of an import run
#[async_trait]
pub trait ImportOutputPort: Send + Sync {
    async fn write_result(&self, result: &BatchProcessingResult) -> anyhow::Result<()>;
}
