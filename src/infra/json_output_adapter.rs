use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::app::ports::ImportOutputPort;
use crate::pipeline::batch::BatchProcessingResult;

/// File-based implementation of ImportOutputPort.
/// Writes the whole run result as pretty-printed JSON.
pub struct JsonFileOutputAdapter {
    path: PathBuf,
}

impl JsonFileOutputAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ImportOutputPort for JsonFileOutputAdapter {
    async fn write_result(&self, result: &BatchProcessingResult) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(result)?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        info!("Wrote run {} to {}", result.run_id, self.path.display());
        Ok(())
    }
}
