use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use contact_pipeline::app::ImportUseCase;
use contact_pipeline::config::Config;
use contact_pipeline::infra::JsonFileOutputAdapter;
use contact_pipeline::pipeline::batch::{BatchProcessingOptions, BatchProcessor};
use contact_pipeline::pipeline::ingestion::{
    CachedContactStore, ContactStore, JsonFileContactStore, RateLimiter,
};
use contact_pipeline::pipeline::processing::normalize::NormalizationService;
use contact_pipeline::pipeline::processing::similarity::FeatureGrouper;

fn write_contacts(dir: &tempfile::TempDir) -> Result<std::path::PathBuf> {
    let contacts = json!([
        {
            "id": "1",
            "firstName": "Jane",
            "lastName": "Doe",
            "email": "Jane.Doe@Acme.io",
            "phone": "(555) 010-0100",
            "company": "Acme",
            "status": "active"
        },
        {
            "id": "2",
            "firstName": "Jane ",
            "lastName": "Doe",
            "email": "jane.doe@acme.io",
            "phone": "555 010 0100",
            "company": "Acme"
        },
        {
            "id": "3",
            "firstName": "Omar",
            "lastName": "Haddad",
            "email": "omar@haddad.dev",
            "status": "inactive"
        },
        {
            "id": "4",
            "name": "Priya",
            "email": "priya@example.com",
            "additionalFields": { "referral": "conference" }
        }
    ]);
    let path = dir.path().join("contacts.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&contacts)?)?;
    Ok(path)
}

#[tokio::test]
async fn test_import_groups_duplicates_and_writes_result() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_contacts(&dir)?;
    let output = dir.path().join("out").join("result.json");

    let store: Arc<dyn ContactStore> = Arc::new(
        CachedContactStore::new(JsonFileContactStore::new(&input), Duration::from_secs(60))
            .with_rate_limiter(RateLimiter::per_minute(600)),
    );
    let processor = BatchProcessor::new(Arc::new(FeatureGrouper::new()))
        .with_normalizer(Arc::new(NormalizationService::new()));
    let use_case = ImportUseCase::new(store, Arc::new(processor), 3)
        .with_source("csv_import")
        .with_output(Arc::new(JsonFileOutputAdapter::new(&output)));

    let (report, result) = use_case.run(BatchProcessingOptions::new()).await?;

    assert_eq!(report.contacts_fetched, 4);
    assert_eq!(report.total_processed, 4);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(report.duplicate_groups, 1);
    assert_eq!(report.similarity_groups, 3);
    assert!(result.contacts.iter().all(|c| c.source == "csv_import"));

    let pair = result.duplicate_groups().next().expect("one duplicate pair");
    let ids: Vec<&str> = pair.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["1", "2"]);

    let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&output)?)?;
    assert_eq!(written["totalProcessed"], 4);
    assert_eq!(written["similarityGroups"].as_array().map(|g| g.len()), Some(3));
    assert_eq!(written["contacts"][3]["additionalFields"]["referral"], "conference");
    Ok(())
}

#[tokio::test]
async fn test_import_honours_configured_batches() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_contacts(&dir)?;
    let config_path = dir.path().join("contact_pipeline.toml");
    std::fs::write(
        &config_path,
        "[batch]\nbatch_size = 1\n\n[store]\npage_size = 2\ncache_ttl_secs = 30\n",
    )?;
    let config = Config::load_from(&config_path)?;

    let store: Arc<dyn ContactStore> = Arc::new(CachedContactStore::new(
        JsonFileContactStore::new(&input),
        config.store.cache_ttl(),
    ));
    let processor = BatchProcessor::new(Arc::new(FeatureGrouper::new()));
    let use_case = ImportUseCase::new(store, Arc::new(processor), config.store.page_size);

    let (report, result) = use_case.run(config.batch_options()).await?;

    // batches of one can never hold a duplicate
    assert_eq!(result.batch_stats.total_batches, 4);
    assert_eq!(report.duplicate_groups, 0);
    assert_eq!(report.similarity_groups, 4);
    Ok(())
}

#[tokio::test]
async fn test_import_from_missing_file_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store: Arc<dyn ContactStore> =
        Arc::new(JsonFileContactStore::new(dir.path().join("absent.json")));
    let processor = BatchProcessor::new(Arc::new(FeatureGrouper::new()));
    let use_case = ImportUseCase::new(store, Arc::new(processor), 10);

    assert!(use_case.run(BatchProcessingOptions::new()).await.is_err());
    Ok(())
}
