/// Shared defaults so the CLI, config loader and processors agree on them

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;

pub const DEFAULT_CONFIG_PATH: &str = "contact_pipeline.toml";
pub const CONFIG_PATH_ENV: &str = "CONTACT_PIPELINE_CONFIG";
pub const METRICS_ADDR_ENV: &str = "CONTACT_PIPELINE_METRICS_ADDR";

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_PREFIX: &str = "contact_pipeline.log";

/// Key under `additionalFields` where merge history is recorded
pub const MERGE_HISTORY_KEY: &str = "mergeHistory";

/// Stage labels reported through batch callbacks
pub const STAGE_NORMALIZING: &str = "normalizing";
pub const STAGE_PROCESSING: &str = "processing";

/// Default source tag for contacts that don't carry one
pub const DEFAULT_SOURCE: &str = "manual";
