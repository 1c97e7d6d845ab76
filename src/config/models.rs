use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Fjall keyspace directory (ledger and jobs)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Largest accepted document, in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_path: default_data_path(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_max_document_bytes() -> usize {
    5 * 1024 * 1024 // 5 MiB
}

/// Pricing and per-job limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BillingConfig {
    /// Credits charged per started thousand tokens
    #[serde(default = "default_rate_per_thousand")]
    pub rate_per_thousand: u64,
    #[serde(default = "default_max_tokens_per_job")]
    pub max_tokens_per_job: u64,
    #[serde(default = "default_max_chunks_per_job")]
    pub max_chunks_per_job: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            rate_per_thousand: default_rate_per_thousand(),
            max_tokens_per_job: default_max_tokens_per_job(),
            max_chunks_per_job: default_max_chunks_per_job(),
        }
    }
}

fn default_rate_per_thousand() -> u64 {
    10
}

fn default_max_tokens_per_job() -> u64 {
    200_000
}

fn default_max_chunks_per_job() -> u32 {
    200
}

/// Chunking and worker pool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_per_job_concurrency")]
    pub per_job_concurrency: usize,
    /// Total attempts per chunk, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_chunk_deadline_ms")]
    pub chunk_deadline_ms: u64,
    /// A job fails once more than this share of its chunks failed
    #[serde(default = "default_failure_threshold_percent")]
    pub failure_threshold_percent: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            worker_concurrency: default_worker_concurrency(),
            per_job_concurrency: default_per_job_concurrency(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            chunk_deadline_ms: default_chunk_deadline_ms(),
            failure_threshold_percent: default_failure_threshold_percent(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    4000
}

fn default_worker_concurrency() -> usize {
    8
}

fn default_per_job_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_chunk_deadline_ms() -> u64 {
    60_000
}

fn default_failure_threshold_percent() -> u32 {
    10
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Filesystem root for the local provider
    #[serde(default = "default_root")]
    pub root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: default_bucket(),
            root: default_root(),
        }
    }
}

fn default_bucket() -> String {
    "linguabox-default".to_string()
}

fn default_root() -> Option<PathBuf> {
    Some(PathBuf::from("data/objects"))
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json_logs: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
