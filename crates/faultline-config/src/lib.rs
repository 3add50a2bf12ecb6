use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "faultline.toml";
pub const DEFAULT_GIT_BINARY: &str = "git";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_K_HOPS: usize = 3;
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.10;
pub const MAX_RECOMMENDED_K_HOPS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FaultlineConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub random_pool: RandomPoolConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_k_hops")]
    pub k_hops: usize,
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    #[serde(default = "default_during_window_days")]
    pub during_window_days: u32,
    #[serde(default)]
    pub quotas: QuotaConfig,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            k_hops: default_k_hops(),
            overlap_threshold: default_overlap_threshold(),
            during_window_days: default_during_window_days(),
            quotas: QuotaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_temporal_quota")]
    pub safe_before: usize,
    #[serde(default = "default_temporal_quota")]
    pub safe_after: usize,
    #[serde(default = "default_control_quota")]
    pub safe_during: usize,
    #[serde(default = "default_control_quota")]
    pub safe_random: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            safe_before: default_temporal_quota(),
            safe_after: default_temporal_quota(),
            safe_during: default_control_quota(),
            safe_random: default_control_quota(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_size")]
    pub ancestors: usize,
    #[serde(default = "default_window_size")]
    pub descendants: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            ancestors: default_window_size(),
            descendants: default_window_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    #[serde(default = "default_github_token_env")]
    pub github_token_env: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_max_files_per_commit")]
    pub max_files_per_commit: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_content_concurrency")]
    pub content_concurrency: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            git_binary: default_git_binary(),
            github_api_base: default_github_api_base(),
            github_token_env: default_github_token_env(),
            command_timeout_secs: default_command_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_files_per_commit: default_max_files_per_commit(),
            max_file_bytes: default_max_file_bytes(),
            content_concurrency: default_content_concurrency(),
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_run_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_catastrophe_timeout_secs")]
    pub catastrophe_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_run_concurrency(),
            catastrophe_timeout_secs: default_catastrophe_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomPoolConfig {
    #[serde(default = "default_pool_per_repository")]
    pub per_repository: usize,
    #[serde(default)]
    pub repositories: Vec<PoolRepository>,
}

impl Default for RandomPoolConfig {
    fn default() -> Self {
        Self {
            per_repository: default_pool_per_repository(),
            repositories: Vec::new(),
        }
    }
}

/// An unrelated repository sampled for SAFE_RANDOM controls. Without a
/// pivot the remote HEAD is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRepository {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(CONFIG_FILE_NAME)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<FaultlineConfig, ConfigError> {
    let raw = fs::read_to_string(path)?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<FaultlineConfig, ConfigError> {
    let parsed: FaultlineConfig = toml::from_str(raw)?;
    Ok(normalize_config(parsed))
}

/// Loads `faultline.toml` from `workspace_root`, falling back to defaults when
/// the file does not exist.
pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<FaultlineConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(FaultlineConfig::default());
    }
    load_config(path)
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<FaultlineConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    fs::create_dir_all(workspace_root)?;
    let config = FaultlineConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

/// Non-fatal findings about a loaded config. Nothing here prevents a run.
pub fn validate_config(config: &FaultlineConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let sampling = &config.sampling;

    if !(sampling.overlap_threshold > 0.0 && sampling.overlap_threshold < 1.0) {
        warnings.push(ConfigWarning {
            code: "threshold_out_of_range",
            message: format!(
                "sampling.overlap_threshold = {} is outside (0, 1); one of the component buckets can never fill",
                sampling.overlap_threshold
            ),
        });
    }

    let quotas = [
        ("safe_before", sampling.quotas.safe_before),
        ("safe_after", sampling.quotas.safe_after),
        ("safe_during", sampling.quotas.safe_during),
        ("safe_random", sampling.quotas.safe_random),
    ];
    for (name, quota) in quotas {
        if quota == 0 {
            warnings.push(ConfigWarning {
                code: "zero_quota",
                message: format!("sampling.quotas.{name} is 0; that bucket will always be empty"),
            });
        }
    }

    if config.window.ancestors == 0 {
        warnings.push(ConfigWarning {
            code: "zero_window",
            message: "window.ancestors is 0; SAFE_BEFORE has no candidates".to_owned(),
        });
    }
    if config.window.descendants == 0 {
        warnings.push(ConfigWarning {
            code: "zero_window",
            message: "window.descendants is 0; SAFE_AFTER has no candidates".to_owned(),
        });
    }

    if sampling.k_hops > MAX_RECOMMENDED_K_HOPS {
        warnings.push(ConfigWarning {
            code: "k_hops_large",
            message: format!(
                "sampling.k_hops = {} exceeds {MAX_RECOMMENDED_K_HOPS}; components approach the whole repository",
                sampling.k_hops
            ),
        });
    }

    if config.sampling.quotas.safe_random > 0 && config.random_pool.repositories.is_empty() {
        warnings.push(ConfigWarning {
            code: "empty_random_pool",
            message: "random_pool.repositories is empty; SAFE_RANDOM will be partial".to_owned(),
        });
    }

    warnings
}

fn default_k_hops() -> usize {
    DEFAULT_K_HOPS
}

fn default_overlap_threshold() -> f64 {
    DEFAULT_OVERLAP_THRESHOLD
}

fn default_during_window_days() -> u32 {
    30
}

fn default_temporal_quota() -> usize {
    20
}

fn default_control_quota() -> usize {
    10
}

fn default_window_size() -> usize {
    100
}

fn default_git_binary() -> String {
    DEFAULT_GIT_BINARY.to_owned()
}

fn default_github_api_base() -> String {
    DEFAULT_GITHUB_API_BASE.to_owned()
}

fn default_github_token_env() -> String {
    DEFAULT_GITHUB_TOKEN_ENV.to_owned()
}

fn default_command_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_max_files_per_commit() -> usize {
    5
}

fn default_max_file_bytes() -> u64 {
    512 * 1024
}

fn default_content_concurrency() -> usize {
    2
}

fn default_run_concurrency() -> usize {
    4
}

fn default_catastrophe_timeout_secs() -> u64 {
    900
}

fn default_pool_per_repository() -> usize {
    20
}

fn normalize_required(input: &str, fallback: fn() -> String) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_owned()
    }
}

fn normalize_config(mut config: FaultlineConfig) -> FaultlineConfig {
    config.fetch.git_binary = normalize_required(&config.fetch.git_binary, default_git_binary);
    config.fetch.github_api_base = normalize_required(
        &config.fetch.github_api_base,
        default_github_api_base,
    )
    .trim_end_matches('/')
    .to_owned();
    config.fetch.github_token_env =
        normalize_required(&config.fetch.github_token_env, default_github_token_env);

    config.fetch.content_concurrency = config.fetch.content_concurrency.max(1);
    config.fetch.command_timeout_secs = config.fetch.command_timeout_secs.max(1);
    config.fetch.backoff_max_ms = config.fetch.backoff_max_ms.max(config.fetch.backoff_base_ms);
    config.run.concurrency = config.run.concurrency.max(1);

    for repository in &mut config.random_pool.repositories {
        repository.url = repository.url.trim().to_owned();
        repository.pivot = repository
            .pivot
            .take()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
    }
    config
        .random_pool
        .repositories
        .retain(|repository| !repository.url.is_empty());

    config
}
