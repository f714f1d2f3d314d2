use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration structure for rpg-forge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Orchestration and retry settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Majority-vote diagnosis settings
    #[serde(default)]
    pub diagnosis: DiagnosisConfig,

    /// LLM gateway settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Sandbox executor settings
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Orchestration and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    /// Retry budget per node
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Log progress every N nodes
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Save a checkpoint every N nodes
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Abort the run on the first node that exhausts its retries
    #[serde(default)]
    pub fail_fast: bool,

    /// Only generate leaf nodes
    #[serde(default = "default_true")]
    pub leaf_only: bool,

    /// Where generation state is checkpointed
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_progress_interval() -> usize {
    10
}

const fn default_checkpoint_interval() -> usize {
    5
}

const fn default_true() -> bool {
    true
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(".rpg-forge/checkpoint.json")
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            progress_interval: default_progress_interval(),
            checkpoint_interval: default_checkpoint_interval(),
            fail_fast: false,
            leaf_only: true,
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

/// Majority-vote diagnosis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DiagnosisConfig {
    /// Number of independent classification rounds
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Temperature of the first round
    #[serde(default = "default_base_temperature")]
    pub base_temperature: f32,

    /// Temperature added per subsequent round
    #[serde(default = "default_temperature_step")]
    pub temperature_step: f32,
}

const fn default_rounds() -> u32 {
    5
}

const fn default_base_temperature() -> f32 {
    0.3
}

const fn default_temperature_step() -> f32 {
    0.1
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            base_temperature: default_base_temperature(),
            temperature_step: default_temperature_step(),
        }
    }
}

/// LLM gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for generation and diagnosis
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (falls back to `ANTHROPIC_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Retries for transient HTTP failures
    #[serde(default = "default_max_http_retries")]
    pub max_http_retries: u32,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_llm_timeout_secs() -> u64 {
    300
}

const fn default_requests_per_second() -> u32 {
    2
}

const fn default_max_http_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            max_http_retries: default_max_http_retries(),
        }
    }
}

impl LlmConfig {
    /// Get API key from config or environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }
}

/// Sandbox executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    /// Program that runs the tests
    #[serde(default = "default_sandbox_program")]
    pub program: String,

    /// Arguments passed to the program
    #[serde(default = "default_sandbox_args")]
    pub args: Vec<String>,

    /// Per-execution timeout in seconds
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,

    /// File name the implementation is written to
    #[serde(default = "default_implementation_file")]
    pub implementation_file: String,

    /// File name the tests are written to
    #[serde(default = "default_test_file")]
    pub test_file: String,
}

fn default_sandbox_program() -> String {
    "python".to_string()
}

fn default_sandbox_args() -> Vec<String> {
    vec!["-m".to_string(), "pytest".to_string(), "-q".to_string()]
}

const fn default_sandbox_timeout_secs() -> u64 {
    120
}

fn default_implementation_file() -> String {
    "implementation.py".to_string()
}

fn default_test_file() -> String {
    "test_implementation.py".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: default_sandbox_program(),
            args: default_sandbox_args(),
            timeout_secs: default_sandbox_timeout_secs(),
            implementation_file: default_implementation_file(),
            test_file: default_test_file(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for rolling log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}
