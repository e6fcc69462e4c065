// src/config.rs

use std::path::PathBuf;
use std::time::Duration;

/// Spreadsheet read at startup.
pub const INPUT_PATH: &str = "entrada.xlsx";
/// Spreadsheet written once the whole batch has been looked up.
pub const OUTPUT_PATH: &str = "saida.xlsx";

/// Public CNPJ registry; the 14-digit identifier is appended as the last path segment.
pub const REGISTRY_BASE_URL: &str = "https://www.receitaws.com.br/v1/cnpj/";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub const BACKOFF_BASE: Duration = Duration::from_secs(3);
pub const BACKOFF_STEP: Duration = Duration::from_secs(2);
pub const BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Fixed gap between two consecutive lookups, independent of the retry backoff.
pub const PACING_DELAY: Duration = Duration::from_secs(3);

/// Linear, capped backoff: `base`, `base + step`, ... up to `max`. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: BACKOFF_BASE,
            step: BACKOFF_STEP,
            max: BACKOFF_MAX,
        }
    }
}

/// Everything the lookup client needs to talk to the registry.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
    /// `None` retries forever, which is the production behavior.
    pub max_attempts: Option<u32>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: REGISTRY_BASE_URL.to_string(),
            timeout: REQUEST_TIMEOUT,
            backoff: BackoffPolicy::default(),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            input: PathBuf::from(INPUT_PATH),
            output: PathBuf::from(OUTPUT_PATH),
        }
    }
}
