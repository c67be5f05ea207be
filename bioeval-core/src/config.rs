use crate::gallery::EnrollmentPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Immutable parameter set for one evaluation run. Captured once before the
/// run starts and threaded through every stage; nothing consults mutable
/// global state mid-computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalParams {
    /// Opaque algorithm name, resolved to a matcher by the registry
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Re-enroll even when a cached gallery file exists
    #[serde(default)]
    pub force_enrollment: bool,

    /// Base path for resolving relative sigset source references
    #[serde(default = "default_comparison_input_path")]
    pub comparison_input_path: PathBuf,

    /// The fixed false-accept-rate operating point for TAR reporting
    #[serde(default = "default_target_far")]
    pub target_far: f64,

    /// Exclude same-source genuine pairs from both score populations
    #[serde(default = "default_same_source_exclusion")]
    pub same_source_exclusion: bool,

    /// Operating threshold for the accuracy summary, if any
    #[serde(default)]
    pub decision_threshold: Option<f64>,

    #[serde(default)]
    pub enrollment_policy: EnrollmentPolicy,

    /// Mark diagonal cells non-comparable in self-comparison runs
    #[serde(default)]
    pub exclude_self: bool,
}

fn default_algorithm() -> String {
    "cosine".to_string()
}

fn default_comparison_input_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_target_far() -> f64 {
    0.001
}

fn default_same_source_exclusion() -> bool {
    true
}

impl EvalParams {
    /// Load parameters with fallback chain:
    /// 1. /etc/bioeval/bioeval.toml (system-wide)
    /// 2. ~/.config/bioeval/bioeval.toml (user)
    /// 3. Compiled defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(params) = Self::load_from_path("/etc/bioeval/bioeval.toml") {
            params.validate()?;
            return Ok(params);
        }

        if let Some(home) = std::env::var_os("HOME") {
            let user_config = PathBuf::from(home)
                .join(".config")
                .join("bioeval")
                .join("bioeval.toml");
            if let Ok(params) = Self::load_from_path(&user_config) {
                params.validate()?;
                return Ok(params);
            }
        }

        let params = Self::default();
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a specific file path
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let params: EvalParams = toml::from_str(&contents)?;
        Ok(params)
    }

    /// Validate parameter values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.algorithm.is_empty() {
            return Err(ConfigError::Validation(
                "Algorithm name cannot be empty".to_string(),
            ));
        }

        if !(self.target_far > 0.0 && self.target_far <= 1.0) {
            return Err(ConfigError::Validation(
                "Target FAR must be in (0, 1]".to_string(),
            ));
        }

        if let Some(threshold) = self.decision_threshold {
            if !threshold.is_finite() {
                return Err(ConfigError::Validation(
                    "Decision threshold must be finite".to_string(),
                ));
            }
        }

        if self.comparison_input_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Comparison input path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for EvalParams {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            force_enrollment: false,
            comparison_input_path: default_comparison_input_path(),
            target_far: default_target_far(),
            same_source_exclusion: default_same_source_exclusion(),
            decision_threshold: None,
            enrollment_policy: EnrollmentPolicy::Abort,
            exclude_self: false,
        }
    }
}
