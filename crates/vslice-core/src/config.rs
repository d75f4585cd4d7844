//! Pipeline configuration
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```toml
//! completion_threshold = 0.85
//! max_retries = 3
//! execution_mode = "real"
//!
//! [commands]
//! test = "npm test"
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How slice builds reach the outside world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Real collaborators when both are wired, scripted otherwise
    #[default]
    Auto,
    /// Real collaborators; missing wiring is a configuration error
    Real,
    /// Deterministic scripted fallback
    Scripted,
}

/// Confidence deltas applied by the build loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Per generated file
    pub per_file: f64,
    /// Compile check passed
    pub build_ok: f64,
    /// Test suite passed
    pub tests_passed: f64,
    /// Heal attempt that did not fix the failure (negative)
    pub failed_retry: f64,
    /// Live verification passed
    pub live_verified: f64,
    /// Live verification partially passed
    pub live_partial: f64,
    /// Final score lifted to `threshold + margin` when tests pass
    pub completion_margin: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            per_file: 0.02,
            build_ok: 0.1,
            tests_passed: 0.3,
            failed_retry: -0.05,
            live_verified: 0.1,
            live_partial: 0.03,
            completion_margin: 0.05,
        }
    }
}

/// Commands run inside the sandbox workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxCommands {
    /// Compile / type check
    pub build: String,
    /// Test suite
    pub test: String,
    /// Dev server for live verification
    pub start: Option<String>,
    /// End-to-end checks for live verification
    pub e2e: Option<String>,
    /// Port the dev server listens on
    pub preview_port: u16,
}

impl Default for SandboxCommands {
    fn default() -> Self {
        Self {
            build: "npm run build".to_string(),
            test: "npm test".to_string(),
            start: None,
            e2e: None,
            preview_port: 3000,
        }
    }
}

/// Logging output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Score at which a slice counts as complete
    pub completion_threshold: f64,
    /// Heal attempts per slice build
    pub max_retries: u32,
    /// Slices built at the same time
    pub max_concurrent_slices: usize,
    /// Delay after each emitted event, for UI pacing
    pub event_pacing_ms: u64,
    /// Append attempts before an event failure is fatal
    pub append_attempts: u32,
    /// Time budget per analysis stage
    pub stage_timeout_secs: Option<u64>,
    /// Collaborator selection
    pub execution_mode: ExecutionMode,
    /// Run live verification after tests pass
    pub live_verification: bool,
    /// Confidence deltas
    pub weights: ConfidenceWeights,
    /// Sandbox commands
    pub commands: SandboxCommands,
    /// Logging output
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            completion_threshold: 0.85,
            max_retries: 3,
            max_concurrent_slices: 1,
            event_pacing_ms: 0,
            append_attempts: 3,
            stage_timeout_secs: None,
            execution_mode: ExecutionMode::Auto,
            live_verification: false,
            weights: ConfidenceWeights::default(),
            commands: SandboxCommands::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// [`PipelineError::Config`] for syntax errors or invalid values.
    pub fn from_toml_str(source: &str) -> Result<Self, PipelineError> {
        let config: Self =
            toml::from_str(source).map_err(|err| PipelineError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// [`PipelineError::Config`] if the file is unreadable or invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| PipelineError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// [`PipelineError::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.completion_threshold) {
            return Err(PipelineError::Config(format!(
                "completion_threshold must be in [0, 1], got {}",
                self.completion_threshold
            )));
        }
        if !unit.contains(&self.weights.completion_margin) {
            return Err(PipelineError::Config(format!(
                "weights.completion_margin must be in [0, 1], got {}",
                self.weights.completion_margin
            )));
        }
        if self.max_retries == 0 {
            return Err(PipelineError::Config("max_retries must be at least 1".into()));
        }
        if self.max_concurrent_slices == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_slices must be at least 1".into(),
            ));
        }
        if self.append_attempts == 0 {
            return Err(PipelineError::Config("append_attempts must be at least 1".into()));
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(PipelineError::Config("stage_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Event pacing as a duration
    #[inline]
    #[must_use]
    pub fn event_pacing(&self) -> Duration {
        Duration::from_millis(self.event_pacing_ms)
    }

    /// Stage time budget as a duration
    #[inline]
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    /// With completion threshold
    #[inline]
    #[must_use]
    pub fn with_completion_threshold(mut self, threshold: f64) -> Self {
        self.completion_threshold = threshold;
        self
    }

    /// With max heal attempts
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// With max concurrent slice builds
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_slices(mut self, max: usize) -> Self {
        self.max_concurrent_slices = max;
        self
    }

    /// With per-stage timeout
    #[inline]
    #[must_use]
    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = Some(secs);
        self
    }

    /// With execution mode
    #[inline]
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// With live verification enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_live_verification(mut self, enabled: bool) -> Self {
        self.live_verification = enabled;
        self
    }

    /// With sandbox commands
    #[inline]
    #[must_use]
    pub fn with_commands(mut self, commands: SandboxCommands) -> Self {
        self.commands = commands;
        self
    }

    /// With confidence weights
    #[inline]
    #[must_use]
    pub fn with_weights(mut self, weights: ConfidenceWeights) -> Self {
        self.weights = weights;
        self
    }
}
