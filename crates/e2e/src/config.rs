//! Harness configuration: target UI identities, wait budgets, runner and browser settings

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;
use crate::runner::RunnerConfig;

/// Identity of the service under test and the controls the driver talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Page hosting the transliterator
    pub url: String,

    /// Placeholder text of the input control
    pub input_placeholder: String,

    /// CSS selector of the rendered output container
    pub output_selector: String,

    /// Key pressed after injection to finalize the last word
    pub trigger_key: String,

    /// Chord selecting the whole input before deletion
    pub select_all_chord: String,

    pub delete_key: String,

    /// Event dispatched after setting text so the page picks up the change
    pub input_event: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "https://www.swifttranslator.com/".to_string(),
            input_placeholder: "Input Your Singlish Text Here.".to_string(),
            output_selector: "div.whitespace-pre-wrap.w-full.h-80".to_string(),
            trigger_key: "Space".to_string(),
            select_all_chord: "Control+A".to_string(),
            delete_key: "Backspace".to_string(),
            input_event: "input".to_string(),
        }
    }
}

/// Bounded polling for a condition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl PollPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 15_000,
        }
    }
}

/// Bounded wait for a value to stop changing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    /// Pause before the first read
    pub initial_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// Consecutive identical non-empty reads required
    pub stable_reads: usize,
    /// Hard upper bound; exceeding it is a timeout failure
    pub timeout_ms: u64,
}

impl SettlePolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            poll_interval_ms: 250,
            stable_reads: 3,
            timeout_ms: 10_000,
        }
    }
}

/// Synchronization budgets for the driver and the presence check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// After navigation, until the input control is usable
    pub readiness: PollPolicy,

    /// After the trigger key, until the output stops changing
    pub output: SettlePolicy,

    /// Event-based page readiness used by the presence check
    pub page_ready_timeout_ms: u64,

    /// How long a live run waits for the service to answer at all
    pub preflight_timeout_ms: u64,
}

impl WaitConfig {
    pub fn preflight_timeout(&self) -> Duration {
        Duration::from_millis(self.preflight_timeout_ms)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            readiness: PollPolicy::default(),
            output: SettlePolicy::default(),
            page_ready_timeout_ms: 30_000,
            preflight_timeout_ms: 60_000,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub target: TargetConfig,
    pub waits: WaitConfig,
    pub runner: RunnerConfig,
    pub playwright: PlaywrightConfig,
}

impl HarnessConfig {
    /// Load configuration from a TOML file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> E2eResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.target.url.trim().is_empty() {
            return Err(E2eError::Config("target.url must not be empty".into()));
        }
        if self.target.input_placeholder.is_empty() || self.target.output_selector.is_empty() {
            return Err(E2eError::Config("target locators must not be empty".into()));
        }
        if self.waits.output.stable_reads == 0 {
            return Err(E2eError::Config("waits.output.stable_reads must be at least 1".into()));
        }
        if self.waits.readiness.timeout_ms == 0 || self.waits.output.timeout_ms == 0 {
            return Err(E2eError::Config("wait timeouts must be positive".into()));
        }
        if self.runner.concurrency == 0 {
            return Err(E2eError::Config("runner.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
