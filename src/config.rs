//! Tunable thresholds and scoring weights
//!
//! The defaults reflect observed fragility on real pages; every value can be
//! overridden from a JSON file. Missing fields keep their default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Per-strategy base scores and adjustments used by the robustness scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub stable_id: i32,
    pub accessibility_attribute: i32,
    pub css_path: i32,
    pub text_content: i32,
    pub relative_position: i32,
    pub xpath: i32,
    /// Bonus when the underlying value has no digits
    pub no_digit_bonus: i32,
    /// Penalty when the chain is longer than `max_chain_length`
    pub deep_chain_penalty: i32,
    pub max_chain_length: usize,
    /// Penalty for text-content locators over the verbosity threshold
    pub verbose_text_penalty: i32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            stable_id: 95,
            accessibility_attribute: 85,
            css_path: 60,
            text_content: 55,
            relative_position: 45,
            xpath: 30,
            no_digit_bonus: 10,
            deep_chain_penalty: 15,
            max_chain_length: 4,
            verbose_text_penalty: 20,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringWeights,
    /// Minimum description match score for a natural-language target
    pub min_description_confidence: u32,
    /// Text-content locators are only generated below this many characters
    pub text_length_limit: usize,
    /// Text longer than this is penalised as verbose
    pub verbose_text_threshold: usize,
    /// Scores at or above this are considered robust
    pub robust_threshold: u8,
    /// Penalty applied when an evaluated locator matches several elements
    pub ambiguity_penalty: i32,
    pub poll_interval_ms: u64,
    pub default_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringWeights::default(),
            min_description_confidence: 10,
            text_length_limit: 50,
            verbose_text_threshold: 30,
            robust_threshold: 70,
            ambiguity_penalty: 20,
            poll_interval_ms: 100,
            default_wait_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Load `~/.locprobe/config.json` if it exists, defaults otherwise
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".locprobe").join("config.json"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
