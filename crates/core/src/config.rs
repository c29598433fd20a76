use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tunables of the pipeline. `from_env` overlays `VITRINE_*` variables on the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of loader jobs in flight for one batch.
    pub max_in_flight: usize,
    /// Delay between a viewport change and the visibility check.
    pub debounce_ms: u64,
    /// Slack above the viewport top still counted as visible (px).
    pub slack_above: f64,
    /// Slack below the viewport bottom still counted as visible (px).
    pub slack_below: f64,
    /// Attribution value meaning "no attribution".
    pub no_attribution: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 20,
            debounce_ms: 100,
            slack_above: 100.0,
            slack_below: 200.0,
            no_attribution: "plent".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_parse::<usize>("VITRINE_MAX_JOBS") {
            cfg.max_in_flight = n.max(1);
        }
        if let Some(ms) = env_parse::<u64>("VITRINE_DEBOUNCE_MS") {
            cfg.debounce_ms = ms;
        }
        if let Ok(s) = std::env::var("VITRINE_NO_ATTRIBUTION") {
            if !s.is_empty() { cfg.no_attribution = s; }
        }
        cfg
    }

    pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable env value");
            None
        }
    }
}
