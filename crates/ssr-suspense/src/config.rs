use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error as ThisError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_SUBSTITUTION_PASSES: usize = 10_000;

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("Invalid render id: {0} (expected digits and dots, ending with a dot)")]
    InvalidRenderId(String),
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("Invalid max substitution passes: {0}")]
    InvalidMaxPasses(String),
    #[error("Invalid debug timing flag: {0}")]
    InvalidDebugTiming(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Prefix of every hydration id produced by the pass. Lets several
    /// independent renders share one document without id collisions.
    pub render_id: String,
    pub timeout_ms: u64,
    pub max_substitution_passes: usize,
    pub debug_timing: bool,
    /// Nonce attached to emitted hydration scripts.
    pub nonce: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_id: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_substitution_passes: DEFAULT_MAX_SUBSTITUTION_PASSES,
            debug_timing: false,
            nonce: None,
        }
    }
}

impl RenderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(render_id) = lookup("SSR_SUSPENSE_RENDER_ID") {
            config.render_id = render_id;
        }

        if let Some(timeout_str) = lookup("SSR_SUSPENSE_TIMEOUT_MS") {
            config.timeout_ms =
                timeout_str.parse().map_err(|_| ConfigError::InvalidTimeout(timeout_str))?;
        }

        if let Some(passes_str) = lookup("SSR_SUSPENSE_MAX_PASSES") {
            config.max_substitution_passes =
                passes_str.parse().map_err(|_| ConfigError::InvalidMaxPasses(passes_str))?;
        }

        if let Some(flag) = lookup("SSR_SUSPENSE_DEBUG_TIMING") {
            config.debug_timing = match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidDebugTiming(flag)),
            };
        }

        if let Some(nonce) = lookup("SSR_SUSPENSE_NONCE") {
            config.nonce = Some(nonce).filter(|n| !n.is_empty());
        }

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let id_chars_valid = self.render_id.chars().all(|c| c.is_ascii_digit() || c == '.');
        if !id_chars_valid || !(self.render_id.is_empty() || self.render_id.ends_with('.')) {
            return Err(ConfigError::InvalidRenderId(self.render_id.clone()));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("timeout cannot be 0".to_string()));
        }

        if self.max_substitution_passes == 0 {
            return Err(ConfigError::InvalidMaxPasses("must allow at least one pass".to_string()));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_render_id(mut self, render_id: impl Into<String>) -> Self {
        self.render_id = render_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: FxHashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_render_config_default() {
        let config = RenderConfig::default();

        assert_eq!(config.render_id, "");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_substitution_passes, 10_000);
        assert!(!config.debug_timing);
        assert!(config.nonce.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_vars_overrides() {
        let config = RenderConfig::from_vars(vars(&[
            ("SSR_SUSPENSE_RENDER_ID", "3."),
            ("SSR_SUSPENSE_TIMEOUT_MS", "250"),
            ("SSR_SUSPENSE_MAX_PASSES", "12"),
            ("SSR_SUSPENSE_DEBUG_TIMING", "on"),
            ("SSR_SUSPENSE_NONCE", "abc123"),
        ]))
        .unwrap();

        assert_eq!(config.render_id, "3.");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.max_substitution_passes, 12);
        assert!(config.debug_timing);
        assert_eq!(config.nonce.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_from_vars_rejects_malformed_values() {
        let err = RenderConfig::from_vars(vars(&[("SSR_SUSPENSE_TIMEOUT_MS", "soon")]));
        assert!(matches!(err, Err(ConfigError::InvalidTimeout(v)) if v == "soon"));

        let err = RenderConfig::from_vars(vars(&[("SSR_SUSPENSE_DEBUG_TIMING", "maybe")]));
        assert!(matches!(err, Err(ConfigError::InvalidDebugTiming(_))));

        let err = RenderConfig::from_vars(vars(&[("SSR_SUSPENSE_RENDER_ID", "app")]));
        assert!(matches!(err, Err(ConfigError::InvalidRenderId(_))));
    }

    #[test]
    fn test_render_id_must_end_with_dot() {
        assert!(RenderConfig::default().with_render_id("1.2.").validate().is_ok());
        assert!(RenderConfig::default().with_render_id("1.2").validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RenderConfig { timeout_ms: 0, ..RenderConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }
}
