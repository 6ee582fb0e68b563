// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Configuration loading for reassembly and cache analysis thresholds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GeneralConfig {
    /// Path to write the JSON report to; stdout when unset.
    #[serde(default)]
    pub report: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReassemblyConfig {
    /// Share of a declared Content-Length that must be captured for the
    /// content to be extractable (default: 0.9)
    #[serde(default = "default_completeness_threshold")]
    pub completeness_threshold: f64,

    /// Upper bound on a message's start line plus header section
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
}

fn default_completeness_threshold() -> f64 {
    0.9
}

fn default_max_header_bytes() -> usize {
    64 * 1024
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            completeness_threshold: default_completeness_threshold(),
            max_header_bytes: default_max_header_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Freshness granted from the Date header when no explicit lifetime is
    /// given (default: 86400 = one day)
    #[serde(default = "default_heuristic_freshness")]
    pub heuristic_freshness_secs: i64,

    #[serde(default = "default_cacheable_methods")]
    pub cacheable_methods: Vec<String>,
}

fn default_heuristic_freshness() -> i64 {
    86_400
}

fn default_cacheable_methods() -> Vec<String> {
    vec!["GET".to_string(), "PUT".to_string(), "POST".to_string()]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            heuristic_freshness_secs: default_heuristic_freshness(),
            cacheable_methods: default_cacheable_methods(),
        }
    }
}

impl CacheConfig {
    pub fn is_cacheable_method(&self, method: &str) -> bool {
        self.cacheable_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub reassembly: ReassemblyConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file. Every table and key is optional:
    ///
    /// [reassembly]
    /// completeness_threshold = 0.9
    ///
    /// [cache]
    /// heuristic_freshness_secs = 86400
    /// cacheable_methods = ["GET"]
    pub async fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let s = tokio::fs::read_to_string(path.as_ref()).await?;
        let cfg: Self = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let t = self.reassembly.completeness_threshold;
        if !(t > 0.0 && t <= 1.0) {
            anyhow::bail!("reassembly.completeness_threshold must be in (0, 1], got {}", t);
        }
        if self.reassembly.max_header_bytes == 0 {
            anyhow::bail!("reassembly.max_header_bytes must be greater than zero");
        }
        if self.cache.heuristic_freshness_secs < 0 {
            anyhow::bail!(
                "cache.heuristic_freshness_secs must not be negative, got {}",
                self.cache.heuristic_freshness_secs
            );
        }
        if self.cache.cacheable_methods.is_empty() {
            anyhow::bail!("cache.cacheable_methods cannot be empty");
        }
        Ok(())
    }
}
