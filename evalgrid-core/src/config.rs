// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for column derivation and cell resolution
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! view = "auto"
//!
//! [widths]
//! annotation = 180
//!
//! [[static_metrics]]
//! key = "attributes.ag.metrics.costs.cumulative.total"
//! label = "Cost"
//! metric_type = "number"
//! scope = "auto"
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of runs kept in the scenario-step cache
pub const DEFAULT_MAX_RUNS: u64 = 16;

/// Default number of scenarios cached per run
pub const DEFAULT_MAX_SCENARIOS_PER_RUN: u64 = 512;

/// Which table flavour is being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableView {
    /// Human evaluation view, carries the sticky `action` column
    #[default]
    Human,
    /// Automatic evaluation view
    Auto,
}

/// Which static metric group a metric column belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricScope {
    Auto,
    Human,
}

/// A metric column declared independently of any run mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMetricSpec {
    /// Metric key as it appears in run-level metric stats
    pub key: String,

    /// Column header
    pub label: String,

    /// Declared value type ("number", "boolean", "string", ...)
    #[serde(default = "default_metric_type")]
    pub metric_type: String,

    pub scope: MetricScope,
}

impl StaticMetricSpec {
    pub fn new(key: &str, label: &str, metric_type: &str, scope: MetricScope) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            metric_type: metric_type.to_string(),
            scope,
        }
    }
}

fn default_metric_type() -> String {
    "number".to_string()
}

/// Width hints in pixels, handed to the rendering layer as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnWidths {
    pub index: u32,
    pub status: u32,
    pub action: u32,
    pub input: u32,
    pub invocation: u32,
    pub annotation: u32,
    pub metric: u32,
}

impl Default for ColumnWidths {
    fn default() -> Self {
        Self {
            index: 72,
            status: 112,
            action: 120,
            input: 220,
            invocation: 260,
            annotation: 160,
            metric: 140,
        }
    }
}

/// Bounds for the scenario-step cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of runs with cached scenario steps
    pub max_runs: u64,

    /// Maximum number of cached scenarios per run
    pub max_scenarios_per_run: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_runs: DEFAULT_MAX_RUNS,
            max_scenarios_per_run: DEFAULT_MAX_SCENARIOS_PER_RUN,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub view: TableView,
    pub widths: ColumnWidths,
    pub static_metrics: Vec<StaticMetricSpec>,
    pub cache: CacheConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            view: TableView::default(),
            widths: ColumnWidths::default(),
            static_metrics: default_static_metrics(),
            cache: CacheConfig::default(),
        }
    }
}

/// Invocation metrics every run reports, regardless of its mappings
pub fn default_static_metrics() -> Vec<StaticMetricSpec> {
    vec![
        StaticMetricSpec::new(
            "attributes.ag.metrics.costs.cumulative.total",
            "Cost",
            "number",
            MetricScope::Auto,
        ),
        StaticMetricSpec::new(
            "attributes.ag.metrics.duration.cumulative",
            "Duration",
            "number",
            MetricScope::Auto,
        ),
        StaticMetricSpec::new(
            "attributes.ag.metrics.tokens.cumulative.total",
            "Tokens",
            "number",
            MetricScope::Auto,
        ),
    ]
}

impl GridConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            static_metrics = config.static_metrics.len(),
            "loaded grid config"
        );
        Ok(config)
    }

    /// Config without statically declared metric columns
    pub fn without_static_metrics() -> Self {
        Self {
            static_metrics: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_view(mut self, view: TableView) -> Self {
        self.view = view;
        self
    }

    /// Static metrics declared for one scope, in declaration order
    pub fn static_metrics_for(&self, scope: MetricScope) -> impl Iterator<Item = &StaticMetricSpec> {
        self.static_metrics.iter().filter(move |m| m.scope == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GridConfig::default();
        assert_eq!(config.view, TableView::Human);
        assert_eq!(config.static_metrics.len(), 3);
        assert_eq!(config.static_metrics_for(MetricScope::Human).count(), 0);
        assert_eq!(config.cache.max_scenarios_per_run, DEFAULT_MAX_SCENARIOS_PER_RUN);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = GridConfig::from_toml_str("").unwrap();
        assert_eq!(config, GridConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let raw = r#"
view = "auto"

[widths]
annotation = 180

[[static_metrics]]
key = "quality"
label = "Quality"
scope = "human"
"#;
        let config = GridConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.view, TableView::Auto);
        assert_eq!(config.widths.annotation, 180);
        assert_eq!(config.widths.input, ColumnWidths::default().input);
        assert_eq!(config.static_metrics.len(), 1);
        assert_eq!(config.static_metrics[0].metric_type, "number");
        assert_eq!(config.static_metrics[0].scope, MetricScope::Human);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = GridConfig::from_toml_str("view = 3").unwrap_err();
        assert!(matches!(err, crate::GridError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nmax_runs = 2").unwrap();

        let config = GridConfig::load(file.path()).unwrap();
        assert_eq!(config.cache.max_runs, 2);
        assert_eq!(config.cache.max_scenarios_per_run, DEFAULT_MAX_SCENARIOS_PER_RUN);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = GridConfig::load("/nonexistent/evalgrid.toml").unwrap_err();
        assert!(matches!(err, crate::GridError::Io(_)));
    }
}
