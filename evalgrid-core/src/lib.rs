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

//! # Evalgrid Core
//!
//! Shared data model for evaluation-run tables.
//!
//! ## Contents
//!
//! - **Run model**: mappings, run index and step metadata ([`run`])
//! - **Evaluator definitions**: payload shapes and metric definitions ([`evaluator`])
//! - **Scenario steps**: lazily fetched per-scenario execution units ([`scenario`])
//! - **Metric keys**: primary key normalization and fallback aliases ([`metric_key`])
//! - **Configuration**: view, width hints, static metrics, cache bounds ([`config`])
//!
//! Parsing is lenient: payloads from the backend change shape across API
//! versions, so malformed pieces are dropped instead of rejected. Only the
//! boundary operations (config loading, envelope parsing) return [`Result`].

pub mod config;
pub mod error;
pub mod evaluator;
pub mod metric_key;
pub mod run;
pub mod scenario;
pub mod text;

pub use config::{CacheConfig, ColumnWidths, GridConfig, MetricScope, StaticMetricSpec, TableView};
pub use error::{GridError, Result};
pub use evaluator::{
    parse_evaluators_response, EvaluatorDefinition, MetricDefinition, MetricsShape, SchemaSource,
};
pub use metric_key::{collect_fallback_keys, normalize_primary_key};
pub use run::{
    ColumnKind, EvaluationRun, EvaluatorRef, MappingColumn, MappingStep, RunIndex, RunMapping,
    StepKind, StepMeta, StepRefs,
};
pub use scenario::{ScenarioStep, ScenarioStepsResult, StepBucket};
