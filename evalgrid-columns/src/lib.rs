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

//! # Evalgrid Columns
//!
//! Derives the table model of an evaluation run and resolves its cells.
//!
//! ## Pipeline
//!
//! - **Metrics resolution**: evaluator payload -> metric definitions ([`metrics_resolver`])
//! - **Column building**: run mappings + run index + evaluators -> ordered
//!   columns and column groups ([`column_builder`])
//! - **Failure resolution**: scenario steps -> failed step and message
//!   ([`failure`], [`failure_map`])
//! - **Value location**: annotation outputs -> metric value ([`locator`])
//! - **Cell helpers**: stats lookup and formatting ([`metric_cell`]), the
//!   per-cell facade ([`cell`])
//!
//! Every derivation is synchronous and infallible. Missing or malformed
//! input degrades to empty results; the renderer decides how to show them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use evalgrid_columns::{build_run_table_model, CellResolver, ScenarioStepsCache};
//! use evalgrid_core::{EvaluationRun, GridConfig};
//!
//! let run = EvaluationRun::from_response(&run_body).unwrap_or_default();
//! let model = build_run_table_model(&run, &evaluators, &GridConfig::default());
//!
//! let cache = ScenarioStepsCache::default();
//! cache.insert(&run.id, "scenario-1", steps);
//! let resolver = CellResolver::new(&cache, &run.id);
//! for column in &model.columns {
//!     let cell = resolver.resolve("scenario-1", column);
//! }
//! ```

pub mod cache;
pub mod cell;
pub mod column_builder;
pub mod failure;
pub mod failure_map;
pub mod locator;
pub mod memo;
pub mod metric_cell;
pub mod metrics_resolver;

pub use cache::{cache_key, CacheStats, ScenarioStepsCache};
pub use cell::{candidate_keys, slug_candidates, CellResolver, CellValue};
pub use column_builder::{
    build_run_table_model, ColumnGroup, ColumnPin, EvaluatorSummary, GroupKind, RunTableModel,
    TableColumn, TableColumnKind,
};
pub use failure::{resolve_error_message, resolve_step_failure, StepFailure};
pub use failure_map::{
    build_evaluator_failures_map, build_failures_from_cache, EvaluatorFailureMap, FailureMapMemo,
};
pub use locator::{locate_output_value, looks_like_schema, LocatedValue};
pub use memo::{input_fingerprint, ColumnModelMemo};
pub use metric_cell::{format_metric_value, lookup_metric_stats, metric_display_value};
pub use metrics_resolver::{
    extract_metrics, resolve_definition_metrics, resolve_evaluator_metrics_map, MetricsMap,
};
