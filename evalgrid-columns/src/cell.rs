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

//! Per-cell resolution
//!
//! Connects a derived [`TableColumn`] to the scenario-level resolvers: the
//! failure resolver decides whether the cell shows an error, the output
//! locator finds the value otherwise. Both read from the injected
//! [`ScenarioStepsCache`]; a scenario that is not cached yet resolves to
//! nothing and the renderer keeps its loading state.

use crate::cache::ScenarioStepsCache;
use crate::column_builder::{TableColumn, TableColumnKind};
use crate::failure::{resolve_step_failure, StepFailure};
use crate::locator::{locate_output_value, LocatedValue};
use serde::{Deserialize, Serialize};

/// What a cell displays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<LocatedValue>,
}

fn push_unique(into: &mut Vec<String>, item: Option<&str>) {
    if let Some(item) = item.filter(|item| !item.is_empty()) {
        if !into.iter().any(|known| known == item) {
            into.push(item.to_string());
        }
    }
}

/// Slugs identifying the step that produces a column:
/// evaluator slug, step key, evaluator id
pub fn slug_candidates(column: &TableColumn) -> Vec<String> {
    let mut candidates = Vec::new();
    push_unique(&mut candidates, column.evaluator_slug.as_deref());
    push_unique(&mut candidates, column.step_key.as_deref());
    push_unique(&mut candidates, column.evaluator_id.as_deref());
    candidates
}

/// Keys a column's value may be stored under:
/// metric key, stats key, fallback keys, mapping path
pub fn candidate_keys(column: &TableColumn) -> Vec<String> {
    let mut keys = Vec::new();
    push_unique(&mut keys, column.metric_key.as_deref());
    push_unique(&mut keys, column.stats_key.as_deref());
    for key in &column.fallback_keys {
        push_unique(&mut keys, Some(key.as_str()));
    }
    push_unique(&mut keys, column.path.as_deref());
    keys
}

/// Resolves cells of one run against cached scenario steps
pub struct CellResolver<'a> {
    cache: &'a ScenarioStepsCache,
    run_id: &'a str,
}

impl<'a> CellResolver<'a> {
    pub fn new(cache: &'a ScenarioStepsCache, run_id: &'a str) -> Self {
        Self { cache, run_id }
    }

    /// Failure of the step producing this cell, if any
    pub fn failure(&self, scenario_id: &str, column: &TableColumn) -> Option<StepFailure> {
        if !matches!(
            column.kind,
            TableColumnKind::Invocation | TableColumnKind::Annotation | TableColumnKind::Evaluator
        ) {
            return None;
        }
        let steps = self.cache.get(self.run_id, scenario_id)?;
        resolve_step_failure(
            &steps,
            scenario_id,
            &slug_candidates(column),
            column.step_key.as_deref(),
        )
    }

    /// Annotation output value of this cell
    pub fn value(&self, scenario_id: &str, column: &TableColumn) -> Option<LocatedValue> {
        if !column.is_annotation() {
            return None;
        }
        let steps = self.cache.get(self.run_id, scenario_id)?;
        locate_output_value(
            &steps,
            &slug_candidates(column),
            column.evaluator_slug.as_deref().unwrap_or_default(),
            &candidate_keys(column),
        )
    }

    /// Failure first; the value is only looked up for cells that did not fail
    pub fn resolve(&self, scenario_id: &str, column: &TableColumn) -> CellValue {
        let failure = self.failure(scenario_id, column);
        let value = if failure.is_none() {
            self.value(scenario_id, column)
        } else {
            None
        };
        tracing::trace!(
            run_id = self.run_id,
            scenario_id,
            column = %column.id,
            failed = failure.is_some(),
            found = value.is_some(),
            "resolved cell"
        );
        CellValue { failure, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_builder::build_run_table_model;
    use evalgrid_core::{
        ColumnKind, EvaluationRun, GridConfig, RunIndex, RunMapping, ScenarioStep,
        ScenarioStepsResult, StepKind, StepMeta,
    };
    use serde_json::json;

    fn model() -> crate::column_builder::RunTableModel {
        let run = EvaluationRun::new("run")
            .with_mapping(RunMapping::new("s1", "age", ColumnKind::Testset, "age"))
            .with_mapping(RunMapping::new("s2", "out", ColumnKind::Invocation, "output"))
            .with_mapping(RunMapping::new(
                "s3",
                "attributes.ag.data.outputs.isCorrect",
                ColumnKind::Annotation,
                "isCorrect",
            ))
            .with_index(
                RunIndex::new()
                    .with_step("s1", StepMeta::new(StepKind::Input))
                    .with_step("s2", StepMeta::new(StepKind::Invocation))
                    .with_step(
                        "s3",
                        StepMeta::new(StepKind::Annotation).with_evaluator("e1", "exact"),
                    ),
            );
        build_run_table_model(&run, &[], &GridConfig::without_static_metrics())
    }

    #[test]
    fn test_candidates_from_column() {
        let model = model();
        let column = model.column("annotation:isCorrect:300").unwrap();
        assert_eq!(slug_candidates(column), vec!["exact", "s3", "e1"]);
        assert_eq!(
            candidate_keys(column),
            vec!["isCorrect", "exact.isCorrect", "attributes.ag.data.outputs.isCorrect"]
        );
    }

    #[test]
    fn test_uncached_scenario_resolves_to_nothing() {
        let cache = ScenarioStepsCache::default();
        let model = model();
        let resolver = CellResolver::new(&cache, "run");
        let column = model.column("annotation:isCorrect:300").unwrap();
        assert_eq!(resolver.resolve("sc-1", column), CellValue::default());
    }

    #[test]
    fn test_value_and_failure_cells() {
        let cache = ScenarioStepsCache::default();
        cache.insert(
            "run",
            "ok",
            ScenarioStepsResult {
                annotation_steps: vec![ScenarioStep::new("s3", "success")
                    .with_evaluator("exact")
                    .with_annotation_outputs(json!({ "isCorrect": true }))],
                ..Default::default()
            },
        );
        cache.insert(
            "run",
            "broken",
            ScenarioStepsResult {
                annotation_steps: vec![ScenarioStep::new("s3", "error")
                    .with_evaluator("exact")
                    .with_error(json!("judge timed out"))],
                ..Default::default()
            },
        );

        let model = model();
        let resolver = CellResolver::new(&cache, "run");
        let column = model.column("annotation:isCorrect:300").unwrap();

        let ok = resolver.resolve("ok", column);
        assert!(ok.failure.is_none());
        assert_eq!(ok.value.unwrap().value, json!(true));

        let broken = resolver.resolve("broken", column);
        assert_eq!(broken.failure.unwrap().error.as_deref(), Some("judge timed out"));
        assert!(broken.value.is_none());

        let input = model.column("input:age:100").unwrap();
        assert_eq!(resolver.resolve("broken", input), CellValue::default());
    }
}
