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

//! Per-run evaluator failure map
//!
//! scenario id -> evaluator slug -> failure, built by scanning each visible
//! scenario's steps once. The map is rebuilt whenever step data changes and
//! published through [`FailureMapMemo`], which keeps the previous instance
//! when nothing changed.

use crate::cache::ScenarioStepsCache;
use crate::failure::{resolve_step_failure, StepFailure};
use dashmap::DashMap;
use evalgrid_core::ScenarioStepsResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluator slug -> failure of that evaluator's step
pub type SlugFailures = BTreeMap<String, StepFailure>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorFailureMap {
    scenarios: BTreeMap<String, SlugFailures>,
}

impl EvaluatorFailureMap {
    pub fn get(&self, scenario_id: &str, evaluator_slug: &str) -> Option<&StepFailure> {
        self.scenarios.get(scenario_id)?.get(evaluator_slug)
    }

    pub fn scenario(&self, scenario_id: &str) -> Option<&SlugFailures> {
        self.scenarios.get(scenario_id)
    }

    /// Number of scenarios with at least one failure
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    fn record(&mut self, scenario_id: &str, result: &ScenarioStepsResult, slugs: &[String]) {
        let mut failures = SlugFailures::new();
        for slug in slugs.iter().filter(|slug| !slug.is_empty()) {
            if failures.contains_key(slug) {
                continue;
            }
            let candidates = std::slice::from_ref(slug);
            if let Some(failure) = resolve_step_failure(result, scenario_id, candidates, None) {
                failures.insert(slug.clone(), failure);
            }
        }
        if !failures.is_empty() {
            self.scenarios.insert(scenario_id.to_string(), failures);
        }
    }
}

/// Build the failure map from already fetched step results
pub fn build_evaluator_failures_map<'a>(
    results: impl IntoIterator<Item = (&'a str, &'a ScenarioStepsResult)>,
    evaluator_slugs: &[String],
) -> EvaluatorFailureMap {
    let mut map = EvaluatorFailureMap::default();
    for (scenario_id, result) in results {
        map.record(scenario_id, result, evaluator_slugs);
    }
    map
}

/// Build the failure map for the visible scenarios of a run.
///
/// Scenarios whose steps are not cached yet are skipped; they join the map
/// on the rebuild that follows their fetch.
pub fn build_failures_from_cache(
    cache: &ScenarioStepsCache,
    run_id: &str,
    scenario_ids: &[String],
    evaluator_slugs: &[String],
) -> EvaluatorFailureMap {
    let mut map = EvaluatorFailureMap::default();
    let mut pending = 0usize;
    for scenario_id in scenario_ids {
        match cache.get(run_id, scenario_id) {
            Some(result) => map.record(scenario_id, &result, evaluator_slugs),
            None => pending += 1,
        }
    }
    tracing::trace!(
        run_id,
        scenarios = scenario_ids.len(),
        pending,
        failing = map.len(),
        "built evaluator failure map"
    );
    map
}

/// Publishes failure maps per run, reusing the previous `Arc` when the new
/// map is deep-equal so consumers can skip work on pointer equality.
#[derive(Default)]
pub struct FailureMapMemo {
    published: DashMap<String, Arc<EvaluatorFailureMap>>,
}

impl FailureMapMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, run_id: &str, map: EvaluatorFailureMap) -> Arc<EvaluatorFailureMap> {
        if let Some(current) = self.published.get(run_id) {
            if **current == map {
                return Arc::clone(&current);
            }
        }
        let fresh = Arc::new(map);
        self.published.insert(run_id.to_string(), Arc::clone(&fresh));
        fresh
    }

    pub fn current(&self, run_id: &str) -> Option<Arc<EvaluatorFailureMap>> {
        self.published.get(run_id).map(|entry| Arc::clone(&entry))
    }

    pub fn forget(&self, run_id: &str) {
        self.published.remove(run_id);
    }
}
