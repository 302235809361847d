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

//! Scenario-step cache
//!
//! Step results are fetched lazily per visible scenario and written once.
//! Each run gets its own bounded cache, and the set of runs is bounded as
//! well, so a long session does not accumulate every run it ever opened.

use evalgrid_core::{CacheConfig, ScenarioStepsResult};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type RunCache = Cache<String, Arc<ScenarioStepsResult>>;

/// Cache key of a scenario's steps: `runId::scenarioId`
pub fn cache_key(run_id: &str, scenario_id: &str) -> String {
    format!("{}::{}", run_id, scenario_id)
}

/// Owned cache of scenario step results, injected into the cell resolvers
pub struct ScenarioStepsCache {
    runs: Cache<String, RunCache>,
    max_scenarios_per_run: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScenarioStepsCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            runs: Cache::builder().max_capacity(config.max_runs).build(),
            max_scenarios_per_run: config.max_scenarios_per_run,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn run_cache(&self, run_id: &str) -> RunCache {
        let capacity = self.max_scenarios_per_run;
        self.runs.get_with(run_id.to_string(), || {
            Cache::builder().max_capacity(capacity).build()
        })
    }

    /// Cached steps of a scenario
    pub fn get(&self, run_id: &str, scenario_id: &str) -> Option<Arc<ScenarioStepsResult>> {
        let cached = self
            .runs
            .get(run_id)
            .and_then(|run| run.get(&cache_key(run_id, scenario_id)));
        match cached {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a fetched result. An existing entry is kept and returned
    /// instead; entries are never replaced.
    pub fn insert(
        &self,
        run_id: &str,
        scenario_id: &str,
        result: ScenarioStepsResult,
    ) -> Arc<ScenarioStepsResult> {
        self.get_or_insert_with(run_id, scenario_id, || result)
    }

    /// Return the cached result, running `fetch` only when absent
    pub fn get_or_insert_with(
        &self,
        run_id: &str,
        scenario_id: &str,
        fetch: impl FnOnce() -> ScenarioStepsResult,
    ) -> Arc<ScenarioStepsResult> {
        self.run_cache(run_id)
            .get_with(cache_key(run_id, scenario_id), || Arc::new(fetch()))
    }

    /// Drop every cached scenario of a run
    pub fn evict_run(&self, run_id: &str) {
        if let Some(run) = self.runs.get(run_id) {
            run.invalidate_all();
        }
        self.runs.invalidate(run_id);
    }

    /// Clear entire cache
    pub fn clear(&self) {
        self.runs.invalidate_all();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            runs: self.runs.entry_count(),
        }
    }
}

impl Default for ScenarioStepsCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub runs: u64,
}
