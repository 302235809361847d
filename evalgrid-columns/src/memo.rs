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

//! Memoized column model derivation
//!
//! The column model is a pure function of (run, evaluators, config). The
//! memo keeps one model per run together with a fingerprint of the inputs
//! it was built from, and rebuilds only when the fingerprint changes.

use crate::column_builder::{build_run_table_model, RunTableModel};
use evalgrid_core::{EvaluationRun, EvaluatorDefinition, GridConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fingerprint of the derivation inputs
pub fn input_fingerprint(
    run: &EvaluationRun,
    evaluators: &[EvaluatorDefinition],
    config: &GridConfig,
) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for part in [
        serde_json::to_vec(run),
        serde_json::to_vec(evaluators),
        serde_json::to_vec(config),
    ] {
        // serialization of these types cannot fail: every map key is a string
        let bytes = part.unwrap_or_default();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    hasher.finalize()
}

struct MemoEntry {
    fingerprint: blake3::Hash,
    model: Arc<RunTableModel>,
}

/// run id -> last built column model
#[derive(Default)]
pub struct ColumnModelMemo {
    entries: RwLock<HashMap<String, MemoEntry>>,
    builds: AtomicU64,
}

impl ColumnModelMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized model, rebuilding it if the inputs changed
    pub fn get_or_build(
        &self,
        run: &EvaluationRun,
        evaluators: &[EvaluatorDefinition],
        config: &GridConfig,
    ) -> Arc<RunTableModel> {
        let fingerprint = input_fingerprint(run, evaluators, config);
        if let Some(entry) = self.entries.read().get(&run.id) {
            if entry.fingerprint == fingerprint {
                return Arc::clone(&entry.model);
            }
        }

        let model = Arc::new(build_run_table_model(run, evaluators, config));
        self.builds.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(
            run.id.clone(),
            MemoEntry {
                fingerprint,
                model: Arc::clone(&model),
            },
        );
        model
    }

    pub fn invalidate(&self, run_id: &str) {
        self.entries.write().remove(run_id);
    }

    /// Number of derivations performed so far
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}
