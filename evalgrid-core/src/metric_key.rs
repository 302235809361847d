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

//! Metric key normalization
//!
//! Metric stats are keyed inconsistently across backend versions: sometimes
//! `isCorrect`, sometimes `exact_match.isCorrect`, sometimes a full output
//! path. The primary key is the evaluator-slug-qualified form; fallback keys
//! are every other spelling the same metric may be stored under.

use serde_json::Value;

/// Metadata fields that may carry an alternative spelling of a metric key
const META_KEY_FIELDS: &[&str] = &[
    "metricKey",
    "key",
    "path",
    "fullKey",
    "canonicalKey",
    "statsKey",
    "metric",
];

/// Qualify a raw metric key with its evaluator slug.
///
/// Keys that already start with `<slug>.` or contain a `.` are returned
/// unchanged, so the function is idempotent.
pub fn normalize_primary_key(slug: &str, raw_key: &str) -> String {
    if raw_key.is_empty() || slug.is_empty() {
        return raw_key.to_string();
    }
    if raw_key.starts_with(&format!("{}.", slug)) || raw_key.contains('.') {
        return raw_key.to_string();
    }
    format!("{}.{}", slug, raw_key)
}

fn expand(slug: &str, candidate: &str) -> String {
    if slug.is_empty() || candidate.contains('.') {
        candidate.to_string()
    } else {
        format!("{}.{}", slug, candidate)
    }
}

/// Collect alternative keys for the same metric.
///
/// Sources, in order: the raw key, `meta.aliases` (string or list),
/// `meta.alias`, and the string fields listed in `META_KEY_FIELDS`. Each
/// candidate contributes itself and its slug-qualified form. The result is
/// de-duplicated and never contains `raw_key` or `primary_key`.
pub fn collect_fallback_keys(
    slug: &str,
    raw_key: &str,
    primary_key: &str,
    meta: Option<&Value>,
) -> Vec<String> {
    let mut candidates: Vec<String> = vec![raw_key.to_string()];

    if let Some(meta) = meta {
        match meta.get("aliases") {
            Some(Value::Array(items)) => candidates.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string),
            ),
            Some(Value::String(alias)) => candidates.push(alias.clone()),
            _ => {}
        }
        if let Some(alias) = meta.get("alias").and_then(Value::as_str) {
            candidates.push(alias.to_string());
        }
        for field in META_KEY_FIELDS {
            if let Some(value) = meta.get(*field).and_then(Value::as_str) {
                candidates.push(value.to_string());
            }
        }
    }

    let mut keys: Vec<String> = Vec::new();
    for candidate in candidates.iter().filter(|c| !c.is_empty()) {
        for key in [candidate.clone(), expand(slug, candidate)] {
            if key != raw_key && key != primary_key && !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}
