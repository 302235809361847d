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

//! Scenario output value locator
//!
//! Finds the value of a metric inside the outputs of a scenario's annotation
//! steps. Output layouts vary by evaluator, so lookup runs in two passes:
//! an exact pass over the candidate key paths and their known spellings,
//! then a fuzzy depth-first walk comparing canonicalized leaf keys.

use evalgrid_core::text::{canonical_key, identifier_matches, last_segment};
use evalgrid_core::{ScenarioStep, ScenarioStepsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefixes stripped from candidate paths in the exact pass
const STRIPPED_PREFIXES: &[&str] = &["attributes.ag.data.outputs.", "ag.data.outputs.", "outputs."];

/// Namespace evaluators use for secondary outputs
const EXTRA_NAMESPACE: &str = "extra.";

/// A located output value and the key path it was found under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedValue {
    pub value: Value,
    pub matched_key: String,
}

/// Primitive (non-null) or array values are cell values; objects are not
fn is_cell_value(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Object(_))
}

/// A bare JSON-schema fragment such as `{"type": "boolean"}`
pub fn looks_like_schema(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() <= 2 && map.get("type").is_some_and(Value::is_string),
        _ => false,
    }
}

/// Resolve a dotted path: a literal key first, then segment by segment
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    if let Some(value) = root.get(path) {
        return Some(value);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Spellings of a candidate path: verbatim, then with known prefixes and
/// the evaluator slug stripped (repeatedly, so `outputs.slug.x` yields `x`)
fn path_variants(path: &str, slug: &str) -> Vec<String> {
    let slug_prefix = format!("{}.", slug);
    let mut prefixes: Vec<&str> = STRIPPED_PREFIXES.to_vec();
    if !slug.is_empty() {
        prefixes.push(&slug_prefix);
    }

    let mut variants = vec![path.to_string()];
    let mut cursor = 0;
    while cursor < variants.len() {
        for prefix in &prefixes {
            let stripped = variants[cursor]
                .strip_prefix(*prefix)
                .filter(|rest| !rest.is_empty())
                .map(str::to_string);
            if let Some(stripped) = stripped {
                if !variants.contains(&stripped) {
                    variants.push(stripped);
                }
            }
        }
        cursor += 1;
    }
    variants
}

/// Annotation steps produced by one of the slug candidates
fn steps_in_scope<'a>(
    result: &'a ScenarioStepsResult,
    slug_candidates: &[String],
) -> Vec<&'a ScenarioStep> {
    result
        .annotation_steps
        .iter()
        .chain(result.steps.iter().filter(|step| !step.annotation.is_null()))
        .filter(|step| {
            let ids = step.identifiers();
            slug_candidates
                .iter()
                .any(|candidate| ids.iter().any(|id| identifier_matches(id, candidate)))
        })
        .collect()
}

fn exact_match(
    outputs: &Value,
    evaluator_slug: &str,
    candidate_keys: &[String],
) -> Option<LocatedValue> {
    for key in candidate_keys {
        let variants = path_variants(key, evaluator_slug);
        let namespaced = variants
            .iter()
            .map(|variant| format!("{}{}", EXTRA_NAMESPACE, variant));
        for path in variants.iter().cloned().chain(namespaced) {
            if let Some(value) = lookup_path(outputs, &path).filter(|v| is_cell_value(v)) {
                return Some(LocatedValue {
                    value: value.clone(),
                    matched_key: path,
                });
            }
        }
    }
    None
}

fn fuzzy_match(
    node: &Map<String, Value>,
    targets: &[String],
    trail: &mut Vec<String>,
) -> Option<LocatedValue> {
    for (key, value) in node {
        if looks_like_schema(value) {
            continue;
        }
        trail.push(key.clone());
        if is_cell_value(value) && targets.contains(&canonical_key(key)) {
            return Some(LocatedValue {
                value: value.clone(),
                matched_key: trail.join("."),
            });
        }
        if let Value::Object(child) = value {
            if let Some(found) = fuzzy_match(child, targets, trail) {
                return Some(found);
            }
        }
        trail.pop();
    }
    None
}

/// Locate a metric value in a scenario's annotation outputs.
///
/// Steps are narrowed to annotation steps matching a slug candidate. The
/// exact pass tries, per output object and candidate key, every path
/// spelling and then the same spellings under `extra.`; the first primitive
/// or array value wins. The fuzzy pass walks each output object depth
/// first, skipping schema fragments, and matches leaf keys against the
/// canonicalized last segment of each candidate key.
pub fn locate_output_value(
    result: &ScenarioStepsResult,
    slug_candidates: &[String],
    evaluator_slug: &str,
    candidate_keys: &[String],
) -> Option<LocatedValue> {
    let steps = steps_in_scope(result, slug_candidates);
    if steps.is_empty() || candidate_keys.is_empty() {
        return None;
    }
    let outputs: Vec<&Value> = steps
        .iter()
        .flat_map(|step| step.output_objects())
        .filter(|outputs| !looks_like_schema(outputs))
        .collect();

    for object in &outputs {
        if let Some(found) = exact_match(object, evaluator_slug, candidate_keys) {
            tracing::trace!(matched_key = %found.matched_key, "output value located by path");
            return Some(found);
        }
    }

    let mut targets: Vec<String> = Vec::new();
    for key in candidate_keys {
        let target = canonical_key(last_segment(key));
        if !target.is_empty() && !targets.contains(&target) {
            targets.push(target);
        }
    }
    if targets.is_empty() {
        return None;
    }

    for object in &outputs {
        if let Value::Object(map) = object {
            if let Some(found) = fuzzy_match(map, &targets, &mut Vec::new()) {
                tracing::trace!(matched_key = %found.matched_key, "output value located by key search");
                return Some(found);
            }
        }
    }
    None
}
