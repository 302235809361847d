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

//! Evaluation run model
//!
//! A run declares *mappings* (which step output lands in which table column)
//! and a set of steps. The steps are indexed by key into a [`RunIndex`] that
//! records each step's kind and evaluator reference.

use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Kind of a run step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Input,
    Invocation,
    Annotation,
    Meta,
}

impl StepKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "input" | "testset" => Some(Self::Input),
            "invocation" => Some(Self::Invocation),
            "annotation" | "evaluator" => Some(Self::Annotation),
            "meta" => Some(Self::Meta),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Invocation => "invocation",
            Self::Annotation => "annotation",
            Self::Meta => "meta",
        }
    }
}

/// Kind declared on a mapping's column descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Testset,
    Invocation,
    Annotation,
    Evaluator,
}

impl ColumnKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "testset" => Some(Self::Testset),
            "invocation" => Some(Self::Invocation),
            "annotation" => Some(Self::Annotation),
            "evaluator" => Some(Self::Evaluator),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testset => "testset",
            Self::Invocation => "invocation",
            Self::Annotation => "annotation",
            Self::Evaluator => "evaluator",
        }
    }

    /// Step kind implied by the column kind, used when the run index has
    /// no usable entry for the mapped step
    pub fn implied_step_kind(&self) -> StepKind {
        match self {
            Self::Testset => StepKind::Input,
            Self::Invocation => StepKind::Invocation,
            Self::Annotation | Self::Evaluator => StepKind::Annotation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStep {
    pub key: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingColumn {
    pub kind: ColumnKind,
    pub name: String,
}

/// One well-formed `{step: {key, path}, column: {kind, name}}` mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMapping {
    pub step: MappingStep,
    pub column: MappingColumn,
}

impl RunMapping {
    pub fn new(step_key: &str, path: &str, kind: ColumnKind, name: &str) -> Self {
        Self {
            step: MappingStep {
                key: step_key.to_string(),
                path: path.to_string(),
            },
            column: MappingColumn {
                kind,
                name: name.to_string(),
            },
        }
    }

    /// Read a mapping from raw JSON, returning `None` for any malformed entry
    pub fn from_value(value: &Value) -> Option<Self> {
        let step = value.get("step")?;
        let column = value.get("column")?;
        let key = step.get("key")?.as_str()?;
        let path = step.get("path")?.as_str()?;
        let name = column.get("name")?.as_str()?;
        let kind = ColumnKind::parse(column.get("kind")?.as_str()?)?;
        Some(Self::new(key, path, kind, name))
    }

    pub fn to_value(&self) -> Value {
        json!({
            "step": { "key": self.step.key, "path": self.step.path },
            "column": { "kind": self.column.kind.as_str(), "name": self.column.name },
        })
    }
}

/// `{id, slug}` reference to an evaluator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl EvaluatorRef {
    fn from_value(value: &Value) -> Option<Self> {
        let id = non_empty_str(value.get("id"));
        let slug = non_empty_str(value.get("slug"));
        if id.is_none() && slug.is_none() {
            return None;
        }
        Some(Self { id, slug })
    }
}

/// References attached to a run step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<EvaluatorRef>,
}

/// Metadata the run index records per step key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<StepKind>,
    #[serde(default)]
    pub refs: StepRefs,
}

impl StepMeta {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind: Some(kind),
            refs: StepRefs::default(),
        }
    }

    pub fn with_evaluator(mut self, id: &str, slug: &str) -> Self {
        self.refs.evaluator = Some(EvaluatorRef {
            id: Some(id.to_string()).filter(|s| !s.is_empty()),
            slug: Some(slug.to_string()).filter(|s| !s.is_empty()),
        });
        self
    }

    pub fn evaluator_id(&self) -> Option<&str> {
        self.refs.evaluator.as_ref()?.id.as_deref()
    }

    pub fn evaluator_slug(&self) -> Option<&str> {
        self.refs.evaluator.as_ref()?.slug.as_deref()
    }

    fn from_value(value: &Value) -> Self {
        let kind = value
            .get("kind")
            .or_else(|| value.get("type"))
            .and_then(Value::as_str)
            .and_then(StepKind::parse);
        let evaluator = value
            .get("refs")
            .or_else(|| value.get("references"))
            .and_then(|refs| refs.get("evaluator"))
            .and_then(EvaluatorRef::from_value);
        Self {
            kind,
            refs: StepRefs { evaluator },
        }
    }
}

/// Step key -> step metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIndex {
    steps: BTreeMap<String, StepMeta>,
    /// Step keys in declaration order
    order: Vec<String>,
}

impl RunIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, meta: StepMeta) {
        if self.steps.insert(key.to_string(), meta).is_none() {
            self.order.push(key.to_string());
        }
    }

    pub fn with_step(mut self, key: &str, meta: StepMeta) -> Self {
        self.insert(key, meta);
        self
    }

    pub fn get(&self, key: &str) -> Option<&StepMeta> {
        self.steps.get(key)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StepMeta)> {
        self.order
            .iter()
            .filter_map(|key| self.steps.get(key).map(|meta| (key.as_str(), meta)))
    }

    /// Build the index from `run.data.steps`.
    ///
    /// Accepts the list form `[{key, type, references}]` and the map form
    /// `{key: {kind, refs}}`. Entries without a key are skipped.
    pub fn from_steps(value: &Value) -> Self {
        let mut index = Self::new();
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(key) = item.get("key").and_then(Value::as_str) {
                        index.insert(key, StepMeta::from_value(item));
                    }
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    index.insert(key, StepMeta::from_value(item));
                }
            }
            _ => {}
        }
        index
    }
}

/// A fetched evaluation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub id: String,

    /// Raw mapping entries as returned by the API; filtered at derivation time
    pub mappings: Vec<Value>,

    pub index: RunIndex,
}

impl EvaluationRun {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_mapping(mut self, mapping: RunMapping) -> Self {
        self.mappings.push(mapping.to_value());
        self
    }

    pub fn with_raw_mapping(mut self, mapping: Value) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn with_index(mut self, index: RunIndex) -> Self {
        self.index = index;
        self
    }

    /// Read a run from `GET /preview/evaluations/runs/{id}`.
    ///
    /// Accepts the `{run: {...}}` envelope or a bare run object.
    pub fn from_response(value: &Value) -> Option<Self> {
        let run = match value.get("run") {
            Some(run) if run.is_object() => run,
            Some(_) => return None,
            None if value.is_object() => value,
            None => return None,
        };

        let id = run.get("id").and_then(Value::as_str).unwrap_or_default();
        let data = run.get("data");
        let mappings = data
            .and_then(|d| d.get("mappings"))
            .or_else(|| run.get("mappings"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let index = data
            .and_then(|d| d.get("steps"))
            .map(RunIndex::from_steps)
            .unwrap_or_default();

        Some(Self {
            id: id.to_string(),
            mappings,
            index,
        })
    }

    /// Parse a run response body
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_response(&value)
            .ok_or_else(|| GridError::InvalidPayload("response carries no run object".into()))
    }

    /// Evaluator ids referenced by the run's steps, in declaration order
    pub fn referenced_evaluator_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for (_, meta) in self.index.iter() {
            if let Some(id) = meta.evaluator_id() {
                if !ids.iter().any(|known| known == id) {
                    ids.push(id.to_string());
                }
            }
        }
        ids
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
