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

//! Evaluator definitions
//!
//! Evaluator payloads describe their outputs in one of several shapes
//! depending on the API version that produced them. [`MetricsShape`] names
//! each known shape; [`MetricsShape::detect`] tries the detectors in a fixed
//! order and returns the first that finds a non-empty description.

use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a JSON-schema `properties` object was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    /// `data.schemas.outputs.properties`
    DataSchemasOutputs,
    /// `data.service.format.properties.outputs.properties`
    ServiceFormatOutputs,
    /// `data.output_schema.properties`
    DataOutputSchema,
    /// `output_schema.properties`
    OutputSchema,
    /// `schemas.outputs.properties`
    SchemasOutputs,
}

impl SchemaSource {
    /// Probe order for schema-shaped payloads
    pub const ALL: [SchemaSource; 5] = [
        SchemaSource::DataSchemasOutputs,
        SchemaSource::ServiceFormatOutputs,
        SchemaSource::DataOutputSchema,
        SchemaSource::OutputSchema,
        SchemaSource::SchemasOutputs,
    ];

    pub fn path(&self) -> &'static [&'static str] {
        match self {
            Self::DataSchemasOutputs => &["data", "schemas", "outputs", "properties"],
            Self::ServiceFormatOutputs => &[
                "data",
                "service",
                "format",
                "properties",
                "outputs",
                "properties",
            ],
            Self::DataOutputSchema => &["data", "output_schema", "properties"],
            Self::OutputSchema => &["output_schema", "properties"],
            Self::SchemasOutputs => &["schemas", "outputs", "properties"],
        }
    }

    /// Non-empty `properties` object at this source's path
    pub fn probe<'a>(&self, raw: &'a Value) -> Option<&'a Map<String, Value>> {
        let mut node = raw;
        for segment in self.path() {
            node = node.get(*segment)?;
        }
        node.as_object().filter(|props| !props.is_empty())
    }
}

/// A recognized description of an evaluator's metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricsShape<'a> {
    /// `metrics: {name: {type, label, ...}}`
    FlatMetrics(&'a Map<String, Value>),
    /// JSON-schema `properties` object found at `source`
    SchemaProperties {
        source: SchemaSource,
        properties: &'a Map<String, Value>,
    },
    /// `metrics: [{name, type, ...}]` or `data.metrics: [...]`
    MetricList(&'a [Value]),
}

type Detector = for<'a> fn(&'a Value) -> Option<MetricsShape<'a>>;

fn detect_flat_metrics(raw: &Value) -> Option<MetricsShape<'_>> {
    raw.get("metrics")?
        .as_object()
        .filter(|m| !m.is_empty())
        .map(MetricsShape::FlatMetrics)
}

fn detect_schema_properties(raw: &Value) -> Option<MetricsShape<'_>> {
    SchemaSource::ALL.iter().find_map(|source| {
        source
            .probe(raw)
            .map(|properties| MetricsShape::SchemaProperties {
                source: *source,
                properties,
            })
    })
}

fn detect_metric_list(raw: &Value) -> Option<MetricsShape<'_>> {
    [raw.get("metrics"), raw.get("data").and_then(|d| d.get("metrics"))]
        .into_iter()
        .flatten()
        .find_map(|node| node.as_array().filter(|items| !items.is_empty()))
        .map(|items| MetricsShape::MetricList(items.as_slice()))
}

/// Shape detectors in priority order
const DETECTORS: &[(&str, Detector)] = &[
    ("flat_metrics", detect_flat_metrics),
    ("schema_properties", detect_schema_properties),
    ("metric_list", detect_metric_list),
];

impl<'a> MetricsShape<'a> {
    /// Run the detectors in order, returning the first match
    pub fn detect(raw: &'a Value) -> Option<Self> {
        for (name, detector) in DETECTORS {
            if let Some(shape) = detector(raw) {
                tracing::debug!(detector = *name, "evaluator metrics shape detected");
                return Some(shape);
            }
        }
        None
    }
}

/// A metric produced by an evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,

    /// Output path of the metric; equals `name` for top-level outputs
    pub path: String,

    /// Declared type ("number", "boolean", "string", "array", ...)
    pub metric_type: String,

    pub display_label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The raw schema or metric entry, kept for alias lookup
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

/// An evaluator as returned by `POST /preview/simple/evaluators/query`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorDefinition {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Full payload, probed lazily for metric descriptions
    #[serde(default)]
    pub raw: Value,
}

impl EvaluatorDefinition {
    pub fn new(id: &str, slug: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Read an evaluator entry; entries with neither id nor slug are dropped
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = str_field(value, "id");
        let slug = str_field(value, "slug");
        if id.is_empty() && slug.is_empty() {
            return None;
        }
        let name = str_field(value, "name");
        let version = match value.get("version") {
            Some(Value::String(v)) => Some(v.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Some(Self {
            name: if name.is_empty() { slug.clone() } else { name },
            id,
            slug,
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            version,
            raw: value.clone(),
        })
    }

    /// Payload shape describing this evaluator's metrics, if any
    pub fn metrics_shape(&self) -> Option<MetricsShape<'_>> {
        MetricsShape::detect(&self.raw)
    }

    /// Human-readable label: name, then slug
    pub fn label(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else {
            &self.slug
        }
    }
}

/// Read the evaluator list from a `{evaluators: [...]}` envelope or a bare array
pub fn parse_evaluators_response(value: &Value) -> Vec<EvaluatorDefinition> {
    let items = value
        .get("evaluators")
        .and_then(Value::as_array)
        .or_else(|| value.as_array());
    items
        .map(|items| items.iter().filter_map(EvaluatorDefinition::from_value).collect())
        .unwrap_or_default()
}

impl EvaluatorDefinition {
    /// Parse an evaluator query response body
    pub fn list_from_json_str(raw: &str) -> Result<Vec<Self>> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() && !value.is_array() {
            return Err(GridError::InvalidPayload(
                "evaluator response is neither an object nor a list".into(),
            ));
        }
        Ok(parse_evaluators_response(&value))
    }
}

fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_flat_metrics_first() {
        let raw = json!({
            "metrics": { "score": { "type": "number" } },
            "data": { "schemas": { "outputs": { "properties": { "other": {} } } } }
        });
        assert!(matches!(
            MetricsShape::detect(&raw),
            Some(MetricsShape::FlatMetrics(m)) if m.contains_key("score")
        ));
    }

    #[test]
    fn test_detect_schema_sources_in_order() {
        let raw = json!({
            "output_schema": { "properties": { "b": {} } },
            "data": {
                "service": {
                    "format": {
                        "properties": { "outputs": { "properties": { "a": {} } } }
                    }
                }
            }
        });
        match MetricsShape::detect(&raw) {
            Some(MetricsShape::SchemaProperties { source, properties }) => {
                assert_eq!(source, SchemaSource::ServiceFormatOutputs);
                assert!(properties.contains_key("a"));
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_empty_shapes_are_skipped() {
        let raw = json!({
            "metrics": {},
            "data": { "schemas": { "outputs": { "properties": {} } }, "metrics": [{ "name": "x" }] }
        });
        assert!(matches!(
            MetricsShape::detect(&raw),
            Some(MetricsShape::MetricList(items)) if items.len() == 1
        ));
        assert!(MetricsShape::detect(&json!({ "name": "bare" })).is_none());
    }

    #[test]
    fn test_evaluator_from_value() {
        let evaluator = EvaluatorDefinition::from_value(&json!({
            "id": "e1",
            "slug": "exact_match",
            "version": 2,
            "description": "Exact string match"
        }))
        .unwrap();
        assert_eq!(evaluator.name, "exact_match");
        assert_eq!(evaluator.version.as_deref(), Some("2"));
        assert_eq!(evaluator.label(), "exact_match");
        assert!(EvaluatorDefinition::from_value(&json!({ "name": "anonymous" })).is_none());
    }

    #[test]
    fn test_parse_evaluators_response() {
        let body = json!({
            "evaluators": [
                { "id": "e1", "slug": "exact", "name": "Exact" },
                { "name": "no identity" },
                { "id": "e2", "slug": "judge" }
            ]
        });
        let evaluators = parse_evaluators_response(&body);
        assert_eq!(evaluators.len(), 2);
        assert_eq!(evaluators[1].slug, "judge");

        assert!(matches!(
            EvaluatorDefinition::list_from_json_str("\"text\""),
            Err(GridError::InvalidPayload(_))
        ));
    }
}
