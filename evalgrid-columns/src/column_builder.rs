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

//! Run index column builder
//!
//! Derives the ordered column model of an evaluation-run table from the
//! run's mappings, its run index and the evaluator definitions it references.
//!
//! ## Ordering
//!
//! Columns are ordered by a numeric `order`:
//!
//! | block                | base   |
//! |----------------------|--------|
//! | `scenarioIndex`      | 0      |
//! | `status`             | 1      |
//! | input columns        | 100    |
//! | invocation columns   | 200    |
//! | annotation columns   | 300    |
//! | auto metric columns  | 9000   |
//! | human metric columns | 9500   |
//! | `action`             | 10000  |
//!
//! Each block counts its own columns in discovery order. A block that would
//! overflow into the next pushes the following bases up, so inputs always
//! precede invocation outputs, which always precede annotations.

use crate::metrics_resolver::{match_metric, resolve_definition_metrics, MetricsMap};
use evalgrid_core::text::{last_segment, title_case};
use evalgrid_core::{
    collect_fallback_keys, normalize_primary_key, ColumnKind, EvaluationRun, EvaluatorDefinition,
    GridConfig, MetricScope, RunMapping, StaticMetricSpec, StepKind, StepMeta, TableView,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internal dedup marker; columns carrying it are never shown
const DEDUP_MARKER: &str = "_dedup_id";

/// Prefixes stripped from an annotation path to obtain its metric key
const OUTPUT_PATH_PREFIXES: &[&str] = &[
    "attributes.ag.data.outputs.",
    "ag.data.outputs.",
    "data.outputs.",
    "outputs.",
];

pub const INDEX_ORDER: u32 = 0;
pub const STATUS_ORDER: u32 = 1;
pub const INPUT_BASE: u32 = 100;
pub const INVOCATION_BASE: u32 = 200;
pub const ANNOTATION_BASE: u32 = 300;
pub const AUTO_METRIC_BASE: u32 = 9000;
pub const HUMAN_METRIC_BASE: u32 = 9500;
pub const ACTION_ORDER: u32 = 10000;

pub const INPUTS_GROUP: &str = "inputs";
pub const OUTPUTS_GROUP: &str = "outputs";
pub const SHARED_ANNOTATIONS_GROUP: &str = "annotations";
pub const AUTO_METRICS_GROUP: &str = "metrics:auto";
pub const HUMAN_METRICS_GROUP: &str = "metrics:human";

/// Kind of a derived table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableColumnKind {
    Meta,
    Input,
    Invocation,
    Annotation,
    Evaluator,
    Metric,
}

impl TableColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Input => "input",
            Self::Invocation => "invocation",
            Self::Annotation => "annotation",
            Self::Evaluator => "evaluator",
            Self::Metric => "metric",
        }
    }

    /// Tie-break rank when two columns share an order
    fn rank(&self) -> u8 {
        match self {
            Self::Meta => 0,
            Self::Input => 1,
            Self::Invocation => 2,
            Self::Annotation => 3,
            Self::Evaluator => 4,
            Self::Metric => 5,
        }
    }
}

/// Sticky placement hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnPin {
    Left,
    Right,
}

/// One derived table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    /// `<kind>:<name>:<order>`, unique within one run
    pub id: String,
    pub label: String,
    pub display_label: String,
    pub kind: TableColumnKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_segments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepKind>,

    /// Key the cell value is read under
    pub value_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    /// Slug-qualified metric key used for run-level stats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_name: Option<String>,

    pub order: u32,
    pub width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<ColumnPin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl TableColumn {
    fn new(kind: TableColumnKind, name: &str, order: u32, width: u32) -> Self {
        Self {
            id: format!("{}:{}:{}", kind.as_str(), name, order),
            label: name.to_string(),
            display_label: title_case(name),
            kind,
            step_key: None,
            path: None,
            path_segments: Vec::new(),
            step_type: None,
            value_key: name.to_string(),
            description: None,
            metric_key: None,
            metric_type: None,
            stats_key: None,
            fallback_keys: Vec::new(),
            evaluator_id: None,
            evaluator_slug: None,
            evaluator_name: None,
            order,
            width,
            pinned: None,
            group_id: None,
        }
    }

    pub fn is_annotation(&self) -> bool {
        matches!(
            self.kind,
            TableColumnKind::Annotation | TableColumnKind::Evaluator
        )
    }

    fn sort_key(&self) -> (u32, u8) {
        (self.order, self.kind.rank())
    }
}

/// Kind of a column group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Input,
    Invocation,
    Annotation,
    Metric,
}

/// A visual group of columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnGroup {
    pub id: String,
    pub label: String,
    pub kind: GroupKind,
    /// Member column ids, left to right
    pub columns: Vec<String>,
    pub order: u32,
}

/// An evaluator referenced by the run, with its resolved metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub name: String,
    #[serde(default)]
    pub metrics: MetricsMap,
}

/// The derived column model of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTableModel {
    /// Every column, sorted by order
    pub columns: Vec<TableColumn>,
    pub groups: Vec<ColumnGroup>,
    pub static_metric_columns: Vec<TableColumn>,
    pub evaluators: Vec<EvaluatorSummary>,
    /// Columns no group claims
    pub ungrouped_columns: Vec<TableColumn>,
}

impl RunTableModel {
    pub fn column(&self, id: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|column| column.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&ColumnGroup> {
        self.groups.iter().find(|group| group.id == id)
    }
}

/// Bases for the three mapping blocks, pushed apart when a block overflows
struct BlockBases {
    input: u32,
    invocation: u32,
    annotation: u32,
    next_free: u32,
}

impl BlockBases {
    fn new(inputs: u32, invocations: u32, annotations: u32) -> Self {
        let input = INPUT_BASE;
        let invocation = INVOCATION_BASE.max(input + inputs);
        let annotation = ANNOTATION_BASE.max(invocation + invocations);
        Self {
            input,
            invocation,
            annotation,
            next_free: annotation + annotations,
        }
    }
}

/// Block a mapping's columns are ordered in
fn mapping_block(mapping: &RunMapping, meta: Option<&StepMeta>) -> StepKind {
    match meta {
        None => StepKind::Annotation,
        Some(meta) => match meta.kind {
            Some(StepKind::Meta) | None => mapping.column.kind.implied_step_kind(),
            Some(kind) => kind,
        },
    }
}

/// Metric key of an annotation path: the path minus its output prefix
pub fn metric_key_from_path(path: &str) -> &str {
    OUTPUT_PATH_PREFIXES
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(path)
}

struct AnnotationGroup {
    id: String,
    label: String,
    columns: Vec<String>,
}

/// Per-build lookup of evaluator definitions and their metrics
struct EvaluatorLookup<'a> {
    evaluators: &'a [EvaluatorDefinition],
    metrics: HashMap<usize, Option<MetricsMap>>,
}

impl<'a> EvaluatorLookup<'a> {
    fn new(evaluators: &'a [EvaluatorDefinition]) -> Self {
        Self {
            evaluators,
            metrics: HashMap::new(),
        }
    }

    fn position(&self, id: Option<&str>, slug: Option<&str>) -> Option<usize> {
        id.and_then(|id| self.evaluators.iter().position(|e| e.id == id))
            .or_else(|| slug.and_then(|slug| self.evaluators.iter().position(|e| e.slug == slug)))
    }

    fn find(&self, id: Option<&str>, slug: Option<&str>) -> Option<&'a EvaluatorDefinition> {
        let evaluators = self.evaluators;
        self.position(id, slug).map(|pos| &evaluators[pos])
    }

    fn metrics(&mut self, id: Option<&str>, slug: Option<&str>) -> Option<&MetricsMap> {
        let pos = self.position(id, slug)?;
        let evaluators = self.evaluators;
        self.metrics
            .entry(pos)
            .or_insert_with(|| resolve_definition_metrics(&evaluators[pos]))
            .as_ref()
    }
}

fn meta_columns(config: &GridConfig, action_order: u32) -> Vec<TableColumn> {
    let widths = &config.widths;
    let mut columns = vec![
        TableColumn::new(TableColumnKind::Meta, "scenarioIndex", INDEX_ORDER, widths.index),
        TableColumn::new(TableColumnKind::Meta, "status", STATUS_ORDER, widths.status),
    ];
    columns[0].display_label = "#".to_string();
    columns[0].pinned = Some(ColumnPin::Left);

    if config.view == TableView::Human {
        let mut action =
            TableColumn::new(TableColumnKind::Meta, "action", action_order, widths.action);
        action.pinned = Some(ColumnPin::Right);
        columns.push(action);
    }
    columns
}

fn static_metric_column(spec: &StaticMetricSpec, order: u32, width: u32) -> TableColumn {
    let mut column = TableColumn::new(TableColumnKind::Metric, &spec.key, order, width);
    column.display_label = spec.label.clone();
    column.metric_key = Some(spec.key.clone());
    column.stats_key = Some(spec.key.clone());
    column.metric_type = Some(spec.metric_type.clone());
    column.group_id = Some(
        match spec.scope {
            MetricScope::Auto => AUTO_METRICS_GROUP,
            MetricScope::Human => HUMAN_METRICS_GROUP,
        }
        .to_string(),
    );
    column
}

fn build_static_metric_columns(config: &GridConfig, after: u32) -> Vec<TableColumn> {
    let width = config.widths.metric;
    let auto_base = AUTO_METRIC_BASE.max(after);
    let mut columns: Vec<TableColumn> = config
        .static_metrics_for(MetricScope::Auto)
        .enumerate()
        .map(|(i, spec)| static_metric_column(spec, auto_base + i as u32, width))
        .collect();

    let human_base = HUMAN_METRIC_BASE.max(auto_base + columns.len() as u32);
    columns.extend(
        config
            .static_metrics_for(MetricScope::Human)
            .enumerate()
            .map(|(i, spec)| static_metric_column(spec, human_base + i as u32, width)),
    );
    columns
}

/// Evaluators referenced by the run's annotation steps, in declaration order
fn evaluator_summaries(
    run: &EvaluationRun,
    lookup: &mut EvaluatorLookup<'_>,
) -> Vec<EvaluatorSummary> {
    let mut summaries: Vec<EvaluatorSummary> = Vec::new();
    for (_, meta) in run.index.iter() {
        let (id, slug) = (meta.evaluator_id(), meta.evaluator_slug());
        if id.is_none() && slug.is_none() {
            continue;
        }
        let definition = lookup.find(id, slug);
        let summary_id = id.map(str::to_string).or_else(|| definition.map(|d| d.id.clone()));
        let summary_slug = slug
            .map(str::to_string)
            .or_else(|| definition.map(|d| d.slug.clone()));
        let duplicate = summaries.iter().any(|known| {
            (summary_id.is_some() && known.id == summary_id)
                || (summary_id.is_none() && known.slug == summary_slug)
        });
        if duplicate {
            continue;
        }
        let name = definition
            .map(|d| d.label().to_string())
            .or_else(|| summary_slug.clone())
            .unwrap_or_default();
        let metrics = lookup.metrics(id, slug).cloned().unwrap_or_default();
        summaries.push(EvaluatorSummary {
            id: summary_id,
            slug: summary_slug,
            name,
            metrics,
        });
    }
    summaries
}

/// Build the column model of a run.
///
/// Pure function of its inputs: identical inputs produce identical columns
/// and groups. Malformed mappings are dropped without error.
pub fn build_run_table_model(
    run: &EvaluationRun,
    evaluators: &[EvaluatorDefinition],
    config: &GridConfig,
) -> RunTableModel {
    let mappings: Vec<RunMapping> = run
        .mappings
        .iter()
        .filter_map(RunMapping::from_value)
        .filter(|mapping| !mapping.column.name.contains(DEDUP_MARKER))
        .collect();
    let dropped = run.mappings.len() - mappings.len();
    if dropped > 0 {
        tracing::debug!(run_id = %run.id, dropped, "dropped malformed or internal mappings");
    }

    let blocks: Vec<StepKind> = mappings
        .iter()
        .map(|mapping| mapping_block(mapping, run.index.get(&mapping.step.key)))
        .collect();
    let count = |kind: StepKind| blocks.iter().filter(|b| **b == kind).count() as u32;
    let bases = BlockBases::new(
        count(StepKind::Input),
        count(StepKind::Invocation),
        count(StepKind::Annotation),
    );

    let mut lookup = EvaluatorLookup::new(evaluators);
    let widths = &config.widths;
    let (mut inputs, mut invocations, mut annotations) = (0u32, 0u32, 0u32);
    let mut input_ids: Vec<String> = Vec::new();
    let mut output_ids: Vec<String> = Vec::new();
    let mut annotation_groups: Vec<AnnotationGroup> = Vec::new();
    let static_metric_columns = build_static_metric_columns(config, bases.next_free);
    let action_order = static_metric_columns
        .iter()
        .map(|column| column.order + 1)
        .fold(ACTION_ORDER.max(bases.next_free), u32::max);
    let mut columns: Vec<TableColumn> = meta_columns(config, action_order);

    for (mapping, block) in mappings.iter().zip(blocks) {
        let meta = run.index.get(&mapping.step.key);
        let name = mapping.column.name.as_str();

        let (kind, order, width) = match block {
            StepKind::Input => {
                inputs += 1;
                (TableColumnKind::Input, bases.input + inputs - 1, widths.input)
            }
            StepKind::Invocation => {
                invocations += 1;
                (
                    TableColumnKind::Invocation,
                    bases.invocation + invocations - 1,
                    widths.invocation,
                )
            }
            _ => {
                annotations += 1;
                let kind = if mapping.column.kind == ColumnKind::Evaluator {
                    TableColumnKind::Evaluator
                } else {
                    TableColumnKind::Annotation
                };
                (kind, bases.annotation + annotations - 1, widths.annotation)
            }
        };

        let mut column = TableColumn::new(kind, name, order, width);
        column.step_key = Some(mapping.step.key.clone());
        column.path = Some(mapping.step.path.clone());
        column.path_segments = mapping.step.path.split('.').map(str::to_string).collect();
        column.step_type = Some(block);
        column.value_key = last_segment(&mapping.step.path).to_string();

        match block {
            StepKind::Input => {
                column.group_id = Some(INPUTS_GROUP.to_string());
                input_ids.push(column.id.clone());
            }
            StepKind::Invocation => {
                column.group_id = Some(OUTPUTS_GROUP.to_string());
                output_ids.push(column.id.clone());
            }
            _ => {
                enrich_annotation(&mut column, meta, &mut lookup);
                let group_id = match column.evaluator_id.as_deref() {
                    Some(id) => format!("annotation:{}", id),
                    None => SHARED_ANNOTATIONS_GROUP.to_string(),
                };
                match annotation_groups.iter_mut().find(|g| g.id == group_id) {
                    Some(group) => group.columns.push(column.id.clone()),
                    None => {
                        let label = column
                            .evaluator_name
                            .as_deref()
                            .or(column.evaluator_slug.as_deref())
                            .filter(|label| !label.is_empty())
                            .map(title_case)
                            .unwrap_or_else(|| "Annotations".to_string());
                        annotation_groups.push(AnnotationGroup {
                            id: group_id.clone(),
                            label,
                            columns: vec![column.id.clone()],
                        });
                    }
                }
                column.group_id = Some(group_id);
            }
        }
        columns.push(column);
    }

    columns.extend(static_metric_columns.iter().cloned());
    columns.sort_by_key(TableColumn::sort_key);

    let groups = build_groups(input_ids, output_ids, annotation_groups, &static_metric_columns);
    let ungrouped_columns: Vec<TableColumn> = columns
        .iter()
        .filter(|column| column.group_id.is_none())
        .cloned()
        .collect();
    let evaluators = evaluator_summaries(run, &mut lookup);

    tracing::debug!(
        run_id = %run.id,
        columns = columns.len(),
        groups = groups.len(),
        evaluators = evaluators.len(),
        "built run table model"
    );

    RunTableModel {
        columns,
        groups,
        static_metric_columns,
        evaluators,
        ungrouped_columns,
    }
}

/// Attach evaluator identity and metric metadata to an annotation column
fn enrich_annotation(
    column: &mut TableColumn,
    meta: Option<&StepMeta>,
    lookup: &mut EvaluatorLookup<'_>,
) {
    let ref_id = meta.and_then(StepMeta::evaluator_id);
    let ref_slug = meta.and_then(StepMeta::evaluator_slug);
    let definition = lookup.find(ref_id, ref_slug);

    column.evaluator_id = ref_id
        .map(str::to_string)
        .or_else(|| definition.map(|d| d.id.clone()))
        .filter(|id| !id.is_empty());
    column.evaluator_slug = ref_slug
        .map(str::to_string)
        .or_else(|| definition.map(|d| d.slug.clone()))
        .filter(|slug| !slug.is_empty());
    column.evaluator_name = definition.map(|d| d.label().to_string());

    let path = column.path.clone().unwrap_or_default();
    let metric_key = metric_key_from_path(&path).to_string();
    let slug = column.evaluator_slug.clone().unwrap_or_default();

    let matched = lookup
        .metrics(ref_id, ref_slug)
        .and_then(|metrics| match_metric(metrics, &metric_key))
        .cloned();
    if let Some(metric) = &matched {
        column.metric_type = Some(metric.metric_type.clone());
        column.display_label = metric.display_label.clone();
        column.description = metric.description.clone();
    }

    let primary = normalize_primary_key(&slug, &metric_key);
    column.fallback_keys =
        collect_fallback_keys(&slug, &metric_key, &primary, matched.as_ref().map(|m| &m.meta));
    column.stats_key = Some(primary);
    column.value_key = metric_key.clone();
    column.metric_key = Some(metric_key);
}

fn build_groups(
    input_ids: Vec<String>,
    output_ids: Vec<String>,
    annotation_groups: Vec<AnnotationGroup>,
    static_metric_columns: &[TableColumn],
) -> Vec<ColumnGroup> {
    let mut groups: Vec<ColumnGroup> = Vec::new();
    if !input_ids.is_empty() {
        groups.push(ColumnGroup {
            id: INPUTS_GROUP.to_string(),
            label: "Inputs".to_string(),
            kind: GroupKind::Input,
            columns: input_ids,
            order: INPUT_BASE,
        });
    }
    if !output_ids.is_empty() {
        groups.push(ColumnGroup {
            id: OUTPUTS_GROUP.to_string(),
            label: "Outputs".to_string(),
            kind: GroupKind::Invocation,
            columns: output_ids,
            order: INVOCATION_BASE,
        });
    }

    // one order step per group: only relative order matters
    let mut order = ANNOTATION_BASE;
    for group in annotation_groups {
        groups.push(ColumnGroup {
            id: group.id,
            label: group.label,
            kind: GroupKind::Annotation,
            columns: group.columns,
            order,
        });
        order += 1;
    }

    for (id, label) in [
        (AUTO_METRICS_GROUP, "Auto Metrics"),
        (HUMAN_METRICS_GROUP, "Human Metrics"),
    ] {
        let members: Vec<String> = static_metric_columns
            .iter()
            .filter(|column| column.group_id.as_deref() == Some(id))
            .map(|column| column.id.clone())
            .collect();
        if members.is_empty() {
            continue;
        }
        groups.push(ColumnGroup {
            id: id.to_string(),
            label: label.to_string(),
            kind: GroupKind::Metric,
            columns: members,
            order,
        });
        order += 1;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalgrid_core::{RunIndex, StaticMetricSpec};
    use serde_json::json;

    fn bare_config() -> GridConfig {
        GridConfig::without_static_metrics()
    }

    fn mapping(key: &str, path: &str, kind: ColumnKind, name: &str) -> RunMapping {
        RunMapping::new(key, path, kind, name)
    }

    #[test]
    fn test_meta_columns_only() {
        let model = build_run_table_model(&EvaluationRun::new("r"), &[], &bare_config());
        let ids: Vec<&str> = model.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["meta:scenarioIndex:0", "meta:status:1", "meta:action:10000"]);
        assert!(model.groups.is_empty());
        assert_eq!(model.ungrouped_columns.len(), 3);
        assert_eq!(model.columns[2].pinned, Some(ColumnPin::Right));
    }

    #[test]
    fn test_auto_view_has_no_action_column() {
        let config = bare_config().with_view(TableView::Auto);
        let model = build_run_table_model(&EvaluationRun::new("r"), &[], &config);
        assert_eq!(model.columns.len(), 2);
    }

    #[test]
    fn test_zero_mappings_keep_static_metric_groups() {
        let model = build_run_table_model(&EvaluationRun::new("r"), &[], &GridConfig::default());
        assert_eq!(model.columns.len(), 6);
        assert_eq!(model.static_metric_columns.len(), 3);
        assert_eq!(model.groups.len(), 1);
        assert_eq!(model.groups[0].id, AUTO_METRICS_GROUP);
        assert_eq!(model.groups[0].columns.len(), 3);
        assert_eq!(model.columns.last().unwrap().id, "meta:action:10000");
    }

    #[test]
    fn test_human_static_metrics_group() {
        let mut config = bare_config();
        config.static_metrics = vec![
            StaticMetricSpec::new("quality", "Quality", "number", MetricScope::Human),
            StaticMetricSpec::new("cost", "Cost", "number", MetricScope::Auto),
        ];
        let model = build_run_table_model(&EvaluationRun::new("r"), &[], &config);
        let ids: Vec<&str> = model.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec![AUTO_METRICS_GROUP, HUMAN_METRICS_GROUP]);
        assert_eq!(model.column("metric:cost:9000").unwrap().display_label, "Cost");
        assert!(model.column("metric:quality:9500").is_some());
    }

    #[test]
    fn test_missing_step_defaults_to_annotation_block() {
        let run = EvaluationRun::new("r").with_mapping(mapping(
            "unknown",
            "score",
            ColumnKind::Testset,
            "score",
        ));
        let model = build_run_table_model(&run, &[], &bare_config());
        let column = model.column("annotation:score:300").unwrap();
        assert_eq!(column.group_id.as_deref(), Some(SHARED_ANNOTATIONS_GROUP));
        assert_eq!(model.group(SHARED_ANNOTATIONS_GROUP).unwrap().label, "Annotations");
    }

    #[test]
    fn test_meta_step_uses_column_kind() {
        let run = EvaluationRun::new("r")
            .with_mapping(mapping("m", "out", ColumnKind::Invocation, "output"))
            .with_index(RunIndex::new().with_step("m", StepMeta::new(StepKind::Meta)));
        let model = build_run_table_model(&run, &[], &bare_config());
        assert!(model.column("invocation:output:200").is_some());
    }

    #[test]
    fn test_dedup_and_malformed_mappings_dropped() {
        let run = EvaluationRun::new("r")
            .with_mapping(mapping("s1", "testcase_dedup_id", ColumnKind::Testset, "testcase_dedup_id"))
            .with_raw_mapping(json!({ "step": { "key": "s1" }, "column": { "kind": "testset", "name": "x" } }))
            .with_mapping(mapping("s1", "age", ColumnKind::Testset, "age"))
            .with_index(RunIndex::new().with_step("s1", StepMeta::new(StepKind::Input)));
        let model = build_run_table_model(&run, &[], &bare_config());
        assert!(model.columns.iter().all(|c| !c.label.contains(DEDUP_MARKER)));
        assert!(model.column("input:age:100").is_some());
        assert_eq!(model.columns.len(), 4);
    }

    #[test]
    fn test_annotation_enrichment_from_schema() {
        let evaluator = EvaluatorDefinition::new("e1", "exact_match", "exact match").with_raw(json!({
            "data": { "schemas": { "outputs": { "properties": {
                "isCorrect": {
                    "type": "boolean",
                    "title": "Correct?",
                    "description": "Output equals reference",
                    "aliases": ["correct"]
                }
            } } } }
        }));
        let run = EvaluationRun::new("r")
            .with_mapping(mapping(
                "s3",
                "attributes.ag.data.outputs.isCorrect",
                ColumnKind::Annotation,
                "isCorrect",
            ))
            .with_index(RunIndex::new().with_step(
                "s3",
                StepMeta::new(StepKind::Annotation).with_evaluator("e1", "exact_match"),
            ));

        let model = build_run_table_model(&run, &[evaluator], &bare_config());
        let column = model.column("annotation:isCorrect:300").unwrap();
        assert_eq!(column.metric_key.as_deref(), Some("isCorrect"));
        assert_eq!(column.metric_type.as_deref(), Some("boolean"));
        assert_eq!(column.display_label, "Correct?");
        assert_eq!(column.description.as_deref(), Some("Output equals reference"));
        assert_eq!(column.evaluator_name.as_deref(), Some("exact match"));
        assert_eq!(column.stats_key.as_deref(), Some("exact_match.isCorrect"));
        assert!(column.fallback_keys.contains(&"exact_match.correct".to_string()));
        assert_eq!(column.path_segments.len(), 5);

        let group = model.group("annotation:e1").unwrap();
        assert_eq!(group.label, "Exact Match");
        assert_eq!(group.order, ANNOTATION_BASE);

        assert_eq!(model.evaluators.len(), 1);
        assert!(model.evaluators[0].metrics.contains_key("isCorrect"));
    }

    #[test]
    fn test_unmatched_metric_keeps_synthesized_label() {
        let run = EvaluationRun::new("r")
            .with_mapping(mapping("s3", "outputs.gold_answer", ColumnKind::Annotation, "gold_answer"))
            .with_index(RunIndex::new().with_step(
                "s3",
                StepMeta::new(StepKind::Annotation).with_evaluator("", "judge"),
            ));
        let model = build_run_table_model(&run, &[], &bare_config());
        let column = &model.columns[2];
        assert_eq!(column.display_label, "Gold Answer");
        assert_eq!(column.metric_type, None);
        assert_eq!(column.evaluator_slug.as_deref(), Some("judge"));
        assert_eq!(column.group_id.as_deref(), Some(SHARED_ANNOTATIONS_GROUP));
        assert_eq!(model.group(SHARED_ANNOTATIONS_GROUP).unwrap().label, "Judge");
    }

    #[test]
    fn test_annotation_groups_in_discovery_order() {
        let run = EvaluationRun::new("r")
            .with_mapping(mapping("b", "outputs.x", ColumnKind::Annotation, "x"))
            .with_mapping(mapping("a", "outputs.y", ColumnKind::Annotation, "y"))
            .with_mapping(mapping("b", "outputs.z", ColumnKind::Evaluator, "z"))
            .with_index(
                RunIndex::new()
                    .with_step("a", StepMeta::new(StepKind::Annotation).with_evaluator("ea", "a"))
                    .with_step("b", StepMeta::new(StepKind::Annotation).with_evaluator("eb", "b")),
            );
        let model = build_run_table_model(&run, &[], &bare_config());
        let groups: Vec<(&str, u32, usize)> = model
            .groups
            .iter()
            .map(|g| (g.id.as_str(), g.order, g.columns.len()))
            .collect();
        assert_eq!(groups, vec![("annotation:eb", 300, 2), ("annotation:ea", 301, 1)]);
        assert_eq!(model.column("evaluator:z:302").unwrap().kind, TableColumnKind::Evaluator);
    }

    #[test]
    fn test_overflowing_input_block_pushes_later_blocks() {
        let mut run = EvaluationRun::new("r")
            .with_index(
                RunIndex::new()
                    .with_step("in", StepMeta::new(StepKind::Input))
                    .with_step("inv", StepMeta::new(StepKind::Invocation)),
            )
            .with_mapping(mapping("inv", "out", ColumnKind::Invocation, "output"));
        for i in 0..150 {
            let name = format!("col{}", i);
            run = run.with_mapping(mapping("in", &name, ColumnKind::Testset, &name));
        }
        let model = build_run_table_model(&run, &[], &bare_config());
        let output = model.columns.iter().find(|c| c.label == "output").unwrap();
        assert_eq!(output.order, 250);
        let last_input = model.columns.iter().find(|c| c.label == "col149").unwrap();
        assert!(last_input.order < output.order);
    }

    #[test]
    fn test_metric_key_from_path() {
        assert_eq!(metric_key_from_path("attributes.ag.data.outputs.score"), "score");
        assert_eq!(metric_key_from_path("outputs.a.b"), "a.b");
        assert_eq!(metric_key_from_path("score"), "score");
        assert_eq!(metric_key_from_path("outputs."), "outputs.");
    }
}
