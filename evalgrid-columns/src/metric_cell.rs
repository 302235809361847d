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

//! Metric cell helpers: stats lookup and value formatting

use crate::column_builder::TableColumn;
use serde_json::{Map, Value};

/// Placeholder for missing metric values
pub const MISSING_VALUE: &str = "n/a";

/// Find a column's entry in run-level metric stats.
///
/// Tries the stats key, then the raw metric key, then each fallback key.
/// Returns the key that matched along with the entry.
pub fn lookup_metric_stats<'a, 'c>(
    stats: &'a Map<String, Value>,
    column: &'c TableColumn,
) -> Option<(&'c str, &'a Value)> {
    let keys = column
        .stats_key
        .iter()
        .chain(column.metric_key.iter())
        .chain(column.fallback_keys.iter());
    for key in keys {
        if let Some(value) = stats.get(key.as_str()) {
            return Some((key.as_str(), value));
        }
    }
    None
}

/// Unwrap an aggregated stats entry to the value worth displaying.
///
/// `{mean}` yields the mean, `{value}` the value, and `{freq: [{value,
/// count}]}` the most frequent value. Anything else is returned as is.
pub fn metric_display_value(entry: &Value) -> &Value {
    let Value::Object(map) = entry else {
        return entry;
    };
    if let Some(mean) = map.get("mean").filter(|v| !v.is_null()) {
        return mean;
    }
    if let Some(value) = map.get("value") {
        return value;
    }
    if let Some(Value::Array(freq)) = map.get("freq") {
        let mut best: Option<(&Value, f64)> = None;
        for bucket in freq {
            let count = bucket.get("count").and_then(Value::as_f64).unwrap_or(0.0);
            if let Some(value) = bucket.get("value") {
                if best.map_or(true, |(_, top)| count > top) {
                    best = Some((value, count));
                }
            }
        }
        if let Some((value, _)) = best {
            return value;
        }
    }
    entry
}

fn format_number(value: f64) -> String {
    let text = format!("{:.3}", value);
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Render a metric value for a table cell
pub fn format_metric_value(value: Option<&Value>, metric_type: Option<&str>) -> String {
    let Some(value) = value else {
        return MISSING_VALUE.to_string();
    };
    let boolean = metric_type == Some("boolean");
    match value {
        Value::Null => MISSING_VALUE.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(n) if boolean && (n.as_f64() == Some(0.0) || n.as_f64() == Some(1.0)) => {
            (n.as_f64() == Some(1.0)).to_string()
        }
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                n.as_f64().map(format_number).unwrap_or_else(|| n.to_string())
            }
        }
        Value::String(text) if boolean => match text.to_ascii_lowercase().as_str() {
            "true" => "true".to_string(),
            "false" => "false".to_string(),
            _ => text.clone(),
        },
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| format_metric_value(Some(item), metric_type))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}
