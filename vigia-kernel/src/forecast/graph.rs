//! Parsing of the graph endpoint payload.
//!
//! ```json
//! { "meta": { "start": 0, "end": 345600, "step": 86400, "legend": ["In", "Out"] },
//!   "data": [[10, -3], [12, -4], ...] }
//! ```
//!
//! `data` is either a flat list (one series) or a list of rows, one row per
//! timestamp and one column per legend entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphFormatError {
    #[error("missing `meta` object")]
    MissingMeta,
    #[error("missing or non-numeric meta field `{0}`")]
    InvalidMetaField(&'static str),
    #[error("sampling step must be positive, got {0}")]
    NonPositiveStep(i64),
    #[error("`data` must be an array")]
    InvalidData,
    #[error("declared length {declared} exceeds limit {limit}")]
    TooLong { declared: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub start: i64,
    pub end: i64,
    pub step: i64,
    pub legend: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesLayout {
    Flat,
    Rows,
}

/// Série brute, échantillons non encore assainis
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub index: usize,
    pub label: String,
    pub samples: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalBundle {
    pub meta: GraphMeta,
    pub layout: SeriesLayout,
    /// Longueur déclarée commune à toutes les séries
    pub declared_len: usize,
    pub series: Vec<RawSeries>,
}

impl HistoricalBundle {
    /// `max_len` borne la longueur déclarée, `meta.rows` compris
    pub fn from_value(payload: &Value, max_len: usize) -> Result<Self, GraphFormatError> {
        let meta_raw = payload.get("meta").filter(|m| m.is_object()).ok_or(GraphFormatError::MissingMeta)?;
        let start = meta_int(meta_raw, "start")?;
        let step = meta_int(meta_raw, "step")?;
        if step <= 0 {
            return Err(GraphFormatError::NonPositiveStep(step));
        }
        let end = meta_int(meta_raw, "end").unwrap_or(start);
        let legend: Vec<String> = meta_raw
            .get("legend")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .map(|l| l.as_str().map(str::to_string).unwrap_or_else(|| l.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let data = payload
            .get("data")
            .and_then(Value::as_array)
            .ok_or(GraphFormatError::InvalidData)?;

        let rows_declared = meta_raw.get("rows").and_then(as_int).and_then(|r| usize::try_from(r).ok());
        let declared_len = rows_declared.unwrap_or(data.len());
        if declared_len > max_len {
            return Err(GraphFormatError::TooLong {
                declared: declared_len,
                limit: max_len,
            });
        }

        let is_rows = !data.is_empty() && data.iter().all(|entry| entry.is_array() || entry.is_null())
            && data.iter().any(Value::is_array);

        let (layout, series) = if is_rows {
            let width = data
                .iter()
                .filter_map(Value::as_array)
                .map(Vec::len)
                .max()
                .unwrap_or(0)
                .max(legend.len());
            let series = (0..width)
                .map(|index| RawSeries {
                    index,
                    label: label_for(&legend, index),
                    samples: data
                        .iter()
                        .map(|row| row.get(index).cloned().unwrap_or(Value::Null))
                        .collect(),
                })
                .collect();
            (SeriesLayout::Rows, series)
        } else {
            let series = vec![RawSeries {
                index: 0,
                label: label_for(&legend, 0),
                samples: data.clone(),
            }];
            (SeriesLayout::Flat, series)
        };

        Ok(Self {
            meta: GraphMeta { start, end, step, legend },
            layout,
            declared_len,
            series,
        })
    }
}

fn label_for(legend: &[String], index: usize) -> String {
    legend.get(index).cloned().unwrap_or_else(|| format!("series_{index}"))
}

fn meta_int(meta: &Value, key: &'static str) -> Result<i64, GraphFormatError> {
    meta.get(key).and_then(as_int).ok_or(GraphFormatError::InvalidMetaField(key))
}

/// Entier JSON ou chaîne numérique
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
