//! Sample sanitation: token parsing, direction clamp, gap filling, padding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sens d'un canal: compteur positif, ou moitié négative d'un canal bidirectionnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn clamp(self, value: f64) -> f64 {
        match self {
            Direction::Positive => value.max(0.0),
            Direction::Negative => value.min(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFill {
    /// Interpolation linéaire entre voisins valides
    #[default]
    Linear,
    /// Dernière valeur valide
    Previous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub values: Vec<f64>,
    /// Échantillons nuls ou illisibles remplacés
    pub repaired: usize,
    /// Dernière valeur valide observée avant complétion
    pub last_valid: Option<f64>,
}

/// Lit un échantillon: nombre JSON, chaîne numérique, ou chaîne avec un
/// préfixe numérique suivi d'un marqueur (`"11JS:0"` → 11).
pub fn parse_sample(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>().ok().or_else(|| numeric_prefix(s))
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn numeric_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            has_digits = true;
            end = frac_end;
        }
    }
    if !has_digits {
        return None;
    }
    s[..end].parse::<f64>().ok()
}

/// Assainit une série et la ramène à `declared_len` échantillons.
pub fn sanitize(samples: &[Value], declared_len: usize, direction: Direction, gap_fill: GapFill) -> Sanitized {
    let parsed: Vec<Option<f64>> = samples
        .iter()
        .map(|s| parse_sample(s).map(|v| direction.clamp(v)))
        .collect();
    let repaired = parsed.iter().filter(|v| v.is_none()).count();
    let last_valid = parsed.iter().rev().find_map(|v| *v);

    let mut values = fill_gaps(&parsed, gap_fill);
    let pad = last_valid.unwrap_or(0.0);
    values.resize(declared_len, pad);

    Sanitized {
        values,
        repaired,
        last_valid,
    }
}

fn fill_gaps(parsed: &[Option<f64>], gap_fill: GapFill) -> Vec<f64> {
    let mut out = Vec::with_capacity(parsed.len());
    let first_valid = parsed.iter().find_map(|v| *v);
    let mut previous: Option<(usize, f64)> = None;

    for (i, sample) in parsed.iter().enumerate() {
        if let Some(v) = sample {
            out.push(*v);
            previous = Some((i, *v));
            continue;
        }
        let next = parsed[i + 1..]
            .iter()
            .enumerate()
            .find_map(|(offset, v)| v.map(|v| (i + 1 + offset, v)));

        let filled = match (previous, next, gap_fill) {
            (Some((pi, pv)), Some((ni, nv)), GapFill::Linear) => {
                pv + (nv - pv) * (i - pi) as f64 / (ni - pi) as f64
            }
            (Some((_, pv)), _, _) => pv,
            (None, Some(_), _) => first_valid.unwrap_or(0.0),
            (None, None, _) => 0.0,
        };
        out.push(filled);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn samples(v: Value) -> Vec<Value> {
        v.as_array().unwrap().clone()
    }

    #[test]
    fn parses_marker_suffixed_tokens() {
        assert_eq!(parse_sample(&json!("11JS:0")), Some(11.0));
        assert_eq!(parse_sample(&json!("2.5e3")), Some(2500.0));
        assert_eq!(parse_sample(&json!("-4.25abc")), Some(-4.25));
        assert_eq!(parse_sample(&json!("JS:0")), None);
        assert_eq!(parse_sample(&json!("NaN")), None);
        assert_eq!(parse_sample(&json!(null)), None);
        assert_eq!(parse_sample(&json!(true)), None);
    }

    #[test]
    fn hold_previous_reproduces_last_good_value() {
        let out = sanitize(&samples(json!([10, 12, "11JS:0", null, 15])), 5, Direction::Positive, GapFill::Previous);
        assert_eq!(out.values, vec![10.0, 12.0, 11.0, 11.0, 15.0]);
        assert_eq!(out.repaired, 1);
        assert_eq!(out.last_valid, Some(15.0));
    }

    #[test]
    fn linear_fill_interpolates_between_neighbours() {
        let out = sanitize(&samples(json!([10, null, null, 16])), 4, Direction::Positive, GapFill::Linear);
        assert_eq!(out.values, vec![10.0, 12.0, 14.0, 16.0]);
    }

    #[test]
    fn trailing_gap_holds_last_value_and_leading_gap_backfills() {
        let out = sanitize(&samples(json!([null, 4, 6, null, "x"])), 5, Direction::Positive, GapFill::Linear);
        assert_eq!(out.values, vec![4.0, 4.0, 6.0, 6.0, 6.0]);
    }

    #[test]
    fn all_invalid_becomes_zeros() {
        let out = sanitize(&samples(json!([null, "bad"])), 2, Direction::Positive, GapFill::Linear);
        assert_eq!(out.values, vec![0.0, 0.0]);
        assert_eq!(out.last_valid, None);
    }

    #[test]
    fn pads_with_last_valid_and_truncates() {
        let padded = sanitize(&samples(json!([1, 2])), 4, Direction::Positive, GapFill::Linear);
        assert_eq!(padded.values, vec![1.0, 2.0, 2.0, 2.0]);

        let truncated = sanitize(&samples(json!([1, 2, 3, 4])), 2, Direction::Positive, GapFill::Linear);
        assert_eq!(truncated.values, vec![1.0, 2.0]);

        let empty = sanitize(&[], 3, Direction::Positive, GapFill::Linear);
        assert_eq!(empty.values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn direction_clamps_sign() {
        let positive = sanitize(&samples(json!([-5, 3])), 2, Direction::Positive, GapFill::Linear);
        assert_eq!(positive.values, vec![0.0, 3.0]);

        let negative = sanitize(&samples(json!([-5, 3])), 2, Direction::Negative, GapFill::Linear);
        assert_eq!(negative.values, vec![-5.0, 0.0]);
    }
}
