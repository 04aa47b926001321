/**
 * MOTEUR DE PRÉVISION - Prévision série par série d'un bundle historique
 *
 * RÔLE : Assainit chaque série, ajuste le modèle configuré, et retombe sur un
 * repli déterministe dès que l'ajustement échoue. Aucune erreur de modèle ne
 * sort de ce module.
 *
 * ÉTAPES (par série, indépendamment) :
 * 1. assainissement + complétion à la longueur déclarée (sanitize)
 * 2. série trop courte → répétition de la dernière valeur
 * 3. sinon fit/forecast via ForecastModel, repli FallbackPolicy en cas d'échec
 * 4. bornage selon le sens du canal
 */

pub mod graph;
pub mod models;
pub mod sanitize;

use graph::{GraphFormatError, GraphMeta, HistoricalBundle, RawSeries, SeriesLayout};
use models::{build_model, ModelFamily, ModelParams};
use sanitize::{sanitize, Direction, GapFill};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Répète la dernière valeur observée
    #[default]
    LastValue,
    /// Moyenne de la dernière valeur et de la moyenne historique
    BlendMean,
}

/// Convention qui indique quelles séries sont la moitié négative d'un canal bidirectionnel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelConvention {
    /// Compteurs uniquement, tout est positif
    #[default]
    Unsigned,
    /// Libellés contenant un marqueur (insensible à la casse) → négatif
    LegendMarkers { markers: Vec<String> },
    /// Positions impaires → négatif (paires in/out)
    AlternatingPairs,
}

impl ChannelConvention {
    pub fn direction(&self, index: usize, label: &str) -> Direction {
        match self {
            ChannelConvention::Unsigned => Direction::Positive,
            ChannelConvention::LegendMarkers { markers } => {
                let label = label.to_ascii_lowercase();
                if markers.iter().any(|m| label.contains(&m.to_ascii_lowercase())) {
                    Direction::Negative
                } else {
                    Direction::Positive
                }
            }
            ChannelConvention::AlternatingPairs if index % 2 == 1 => Direction::Negative,
            ChannelConvention::AlternatingPairs => Direction::Positive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub family: ModelFamily,
    pub horizon: usize,
    pub min_samples: usize,
    pub fallback: FallbackPolicy,
    pub gap_fill: GapFill,
    pub channels: ChannelConvention,
    /// Longueur déclarée maximale d'une série historique
    pub max_series_len: usize,
    pub params: ModelParams,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            family: ModelFamily::Smoothing,
            horizon: 7,
            min_samples: 10,
            fallback: FallbackPolicy::LastValue,
            gap_fill: GapFill::Linear,
            // graph.php multi-port_bits_separate : colonnes in/out alternées
            channels: ChannelConvention::AlternatingPairs,
            max_series_len: 100_000,
            params: ModelParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesForecast {
    pub index: usize,
    pub label: String,
    pub model: ModelFamily,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMeta {
    pub start: i64,
    pub end: i64,
    pub step: i64,
    pub legend: Vec<String>,
    pub forecast_start: i64,
    pub forecast_end: i64,
    pub horizon: usize,
}

/// Même forme que `data` en entrée
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForecastData {
    Flat(Vec<f64>),
    Rows(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastBundle {
    pub meta: ForecastMeta,
    pub data: ForecastData,
    pub series: Vec<SeriesForecast>,
}

#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Parse le payload du graphe puis le prévoit
    pub fn forecast_value(&self, payload: &Value) -> Result<ForecastBundle, GraphFormatError> {
        let bundle = HistoricalBundle::from_value(payload, self.config.max_series_len)?;
        Ok(self.forecast_bundle(&bundle))
    }

    pub fn forecast_bundle(&self, bundle: &HistoricalBundle) -> ForecastBundle {
        let horizon = self.config.horizon;
        let series: Vec<SeriesForecast> = bundle
            .series
            .iter()
            .map(|raw| self.forecast_series(raw, bundle.declared_len))
            .collect();

        let data = match bundle.layout {
            SeriesLayout::Flat => ForecastData::Flat(series.first().map(|s| s.values.clone()).unwrap_or_default()),
            SeriesLayout::Rows => ForecastData::Rows(
                (0..horizon)
                    .map(|h| series.iter().map(|s| s.values[h]).collect())
                    .collect(),
            ),
        };

        ForecastBundle {
            meta: forecast_meta(&bundle.meta, bundle.declared_len, horizon),
            data,
            series,
        }
    }

    fn forecast_series(&self, raw: &RawSeries, declared_len: usize) -> SeriesForecast {
        let cfg = &self.config;
        let direction = cfg.channels.direction(raw.index, &raw.label);
        let clean = sanitize(&raw.samples, declared_len, direction, cfg.gap_fill);
        if clean.repaired > 0 {
            debug!(series = %raw.label, repaired = clean.repaired, "samples repaired");
        }
        let history = clean.values;
        let last = history.last().copied().unwrap_or(0.0);

        let (values, fallback_reason) = if history.len() < cfg.min_samples {
            (
                vec![last; cfg.horizon],
                Some(format!("{} samples below minimum {}", history.len(), cfg.min_samples)),
            )
        } else {
            let mut model = build_model(cfg.family, &cfg.params);
            match model.fit(&history).and_then(|_| model.forecast(cfg.horizon)) {
                Ok(values) if values.len() == cfg.horizon => (values, None),
                Ok(_) => (self.fallback_values(&history), Some("model returned a short forecast".to_string())),
                Err(failure) => (self.fallback_values(&history), Some(failure.to_string())),
            }
        };

        if let Some(reason) = &fallback_reason {
            debug!(series = %raw.label, family = ?cfg.family, %reason, "forecast fallback");
        }

        SeriesForecast {
            index: raw.index,
            label: raw.label.clone(),
            model: cfg.family,
            fallback: fallback_reason.is_some(),
            fallback_reason,
            values: values.into_iter().map(|v| direction.clamp(v)).collect(),
        }
    }

    fn fallback_values(&self, history: &[f64]) -> Vec<f64> {
        let last = history.last().copied().unwrap_or(0.0);
        let value = match self.config.fallback {
            FallbackPolicy::LastValue => last,
            FallbackPolicy::BlendMean if history.is_empty() => last,
            FallbackPolicy::BlendMean => {
                let mean = history.iter().sum::<f64>() / history.len() as f64;
                (last + mean) / 2.0
            }
        };
        vec![value; self.config.horizon]
    }
}

fn forecast_meta(meta: &GraphMeta, len: usize, horizon: usize) -> ForecastMeta {
    let forecast_start = meta.start.saturating_add(meta.step.saturating_mul(len as i64));
    ForecastMeta {
        start: meta.start,
        end: meta.end,
        step: meta.step,
        legend: meta.legend.clone(),
        forecast_start,
        forecast_end: forecast_start.saturating_add(meta.step.saturating_mul(horizon as i64)),
        horizon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine(family: ModelFamily, horizon: usize, min_samples: usize) -> ForecastEngine {
        ForecastEngine::new(ForecastConfig {
            family,
            horizon,
            min_samples,
            ..Default::default()
        })
    }

    #[test]
    fn short_series_repeats_last_value() {
        let payload = json!({
            "meta": {"start": 0, "end": 345600, "step": 86400, "legend": ["traffic"]},
            "data": [10, 12, "11JS:0", null, 15]
        });
        let out = engine(ModelFamily::Smoothing, 2, 10).forecast_value(&payload).unwrap();

        assert_eq!(out.data, ForecastData::Flat(vec![15.0, 15.0]));
        assert!(out.series[0].fallback);
        assert_eq!(out.meta.forecast_start, 5 * 86400);
        assert_eq!(out.meta.forecast_end, 7 * 86400);
        assert_eq!(out.meta.step, 86400);
    }

    #[test]
    fn fallback_ignores_model_family_for_short_series() {
        let payload = json!({"meta": {"start": 0, "step": 60}, "data": [3, 4, 8]});
        for family in [ModelFamily::Smoothing, ModelFamily::Autoregressive, ModelFamily::AdditiveRegression] {
            let out = engine(family, 3, 10).forecast_value(&payload).unwrap();
            assert_eq!(out.data, ForecastData::Flat(vec![8.0, 8.0, 8.0]), "{family:?}");
        }
    }

    #[test]
    fn horizon_and_start_follow_declared_length() {
        let data: Vec<Value> = (0..30).map(|t| json!(t * 2)).collect();
        let payload = json!({"meta": {"start": 1000, "step": 300, "rows": 32}, "data": data});
        let out = engine(ModelFamily::Smoothing, 5, 10).forecast_value(&payload).unwrap();

        assert_eq!(out.meta.forecast_start, 1000 + 32 * 300);
        assert_eq!(out.meta.horizon, 5);
        assert_eq!(out.series[0].values.len(), 5);
        assert!(!out.series[0].fallback);
    }

    #[test]
    fn counter_forecasts_never_go_negative() {
        // tendance fortement décroissante
        let data: Vec<Value> = (0..20).map(|t| json!(100 - t * 5)).collect();
        let payload = json!({"meta": {"start": 0, "step": 1}, "data": data});
        let out = engine(ModelFamily::Smoothing, 10, 10).forecast_value(&payload).unwrap();
        assert!(out.series[0].values.iter().all(|v| *v >= 0.0));
        assert_eq!(out.series[0].values[9], 0.0);
    }

    #[test]
    fn failed_fit_uses_configured_fallback() {
        // variance nulle → l'AR échoue
        let payload = json!({"meta": {"start": 0, "step": 1}, "data": vec![4; 12]});
        let mut config = ForecastConfig {
            family: ModelFamily::Autoregressive,
            horizon: 2,
            ..Default::default()
        };
        config.params.autoregressive.difference = false;

        let out = ForecastEngine::new(config.clone()).forecast_value(&payload).unwrap();
        assert!(out.series[0].fallback);
        assert_eq!(out.series[0].values, vec![4.0, 4.0]);

        config.fallback = FallbackPolicy::BlendMean;
        let blended = ForecastEngine::new(config).forecast_value(&json!({
            "meta": {"start": 0, "step": 1},
            "data": [2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2]
        }));
        assert_eq!(blended.unwrap().series[0].values, vec![2.0, 2.0]);
    }

    #[test]
    fn blend_mean_averages_last_and_history() {
        let engine = ForecastEngine::new(ForecastConfig {
            horizon: 1,
            fallback: FallbackPolicy::BlendMean,
            ..Default::default()
        });
        assert_eq!(engine.fallback_values(&[0.0, 0.0, 6.0]), vec![4.0]);
    }

    #[test]
    fn rows_layout_is_mirrored_with_signed_halves() {
        let rows: Vec<Value> = (0..4).map(|t| json!([10 + t, -(10 + t)])).collect();
        let payload = json!({"meta": {"start": 0, "step": 86400, "legend": ["In", "Out"]}, "data": rows});
        let out = ForecastEngine::new(ForecastConfig {
            horizon: 3,
            ..Default::default()
        })
        .forecast_value(&payload)
        .unwrap();

        let ForecastData::Rows(rows) = &out.data else {
            panic!("expected rows layout, got {:?}", out.data)
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![13.0, -13.0]);
        assert_eq!(out.series[1].label, "Out");
    }

    #[test]
    fn huge_declared_rows_is_a_format_error() {
        let payload = json!({"meta": {"start": 0, "step": 60, "rows": 4611686018427387904u64}, "data": [1, 2, 3]});
        let err = ForecastEngine::default().forecast_value(&payload).unwrap_err();
        assert!(matches!(err, GraphFormatError::TooLong { limit: 100_000, .. }));
    }

    #[test]
    fn unsigned_convention_clamps_every_series() {
        let payload = json!({"meta": {"start": 0, "step": 1}, "data": [[5, -5], [6, -6]]});
        let out = ForecastEngine::new(ForecastConfig {
            horizon: 1,
            channels: ChannelConvention::Unsigned,
            ..Default::default()
        })
        .forecast_value(&payload)
        .unwrap();
        assert_eq!(out.data, ForecastData::Rows(vec![vec![6.0, 0.0]]));
    }

    #[test]
    fn legend_markers_pick_negative_series() {
        let convention = ChannelConvention::LegendMarkers { markers: vec!["out".into()] };
        assert_eq!(convention.direction(0, "Inbound"), Direction::Positive);
        assert_eq!(convention.direction(1, "OUTbound"), Direction::Negative);
    }

    #[test]
    fn malformed_payload_is_reported() {
        let err = ForecastEngine::default().forecast_value(&json!({"meta": {"start": 0}, "data": []}));
        assert_eq!(err, Err(GraphFormatError::InvalidMetaField("step")));
    }
}
