//! Forecast model families behind one fit/forecast contract.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Lissage exponentiel de Holt (niveau + tendance)
    #[default]
    Smoothing,
    /// AR(p), Yule-Walker
    Autoregressive,
    /// Tendance linéaire + profil saisonnier additif
    AdditiveRegression,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ModelFittingFailure {
    #[error("insufficient data: need {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("series has zero variance")]
    ZeroVariance,
    #[error("fit did not converge: {0}")]
    NonConvergence(&'static str),
    #[error("model produced non-finite values")]
    NonFinite,
    #[error("model used before fit")]
    NotFitted,
}

pub trait ForecastModel: Send {
    fn family(&self) -> ModelFamily;
    fn fit(&mut self, history: &[f64]) -> Result<(), ModelFittingFailure>;
    fn forecast(&self, horizon: usize) -> Result<Vec<f64>, ModelFittingFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self { alpha: 0.3, beta: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoregressiveParams {
    pub order: usize,
    /// Différenciation d'ordre 1 avant l'ajustement
    pub difference: bool,
}

impl Default for AutoregressiveParams {
    fn default() -> Self {
        Self { order: 3, difference: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditiveParams {
    /// Période saisonnière en pas d'échantillonnage (7 = hebdo pour un pas journalier)
    pub period: usize,
}

impl Default for AdditiveParams {
    fn default() -> Self {
        Self { period: 7 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub smoothing: SmoothingParams,
    pub autoregressive: AutoregressiveParams,
    pub additive: AdditiveParams,
}

pub fn build_model(family: ModelFamily, params: &ModelParams) -> Box<dyn ForecastModel> {
    match family {
        ModelFamily::Smoothing => Box::new(HoltSmoothing::new(params.smoothing)),
        ModelFamily::Autoregressive => Box::new(Autoregressive::new(params.autoregressive)),
        ModelFamily::AdditiveRegression => Box::new(AdditiveRegression::new(params.additive)),
    }
}

fn finite(values: Vec<f64>) -> Result<Vec<f64>, ModelFittingFailure> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(values)
    } else {
        Err(ModelFittingFailure::NonFinite)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// ============================================================================
// HOLT
// ============================================================================

pub struct HoltSmoothing {
    params: SmoothingParams,
    state: Option<(f64, f64)>,
}

impl HoltSmoothing {
    pub fn new(params: SmoothingParams) -> Self {
        Self { params, state: None }
    }
}

impl ForecastModel for HoltSmoothing {
    fn family(&self) -> ModelFamily {
        ModelFamily::Smoothing
    }

    fn fit(&mut self, history: &[f64]) -> Result<(), ModelFittingFailure> {
        if history.len() < 2 {
            return Err(ModelFittingFailure::InsufficientData { needed: 2, got: history.len() });
        }
        let SmoothingParams { alpha, beta } = self.params;
        if !(0.0..=1.0).contains(&alpha) || !(0.0..=1.0).contains(&beta) {
            return Err(ModelFittingFailure::NonConvergence("smoothing factors outside [0, 1]"));
        }

        let mut level = history[0];
        let mut trend = history[1] - history[0];
        for &value in &history[1..] {
            let prev_level = level;
            level = alpha * value + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        }
        if !level.is_finite() || !trend.is_finite() {
            return Err(ModelFittingFailure::NonFinite);
        }
        self.state = Some((level, trend));
        Ok(())
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<f64>, ModelFittingFailure> {
        let (level, trend) = self.state.ok_or(ModelFittingFailure::NotFitted)?;
        finite((1..=horizon).map(|h| level + trend * h as f64).collect())
    }
}

// ============================================================================
// AR(p)
// ============================================================================

pub struct Autoregressive {
    params: AutoregressiveParams,
    fitted: Option<ArFit>,
}

struct ArFit {
    coefficients: Vec<f64>,
    mean: f64,
    /// Dernières valeurs de la série modélisée (différenciée ou non), plus récente en dernier
    tail: Vec<f64>,
    /// Dernier niveau observé, pour réintégrer une série différenciée
    last_level: f64,
}

impl Autoregressive {
    pub fn new(params: AutoregressiveParams) -> Self {
        Self { params, fitted: None }
    }
}

/// Levinson-Durbin sur les autocovariances r[0..=p]
fn levinson_durbin(r: &[f64], order: usize) -> Result<Vec<f64>, ModelFittingFailure> {
    let mut phi = vec![0.0; order];
    let mut error = r[0];
    for k in 0..order {
        let mut acc = r[k + 1];
        for j in 0..k {
            acc -= phi[j] * r[k - j];
        }
        let reflection = acc / error;
        if !reflection.is_finite() || reflection.abs() >= 1.0 {
            return Err(ModelFittingFailure::NonConvergence("non-stationary reflection coefficient"));
        }
        let previous = phi.clone();
        phi[k] = reflection;
        for j in 0..k {
            phi[j] = previous[j] - reflection * previous[k - 1 - j];
        }
        error *= 1.0 - reflection * reflection;
    }
    Ok(phi)
}

impl ForecastModel for Autoregressive {
    fn family(&self) -> ModelFamily {
        ModelFamily::Autoregressive
    }

    fn fit(&mut self, history: &[f64]) -> Result<(), ModelFittingFailure> {
        let order = self.params.order.max(1);
        let series: Vec<f64> = if self.params.difference {
            history.windows(2).map(|w| w[1] - w[0]).collect()
        } else {
            history.to_vec()
        };
        let needed = 2 * order + 1;
        if series.len() < needed {
            return Err(ModelFittingFailure::InsufficientData { needed, got: series.len() });
        }

        let mu = mean(&series);
        let n = series.len() as f64;
        let autocov: Vec<f64> = (0..=order)
            .map(|lag| {
                series[lag..]
                    .iter()
                    .zip(series.iter())
                    .map(|(a, b)| (a - mu) * (b - mu))
                    .sum::<f64>()
                    / n
            })
            .collect();
        if autocov[0] <= f64::EPSILON {
            return Err(ModelFittingFailure::ZeroVariance);
        }

        let coefficients = levinson_durbin(&autocov, order)?;
        self.fitted = Some(ArFit {
            coefficients,
            mean: mu,
            tail: series[series.len() - order..].to_vec(),
            last_level: history.last().copied().unwrap_or(0.0),
        });
        Ok(())
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<f64>, ModelFittingFailure> {
        let fit = self.fitted.as_ref().ok_or(ModelFittingFailure::NotFitted)?;
        let mut window = fit.tail.clone();
        let mut level = fit.last_level;
        let mut out = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let next = fit.mean
                + fit
                    .coefficients
                    .iter()
                    .zip(window.iter().rev())
                    .map(|(phi, x)| phi * (x - fit.mean))
                    .sum::<f64>();
            window.remove(0);
            window.push(next);
            if self.params.difference {
                level += next;
                out.push(level);
            } else {
                out.push(next);
            }
        }
        finite(out)
    }
}

// ============================================================================
// RÉGRESSION ADDITIVE
// ============================================================================

pub struct AdditiveRegression {
    params: AdditiveParams,
    fitted: Option<AdditiveFit>,
}

struct AdditiveFit {
    intercept: f64,
    slope: f64,
    seasonal: Vec<f64>,
    len: usize,
}

impl AdditiveRegression {
    pub fn new(params: AdditiveParams) -> Self {
        Self { params, fitted: None }
    }
}

impl ForecastModel for AdditiveRegression {
    fn family(&self) -> ModelFamily {
        ModelFamily::AdditiveRegression
    }

    fn fit(&mut self, history: &[f64]) -> Result<(), ModelFittingFailure> {
        let n = history.len();
        if n < 2 {
            return Err(ModelFittingFailure::InsufficientData { needed: 2, got: n });
        }

        // moindres carrés sur t = 0..n
        let t_mean = (n - 1) as f64 / 2.0;
        let y_mean = mean(history);
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (t, y) in history.iter().enumerate() {
            let dt = t as f64 - t_mean;
            sxy += dt * (y - y_mean);
            sxx += dt * dt;
        }
        let slope = sxy / sxx;
        let intercept = y_mean - slope * t_mean;
        if !slope.is_finite() || !intercept.is_finite() {
            return Err(ModelFittingFailure::NonFinite);
        }

        let period = self.params.period;
        let seasonal = if period >= 2 && n >= 2 * period {
            let mut sums = vec![0.0; period];
            let mut counts = vec![0usize; period];
            for (t, y) in history.iter().enumerate() {
                let residual = y - (intercept + slope * t as f64);
                sums[t % period] += residual;
                counts[t % period] += 1;
            }
            let raw: Vec<f64> = sums.iter().zip(&counts).map(|(s, c)| s / *c as f64).collect();
            let centre = mean(&raw);
            raw.into_iter().map(|s| s - centre).collect()
        } else {
            Vec::new()
        };

        self.fitted = Some(AdditiveFit { intercept, slope, seasonal, len: n });
        Ok(())
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<f64>, ModelFittingFailure> {
        let fit = self.fitted.as_ref().ok_or(ModelFittingFailure::NotFitted)?;
        let values = (0..horizon)
            .map(|h| {
                let t = fit.len + h;
                let season = if fit.seasonal.is_empty() {
                    0.0
                } else {
                    fit.seasonal[t % fit.seasonal.len()]
                };
                fit.intercept + fit.slope * t as f64 + season
            })
            .collect();
        finite(values)
    }
}
