//! Seasonal ARIMA fitted by conditional sum of squares, plus stepwise order search.
//!
//! The model is the multiplicative `(p,d,q)x(P,D,Q,m)` form. The series is
//! differenced `d` times at lag 1 and `D` times at lag `m`, standardised, and
//! the ARMA coefficients plus an intercept are estimated by minimising the
//! conditional sum of squared one-step residuals with Nelder–Mead.
//! Coefficients are `tanh`-bounded and divided by their count so that the
//! absolute coefficients of each polynomial sum below one.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::SeasonalSearchConfig;
use crate::error::{EngineError, Result};
use crate::grid::Granularity;

use super::optimize::NelderMead;
use super::params::ModelParameters;

const MIN_VARIANCE: f64 = 1e-12;
const MAX_STEPWISE_FITS: usize = 100;

/// Seasonal period `m` used for each granularity: weekly for daily data.
pub fn seasonal_period(granularity: Granularity) -> usize {
    match granularity {
        Granularity::FiveMin => 288,
        Granularity::Hourly => 24,
        Granularity::Daily => 7,
        Granularity::Monthly => 12,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SarimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl SarimaOrder {
    pub fn new(order: (usize, usize, usize), seasonal: (usize, usize, usize, usize)) -> Self {
        Self {
            p: order.0,
            d: order.1,
            q: order.2,
            seasonal_p: seasonal.0,
            seasonal_d: seasonal.1,
            seasonal_q: seasonal.2,
            period: seasonal.3.max(1),
        }
    }

    pub fn from_params(params: &ModelParameters) -> Option<Self> {
        match *params {
            ModelParameters::Seasonal {
                order,
                seasonal_order,
            } => Some(Self::new(order, seasonal_order)),
            ModelParameters::Knn { .. } => None,
        }
    }

    pub fn to_params(self) -> ModelParameters {
        ModelParameters::Seasonal {
            order: (self.p, self.d, self.q),
            seasonal_order: (self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period),
        }
    }

    fn n_coefficients(self) -> usize {
        self.p + self.q + self.seasonal_p + self.seasonal_q
    }

    fn ar_span(self) -> usize {
        self.p + self.seasonal_p * self.period
    }

    fn ma_span(self) -> usize {
        self.q + self.seasonal_q * self.period
    }

    fn differencing_loss(self) -> usize {
        self.d + self.seasonal_d * self.period
    }

    /// Shortest series this order can be fitted to.
    pub fn min_observations(self) -> usize {
        self.differencing_loss() + self.ar_span() + self.ma_span() + self.n_coefficients() + 2
    }
}

impl fmt::Display for SarimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{})x({},{},{},{})",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
        )
    }
}

/// Coefficients unpacked from the optimiser's raw vector.
#[derive(Debug, Clone, PartialEq)]
struct Coefficients {
    ar: Vec<f64>,
    ma: Vec<f64>,
    seasonal_ar: Vec<f64>,
    seasonal_ma: Vec<f64>,
    intercept: f64,
}

impl Coefficients {
    fn from_raw(order: SarimaOrder, raw: &[f64]) -> Self {
        let mut it = raw.iter().copied();
        let mut take = |n: usize| -> Vec<f64> {
            let bound = n.max(1) as f64;
            it.by_ref().take(n).map(|x| x.tanh() / bound).collect()
        };
        let ar = take(order.p);
        let ma = take(order.q);
        let seasonal_ar = take(order.seasonal_p);
        let seasonal_ma = take(order.seasonal_q);
        let intercept = raw.last().copied().unwrap_or(0.0);
        Self {
            ar,
            ma,
            seasonal_ar,
            seasonal_ma,
            intercept,
        }
    }

    /// AR side as sparse `(lag, coef)` in `z_t = sum coef * z_{t-lag}` form.
    fn ar_terms(&self, period: usize) -> Vec<(usize, f64)> {
        // (1 - a(B))(1 - A(B^m)) = 1 - a(B) - A(B^m) + a(B)A(B^m)
        let mut terms = Vec::new();
        for (i, a) in self.ar.iter().enumerate() {
            terms.push((i + 1, *a));
        }
        for (j, sa) in self.seasonal_ar.iter().enumerate() {
            terms.push(((j + 1) * period, *sa));
            for (i, a) in self.ar.iter().enumerate() {
                terms.push((i + 1 + (j + 1) * period, -a * sa));
            }
        }
        terms
    }

    /// MA side as sparse `(lag, coef)` in `+ sum coef * e_{t-lag}` form.
    fn ma_terms(&self, period: usize) -> Vec<(usize, f64)> {
        let mut terms = Vec::new();
        for (i, b) in self.ma.iter().enumerate() {
            terms.push((i + 1, *b));
        }
        for (j, sb) in self.seasonal_ma.iter().enumerate() {
            terms.push(((j + 1) * period, *sb));
            for (i, b) in self.ma.iter().enumerate() {
                terms.push((i + 1 + (j + 1) * period, b * sb));
            }
        }
        terms
    }
}

/// One-step residuals and their sum of squares over `start..`, conditioning
/// on the observations before `start` and zero pre-sample errors.
///
/// `start` must be at least the largest AR lag.
fn conditional_residuals(
    z: &[f64],
    ar: &[(usize, f64)],
    ma: &[(usize, f64)],
    mu: f64,
    start: usize,
) -> (Vec<f64>, f64) {
    let mut e = vec![0.0; z.len()];
    let mut css = 0.0;
    for t in start..z.len() {
        let mut pred = mu;
        for &(lag, c) in ar {
            pred += c * (z[t - lag] - mu);
        }
        for &(lag, c) in ma {
            if lag <= t {
                pred += c * e[t - lag];
            }
        }
        e[t] = z[t] - pred;
        css += e[t] * e[t];
    }
    (e, css)
}

fn difference(series: &[f64], lag: usize) -> Vec<f64> {
    series.windows(lag + 1).map(|w| w[lag] - w[0]).collect()
}

/// Inverts one differencing step, continuing `history` with `diffs`.
fn integrate(history: &[f64], diffs: &[f64], lag: usize) -> Vec<f64> {
    let mut ext = history.to_vec();
    for &x in diffs {
        let v = x + ext[ext.len() - lag];
        ext.push(v);
    }
    ext.split_off(history.len())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

/// A fitted seasonal ARIMA model.
#[derive(Debug, Clone)]
pub struct Sarima {
    order: SarimaOrder,
    coefficients: Coefficients,
    /// Series after each differencing step; `stages[0]` is the input.
    stages: Vec<Vec<f64>>,
    /// Standardised, fully differenced series.
    z: Vec<f64>,
    residuals: Vec<f64>,
    center: f64,
    scale: f64,
    sigma2: f64,
    aic: f64,
}

impl Sarima {
    /// Fits `order` to `series`, conditioning on its own AR span.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Model`] if the series is shorter than
    /// [`SarimaOrder::min_observations`] or the fit does not converge to a
    /// finite objective.
    pub fn fit(series: &[f64], order: SarimaOrder, max_iterations: usize) -> Result<Self> {
        Self::fit_conditioned(series, order, max_iterations, order.ar_span())
    }

    /// Fits `order` with the residual sum starting `condition_on` steps into
    /// the differenced series.
    ///
    /// Candidates sharing `d`, `D` and `condition_on` are scored over the same
    /// residuals on the standardised series, so their AICs are comparable and
    /// do not depend on the units of `series`.
    ///
    /// # Errors
    ///
    /// See [`Sarima::fit`].
    pub fn fit_conditioned(
        series: &[f64],
        order: SarimaOrder,
        max_iterations: usize,
        condition_on: usize,
    ) -> Result<Self> {
        let start = condition_on.max(order.ar_span());
        let required = order.min_observations() + (start - order.ar_span());
        if series.len() < required {
            return Err(EngineError::Model(format!(
                "sarima{order} needs {required} observations, got {}",
                series.len()
            )));
        }

        let mut stages = vec![series.to_vec()];
        for k in 0..order.d + order.seasonal_d {
            let lag = if k < order.d { 1 } else { order.period };
            let next = difference(&stages[stages.len() - 1], lag);
            stages.push(next);
        }
        let w = &stages[stages.len() - 1];

        let center = mean(w);
        let var = w.iter().map(|x| (x - center).powi(2)).sum::<f64>() / w.len() as f64;
        let scale = if var > MIN_VARIANCE { var.sqrt() } else { 1.0 };
        let z: Vec<f64> = w.iter().map(|x| (x - center) / scale).collect();

        let objective = |raw: &[f64]| {
            let c = Coefficients::from_raw(order, raw);
            conditional_residuals(&z, &c.ar_terms(order.period), &c.ma_terms(order.period), c.intercept, start).1
        };
        let x0 = vec![0.0; order.n_coefficients() + 1];
        let (best, css) = NelderMead::new(max_iterations).minimize(objective, &x0);
        if !css.is_finite() {
            return Err(EngineError::Model(format!("sarima{order} fit diverged")));
        }

        let coefficients = Coefficients::from_raw(order, &best);
        let (residuals, css) = conditional_residuals(
            &z,
            &coefficients.ar_terms(order.period),
            &coefficients.ma_terms(order.period),
            coefficients.intercept,
            start,
        );
        let n_eff = (z.len() - start) as f64;
        let standardised = (css / n_eff).max(MIN_VARIANCE);
        let sigma2 = standardised * scale * scale;
        let k = (order.n_coefficients() + 1) as f64;
        let aic = n_eff * standardised.ln() + 2.0 * (k + 1.0);

        Ok(Self {
            order,
            coefficients,
            stages,
            z,
            residuals,
            center,
            scale,
            sigma2,
            aic,
        })
    }

    pub fn order(&self) -> SarimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Forecasts `steps` periods past the end of the fitted series, in levels,
    /// clamped at zero.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let ar = self.coefficients.ar_terms(self.order.period);
        let ma = self.coefficients.ma_terms(self.order.period);
        let mu = self.coefficients.intercept;
        let n = self.z.len();

        let mut z = self.z.clone();
        let mut e = self.residuals.clone();
        for _ in 0..steps {
            let t = z.len();
            let mut pred = mu;
            for &(lag, c) in &ar {
                if lag <= t {
                    pred += c * (z[t - lag] - mu);
                }
            }
            for &(lag, c) in &ma {
                if lag <= t {
                    pred += c * e[t - lag];
                }
            }
            z.push(pred);
            e.push(0.0);
        }

        let mut levels: Vec<f64> = z[n..].iter().map(|v| v * self.scale + self.center).collect();
        for k in (1..self.stages.len()).rev() {
            let lag = if k <= self.order.d { 1 } else { self.order.period };
            levels = integrate(&self.stages[k - 1], &levels, lag);
        }
        levels.into_iter().map(|v| v.max(0.0)).collect()
    }
}

/// Hyndman–Khandakar stepwise order search over `(p,d,q)x(P,D,Q,m)` with
/// `d` and `D` held fixed.
#[derive(Debug, Clone)]
pub struct StepwiseSearch {
    config: SeasonalSearchConfig,
    d: usize,
    seasonal_d: usize,
    period: usize,
}

impl StepwiseSearch {
    pub fn new(config: &SeasonalSearchConfig, period: usize) -> Self {
        Self {
            config: config.clone(),
            d: 0,
            seasonal_d: 1,
            period,
        }
    }

    /// Largest AR span any candidate can reach.
    fn conditioning(&self) -> usize {
        self.config.max_p + self.config.max_seasonal_p * self.period
    }

    /// Shortest series on which at least the simplest candidate fits.
    pub fn min_observations(&self) -> usize {
        let simplest = self.order(0, 0, 0, 0);
        simplest.min_observations() + self.conditioning() - simplest.ar_span()
    }

    fn order(&self, p: usize, q: usize, sp: usize, sq: usize) -> SarimaOrder {
        SarimaOrder {
            p: p.min(self.config.max_p),
            d: self.d,
            q: q.min(self.config.max_q),
            seasonal_p: sp.min(self.config.max_seasonal_p),
            seasonal_d: self.seasonal_d,
            seasonal_q: sq.min(self.config.max_seasonal_q),
            period: self.period,
        }
    }

    fn starting_orders(&self) -> Vec<SarimaOrder> {
        vec![
            self.order(2, 2, 1, 1),
            self.order(0, 0, 0, 0),
            self.order(1, 0, 1, 0),
            self.order(0, 1, 0, 1),
        ]
    }

    fn neighbours(&self, o: SarimaOrder) -> Vec<SarimaOrder> {
        let c = &self.config;
        let mut out = Vec::new();
        let mut push = |p: Option<usize>, q: Option<usize>, sp: Option<usize>, sq: Option<usize>| {
            if let (Some(p), Some(q), Some(sp), Some(sq)) = (p, q, sp, sq) {
                if p <= c.max_p && q <= c.max_q && sp <= c.max_seasonal_p && sq <= c.max_seasonal_q {
                    out.push(SarimaOrder {
                        p,
                        q,
                        seasonal_p: sp,
                        seasonal_q: sq,
                        ..o
                    });
                }
            }
        };
        let (p, q, sp, sq) = (o.p, o.q, o.seasonal_p, o.seasonal_q);
        for delta in [-1i64, 1] {
            let shift = |v: usize| usize::try_from(v as i64 + delta).ok();
            push(shift(p), Some(q), Some(sp), Some(sq));
            push(Some(p), shift(q), Some(sp), Some(sq));
            push(Some(p), Some(q), shift(sp), Some(sq));
            push(Some(p), Some(q), Some(sp), shift(sq));
            push(shift(p), shift(q), Some(sp), Some(sq));
        }
        out
    }

    /// Returns the lowest-AIC fit found.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Model`] if no candidate order could be fitted.
    pub fn search(&self, series: &[f64]) -> Result<Sarima> {
        let mut visited = HashSet::new();
        let mut best: Option<Sarima> = None;
        let mut fits = 0;
        let conditioning = self.conditioning();

        let mut consider = |order: SarimaOrder, best: &mut Option<Sarima>| -> bool {
            if !visited.insert(order) || fits >= MAX_STEPWISE_FITS {
                return false;
            }
            fits += 1;
            match Sarima::fit_conditioned(series, order, self.config.max_iterations, conditioning) {
                Ok(model) if model.aic().is_finite() => {
                    debug!(order = %order, aic = model.aic(), "fitted candidate");
                    if best.as_ref().is_none_or(|b| model.aic() < b.aic()) {
                        *best = Some(model);
                        return true;
                    }
                    false
                }
                Ok(_) => false,
                Err(err) => {
                    debug!(order = %order, error = %err, "candidate rejected");
                    false
                }
            }
        };

        for order in self.starting_orders() {
            consider(order, &mut best);
        }

        loop {
            let Some(current) = best.as_ref().map(Sarima::order) else {
                break;
            };
            let mut improved = false;
            for candidate in self.neighbours(current) {
                if consider(candidate, &mut best) {
                    improved = true;
                    break;
                }
            }
            if !improved {
                break;
            }
        }

        best.ok_or_else(|| {
            EngineError::Model(format!("no seasonal order could be fitted to {} observations", series.len()))
        })
    }
}
