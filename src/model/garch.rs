//! Constant-mean GARCH(p, q) with Gaussian innovations.
//!
//! ```text
//! r[t]   = mu + e[t]
//! h[t]   = omega + sum_i alpha[i] * e[t-i]^2 + sum_j beta[j] * h[t-j]
//! ```
//!
//! Pre-sample `e^2` and `h` use an exponentially weighted backcast of the
//! squared residuals. Estimation maximizes the likelihood with Nelder–Mead
//! over an unconstrained reparametrization that keeps `omega > 0`,
//! `alpha, beta >= 0` and `sum(alpha) + sum(beta) < PERSISTENCE_CAP`.

use super::optimizer::NelderMead;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Largest accepted lag order for either term
pub const MAX_ORDER: usize = 10;

/// Smallest return sample any model is fitted on
pub const MIN_RETURNS: usize = 30;

pub const PERSISTENCE_CAP: f64 = 0.999;

const BACKCAST_DECAY: f64 = 0.94;
const BACKCAST_WINDOW: usize = 75;
const VARIANCE_FLOOR: f64 = 1e-12;
const LN_2PI: f64 = 1.837_877_066_409_345_5;

const ITERATIONS_PER_PARAM: usize = 1_000;
const TOLERANCE: f64 = 1e-9;

/// Start values: 0.05 of persistence on the ARCH terms, 0.90 on the GARCH terms
const START_ALPHA_TOTAL: f64 = 0.05;
const START_BETA_TOTAL: f64 = 0.90;

/// Required number of returns for a GARCH(p, q) fit
pub fn min_returns(p: usize, q: usize) -> usize {
    MIN_RETURNS.max(10 * p.max(q))
}

/// Model coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchParams {
    pub mu: f64,
    pub omega: f64,
    pub alpha: Vec<f64>,
    pub beta: Vec<f64>,
}

impl GarchParams {
    pub fn p(&self) -> usize {
        self.alpha.len()
    }

    pub fn q(&self) -> usize {
        self.beta.len()
    }

    /// Number of estimated coefficients
    pub fn num_params(&self) -> usize {
        2 + self.alpha.len() + self.beta.len()
    }

    /// `sum(alpha) + sum(beta)`
    pub fn persistence(&self) -> f64 {
        self.alpha.iter().sum::<f64>() + self.beta.iter().sum::<f64>()
    }

    /// Long-run variance `omega / (1 - persistence)`, if stationary
    pub fn unconditional_variance(&self) -> Option<f64> {
        let persistence = self.persistence();
        (persistence < 1.0).then(|| self.omega / (1.0 - persistence))
    }
}

/// Exponentially weighted mean of the first squared residuals
pub fn backcast(residuals: &[f64]) -> f64 {
    let window = residuals.len().min(BACKCAST_WINDOW);
    if window == 0 {
        return VARIANCE_FLOOR;
    }

    let mut weight = 1.0;
    let mut total_weight = 0.0;
    let mut acc = 0.0;
    for e in &residuals[..window] {
        acc += weight * e * e;
        total_weight += weight;
        weight *= BACKCAST_DECAY;
    }
    (acc / total_weight).max(VARIANCE_FLOOR)
}

/// In-sample conditional variances `h[t]` for each residual
pub fn conditional_variances(params: &GarchParams, residuals: &[f64], backcast: f64) -> Vec<f64> {
    let n = residuals.len();
    let mut h = Vec::with_capacity(n);

    for t in 0..n {
        let mut ht = params.omega;
        for (i, a) in params.alpha.iter().enumerate() {
            let lag = i + 1;
            let shock = if t >= lag {
                residuals[t - lag] * residuals[t - lag]
            } else {
                backcast
            };
            ht += a * shock;
        }
        for (j, b) in params.beta.iter().enumerate() {
            let lag = j + 1;
            let prev = if t >= lag { h[t - lag] } else { backcast };
            ht += b * prev;
        }
        h.push(ht.max(VARIANCE_FLOOR));
    }

    h
}

/// Gaussian negative log-likelihood of `returns` under `params`
pub fn negative_log_likelihood(params: &GarchParams, returns: &[f64]) -> f64 {
    let residuals: Vec<f64> = returns.iter().map(|r| r - params.mu).collect();
    let h = conditional_variances(params, &residuals, backcast(&residuals));

    0.5 * residuals
        .iter()
        .zip(&h)
        .map(|(e, ht)| LN_2PI + ht.ln() + e * e / ht)
        .sum::<f64>()
}

/// Result of a maximum likelihood fit
#[derive(Debug, Clone)]
pub struct Estimate {
    pub params: GarchParams,
    pub log_likelihood: f64,
    pub residuals: Vec<f64>,
    pub variances: Vec<f64>,
    pub iterations: usize,
    pub evaluations: usize,
}

/// Maximum likelihood estimate of a GARCH(p, q) on percentage returns
pub fn estimate(returns: &[f64], p: usize, q: usize) -> Result<Estimate> {
    let dim = 2 + p + q;
    estimate_with(returns, p, q, &NelderMead::new(ITERATIONS_PER_PARAM * dim, TOLERANCE))
}

/// [`estimate`] with explicit optimizer settings
pub(crate) fn estimate_with(
    returns: &[f64],
    p: usize,
    q: usize,
    optimizer: &NelderMead,
) -> Result<Estimate> {
    if p == 0 || q == 0 || p > MAX_ORDER || q > MAX_ORDER {
        return Err(AppError::Validation(format!(
            "GARCH orders must be within 1..={}, got p={} q={}",
            MAX_ORDER, p, q
        )));
    }
    let required = min_returns(p, q);
    if returns.len() < required {
        return Err(AppError::InsufficientData {
            available: returns.len(),
            required,
        });
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(AppError::Schema("returns contain non-finite values".into()));
    }

    let start = starting_params(returns, p, q);
    let transform = Transform { p, q };
    let x0 = transform.encode(&start);

    let mut steps = vec![0.5; x0.len()];
    steps[0] = (0.1 * sample_variance(returns).sqrt()).max(1e-3);

    let minimum = optimizer.minimize(
        |x| negative_log_likelihood(&transform.decode(x), returns),
        &x0,
        &steps,
    );

    if !minimum.converged || !minimum.value.is_finite() {
        tracing::warn!(
            "GARCH({},{}) fit did not converge after {} iterations",
            p,
            q,
            minimum.iterations
        );
        return Err(AppError::Convergence {
            iterations: minimum.iterations,
        });
    }

    let params = transform.decode(&minimum.point);
    let residuals: Vec<f64> = returns.iter().map(|r| r - params.mu).collect();
    let variances = conditional_variances(&params, &residuals, backcast(&residuals));

    Ok(Estimate {
        params,
        log_likelihood: -minimum.value,
        residuals,
        variances,
        iterations: minimum.iterations,
        evaluations: minimum.evaluations,
    })
}

/// Multi-step variance forecast.
///
/// `shocks_sq` holds the most recent squared residuals (at least p) and
/// `variances` the most recent conditional variances (at least q), both
/// oldest first. Future squared shocks are replaced by their expectation,
/// the forecast variance of the same step.
pub fn forecast_variance(
    params: &GarchParams,
    shocks_sq: &[f64],
    variances: &[f64],
    horizon: usize,
) -> Vec<f64> {
    let mut e2 = shocks_sq.to_vec();
    let mut hv = variances.to_vec();
    let mut out = Vec::with_capacity(horizon);

    for _ in 0..horizon {
        let mut h = params.omega;
        for (i, a) in params.alpha.iter().enumerate() {
            h += a * e2[e2.len() - 1 - i];
        }
        for (j, b) in params.beta.iter().enumerate() {
            h += b * hv[hv.len() - 1 - j];
        }
        let h = h.max(VARIANCE_FLOOR);
        e2.push(h);
        hv.push(h);
        out.push(h);
    }

    out
}

fn starting_params(returns: &[f64], p: usize, q: usize) -> GarchParams {
    let mu = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = sample_variance(returns).max(VARIANCE_FLOOR);
    let persistence = START_ALPHA_TOTAL + START_BETA_TOTAL;

    GarchParams {
        mu,
        omega: variance * (1.0 - persistence),
        alpha: vec![START_ALPHA_TOTAL / p as f64; p],
        beta: vec![START_BETA_TOTAL / q as f64; q],
    }
}

fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n as f64 - 1.0)
}

/// Maps `[mu, ln(omega), z_1 .. z_{p+q}]` to constrained coefficients.
///
/// With `s_k = exp(z_k)`, coefficient `k` is `CAP * s_k / (1 + sum(s))`,
/// so every coefficient is positive and their sum stays below `CAP`.
#[derive(Debug, Clone, Copy)]
struct Transform {
    p: usize,
    q: usize,
}

const Z_BOUND: f64 = 40.0;
const LN_OMEGA_BOUND: f64 = 50.0;
const COEF_FLOOR: f64 = 1e-8;

impl Transform {
    fn encode(&self, params: &GarchParams) -> Vec<f64> {
        let mut x = Vec::with_capacity(2 + self.p + self.q);
        x.push(params.mu);
        x.push(params.omega.max(VARIANCE_FLOOR).ln());

        let shares: Vec<f64> = params
            .alpha
            .iter()
            .chain(&params.beta)
            .map(|c| (c / PERSISTENCE_CAP).max(COEF_FLOOR))
            .collect();
        let slack = (1.0 - shares.iter().sum::<f64>()).max(COEF_FLOOR);
        x.extend(shares.iter().map(|u| (u / slack).ln()));
        x
    }

    fn decode(&self, x: &[f64]) -> GarchParams {
        let mu = x[0];
        let omega = x[1].clamp(-LN_OMEGA_BOUND, LN_OMEGA_BOUND).exp();

        let s: Vec<f64> = x[2..]
            .iter()
            .map(|z| z.clamp(-Z_BOUND, Z_BOUND).exp())
            .collect();
        let denom = 1.0 + s.iter().sum::<f64>();
        let coefs: Vec<f64> = s.iter().map(|sk| PERSISTENCE_CAP * sk / denom).collect();

        GarchParams {
            mu,
            omega,
            alpha: coefs[..self.p].to_vec(),
            beta: coefs[self.p..].to_vec(),
        }
    }
}
