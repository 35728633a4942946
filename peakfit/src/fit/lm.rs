//! Levenberg-Marquardt optimizer for composite lineshape fitting.
//!
//! Works on a dynamically sized parameter vector where only the free entries
//! of a [`ParameterSet`] move. Normal equations are assembled from the
//! analytic Jacobian and solved with `nalgebra` LU. Uses f64 throughout.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::params::ParameterSet;
use crate::error::{Error, Result};

/// Damping above which a stuck fit is abandoned.
const LAMBDA_MAX: f64 = 1e12;

/// Lower limit on the damped diagonal so zero-sensitivity parameters stay solvable.
const DIAGONAL_FLOOR: f64 = 1e-12;

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum iterations per solver call.
    pub max_iterations: usize,
    /// Relative parameter step below which the fit counts as converged.
    pub xtol: f64,
    /// Relative chi² reduction below which the fit counts as converged.
    pub ftol: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on a rejected step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on an accepted step.
    pub lambda_down: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            xtol: 1e-10,
            ftol: 1e-12,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

impl LmConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if self.max_iterations == 0 {
            return invalid("solver.max_iterations must be positive".to_string());
        }
        for (name, value) in [
            ("xtol", self.xtol),
            ("ftol", self.ftol),
            ("initial_lambda", self.initial_lambda),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("solver.{name} must be positive, got {value}"));
            }
        }
        if !(self.lambda_up.is_finite() && self.lambda_up > 1.0) {
            return invalid(format!(
                "solver.lambda_up must be > 1, got {}",
                self.lambda_up
            ));
        }
        if !(self.lambda_down > 0.0 && self.lambda_down < 1.0) {
            return invalid(format!(
                "solver.lambda_down must be in (0, 1), got {}",
                self.lambda_down
            ));
        }
        Ok(())
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    MaxIterations,
    /// Damping grew without finding a better point.
    DampingLimit,
    /// Normal equations could not be solved.
    Singular,
    /// Fewer data points than free parameters.
    TooFewPoints,
    /// Model or data produced a non-finite chi².
    NonFinite,
}

/// Result of L-M optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// All parameter values, fixed ones untouched.
    pub params: Vec<f64>,
    /// Standard errors for free parameters, `None` for fixed ones or when
    /// the covariance is unavailable.
    pub std_errors: Vec<Option<f64>>,
    pub chi2: f64,
    pub termination: Termination,
    pub iterations: usize,
}

impl LmResult {
    #[inline]
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Models that can be fitted with L-M optimization over a 2D grid.
pub trait LmModel {
    fn param_count(&self) -> usize;

    /// Evaluate the model at a point.
    fn evaluate(&self, x: f64, y: f64, params: &[f64]) -> f64;

    /// Evaluate and write df/dp for every parameter into `gradient`.
    fn evaluate_with_gradient(&self, x: f64, y: f64, params: &[f64], gradient: &mut [f64]) -> f64;
}

/// Sample coordinates and observed values.
#[derive(Debug, Clone, Copy)]
pub struct Samples<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub z: &'a [f64],
}

impl Samples<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.z.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }
}

/// Run L-M optimization of `model` against `samples`, starting from `params`.
pub fn optimize<M: LmModel>(
    model: &M,
    samples: Samples<'_>,
    params: &ParameterSet,
    config: &LmConfig,
) -> LmResult {
    debug_assert_eq!(model.param_count(), params.len());
    debug_assert_eq!(samples.x.len(), samples.z.len());
    debug_assert_eq!(samples.y.len(), samples.z.len());

    let free = params.free_indices();
    let mut values = params.values().to_vec();
    params.project(&mut values);

    let finish = |values: Vec<f64>, chi2: f64, termination, iterations| LmResult {
        std_errors: vec![None; values.len()],
        params: values,
        chi2,
        termination,
        iterations,
    };

    let mut chi2 = compute_chi2(model, samples, &values);
    if !chi2.is_finite() {
        return finish(values, chi2, Termination::NonFinite, 0);
    }
    if free.is_empty() {
        return finish(values, chi2, Termination::Converged, 0);
    }
    if samples.len() <= free.len() {
        return finish(values, chi2, Termination::TooFewPoints, 0);
    }

    let mut lambda = config.initial_lambda;
    let mut termination = Termination::MaxIterations;
    let mut iterations = 0;
    let mut scratch = vec![0.0; values.len()];

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let (hessian, gradient) = normal_equations(model, samples, &values, &free, &mut scratch);

        let mut damped = hessian;
        for i in 0..free.len() {
            let d = damped[(i, i)];
            damped[(i, i)] = d + lambda * d.max(DIAGONAL_FLOOR);
        }

        let Some(delta) = damped.lu().solve(&gradient) else {
            termination = Termination::Singular;
            break;
        };

        let mut candidate = values.clone();
        for (k, &i) in free.iter().enumerate() {
            candidate[i] += delta[k];
        }
        params.project(&mut candidate);

        let small_step = free.iter().all(|&i| {
            let step = (candidate[i] - values[i]).abs();
            step <= config.xtol * (values[i].abs() + config.xtol)
        });
        let new_chi2 = compute_chi2(model, samples, &candidate);

        if new_chi2.is_finite() && new_chi2 < chi2 {
            let reduction = (chi2 - new_chi2) / chi2;
            values = candidate;
            chi2 = new_chi2;
            lambda = (lambda * config.lambda_down).max(f64::MIN_POSITIVE);
            if small_step || reduction <= config.ftol || chi2 == 0.0 {
                termination = Termination::Converged;
                break;
            }
        } else {
            // No better point exists within numerical precision of here.
            if small_step {
                termination = Termination::Converged;
                break;
            }
            lambda *= config.lambda_up;
            if lambda > LAMBDA_MAX {
                termination = Termination::DampingLimit;
                break;
            }
        }
    }

    let std_errors = standard_errors(model, samples, &values, &free, chi2, &mut scratch);
    LmResult {
        params: values,
        std_errors,
        chi2,
        termination,
        iterations,
    }
}

fn compute_chi2<M: LmModel>(model: &M, samples: Samples<'_>, params: &[f64]) -> f64 {
    samples
        .x
        .iter()
        .zip(samples.y.iter())
        .zip(samples.z.iter())
        .map(|((&x, &y), &z)| {
            let residual = z - model.evaluate(x, y, params);
            residual * residual
        })
        .sum()
}

/// Assemble `JᵀJ` and `Jᵀr` over the free parameters.
/// Only the upper triangle is accumulated, then mirrored.
fn normal_equations<M: LmModel>(
    model: &M,
    samples: Samples<'_>,
    params: &[f64],
    free: &[usize],
    scratch: &mut [f64],
) -> (DMatrix<f64>, DVector<f64>) {
    let p = free.len();
    let mut hessian = DMatrix::<f64>::zeros(p, p);
    let mut gradient = DVector::<f64>::zeros(p);
    let mut row = vec![0.0; p];

    for ((&x, &y), &z) in samples.x.iter().zip(samples.y.iter()).zip(samples.z.iter()) {
        let value = model.evaluate_with_gradient(x, y, params, scratch);
        let r = z - value;
        for (slot, &i) in row.iter_mut().zip(free) {
            *slot = scratch[i];
        }
        for a in 0..p {
            gradient[a] += row[a] * r;
            for b in a..p {
                hessian[(a, b)] += row[a] * row[b];
            }
        }
    }

    for a in 1..p {
        for b in 0..a {
            hessian[(a, b)] = hessian[(b, a)];
        }
    }

    (hessian, gradient)
}

/// `sqrt(diag((JᵀJ)⁻¹) · chi²/(n - p))` for free parameters.
fn standard_errors<M: LmModel>(
    model: &M,
    samples: Samples<'_>,
    params: &[f64],
    free: &[usize],
    chi2: f64,
    scratch: &mut [f64],
) -> Vec<Option<f64>> {
    let mut errors = vec![None; params.len()];
    let dof = samples.len().saturating_sub(free.len());
    if free.is_empty() || dof == 0 || !chi2.is_finite() {
        return errors;
    }

    let (hessian, _) = normal_equations(model, samples, params, free, scratch);
    let Some(covariance) = hessian.try_inverse() else {
        return errors;
    };
    let scale = chi2 / dof as f64;
    for (k, &i) in free.iter().enumerate() {
        let variance = covariance[(k, k)] * scale;
        if variance.is_finite() && variance >= 0.0 {
            errors[i] = Some(variance.sqrt());
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    /// z = a·x + b·y + c
    struct Plane3;

    impl LmModel for Plane3 {
        fn param_count(&self) -> usize {
            3
        }

        fn evaluate(&self, x: f64, y: f64, p: &[f64]) -> f64 {
            p[0] * x + p[1] * y + p[2]
        }

        fn evaluate_with_gradient(&self, x: f64, y: f64, p: &[f64], g: &mut [f64]) -> f64 {
            g[0] = x;
            g[1] = y;
            g[2] = 1.0;
            self.evaluate(x, y, p)
        }
    }

    /// z = a·exp(-(x-c)²/2)
    struct Bump;

    impl LmModel for Bump {
        fn param_count(&self) -> usize {
            2
        }

        fn evaluate(&self, x: f64, _y: f64, p: &[f64]) -> f64 {
            p[0] * (-0.5 * (x - p[1]).powi(2)).exp()
        }

        fn evaluate_with_gradient(&self, x: f64, y: f64, p: &[f64], g: &mut [f64]) -> f64 {
            let e = (-0.5 * (x - p[1]).powi(2)).exp();
            g[0] = e;
            g[1] = p[0] * e * (x - p[1]);
            self.evaluate(x, y, p)
        }
    }

    fn grid(n: usize) -> (Vec<f64>, Vec<f64>) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for y in 0..n {
            for x in 0..n {
                xs.push(x as f64);
                ys.push(y as f64);
            }
        }
        (xs, ys)
    }

    #[test]
    fn test_linear_model_recovered() {
        let (xs, ys) = grid(5);
        let zs: Vec<f64> = xs
            .iter()
            .zip(&ys)
            .map(|(&x, &y)| 2.0 * x - 3.0 * y + 0.5)
            .collect();
        let samples = Samples {
            x: &xs,
            y: &ys,
            z: &zs,
        };
        let result = optimize(
            &Plane3,
            samples,
            &ParameterSet::new(vec![0.0, 0.0, 0.0]),
            &LmConfig::default(),
        );
        assert!(result.converged());
        assert!((result.params[0] - 2.0).abs() < 1e-8);
        assert!((result.params[1] + 3.0).abs() < 1e-8);
        assert!((result.params[2] - 0.5).abs() < 1e-8);
    }

    #[test]
    fn test_fixed_parameter_is_untouched() {
        let (xs, ys) = grid(5);
        let zs: Vec<f64> = xs.iter().zip(&ys).map(|(&x, &y)| x + y + 1.0).collect();
        let mut params = ParameterSet::new(vec![0.0, 0.0, 0.123_456_789]);
        params.fix(2);
        let result = optimize(
            &Plane3,
            Samples {
                x: &xs,
                y: &ys,
                z: &zs,
            },
            &params,
            &LmConfig::default(),
        );
        assert_eq!(result.params[2].to_bits(), 0.123_456_789f64.to_bits());
        assert!(result.std_errors[2].is_none());
        assert!(result.std_errors[0].is_some());
    }

    #[test]
    fn test_nonlinear_model_recovered() {
        let xs: Vec<f64> = (0..21).map(|i| i as f64 * 0.5).collect();
        let ys = vec![0.0; xs.len()];
        let zs: Vec<f64> = xs
            .iter()
            .map(|&x| 4.0 * (-0.5 * (x - 5.3f64).powi(2)).exp())
            .collect();
        let result = optimize(
            &Bump,
            Samples {
                x: &xs,
                y: &ys,
                z: &zs,
            },
            &ParameterSet::new(vec![3.0, 4.5]),
            &LmConfig::default(),
        );
        assert!(result.converged());
        assert!((result.params[0] - 4.0).abs() < 1e-7);
        assert!((result.params[1] - 5.3).abs() < 1e-7);
    }

    #[test]
    fn test_bounds_are_respected() {
        let xs: Vec<f64> = (0..21).map(|i| i as f64 * 0.5).collect();
        let ys = vec![0.0; xs.len()];
        let zs: Vec<f64> = xs
            .iter()
            .map(|&x| 4.0 * (-0.5 * (x - 5.3f64).powi(2)).exp())
            .collect();
        let mut params = ParameterSet::new(vec![3.0, 4.5]);
        params.set_bounds(1, 4.0, 5.0);
        let result = optimize(
            &Bump,
            Samples {
                x: &xs,
                y: &ys,
                z: &zs,
            },
            &params,
            &LmConfig::default(),
        );
        assert!(result.params[1] <= 5.0);
        assert!(result.params[1] >= 4.0);
    }

    #[test]
    fn test_too_few_points() {
        let xs = vec![0.0, 1.0];
        let ys = vec![0.0, 0.0];
        let zs = vec![1.0, 2.0];
        let result = optimize(
            &Plane3,
            Samples {
                x: &xs,
                y: &ys,
                z: &zs,
            },
            &ParameterSet::new(vec![0.0, 0.0, 0.0]),
            &LmConfig::default(),
        );
        assert_eq!(result.termination, Termination::TooFewPoints);
        assert!(!result.converged());
    }

    #[test]
    fn test_start_at_exact_solution_converges() {
        let (xs, ys) = grid(4);
        let zs: Vec<f64> = xs.iter().zip(&ys).map(|(&x, &y)| x - y).collect();
        let result = optimize(
            &Plane3,
            Samples {
                x: &xs,
                y: &ys,
                z: &zs,
            },
            &ParameterSet::new(vec![1.0, -1.0, 0.0]),
            &LmConfig::default(),
        );
        assert!(result.converged());
        assert_eq!(result.chi2, 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LmConfig {
            lambda_down: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = LmConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        LmConfig::default().validate().unwrap();
    }
}
