//! Unscented transform machinery for the 4-state eye motion filter
//!
//! Sigma point generation with a three-tier square root (Cholesky, eigen,
//! axis-aligned), weighted recombination and covariance conditioning. All
//! working data is ndarray; nalgebra is only used for the factorizations.

use log::debug;
use nalgebra::SymmetricEigen;
use ndarray::{Array1, Array2};

use crate::config::TrackerConfig;
use crate::error::{NumResult, NumericalError};
use crate::types::{StateMat4, SIGMA_COUNT, STATE_DIM};

/// Iteration cap for the symmetric eigen solver. A 4x4 converges in a
/// handful of sweeps; NaN input never does.
const EIGEN_MAX_ITER: usize = 100;

/// Which square root produced the last sigma set, ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SqrtMethod {
    Cholesky,
    Eigen,
    AxisAligned,
}

/// Scaled unscented transform weights for one alpha.
#[derive(Clone, Debug)]
pub struct UnscentedWeights {
    pub lambda: f64,
    pub mean: Array1<f64>,
    pub cov: Array1<f64>,
}

impl UnscentedWeights {
    pub fn new(alpha: f64, beta: f64, kappa: f64) -> NumResult<Self> {
        let n = STATE_DIM as f64;
        let lambda = alpha * alpha * (n + kappa) - n;
        let scale = n + lambda;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(NumericalError::NonFinite("unscented scale"));
        }

        let mut mean = Array1::<f64>::from_elem(SIGMA_COUNT, 0.5 / scale);
        let mut cov = mean.clone();
        mean[0] = lambda / scale;
        cov[0] = lambda / scale + (1.0 - alpha * alpha + beta);

        Ok(Self { lambda, mean, cov })
    }

    /// n + λ, the sigma spread scale
    pub fn scale(&self) -> f64 {
        STATE_DIM as f64 + self.lambda
    }
}

pub fn to_matrix4(m: &Array2<f64>) -> StateMat4 {
    StateMat4::from_fn(|i, j| m[[i, j]])
}

pub fn from_matrix4(m: &StateMat4) -> Array2<f64> {
    Array2::from_shape_fn((STATE_DIM, STATE_DIM), |(i, j)| m[(i, j)])
}

pub fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

fn symmetrize(m: &Array2<f64>) -> Array2<f64> {
    (m + &m.t()) * 0.5
}

fn symmetric_eigen(m: StateMat4) -> NumResult<SymmetricEigen<f64, nalgebra::Const<STATE_DIM>>> {
    if !all_finite(m.iter()) {
        return Err(NumericalError::EigenFailed);
    }
    SymmetricEigen::try_new(m, f64::EPSILON, EIGEN_MAX_ITER).ok_or(NumericalError::EigenFailed)
}

/// Lower-triangular square root of `scale·P`.
fn cholesky_sqrt(p: &StateMat4, scale: f64) -> NumResult<StateMat4> {
    let l = (p * scale).cholesky().ok_or(NumericalError::CholeskyFailed)?.l();
    if all_finite(l.iter()) {
        Ok(l)
    } else {
        Err(NumericalError::CholeskyFailed)
    }
}

/// V·sqrt(max(Λ, floor))·sqrt(scale), a square root of `scale·P` even for
/// slightly indefinite input.
fn eigen_sqrt(p: &StateMat4, scale: f64, floor: f64) -> NumResult<StateMat4> {
    let eig = symmetric_eigen(*p)?;
    let roots = eig.eigenvalues.map(|v| v.max(floor).sqrt() * scale.sqrt());
    let s = eig.eigenvectors * StateMat4::from_diagonal(&roots);
    if all_finite(s.iter()) {
        Ok(s)
    } else {
        Err(NumericalError::EigenFailed)
    }
}

/// Generate 2n+1 sigma points around `mean`. Never fails: falls back from
/// Cholesky to the eigen square root to an axis-aligned spread.
pub fn generate_sigma_points(
    mean: &Array1<f64>,
    cov: &Array2<f64>,
    weights: &UnscentedWeights,
    config: &TrackerConfig,
) -> (Vec<Array1<f64>>, SqrtMethod) {
    let scale = weights.scale();
    let mut p = to_matrix4(&symmetrize(cov));
    for i in 0..STATE_DIM {
        p[(i, i)] += config.regularization;
    }

    let (sqrt, method) = match cholesky_sqrt(&p, scale) {
        Ok(l) => (l, SqrtMethod::Cholesky),
        Err(chol_err) => match eigen_sqrt(&p, scale, config.eigen_floor) {
            Ok(s) => {
                debug!("[UKF] {chol_err}, using eigen square root");
                (s, SqrtMethod::Eigen)
            }
            Err(eig_err) => {
                debug!("[UKF] {eig_err}, using axis-aligned sigma spread");
                let spread = StateMat4::from_fn(|i, j| {
                    if i == j {
                        // f64::max drops NaN
                        (scale * config.eigen_floor.max(p[(i, i)])).sqrt()
                    } else {
                        0.0
                    }
                });
                (spread, SqrtMethod::AxisAligned)
            }
        },
    };

    let mut sigmas = Vec::with_capacity(SIGMA_COUNT);
    sigmas.push(mean.clone());
    for i in 0..STATE_DIM {
        sigmas.push(Array1::from_shape_fn(STATE_DIM, |j| mean[j] + sqrt[(j, i)]));
    }
    for i in 0..STATE_DIM {
        sigmas.push(Array1::from_shape_fn(STATE_DIM, |j| mean[j] - sqrt[(j, i)]));
    }
    (sigmas, method)
}

/// Weighted mean and covariance of a sigma set.
///
/// The mean is accumulated as offsets from the central point: with tiny
/// alpha the weights reach ~1e8 in magnitude and summing raw positions
/// would cancel catastrophically.
pub fn recombine(
    sigmas: &[Array1<f64>],
    weights: &UnscentedWeights,
) -> NumResult<(Array1<f64>, Array2<f64>)> {
    let centre = sigmas.first().ok_or(NumericalError::NonFinite("empty sigma set"))?;

    let mut mean = centre.clone();
    for (i, sigma) in sigmas.iter().enumerate().skip(1) {
        mean.scaled_add(weights.mean[i], &(sigma - centre));
    }

    let mut cov = Array2::<f64>::zeros((STATE_DIM, STATE_DIM));
    for (i, sigma) in sigmas.iter().enumerate() {
        let r = sigma - &mean;
        for a in 0..STATE_DIM {
            for b in 0..STATE_DIM {
                cov[[a, b]] += weights.cov[i] * r[a] * r[b];
            }
        }
    }

    if all_finite(mean.iter()) && all_finite(cov.iter()) {
        Ok((mean, cov))
    } else {
        Err(NumericalError::NonFinite("sigma recombination"))
    }
}

/// Symmetrize, clamp the diagonal into [floor, floor·factor] and rebuild
/// from floored eigenvalues when the matrix is not positive definite.
/// Non-finite entries are replaced (ceiling on the diagonal, 0 elsewhere).
pub fn condition_covariance(cov: &Array2<f64>, config: &TrackerConfig) -> Array2<f64> {
    let mut p = symmetrize(cov);
    for i in 0..STATE_DIM {
        for j in 0..STATE_DIM {
            if !p[[i, j]].is_finite() {
                p[[i, j]] = if i == j { config.covariance_ceiling(i) } else { 0.0 };
            }
        }
        p[[i, i]] = p[[i, i]].clamp(config.covariance_floor[i], config.covariance_ceiling(i));
    }

    match symmetric_eigen(to_matrix4(&p)) {
        Ok(eig) if eig.eigenvalues.min() < config.eigen_floor => {
            debug!("[UKF] covariance not positive definite, flooring eigenvalues");
            let floored = eig.eigenvalues.map(|v| v.max(config.eigen_floor));
            let v = eig.eigenvectors;
            let rebuilt = v * StateMat4::from_diagonal(&floored) * v.transpose();
            symmetrize(&from_matrix4(&rebuilt))
        }
        Ok(_) => p,
        Err(_) => {
            debug!("[UKF] eigen solver failed during conditioning, dropping correlations");
            Array2::from_shape_fn((STATE_DIM, STATE_DIM), |(i, j)| {
                if i == j {
                    p[[i, i]]
                } else {
                    0.0
                }
            })
        }
    }
}
