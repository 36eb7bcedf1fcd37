//! Linear algebra type system for the eye motion estimator
//!
//! Dimensions and nalgebra aliases shared by the unscented filter and the
//! forward predictor. Working state lives in ndarray containers; these
//! fixed-size types are used wherever a factorization is needed.

use nalgebra::SMatrix;

// ===== State Dimensions =====
pub const STATE_DIM: usize = 4; // [position, velocity, acceleration, jerk]

// ===== State indices =====
pub const POS: usize = 0;
pub const VEL: usize = 1;
pub const ACC: usize = 2;
pub const JERK: usize = 3;

// ===== 4-State Filter Types =====
pub type StateMat4 = SMatrix<f64, STATE_DIM, STATE_DIM>;

// ===== Sigma Point Types =====
pub const SIGMA_COUNT: usize = 2 * STATE_DIM + 1; // 9
