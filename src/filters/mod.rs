pub mod forward;
pub mod outlier;
pub mod sigma;
pub mod transition;
pub mod ukf_4d;

pub use forward::ForwardPredictor;
pub use outlier::{GuardDecision, OutlierGuard};
pub use sigma::SqrtMethod;
pub use transition::{filtering_transition, prediction_transition, TransitionContext};
pub use ukf_4d::{EstimatorSnapshot, StateEstimator, StepOutcome};
