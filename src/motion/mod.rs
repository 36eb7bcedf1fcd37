//! Motion analysis feeding the estimator: regime, turning points,
//! oscillation statistics and the noise policy built on top of them.

pub mod noise;
pub mod peak;
pub mod periodicity;
pub mod regime;

pub use noise::{NoiseController, NoiseParams};
pub use peak::PeakDetector;
pub use periodicity::PeriodicityTracker;
pub use regime::RegimeClassifier;
