pub mod analysis;
pub mod config;
pub mod error;
pub mod geometry;
pub mod model;
pub mod preprocess;
pub mod session;

use crate::model::HeadClassifier;

/// Built once at startup and shared read-only by every connection task.
///
/// `classifier` is `None` when the weights failed to load; requests are
/// then served an explicit error instead of crashing the process.
pub struct ServiceContext {
    pub classifier: Option<Box<dyn HeadClassifier>>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
