pub mod quality;
pub mod resolver;

pub use quality::{evaluate_quality_adjustments, QualityEvaluation};
pub use resolver::{select_effective, RateResolver, ResolveRateQuery, ResolveRateRequest};
