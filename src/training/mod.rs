mod accumulator;
mod config;
mod telemetry;

pub use accumulator::{GradientAccumulator, LayerGradient};
pub use config::HyperParameters;
pub(crate) use telemetry::CostSummary;
pub use telemetry::{LogReporter, Reporter, Telemetry, TrainingReport};
