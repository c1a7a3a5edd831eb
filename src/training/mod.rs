//! Fine-tuning a binary fake/real text classifier on LIAR-style data.

pub mod dataset;
pub mod metrics;
pub mod trainer;

pub use dataset::{DatasetKind, Example, Splits};
pub use metrics::{evaluate, EvalMetrics};
pub use trainer::{train, TrainConfig, TrainReport};
