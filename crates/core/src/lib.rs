// Core types and functionality for the fanout scatter/gather runner

pub mod config;
pub mod counter;
pub mod error;
pub mod events;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod types;

pub use config::{FailurePolicy, RunnerConfig};
pub use counter::{run_pipeline, CounterPipeline};
pub use error::{RunnerError, RunnerResult, UnitError};
pub use pipeline::ScatterGatherRunner;
pub use types::*;
