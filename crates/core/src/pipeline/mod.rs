// Scatter / barrier / reduce execution

pub mod builder;
pub mod executor;
pub mod phase;
pub mod pool;
pub mod reducer;
pub mod router;
pub mod unit;

pub use builder::RunnerBuilder;
pub use executor::ScatterGatherRunner;
pub use phase::PhaseTracker;
pub use pool::{BarrierReport, PoolHandle, ScatterProgress, WorkerPool};
pub use reducer::Reducer;
pub use router::{ConfiguredFanOut, FanOutSource, FixedFanOut, Router, SpawnRouter};
pub use unit::{FnUnit, IncrementUnit, WorkUnit};
