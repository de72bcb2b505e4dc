mod engine;
mod rng;
mod stats;
mod types;

pub use engine::{run_simulation, run_simulation_parallel};
pub use rng::{Generator, derive_stream_seed, standard_normal};
pub use stats::{
    DEFAULT_HISTOGRAM_BINS, histogram, histogram_with_default_bins, quantile, summarize,
    year_bands,
};
pub use types::{
    DistributionSummary, HistogramBin, SimulationError, SimulationParameters, SimulationRun,
    Trajectory, TrajectoryPoint, YearBand,
};
