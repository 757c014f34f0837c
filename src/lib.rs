//! multigap: Multiple Gap-Filling of Half-Hourly Flux Series
//!
//! Fills gaps in a measured flux series with a family of look-up-table,
//! diurnal-composite and interpolation techniques, scores every technique on
//! artificial gaps with a seeded bootstrap, and turns the scores into period
//! sums with uncertainty bounds and an ensemble envelope.
//!
//! ## Architecture
//!
//! - **Series**: regular half-hourly table, precondition checks, CSV I/O
//! - **Window / Techniques**: candidate windows and the technique registry
//! - **Filling**: LUT/diurnal and interpolation fillers, gap simulator
//! - **Bootstrap**: resampled Bias / SDev / R2 distributions
//! - **Analysis**: error tables, period sums, ensemble, run description
//! - **Pipeline**: run directory and staged workflow

pub mod config;
pub mod types;
pub mod series;
pub mod window;
pub mod techniques;
pub mod filling;
pub mod bootstrap;
pub mod analysis;
pub mod pipeline;
pub mod synthetic;

// Re-export settings
pub use config::{ConfigError, Settings};

// Re-export shared enums
pub use types::{Scenario, Statistic, TimeOfDay};

// Re-export the series model
pub use series::{SeriesError, TimeSeries};

// Re-export techniques and fillers
pub use techniques::{Registry, Technique};
pub use filling::{
    fill_real_gaps, fill_technique, simulate, FillError, FillOutcome, SimulationReport,
};

// Re-export bootstrap and analysis
pub use bootstrap::{bootstrap, BootstrapError, BootstrapResult};
pub use analysis::{
    ensemble, estimate_errors, select_techniques, sum_period, AnalysisError, EnsembleResult,
    ErrorTable, PeriodSum, RunDescription,
};

// Re-export pipeline
pub use pipeline::{Pipeline, PipelineError, RunDir};
