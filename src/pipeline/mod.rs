//! Staged Gap-Filling Workflow
//!
//! ## Stage Sequence
//!
//! ```text
//! STAGE 1: fill       input → flux_obs, preconditions, artificial-gap fills
//! STAGE 2: inspect    model merge, real-gap filling, run description
//! STAGE 3: bootstrap  ft/dt/nt × hhs/days bootstrap distributions
//! STAGE 4: analyse    error tables, period sums of every technique
//! STAGE 5: ensemble   technique selection, ensemble envelope
//! ```
//!
//! Every stage reads what the previous one persisted in the run directory,
//! so stages can be rerun individually. The input series is checked before
//! the run directory is created, so a precondition failure leaves nothing
//! on disk.

mod run_dir;

pub use run_dir::{new_run_number, RunDir};

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::describe::gap_distribution_table;
use crate::analysis::errors::combined_table;
use crate::analysis::{self, AnalysisError, EnsembleResult, ErrorTable, PeriodSum, RunDescription};
use crate::bootstrap::{bootstrap_time_of_day, BootstrapError, BootstrapResult};
use crate::config::{ConfigError, Settings};
use crate::filling::{fill_real_gaps, simulate, FillError, SimulationReport};
use crate::series::csv::{read_series, write_series, Table};
use crate::series::{SeriesError, TimeSeries};
use crate::techniques::Registry;
use crate::types::{Scenario, TimeOfDay};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Fill(#[from] FillError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("I/O error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Run directory {} does not exist", .0.display())]
    UnknownRun(PathBuf),

    #[error("Missing stage output {}; run the '{stage}' stage first", path.display())]
    MissingStage { stage: &'static str, path: PathBuf },
}

// ============================================================================
// Pipeline
// ============================================================================

/// Outputs of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_number: String,
    pub simulation: SimulationReport,
    pub description: RunDescription,
    pub sums: Vec<PeriodSum>,
    pub ensemble: EnsembleResult,
}

pub struct Pipeline {
    run: RunDir,
    settings: Settings,
}

impl Pipeline {
    /// Start a new run: check the input series, then create the run
    /// directory, copy the inputs and persist the resolved settings.
    pub fn start(run: RunDir, mut settings: Settings) -> Result<Self, PipelineError> {
        settings.validate()?;
        let input = run.data_dir().join(&settings.input.data_file);
        load_observed(&input, &settings)?;

        run.create_tree()?;
        run.copy_input(&settings.input.data_file)?;
        if let Some(models) = &settings.input.models_file {
            run.copy_input(models)?;
        }
        settings.run.run_number = Some(run.run_number().to_string());
        settings.run.code_version = Some(env!("CARGO_PKG_VERSION").to_string());
        settings.save_to_file(&run.settings_file())?;

        info!(
            run = %run.run_number(),
            gas = %settings.flux.gas,
            data = %settings.input.data_file,
            "Run started"
        );
        Ok(Self { run, settings })
    }

    /// Continue an existing run with its persisted settings.
    pub fn resume(run: RunDir) -> Result<Self, PipelineError> {
        let settings = Settings::load_from_file(&run.settings_file())?;
        info!(run = %run.run_number(), "Run resumed");
        Ok(Self { run, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn run_dir(&self) -> &RunDir {
        &self.run
    }

    fn gas(&self) -> &str {
        &self.settings.flux.gas
    }

    fn scenarios_file(&self) -> PathBuf {
        self.run.table(self.run.work_dir(), "scenarios", self.gas(), None)
    }

    fn all_data_file(&self) -> PathBuf {
        self.run.table(self.run.work_dir(), "all_data", self.gas(), None)
    }

    fn boot_file(&self, time_of_day: TimeOfDay, scenario: Scenario) -> PathBuf {
        let suffix = format!("{}_{}", time_of_day.code(), scenario.suffix());
        self.run.table(self.run.work_dir(), "boot", self.gas(), Some(&suffix))
    }

    fn errors_file(&self, time_of_day: TimeOfDay) -> PathBuf {
        self.run.table(self.run.work_dir(), "errors", self.gas(), Some(time_of_day.code()))
    }

    fn result_file(&self, prefix: &str, suffix: Option<&str>) -> PathBuf {
        self.run.table(self.run.result_dir(), prefix, self.gas(), suffix)
    }

    fn read_stage(&self, stage: &'static str, path: PathBuf) -> Result<TimeSeries, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::MissingStage { stage, path });
        }
        Ok(read_series(&path, self.settings.separator())?)
    }

    fn write_table(&self, table: &Table, path: &Path) -> Result<(), PipelineError> {
        table.write(path, self.settings.separator())?;
        info!(path = %path.display(), rows = table.rows.len(), "Table written");
        Ok(())
    }

    /// Times of day the series supports; day/night need the light covariate.
    fn times_of_day(&self, series: &TimeSeries) -> Vec<TimeOfDay> {
        match self.settings.light_split() {
            Some((light, _)) if series.has_channel(light) => TimeOfDay::ALL.to_vec(),
            _ => {
                warn!(
                    covariate = %self.settings.light.covariate,
                    "No usable light covariate, day/night-time analysis skipped"
                );
                vec![TimeOfDay::FullTime]
            }
        }
    }

    // ------------------------------------------------------------------------
    // Stage 1: Fill
    // ------------------------------------------------------------------------

    /// Fill artificial gaps with every technique.
    ///
    /// An existing scenarios table of this run is reused, so channels that
    /// are already complete are not recomputed.
    pub fn fill(&self) -> Result<SimulationReport, PipelineError> {
        let sep = self.settings.separator();
        let scenarios = self.scenarios_file();
        let mut series = if scenarios.is_file() {
            info!(path = %scenarios.display(), "Resuming from existing scenarios");
            let series = read_series(&scenarios, sep)?;
            series.check_gap_limit(
                self.settings.observed_channel(),
                self.settings.filling.max_gap_days,
            )?;
            series
        } else {
            load_observed(&self.run.input(&self.settings.input.data_file), &self.settings)?
        };

        let registry = Registry::from_settings(&self.settings);
        let report = simulate(&mut series, &registry, &self.settings)?;
        for summary in report.unconverged() {
            warn!(
                channel = %summary.channel,
                residual = summary.residual_gaps,
                "Technique left residual gaps"
            );
        }

        write_series(&series, &scenarios, sep)?;
        info!(path = %scenarios.display(), channels = series.channels().len(), "Scenarios written");
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Stage 2: Inspect
    // ------------------------------------------------------------------------

    /// Merge model columns, fill real gaps and describe the run.
    pub fn inspect(&self) -> Result<RunDescription, PipelineError> {
        let sep = self.settings.separator();
        let mut series = self.read_stage("fill", self.scenarios_file())?;

        if let Some(models) = &self.settings.input.models_file {
            merge_models(&mut series, &self.run.input(models), sep)?;
        }

        fill_real_gaps(&mut series, &self.settings)?;

        let mut filled = series.clone();
        let scenario_channels: Vec<String> = series
            .channel_names()
            .filter(|name| Scenario::ALL.iter().any(|s| s.technique_of(name).is_some()))
            .map(str::to_string)
            .collect();
        for name in &scenario_channels {
            filled.remove_channel(name);
        }
        write_series(&filled, &self.result_file("filled_real", None), sep)?;
        write_series(&series, &self.all_data_file(), sep)?;

        let description = analysis::describe(&series, &self.settings)?;
        self.write_table(&description.to_table(), &self.result_file("description", None))?;
        self.write_table(
            &gap_distribution_table(&series, &self.settings)?,
            &self.result_file("gap_distribution", None),
        )?;

        info!(
            days = description.num_days,
            gaps = description.num_gaps,
            gap_percent = description.gap_percent,
            short = description.short_gap_points,
            long = description.long_gap_points,
            "Run described"
        );
        Ok(description)
    }

    // ------------------------------------------------------------------------
    // Stage 3: Bootstrap
    // ------------------------------------------------------------------------

    pub fn bootstrap(&self) -> Result<Vec<BootstrapResult>, PipelineError> {
        let series = self.read_stage("inspect", self.all_data_file())?;
        let mut results = Vec::new();
        for time_of_day in self.times_of_day(&series) {
            for scenario in Scenario::ALL {
                info!(time_of_day = %time_of_day, scenario = %scenario, "Bootstrapping");
                let result = bootstrap_time_of_day(&series, &self.settings, scenario, time_of_day)?;
                self.write_table(&result.to_table(), &self.boot_file(time_of_day, scenario))?;
                results.push(result);
            }
        }
        Ok(results)
    }

    // ------------------------------------------------------------------------
    // Stage 4: Analyse
    // ------------------------------------------------------------------------

    /// Error tables per time of day and the sums of all techniques.
    pub fn analyse(&self) -> Result<Vec<PeriodSum>, PipelineError> {
        let series = self.read_stage("inspect", self.all_data_file())?;
        let mut tables = Vec::new();
        for time_of_day in self.times_of_day(&series) {
            let hhs = self.read_boot(time_of_day, Scenario::HalfHour)?;
            let days = self.read_boot(time_of_day, Scenario::Day)?;
            let errors = analysis::estimate_errors(&hhs, &days);
            self.write_table(&errors.to_table(), &self.errors_file(time_of_day))?;
            tables.push(errors);
        }

        let refs: Vec<&ErrorTable> = tables.iter().collect();
        self.write_table(
            &combined_table(&refs, self.gas(), &self.settings.flux.unit),
            &self.result_file("errors", None),
        )?;

        let full_time = tables
            .iter()
            .find(|t| t.time_of_day == TimeOfDay::FullTime)
            .ok_or_else(|| PipelineError::MissingStage {
                stage: "bootstrap",
                path: self.boot_file(TimeOfDay::FullTime, Scenario::HalfHour),
            })?;
        let sums = analysis::sum_period(&series, &self.settings, full_time)?;
        self.write_table(
            &analysis::sums::to_table(&sums, self.gas(), &self.settings.flux.sum_unit),
            &self.result_file("sums", Some("all")),
        )?;
        for s in &sums {
            info!(
                technique = %s.technique,
                total = s.sum_total,
                error = s.error_total,
                missing = s.miss_fill_real,
                "Period sum"
            );
        }
        Ok(sums)
    }

    fn read_boot(
        &self,
        time_of_day: TimeOfDay,
        scenario: Scenario,
    ) -> Result<BootstrapResult, PipelineError> {
        let path = self.boot_file(time_of_day, scenario);
        if !path.is_file() {
            return Err(PipelineError::MissingStage { stage: "bootstrap", path });
        }
        let table = Table::read(&path, self.settings.separator())?;
        Ok(BootstrapResult::from_table(&table, scenario, time_of_day)?)
    }

    // ------------------------------------------------------------------------
    // Stage 5: Ensemble
    // ------------------------------------------------------------------------

    /// Restrict the sums to the techniques matching `pattern` (or the gas
    /// default) and compute the ensemble envelope.
    pub fn ensemble(&self, pattern: Option<&str>) -> Result<EnsembleResult, PipelineError> {
        let series = self.read_stage("inspect", self.all_data_file())?;
        let errors_path = self.errors_file(TimeOfDay::FullTime);
        if !errors_path.is_file() {
            return Err(PipelineError::MissingStage {
                stage: "analyse",
                path: errors_path,
            });
        }
        let errors = ErrorTable::from_table(
            &Table::read(&errors_path, self.settings.separator())?,
            TimeOfDay::FullTime,
        )?;

        let sums = analysis::sum_period(&series, &self.settings, &errors)?;
        let selected = analysis::select_techniques(&sums, pattern, self.gas())?;
        self.write_table(
            &analysis::sums::to_table(&selected, self.gas(), &self.settings.flux.sum_unit),
            &self.result_file("sums", Some("ens")),
        )?;

        let result = analysis::ensemble(&selected)?;
        self.write_table(
            &result.to_table(self.gas(), &self.settings.flux.sum_unit),
            &self.result_file("ensemble", None),
        )?;
        info!(
            techniques = selected.len(),
            lower_ci = result.lower_ci,
            upper_ci = result.upper_ci,
            delta = result.delta,
            "Ensemble computed"
        );
        Ok(result)
    }

    /// All stages in order.
    pub fn run_all(&self, pattern: Option<&str>) -> Result<RunSummary, PipelineError> {
        let simulation = self.fill()?;
        let description = self.inspect()?;
        self.bootstrap()?;
        let sums = self.analyse()?;
        let ensemble = self.ensemble(pattern)?;
        Ok(RunSummary {
            run_number: self.run.run_number().to_string(),
            simulation,
            description,
            sums,
            ensemble,
        })
    }
}

/// Read the flux table and run every precondition on its observed channel.
fn load_observed(path: &Path, settings: &Settings) -> Result<TimeSeries, PipelineError> {
    let mut series = read_series(path, settings.separator())?;
    series.prepare_observed(&settings.flux)?;
    series.check_gap_limit(settings.observed_channel(), settings.filling.max_gap_days)?;
    Ok(series)
}

/// Add the columns of an external model table with identical timestamps.
///
/// A table on a different time index is skipped with a warning.
pub fn merge_models(
    series: &mut TimeSeries,
    path: &Path,
    separator: char,
) -> Result<usize, PipelineError> {
    let models = read_series(path, separator)?;
    if models.timestamps() != series.timestamps() {
        warn!(
            path = %path.display(),
            model_rows = models.len(),
            data_rows = series.len(),
            "Model timestamps differ from the flux data, model table skipped"
        );
        return Ok(0);
    }
    let mut merged = 0;
    for channel in models.channels() {
        series.insert_channel(channel.name.clone(), channel.values.clone())?;
        merged += 1;
    }
    info!(path = %path.display(), channels = merged, "Model columns merged");
    Ok(merged)
}
