//! Run Settings - every gap-filling policy as an operator-tunable TOML value
//!
//! Each struct implements `Default` with the values of [`super::defaults`],
//! so a run without a settings file behaves exactly like the built-in policy.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming a settings file.
pub const CONFIG_ENV_VAR: &str = "MULTIGAP_CONFIG";

/// Settings file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "multigap.toml";

/// At most this many covariates take part in one look-up table.
pub const MAX_LUT_COVARIATES: usize = 3;

// ============================================================================
// Top-Level Settings
// ============================================================================

/// Root settings of one gap-filling run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Which flux is filled and how it is converted to period sums
    #[serde(default)]
    pub flux: FluxSettings,

    /// Covariates of the LUT_V1 / LUT_V1V2 / LUT_V1V2V3 families
    #[serde(default)]
    pub lut: LutSettings,

    /// Covariates of the MDS-style look-up table
    #[serde(default)]
    pub mds: LutSettings,

    /// Day/night split used by WDM and the time-of-day bootstrap filters
    #[serde(default)]
    pub light: LightSettings,

    /// Bootstrap resampling
    #[serde(default)]
    pub bootstrap: BootstrapSettings,

    /// Window growth ceilings and gap classes
    #[serde(default)]
    pub filling: FillingSettings,

    /// Input files
    #[serde(default)]
    pub input: InputSettings,

    /// Metadata appended by the pipeline
    #[serde(default)]
    pub run: RunMetadata,
}

impl Settings {
    /// Load settings using the standard search order:
    /// 1. `$MULTIGAP_CONFIG` environment variable
    /// 2. `./multigap.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(settings) => {
                        info!(
                            path = %p.display(),
                            gas = %settings.flux.gas,
                            "Loaded settings from MULTIGAP_CONFIG"
                        );
                        return settings;
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load settings from MULTIGAP_CONFIG, falling back"
                        );
                    }
                }
            } else {
                warn!(path = %path, "MULTIGAP_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(settings) => {
                    info!(gas = %settings.flux.gas, "Loaded settings from ./multigap.toml");
                    return settings;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./multigap.toml, using defaults");
                }
            }
        }

        info!("No multigap.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse settings from TOML text, reporting unknown keys as warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let settings: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        settings.validate()?;
        for w in super::validation::validate_physical_ranges(&settings) {
            warn!(field = %w.field, "{}", w);
        }
        Ok(settings)
    }

    /// Serialize the settings to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save settings to a file (the pipeline keeps a copy per run).
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Validate all settings for internal consistency.
    ///
    /// Every violation is collected so the operator sees them all at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.flux.gas.trim().is_empty() {
            errors.push("flux.gas: must not be empty".to_string());
        }
        if self.flux.column.trim().is_empty() {
            errors.push("flux.column: must not be empty".to_string());
        }
        if !self.flux.conversion_factor.is_finite() || self.flux.conversion_factor <= 0.0 {
            errors.push(format!(
                "flux.conversion_factor: must be finite and > 0 (got {})",
                self.flux.conversion_factor
            ));
        }
        if self.flux.flag_column.is_some() && !self.flux.flag_max.is_finite() {
            errors.push(format!(
                "flux.flag_max: must be finite when a flag column is set (got {})",
                self.flux.flag_max
            ));
        }
        if self.flux.default_technique.trim().is_empty() {
            errors.push("flux.default_technique: must not be empty".to_string());
        }

        Self::check_covariates("lut", &self.lut, &mut errors);
        Self::check_covariates("mds", &self.mds, &mut errors);

        let b = &self.bootstrap;
        if b.repetitions == 0 {
            errors.push("bootstrap.repetitions: must be > 0".to_string());
        }
        if !(b.sample_percent > 0.0 && b.sample_percent <= 100.0) {
            errors.push(format!(
                "bootstrap.sample_percent: must be in (0, 100] (got {})",
                b.sample_percent
            ));
        }

        let f = &self.filling;
        if f.short_gap_half_hours == 0 {
            errors.push("filling.short_gap_half_hours: must be > 0".to_string());
        }
        if f.min_lut_matches == 0 {
            errors.push("filling.min_lut_matches: must be > 0".to_string());
        }
        if !(f.lut_ceiling_fraction > 0.0 && f.lut_ceiling_fraction <= 1.0) {
            errors.push(format!(
                "filling.lut_ceiling_fraction: must be in (0, 1] (got {})",
                f.lut_ceiling_fraction
            ));
        }
        if f.interpolation_max_day_radius == 0 {
            errors.push("filling.interpolation_max_day_radius: must be > 0".to_string());
        }
        if f.interpolation_start_day_radius == 0
            || f.interpolation_start_day_radius > f.interpolation_max_day_radius
        {
            errors.push(format!(
                "filling.interpolation_start_day_radius: must be in [1, {}] (got {})",
                f.interpolation_max_day_radius, f.interpolation_start_day_radius
            ));
        }
        for (key, value) in [
            ("rolling_start_window", f.rolling_start_window),
            ("rolling_window_step", f.rolling_window_step),
            ("rolling_min_points", f.rolling_min_points),
            ("rolling_min_days", f.rolling_min_days),
        ] {
            if value == 0 {
                errors.push(format!("filling.{key}: must be > 0"));
            }
        }
        if f.max_gap_days == 0 {
            errors.push("filling.max_gap_days: must be > 0".to_string());
        }

        if self.input.separator.chars().count() != 1 {
            errors.push(format!(
                "input.separator: must be a single character (got {:?})",
                self.input.separator
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_covariates(section: &str, lut: &LutSettings, errors: &mut Vec<String>) {
        if lut.covariates.len() > MAX_LUT_COVARIATES {
            errors.push(format!(
                "{section}.covariates: at most {MAX_LUT_COVARIATES} covariates supported (got {})",
                lut.covariates.len()
            ));
        }
        for (i, band) in lut.covariates.iter().enumerate() {
            if band.name.trim().is_empty() {
                errors.push(format!("{section}.covariates[{i}].name: must not be empty"));
            }
            // NaN disables the covariate; negative tolerances never match anything
            if band.tolerance < 0.0 {
                errors.push(format!(
                    "{section}.covariates[{i}].tolerance: must be >= 0 (got {})",
                    band.tolerance
                ));
            }
        }
    }

    /// Name of the prepared observed channel.
    pub fn observed_channel(&self) -> &'static str {
        defaults::OBSERVED_CHANNEL
    }

    /// Light covariate and threshold, if both are usable.
    pub fn light_split(&self) -> Option<(&str, f64)> {
        let name = self.light.covariate.trim();
        if name.is_empty() || !self.light.threshold.is_finite() {
            None
        } else {
            Some((name, self.light.threshold))
        }
    }

    /// Field separator of the input tables.
    pub fn separator(&self) -> char {
        self.input.separator.chars().next().unwrap_or(',')
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Settings I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Settings parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Settings serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Settings validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Flux
// ============================================================================

/// The measured flux and its conversion into period sums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluxSettings {
    /// Trace gas label, appears in file names and reports.
    #[serde(default = "default_gas")]
    pub gas: String,

    /// Unit of the half-hourly flux.
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Input column holding the measured flux.
    #[serde(default = "default_flux_column")]
    pub column: String,

    /// Optional quality-flag column; values above `flag_max` are discarded.
    #[serde(default)]
    pub flag_column: Option<String>,

    /// Highest accepted quality flag.
    #[serde(default = "default_flag_max")]
    pub flag_max: f64,

    /// Logger sentinel for a missing flux.
    #[serde(default = "default_missing_value")]
    pub missing_value: f64,

    /// Factor converting one half-hourly flux into its contribution to the sum.
    #[serde(default = "default_conversion_factor")]
    pub conversion_factor: f64,

    /// Unit of the period sums.
    #[serde(default = "default_sum_unit")]
    pub sum_unit: String,

    /// Technique patching residual gaps when filling real gaps.
    #[serde(default = "default_technique")]
    pub default_technique: String,
}

fn default_gas() -> String { "CO2".to_string() }
fn default_unit() -> String { "umol m-2 s-1".to_string() }
fn default_flux_column() -> String { "FC".to_string() }
fn default_flag_max() -> f64 { 1.0 }
fn default_missing_value() -> f64 { defaults::MISSING_VALUE_SENTINEL }
// 1800 s per half-hour * 12.011e-6 g C per umol
fn default_conversion_factor() -> f64 { 0.021_619_8 }
fn default_sum_unit() -> String { "gC m-2".to_string() }
fn default_technique() -> String { "MDC_d7".to_string() }

impl Default for FluxSettings {
    fn default() -> Self {
        Self {
            gas: default_gas(),
            unit: default_unit(),
            column: default_flux_column(),
            flag_column: None,
            flag_max: default_flag_max(),
            missing_value: default_missing_value(),
            conversion_factor: default_conversion_factor(),
            sum_unit: default_sum_unit(),
            default_technique: default_technique(),
        }
    }
}

// ============================================================================
// Look-Up Tables
// ============================================================================

/// A covariate with the absolute tolerance used for LUT matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateBand {
    pub name: String,
    pub tolerance: f64,
}

impl CovariateBand {
    pub fn new(name: &str, tolerance: f64) -> Self {
        Self { name: name.to_string(), tolerance }
    }

    /// A band takes part only if it names a column and has a finite tolerance.
    pub fn is_usable(&self) -> bool {
        !self.name.trim().is_empty() && self.tolerance.is_finite()
    }
}

/// Up to three covariates, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LutSettings {
    #[serde(default = "default_covariates")]
    pub covariates: Vec<CovariateBand>,
}

fn default_covariates() -> Vec<CovariateBand> {
    vec![
        CovariateBand::new("Rg", 50.0),
        CovariateBand::new("Tair", 2.5),
        CovariateBand::new("VPD", 5.0),
    ]
}

impl Default for LutSettings {
    fn default() -> Self {
        Self { covariates: default_covariates() }
    }
}

impl LutSettings {
    /// Leading usable covariates; stops at the first unusable one.
    pub fn usable(&self) -> Vec<CovariateBand> {
        self.covariates
            .iter()
            .take(MAX_LUT_COVARIATES)
            .take_while(|band| band.is_usable())
            .cloned()
            .collect()
    }
}

// ============================================================================
// Light / Day-Night Split
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightSettings {
    /// Light-proxy covariate (global radiation, PPFD, ...).
    #[serde(default = "default_light_covariate")]
    pub covariate: String,

    /// Values above the threshold count as daylight.
    #[serde(default = "default_light_threshold")]
    pub threshold: f64,
}

fn default_light_covariate() -> String { "Rg".to_string() }
fn default_light_threshold() -> f64 { 10.0 }

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            covariate: default_light_covariate(),
            threshold: default_light_threshold(),
        }
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSettings {
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,

    /// Share of all rows drawn per repetition (percent).
    #[serde(default = "default_sample_percent")]
    pub sample_percent: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_repetitions() -> usize { defaults::BOOT_REPETITIONS }
fn default_sample_percent() -> f64 { defaults::BOOT_SAMPLE_PERCENT }
fn default_seed() -> u64 { defaults::BOOT_SEED }

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            sample_percent: default_sample_percent(),
            seed: default_seed(),
        }
    }
}

// ============================================================================
// Filling Policy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillingSettings {
    /// Gaps up to this length (half-hours) are short.
    #[serde(default = "default_short_gap")]
    pub short_gap_half_hours: usize,

    /// Matching measured points required for a LUT value.
    #[serde(default = "default_min_lut_matches")]
    pub min_lut_matches: usize,

    /// LUT growth stops once the day radius exceeds this share of all days.
    #[serde(default = "default_lut_ceiling")]
    pub lut_ceiling_fraction: f64,

    /// Day radius of the first interpolation pass.
    #[serde(default = "default_interpolation_start")]
    pub interpolation_start_day_radius: u32,

    /// Interpolation stops once the day radius exceeds this value.
    #[serde(default = "default_interpolation_ceiling")]
    pub interpolation_max_day_radius: u32,

    /// First centered rolling window of `IP_mov` (half-hours).
    #[serde(default = "default_rolling_start")]
    pub rolling_start_window: usize,

    /// Rolling window growth per attempt (half-hours).
    #[serde(default = "default_rolling_step")]
    pub rolling_window_step: usize,

    /// Measured half-hours required inside a rolling window.
    #[serde(default = "default_rolling_min_points")]
    pub rolling_min_points: usize,

    /// Daily means required by the long-gap rolling fallback.
    #[serde(default = "default_rolling_min_days")]
    pub rolling_min_days: usize,

    /// Longest tolerated observed gap (days).
    #[serde(default = "default_max_gap_days")]
    pub max_gap_days: usize,

    /// Run technique fills and bootstrap repetitions on the rayon pool.
    #[serde(default)]
    pub parallel: bool,
}

fn default_short_gap() -> usize { defaults::SHORT_GAP_HALF_HOURS }
fn default_min_lut_matches() -> usize { defaults::MIN_LUT_MATCHES }
fn default_lut_ceiling() -> f64 { defaults::LUT_CEILING_FRACTION }
fn default_interpolation_start() -> u32 { defaults::INTERPOLATION_START_DAY_RADIUS }
fn default_interpolation_ceiling() -> u32 { defaults::INTERPOLATION_MAX_DAY_RADIUS }
fn default_rolling_start() -> usize { defaults::ROLLING_START_WINDOW }
fn default_rolling_step() -> usize { defaults::ROLLING_WINDOW_STEP }
fn default_rolling_min_points() -> usize { defaults::ROLLING_MIN_POINTS }
fn default_rolling_min_days() -> usize { defaults::ROLLING_MIN_DAYS }
fn default_max_gap_days() -> usize { defaults::MAX_GAP_DAYS }

impl Default for FillingSettings {
    fn default() -> Self {
        Self {
            short_gap_half_hours: default_short_gap(),
            min_lut_matches: default_min_lut_matches(),
            lut_ceiling_fraction: default_lut_ceiling(),
            interpolation_start_day_radius: default_interpolation_start(),
            interpolation_max_day_radius: default_interpolation_ceiling(),
            rolling_start_window: default_rolling_start(),
            rolling_window_step: default_rolling_step(),
            rolling_min_points: default_rolling_min_points(),
            rolling_min_days: default_rolling_min_days(),
            max_gap_days: default_max_gap_days(),
            parallel: false,
        }
    }
}

// ============================================================================
// Input Files
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSettings {
    /// Flux and covariate table, relative to the data directory.
    #[serde(default = "default_data_file")]
    pub data_file: String,

    #[serde(default = "default_separator")]
    pub separator: String,

    /// Optional table with externally modelled `<Model>_hhs` / `<Model>_days` columns.
    #[serde(default)]
    pub models_file: Option<String>,
}

fn default_data_file() -> String { "fluxes.csv".to_string() }
fn default_separator() -> String { ",".to_string() }

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            separator: default_separator(),
            models_file: None,
        }
    }
}

// ============================================================================
// Run Metadata
// ============================================================================

/// Written by the pipeline into the per-run settings copy; never read as policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub run_number: Option<String>,

    #[serde(default)]
    pub code_version: Option<String>,
}
