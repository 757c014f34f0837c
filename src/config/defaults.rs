//! System-wide default constants.
//!
//! Gap-class, look-up, interpolation and bootstrap policies are the values
//! [`Settings`](super::Settings) falls back to when a settings file leaves a
//! key out. Series layout, reporting precision and channel names are fixed.

// ============================================================================
// Series Layout
// ============================================================================

/// Half-hours per calendar day.
pub const HALF_HOURS_PER_DAY: usize = 48;

/// Cadence of the series in minutes.
pub const HALF_HOUR_MINUTES: i64 = 30;

/// Shift applied to right-closed stamps before any calendar arithmetic (minutes).
///
/// `00:00` belongs to the previous day; `23:45` after the shift does not.
pub const STAMP_SHIFT_MINUTES: i64 = 15;

/// Value used by data loggers to mark a missing flux.
pub const MISSING_VALUE_SENTINEL: f64 = -9999.0;

/// Longest tolerated gap in the observed channel (days).
pub const MAX_GAP_DAYS: usize = 10;

// ============================================================================
// Gap Classes
// ============================================================================

/// Gaps up to this many half-hours are "short" (12 half-hours = 6 hours).
pub const SHORT_GAP_HALF_HOURS: usize = 12;

// ============================================================================
// Look-Up Table Filling
// ============================================================================

/// Minimum number of matching measured points required to accept a LUT value.
pub const MIN_LUT_MATCHES: usize = 2;

/// LUT window growth stops once the day radius exceeds this share of all days.
pub const LUT_CEILING_FRACTION: f64 = 0.5;

// ============================================================================
// Interpolation Filling
// ============================================================================

/// Initial day radius of the interpolation window.
pub const INTERPOLATION_START_DAY_RADIUS: u32 = 1;

/// Interpolation gives up once the day radius exceeds this value.
pub const INTERPOLATION_MAX_DAY_RADIUS: u32 = 10;

/// First centered rolling window (half-hours) of the moving-average technique.
pub const ROLLING_START_WINDOW: usize = 5;

/// Rolling window growth per attempt (half-hours).
pub const ROLLING_WINDOW_STEP: usize = 2;

/// Non-missing points required inside a rolling window.
pub const ROLLING_MIN_POINTS: usize = 2;

/// Non-missing daily means required by the long-gap rolling fallback.
pub const ROLLING_MIN_DAYS: usize = 2;

// ============================================================================
// Bootstrap
// ============================================================================

/// Number of bootstrap repetitions (99 is enough for quick tests).
pub const BOOT_REPETITIONS: usize = 999;

/// Share of all rows drawn per repetition (percent).
pub const BOOT_SAMPLE_PERCENT: f64 = 50.0;

/// Seed of the resampling generator.
pub const BOOT_SEED: u64 = 99;

// ============================================================================
// Reporting Precision
// ============================================================================

/// Decimal places of bootstrap error estimates.
pub const ERROR_DECIMALS: u32 = 6;

/// Decimal places of period sums.
pub const SUM_DECIMALS: u32 = 4;

/// Decimal places of ensemble results.
pub const ENSEMBLE_DECIMALS: u32 = 1;

// ============================================================================
// Channel Names
// ============================================================================

/// Name of the prepared observed-flux channel.
pub const OBSERVED_CHANNEL: &str = "flux_obs";

/// Suffix of channels holding observed values patched with a technique.
pub const REAL_SUFFIX: &str = "real";

/// Ensemble selection used for ammonia when the caller supplies none.
pub const NH3_ENSEMBLE_PATTERN: &str =
    "IP|WDM|FDA|MDA|LUT_V1_d7|LUT_V1V2_d7|LUT_V1V2V3_d7|ANN";
