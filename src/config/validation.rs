//! Settings validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks on policy values.
//!
//! The raw TOML is first walked as a `toml::Value` tree and every dotted key
//! is compared against the fields of [`Settings`](super::Settings). Unknown
//! keys only produce warnings; serde then deserializes as usual.

use std::collections::HashSet;

/// A non-fatal settings warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Settings Keys
// ============================================================================

/// Every valid dotted key path of `Settings`.
///
/// Kept by hand in step with `settings.rs`. Array-of-table entries
/// (`[[lut.covariates]]`) are listed under the array's own path.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [flux]
        "flux",
        "flux.gas",
        "flux.unit",
        "flux.column",
        "flux.flag_column",
        "flux.flag_max",
        "flux.missing_value",
        "flux.conversion_factor",
        "flux.sum_unit",
        "flux.default_technique",
        // [lut]
        "lut",
        "lut.covariates",
        "lut.covariates.name",
        "lut.covariates.tolerance",
        // [mds]
        "mds",
        "mds.covariates",
        "mds.covariates.name",
        "mds.covariates.tolerance",
        // [light]
        "light",
        "light.covariate",
        "light.threshold",
        // [bootstrap]
        "bootstrap",
        "bootstrap.repetitions",
        "bootstrap.sample_percent",
        "bootstrap.seed",
        // [filling]
        "filling",
        "filling.short_gap_half_hours",
        "filling.min_lut_matches",
        "filling.lut_ceiling_fraction",
        "filling.interpolation_start_day_radius",
        "filling.interpolation_max_day_radius",
        "filling.rolling_start_window",
        "filling.rolling_window_step",
        "filling.rolling_min_points",
        "filling.rolling_min_days",
        "filling.max_gap_days",
        "filling.parallel",
        // [input]
        "input",
        "input.data_file",
        "input.separator",
        "input.models_file",
        // [run]
        "run",
        "run.run_number",
        "run.code_version",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// A table `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`; tables
/// inside arrays contribute their keys under the array's path.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|item| item.is_table()) {
                        for key in walk_toml_keys(item, &path) {
                            if !keys.contains(&key) {
                                keys.push(key);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation
// ============================================================================

/// Return warnings for every unknown key in a raw TOML string.
///
/// Parse errors yield no warnings; serde reports them afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown settings key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Flag values that are legal but unusual for half-hourly flux gap-filling.
pub fn validate_physical_ranges(settings: &super::Settings) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    if settings.bootstrap.repetitions < 99 {
        warn(
            "bootstrap.repetitions",
            format!(
                "bootstrap.repetitions = {} gives unstable percentiles (99 or more recommended)",
                settings.bootstrap.repetitions
            ),
        );
    }

    if settings.bootstrap.sample_percent < 10.0 {
        warn(
            "bootstrap.sample_percent",
            format!(
                "bootstrap.sample_percent = {:.1} draws very few points per repetition",
                settings.bootstrap.sample_percent
            ),
        );
    }

    let t = settings.light.threshold;
    if t.is_finite() && !(0.0..=100.0).contains(&t) {
        warn(
            "light.threshold",
            format!("light.threshold = {t:.1} is outside the typical day/night range (0-100)"),
        );
    }

    // A short gap longer than a day would route every gap to the short-gap branch
    if settings.filling.short_gap_half_hours > super::defaults::HALF_HOURS_PER_DAY {
        warn(
            "filling.short_gap_half_hours",
            format!(
                "filling.short_gap_half_hours = {} exceeds one day",
                settings.filling.short_gap_half_hours
            ),
        );
    }

    if settings.filling.max_gap_days > 30 {
        warn(
            "filling.max_gap_days",
            format!(
                "filling.max_gap_days = {} tolerates gaps longer than a month",
                settings.filling.max_gap_days
            ),
        );
    }

    warnings
}
