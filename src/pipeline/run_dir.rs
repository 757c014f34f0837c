//! Per-run directory layout.
//!
//! ```text
//! <data_dir>/<run>/
//! ├── _in/    copies of the input tables
//! ├── _mgf/   intermediate tables and the resolved settings
//! ├── _res/   result tables
//! └── log_<run>.log
//! ```

use chrono::Local;
use std::path::{Path, PathBuf};

use super::PipelineError;

const INPUT_DIR: &str = "_in";
const WORK_DIR: &str = "_mgf";
const RESULT_DIR: &str = "_res";

/// Run number from the local clock (`YYYYMMDDHHMM`).
pub fn new_run_number() -> String {
    Local::now().format("%Y%m%d%H%M").to_string()
}

#[derive(Debug, Clone)]
pub struct RunDir {
    data_dir: PathBuf,
    run_number: String,
}

impl RunDir {
    /// Layout of a new run; nothing is created on disk yet.
    pub fn new(data_dir: &Path, run_number: &str) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            run_number: run_number.to_string(),
        }
    }

    /// Create `_in/`, `_mgf/` and `_res/`.
    pub fn create_tree(&self) -> Result<(), PipelineError> {
        for dir in [self.input_dir(), self.work_dir(), self.result_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| PipelineError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Open an existing run; the directory must already exist.
    pub fn open(data_dir: &Path, run_number: &str) -> Result<Self, PipelineError> {
        let run = Self::new(data_dir, run_number);
        if !run.root().is_dir() {
            return Err(PipelineError::UnknownRun(run.root()));
        }
        Ok(run)
    }

    pub fn run_number(&self) -> &str {
        &self.run_number
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn root(&self) -> PathBuf {
        self.data_dir.join(&self.run_number)
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root().join(INPUT_DIR)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root().join(WORK_DIR)
    }

    pub fn result_dir(&self) -> PathBuf {
        self.root().join(RESULT_DIR)
    }

    pub fn log_file(&self) -> PathBuf {
        self.root().join(format!("log_{}.log", self.run_number))
    }

    pub fn settings_file(&self) -> PathBuf {
        self.work_dir().join(format!("settings_{}.toml", self.run_number))
    }

    /// `<dir>/<prefix>_<gas>_<run>[_<suffix>].csv`
    pub fn table(&self, dir: PathBuf, prefix: &str, gas: &str, suffix: Option<&str>) -> PathBuf {
        let name = match suffix {
            Some(suffix) => format!("{prefix}_{gas}_{}_{suffix}.csv", self.run_number),
            None => format!("{prefix}_{gas}_{}.csv", self.run_number),
        };
        dir.join(name)
    }

    /// Copy an input file from the data directory into `_in/`.
    pub fn copy_input(&self, file_name: &str) -> Result<PathBuf, PipelineError> {
        let from = self.data_dir.join(file_name);
        let to = self.input(file_name);
        std::fs::copy(&from, &to).map_err(|source| PipelineError::Io { path: from, source })?;
        Ok(to)
    }

    /// Path of an input file after [`copy_input`](Self::copy_input).
    pub fn input(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(file_name));
        self.input_dir().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_names() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDir::new(tmp.path(), "202201011200");
        assert!(!run.root().exists());
        assert!(matches!(
            RunDir::open(tmp.path(), "202201011200"),
            Err(PipelineError::UnknownRun(_))
        ));

        run.create_tree().unwrap();
        assert!(run.work_dir().is_dir() && run.result_dir().is_dir() && run.input_dir().is_dir());
        assert_eq!(
            run.table(run.result_dir(), "sums", "CO2", Some("all")),
            tmp.path().join("202201011200/_res/sums_CO2_202201011200_all.csv")
        );
        assert!(run.log_file().ends_with("log_202201011200.log"));
        assert!(RunDir::open(tmp.path(), "202201011200").is_ok());
        assert!(matches!(RunDir::open(tmp.path(), "1999"), Err(PipelineError::UnknownRun(_))));
    }

    #[test]
    fn run_number_is_minute_stamp() {
        let n = new_run_number();
        assert_eq!(n.len(), 12);
        assert!(n.chars().all(|c| c.is_ascii_digit()));
    }
}
