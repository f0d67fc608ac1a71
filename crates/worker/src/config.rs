use std::path::PathBuf;
use std::str::FromStr;

use physio_core::progress::ProgressConfig;
use physio_core::reference::ProfileLibrary;

use crate::error::WorkerError;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Optional JSON file of exercise profile overrides.
    pub profiles_path: Option<PathBuf>,
    /// Directory scanned for `*.json` job files.
    pub jobs_dir: PathBuf,
    /// Directory analysis records are written to.
    pub output_dir: PathBuf,
    /// Maximum number of patients analyzed in parallel.
    pub max_concurrent_runs: usize,
    pub progress: ProgressConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default  |
    /// |------------------------------|----------|
    /// | `PHYSIO_PROFILES_PATH`       | unset    |
    /// | `PHYSIO_JOBS_DIR`            | `jobs`   |
    /// | `PHYSIO_OUTPUT_DIR`          | `output` |
    /// | `PHYSIO_MAX_CONCURRENT_RUNS` | `4`      |
    /// | `PHYSIO_QUALIFYING_SCORE`    | `70`     |
    /// | `PHYSIO_STREAK_WINDOW_DAYS`  | `3`      |
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let profiles_path = lookup("PHYSIO_PROFILES_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let jobs_dir = PathBuf::from(lookup("PHYSIO_JOBS_DIR").unwrap_or_else(|| "jobs".into()));
        let output_dir = PathBuf::from(lookup("PHYSIO_OUTPUT_DIR").unwrap_or_else(|| "output".into()));

        let max_concurrent_runs: usize = parse_var(&lookup, "PHYSIO_MAX_CONCURRENT_RUNS", 4)?;
        if max_concurrent_runs == 0 {
            return Err(WorkerError::Config(
                "PHYSIO_MAX_CONCURRENT_RUNS must be at least 1".into(),
            ));
        }

        let defaults = ProgressConfig::default();
        let progress = ProgressConfig {
            qualifying_score: parse_var(&lookup, "PHYSIO_QUALIFYING_SCORE", defaults.qualifying_score)?,
            recency_window_days: parse_var(
                &lookup,
                "PHYSIO_STREAK_WINDOW_DAYS",
                defaults.recency_window_days,
            )?,
            ..defaults
        };
        progress.validate()?;

        Ok(Self {
            profiles_path,
            jobs_dir,
            output_dir,
            max_concurrent_runs,
            progress,
        })
    }

    /// Built-in profiles, with overrides from `profiles_path` applied.
    pub async fn load_profiles(&self) -> Result<ProfileLibrary, WorkerError> {
        let mut library = ProfileLibrary::builtin();
        if let Some(path) = &self.profiles_path {
            let json = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| WorkerError::io(path, e))?;
            let count = library.apply_overrides_json(&json)?;
            tracing::info!(path = %path.display(), count, "Applied exercise profile overrides");
        }
        Ok(library)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, WorkerError>
where
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WorkerError::Config(format!("{name} has an invalid value: {raw:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.jobs_dir, PathBuf::from("jobs"));
        assert_eq!(cfg.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.max_concurrent_runs, 4);
        assert!(cfg.profiles_path.is_none());
        assert_eq!(cfg.progress.qualifying_score, 70.0);
        assert_eq!(cfg.progress.recency_window_days, 3);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = WorkerConfig::from_lookup(lookup(&[
            ("PHYSIO_MAX_CONCURRENT_RUNS", "8"),
            ("PHYSIO_QUALIFYING_SCORE", "65.5"),
            ("PHYSIO_STREAK_WINDOW_DAYS", "7"),
            ("PHYSIO_PROFILES_PATH", "/etc/physio/profiles.json"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_concurrent_runs, 8);
        assert_eq!(cfg.progress.qualifying_score, 65.5);
        assert_eq!(cfg.progress.recency_window_days, 7);
        assert_eq!(cfg.profiles_path, Some(PathBuf::from("/etc/physio/profiles.json")));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        assert_matches!(
            WorkerConfig::from_lookup(lookup(&[("PHYSIO_MAX_CONCURRENT_RUNS", "many")])),
            Err(WorkerError::Config(_))
        );
        assert_matches!(
            WorkerConfig::from_lookup(lookup(&[("PHYSIO_MAX_CONCURRENT_RUNS", "0")])),
            Err(WorkerError::Config(_))
        );
        assert_matches!(
            WorkerConfig::from_lookup(lookup(&[("PHYSIO_QUALIFYING_SCORE", "140")])),
            Err(WorkerError::Core(_))
        );
    }

    #[tokio::test]
    async fn missing_profile_file_is_an_io_error() {
        let cfg = WorkerConfig::from_lookup(lookup(&[(
            "PHYSIO_PROFILES_PATH",
            "/nonexistent/physio/profiles.json",
        )]))
        .unwrap();
        assert_matches!(cfg.load_profiles().await, Err(WorkerError::Io { .. }));
    }
}
