use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{HseError, Result};
use crate::kpi::DEFAULT_HOURS_WORKED;

pub const DEFAULT_CONFIG_FILE: &str = "hse.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HseConfig {
    pub hours_worked: f64,
    pub others_min_count: usize,
    pub pareto_top_n: usize,
    pub forecast_months: usize,
    pub datasets: DatasetPaths,
    pub insights: InsightConfig,
}

impl Default for HseConfig {
    fn default() -> Self {
        Self {
            hours_worked: DEFAULT_HOURS_WORKED,
            others_min_count: 8,
            pareto_top_n: 15,
            forecast_months: 4,
            datasets: DatasetPaths::default(),
            insights: InsightConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetPaths {
    pub incident: Option<PathBuf>,
    pub hazard: Option<PathBuf>,
    pub audit: Option<PathBuf>,
    pub inspection: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InsightConfig {
    /// Program and arguments; unset means deterministic insights only.
    pub command: Option<Vec<String>>,
    pub timeout_secs: u64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 20,
        }
    }
}

impl HseConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.hours_worked > 0.0 && self.hours_worked.is_finite()) {
            return Err(HseError::InvalidArgument(format!(
                "hours_worked must be positive, got {}",
                self.hours_worked
            )));
        }
        if self.forecast_months == 0 || self.forecast_months > 12 {
            return Err(HseError::InvalidArgument(format!(
                "forecast_months must be between 1 and 12, got {}",
                self.forecast_months
            )));
        }
        if matches!(&self.insights.command, Some(argv) if argv.is_empty()) {
            return Err(HseError::InvalidArgument(
                "insights.command must name a program".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies command-line overrides and re-validates, so flags obey the same bounds as the file.
    pub fn with_overrides(mut self, hours_worked: Option<f64>, forecast_months: Option<usize>) -> Result<Self> {
        if let Some(hours) = hours_worked {
            self.hours_worked = hours;
        }
        if let Some(months) = forecast_months {
            self.forecast_months = months;
        }
        self.validate()?;
        Ok(self)
    }
}

pub fn parse_config(contents: &str, path: &Path) -> Result<HseConfig> {
    let config: HseConfig = toml::from_str(contents).map_err(|source| HseError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads `path`, or `hse.toml` in the working directory when no path is given.
///
/// A missing default file yields defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<HseConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound && !explicit => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(HseConfig::default());
        }
        Err(source) => return Err(HseError::Io { path, source }),
    };
    let config = parse_config(&contents, &path)?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("", Path::new("hse.toml")).unwrap();
        assert_eq!(config, HseConfig::default());
        assert_eq!(config.hours_worked, 2_000_000.0);
        assert_eq!(config.insights.timeout_secs, 20);
    }

    #[test]
    fn parses_sections() {
        let toml = r#"
            hours_worked = 500000
            pareto_top_n = 10

            [datasets]
            incident = "data/incidents.csv"

            [insights]
            command = ["summarize", "--markdown"]
            timeout_secs = 5
        "#;
        let config = parse_config(toml, Path::new("hse.toml")).unwrap();
        assert_eq!(config.hours_worked, 500_000.0);
        assert_eq!(config.pareto_top_n, 10);
        assert_eq!(config.others_min_count, 8);
        assert_eq!(config.datasets.incident, Some(PathBuf::from("data/incidents.csv")));
        assert_eq!(config.insights.command.as_deref().map(|c| c.len()), Some(2));
    }

    #[test]
    fn rejects_non_positive_hours() {
        let err = parse_config("hours_worked = 0", Path::new("hse.toml")).unwrap_err();
        assert!(matches!(err, HseError::InvalidArgument(_)));
    }

    #[test]
    fn overrides_are_validated_like_the_file() {
        let config = HseConfig::default().with_overrides(Some(500_000.0), Some(6)).unwrap();
        assert_eq!(config.hours_worked, 500_000.0);
        assert_eq!(config.forecast_months, 6);

        let unchanged = HseConfig::default().with_overrides(None, None).unwrap();
        assert_eq!(unchanged, HseConfig::default());

        for (hours, months) in [(Some(-1.0), None), (None, Some(0)), (None, Some(50))] {
            let err = HseConfig::default().with_overrides(hours, months).unwrap_err();
            assert!(matches!(err, HseError::InvalidArgument(_)));
        }
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let err = parse_config("hours_worked = \"lots\"", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, HseError::Config { .. }));
    }

    #[test]
    fn missing_default_is_fine_but_missing_explicit_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(load_config(Some(&missing)), Err(HseError::Io { .. })));

        let path = dir.path().join("hse.toml");
        fs::write(&path, "forecast_months = 6\n").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().forecast_months, 6);
    }
}
