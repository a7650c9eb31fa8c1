//! Per-building configuration supplied by the host.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Verbosity requested by the host for a building.
///
/// The numeric value is the number of engine log categories that get enabled, so a building at
/// [`Verbosity::Medium`] turns on the first four categories the engine advertises.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Errors = 1,
    Warnings = 2,
    #[default]
    Quiet = 3,
    Medium = 4,
    Timestep = 5,
}

impl Verbosity {
    /// Number of engine log categories enabled at this verbosity.
    pub fn categories(self) -> usize {
        self as usize
    }

    /// Most verbose level of engine messages forwarded to the log facade.
    pub fn level_filter(self) -> log::LevelFilter {
        match self {
            Verbosity::Errors => log::LevelFilter::Error,
            Verbosity::Warnings => log::LevelFilter::Warn,
            Verbosity::Quiet | Verbosity::Medium => log::LevelFilter::Info,
            Verbosity::Timestep => log::LevelFilter::Debug,
        }
    }
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Verbosity::Errors => "errors",
            Verbosity::Warnings => "warnings",
            Verbosity::Quiet => "quiet",
            Verbosity::Medium => "medium",
            Verbosity::Timestep => "timestep",
        };
        write!(f, "{name}")
    }
}

/// Everything the host declares about a building.
///
/// Objects that name the same building must agree on the model, weather and precompiled package
/// fields; [`BuildingConfig::check_consistent`] enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildingConfig {
    /// Building name; the key of the building registry.
    pub name: String,
    /// Building model (idf) file.
    pub idf: PathBuf,
    /// Weather file.
    pub weather: PathBuf,
    /// Package generator executable. Required unless `precompiled_package` is set.
    pub generator: Option<PathBuf>,
    /// Prebuilt package copied into place instead of running the generator.
    pub precompiled_package: Option<PathBuf>,
    pub relative_surface_tolerance: f64,
    /// Start time of the experiment in seconds. Must not be negative.
    pub start_time: f64,
    pub verbosity: Verbosity,
    /// Directory the per-building working directory is created in.
    pub work_dir: PathBuf,
    /// Requests closer than this to the current building time do not advance it.
    pub time_tolerance: f64,
    pub max_event_iterations: usize,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            idf: PathBuf::new(),
            weather: PathBuf::new(),
            generator: None,
            precompiled_package: None,
            relative_surface_tolerance: 1e-6,
            start_time: 0.0,
            verbosity: Verbosity::default(),
            work_dir: PathBuf::from("."),
            time_tolerance: 1e-3,
            max_event_iterations: 50,
        }
    }
}

impl BuildingConfig {
    pub fn new(name: impl Into<String>, idf: impl Into<PathBuf>, weather: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            idf: idf.into(),
            weather: weather.into(),
            ..Default::default()
        }
    }

    pub fn with_generator(mut self, generator: impl Into<PathBuf>) -> Self {
        self.generator = Some(generator.into());
        self
    }

    pub fn with_precompiled_package(mut self, package: impl Into<PathBuf>) -> Self {
        self.precompiled_package = Some(package.into());
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Parse a configuration from its JSON form.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::Config {
            building: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Check the configuration before any state is created for it.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(self.error("building name must not be empty"));
        }
        if self.start_time < 0.0 {
            return Err(self.error(format!(
                "start time {} is negative; negative start times are not supported",
                self.start_time
            )));
        }
        if self.time_tolerance < 0.0 || self.max_event_iterations == 0 {
            return Err(self.error("time tolerance and event iteration limit must be positive"));
        }
        readable(&self.idf).map_err(|reason| self.error(format!("idf file: {reason}")))?;
        readable(&self.weather).map_err(|reason| self.error(format!("weather file: {reason}")))?;
        if let Some(package) = &self.precompiled_package {
            readable(package)
                .map_err(|reason| self.error(format!("precompiled package: {reason}")))?;
        }
        Ok(())
    }

    /// Reject a declaration that disagrees with the building it joins.
    pub fn check_consistent(&self, existing: &BuildingConfig) -> Result<(), Error> {
        if self.idf != existing.idf {
            return Err(self.error(format!(
                "objects declare different idf files '{}' and '{}'",
                existing.idf.display(),
                self.idf.display()
            )));
        }
        if self.weather != existing.weather {
            return Err(self.error(format!(
                "objects declare different weather files '{}' and '{}'",
                existing.weather.display(),
                self.weather.display()
            )));
        }
        if self.precompiled_package != existing.precompiled_package {
            return Err(self.error(format!(
                "objects declare different precompiled packages {:?} and {:?}",
                existing.precompiled_package, self.precompiled_package
            )));
        }
        Ok(())
    }

    /// Building name with characters that are awkward in file names replaced.
    pub fn file_stem(&self) -> String {
        self.name.replace(['[', ']', '/', '\\'], "_")
    }

    /// Working directory of this building.
    pub fn building_dir(&self) -> PathBuf {
        self.work_dir
            .join(format!("EnergyPlus-simulation-{}", self.file_stem()))
    }

    /// Location of the package inside the building directory.
    pub fn package_path(&self) -> PathBuf {
        self.building_dir().join(format!("{}.fmu", self.file_stem()))
    }

    /// Location of the canonical description inside the building directory.
    pub fn description_path(&self) -> PathBuf {
        self.building_dir().join("ModelicaBuildingsEnergyPlus.json")
    }
}

fn readable(path: &Path) -> Result<(), String> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(format!("'{}' is not a file", path.display())),
        Err(err) => Err(format!("cannot read '{}': {err}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> (tempfile::TempDir, BuildingConfig) {
        let dir = tempfile::tempdir().unwrap();
        let idf = dir.path().join("house.idf");
        let weather = dir.path().join("chicago.mos");
        std::fs::write(&idf, "Version,9.6;").unwrap();
        std::fs::write(&weather, "#1").unwrap();
        let config = BuildingConfig::new("bui", idf, weather).with_work_dir(dir.path());
        (dir, config)
    }

    #[test]
    fn validates_files() {
        let (_dir, config) = files();
        assert!(config.validate().is_ok());

        let missing = BuildingConfig {
            weather: "missing.mos".into(),
            ..config
        };
        let err = missing.validate().unwrap_err();
        assert!(err.to_string().contains("weather file"), "{err}");
    }

    #[test]
    fn negative_start_time() {
        let (_dir, config) = files();
        let err = config.with_start_time(-1.0).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn paths() {
        let config = BuildingConfig::new("bui[2]", "a.idf", "b.mos").with_work_dir("/tmp/run");
        assert_eq!(
            config.building_dir(),
            PathBuf::from("/tmp/run/EnergyPlus-simulation-bui_2_")
        );
        assert_eq!(
            config.package_path(),
            PathBuf::from("/tmp/run/EnergyPlus-simulation-bui_2_/bui_2_.fmu")
        );
    }

    #[test]
    fn from_json_defaults() {
        let config =
            BuildingConfig::from_json(r#"{"name": "bui", "idf": "a.idf", "weather": "b.mos", "verbosity": "medium"}"#)
                .unwrap();
        assert_eq!(config.verbosity, Verbosity::Medium);
        assert_eq!(config.max_event_iterations, 50);
        assert_eq!(config.time_tolerance, 1e-3);
    }

    #[test]
    fn inconsistent_declarations() {
        let a = BuildingConfig::new("bui", "a.idf", "b.mos");
        let b = BuildingConfig::new("bui", "other.idf", "b.mos");
        assert!(a.check_consistent(&a.clone()).is_ok());
        assert!(b.check_consistent(&a).is_err());
    }

    #[test]
    fn verbosity_order() {
        assert!(Verbosity::Timestep > Verbosity::Quiet);
        assert_eq!(Verbosity::Medium.categories(), 4);
    }
}
