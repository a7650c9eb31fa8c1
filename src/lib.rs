#![doc=include_str!( "../README.md")]
#![deny(clippy::all)]

mod arena;
pub mod building;
pub mod config;
pub mod description;
pub mod engine;
pub mod generate;
pub mod host;
mod lifecycle;
pub mod object;
pub mod registry;
pub mod signal;
pub mod sync;

use std::path::PathBuf;

pub use building::{BuildingInstance, Mode};
pub use config::{BuildingConfig, Verbosity};
pub use engine::{CoSimulationEngine, EngineLoader};
pub use generate::{CommandGenerator, PackageGenerator};
pub use host::{Bridge, HostCallbacks};
pub use object::{ObjectKind, ObjectSpec};
pub use registry::{ObjectHandle, Registry};
pub use signal::{Direction, SignalSpec};
pub use sync::Exchange;

use engine::Fmi2Error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Building '{building}': {reason}")]
    Config { building: String, reason: String },

    #[error("Building '{building}': failed to produce the package: {reason}")]
    Generation { building: String, reason: String },

    #[error(
        "Building '{building}': variable '{signal}' required by '{object}' does not exist in {package:?}"
    )]
    Resolution {
        building: String,
        object: String,
        signal: String,
        package: PathBuf,
    },

    #[error("Signal '{signal}' has not been resolved against the engine")]
    Unresolved { signal: String },

    #[error("Building '{building}': {call} failed for '{object}' with status {status}")]
    Protocol {
        building: String,
        object: String,
        call: &'static str,
        #[source]
        status: Fmi2Error,
    },

    #[error("Building '{building}': {call} is not allowed in {mode} mode")]
    UnexpectedMode {
        building: String,
        mode: Mode,
        call: &'static str,
    },

    #[error(
        "Building '{building}': cannot advance to t = {time} before '{object}' completed its initial exchange"
    )]
    PendingInitialization {
        building: String,
        object: String,
        time: f64,
    },

    #[error("Building '{building}': non-finite value for '{signal}' at t = {time}")]
    NonFinite {
        building: String,
        signal: String,
        time: f64,
    },

    #[error("Building '{building}': the engine requested to terminate the simulation at t = {time}")]
    Terminated { building: String, time: f64 },

    #[error(
        "Building '{building}': event iteration did not converge in {iterations} iterations at t = {time}"
    )]
    EventIteration {
        building: String,
        iterations: usize,
        time: f64,
    },

    #[error("Building '{building}': the engine did not define the next event time at t = {time}")]
    NoNextEvent { building: String, time: f64 },

    #[error(
        "Building '{building}': the engine requested its next event at {next}, which is not after t = {time}"
    )]
    NonPositiveStep {
        building: String,
        time: f64,
        next: f64,
    },

    #[error("Building '{building}' is unusable after an earlier failure: {reason}")]
    StaleBuilding { building: String, reason: String },

    #[error("The object handle is stale or was never allocated")]
    StaleHandle,

    #[error("Object '{object}' declares {expected} inputs, but {found} values were given")]
    InputCount {
        object: String,
        expected: usize,
        found: usize,
    },

    #[error("Error instantiating the engine of building '{0}'")]
    Instantiation(String),

    #[error("Unsupported platform {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Unsupported FMI version {0}")]
    UnsupportedFmiVersion(String),

    #[error("Unsupported package type {0}")]
    UnsupportedFmuType(String),

    #[error("TypesPlatform of loaded API ({0}) doesn't match expected (default)")]
    TypesPlatformMismatch(String),

    #[error("Package structure is not as expected: {0}")]
    ArchiveStructure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Xml(#[from] hard_xml::XmlError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Nul(#[from] std::ffi::NulError),

    #[error(transparent)]
    LibLoading {
        #[from]
        source: libloading::Error,
    },
}

impl Error {
    /// Whether the error leaves the building's engine in an unknown state, so the building can
    /// not be used again.
    pub fn poisons_building(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. }
                | Error::UnexpectedMode { .. }
                | Error::NonFinite { .. }
                | Error::Terminated { .. }
                | Error::EventIteration { .. }
                | Error::NoNextEvent { .. }
                | Error::NonPositiveStep { .. }
        )
    }
}
