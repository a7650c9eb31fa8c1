//! The building instance: one engine shared by all exchange objects that name the same building.
use std::path::PathBuf;

use crate::{
    arena::Index,
    config::{BuildingConfig, Verbosity},
    engine::{CoSimulationEngine, Fmi2Error, Fmi2Res},
    signal::{SignalDescriptor, SignalId, SignalTable},
    Error,
};

/// Lifecycle state of a building's engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// No engine loaded yet.
    #[default]
    Uninitialized,
    /// Engine loaded and instantiated.
    Instantiation,
    Initialization,
    Event,
    ContinuousTime,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::Uninitialized => "uninitialized",
            Mode::Instantiation => "instantiation",
            Mode::Initialization => "initialization",
            Mode::Event => "event",
            Mode::ContinuousTime => "continuous-time",
        };
        write!(f, "{name}")
    }
}

pub struct BuildingInstance {
    pub(crate) config: BuildingConfig,
    /// Highest verbosity requested by any of the objects.
    pub(crate) verbosity: Verbosity,
    pub(crate) mode: Mode,
    /// Engine time; never decreases.
    pub(crate) time: f64,
    pub(crate) engine: Option<Box<dyn CoSimulationEngine>>,
    /// Exchange objects in declaration order.
    pub(crate) objects: Vec<Index>,
    pub(crate) signals: SignalTable,
    pub(crate) content_hash: Option<String>,
    /// Name of the building whose package was copied instead of generating one.
    pub(crate) reused_from: Option<String>,
    /// Bumped whenever engine state may have changed; cached outputs are valid for one epoch.
    pub(crate) epoch: u64,
    /// Epoch and result of the last event iteration.
    pub(crate) events: Option<(u64, f64)>,
    /// Set when bringing up or driving the engine failed; the building is unusable afterwards.
    pub(crate) failure: Option<String>,
    pub(crate) notices: Vec<String>,
}

impl std::fmt::Debug for BuildingInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildingInstance")
            .field("name", &self.config.name)
            .field("mode", &self.mode)
            .field("time", &self.time)
            .field("objects", &self.objects.len())
            .field("signals", &self.signals.len())
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

impl BuildingInstance {
    /// Create an empty building and its working directory.
    pub(crate) fn new(config: BuildingConfig) -> Result<Self, Error> {
        let dir = config.building_dir();
        std::fs::create_dir_all(&dir)?;
        log::debug!(
            "Created building '{}' with working directory {dir:?}",
            config.name
        );
        Ok(Self {
            verbosity: config.verbosity,
            time: config.start_time,
            config,
            mode: Mode::Uninitialized,
            engine: None,
            objects: Vec::new(),
            signals: SignalTable::default(),
            content_hash: None,
            reused_from: None,
            epoch: 0,
            events: None,
            failure: None,
            notices: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &BuildingConfig {
        &self.config
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Hash of the canonical description, once the package has been prepared.
    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn package_path(&self) -> PathBuf {
        self.config.package_path()
    }

    pub fn reused_from(&self) -> Option<&str> {
        self.reused_from.as_deref()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn signals(&self) -> &SignalTable {
        &self.signals
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn signal(&self, id: SignalId) -> Result<&SignalDescriptor, Error> {
        self.signals.get(id).ok_or(Error::StaleHandle)
    }

    /// Merge the verbosity of a newly declared object; the highest wins.
    pub(crate) fn request_verbosity(&mut self, verbosity: Verbosity) {
        if verbosity != self.verbosity {
            self.notice(format!(
                "Objects of building '{}' declare different verbosities '{}' and '{}'; using the highest",
                self.config.name, self.verbosity, verbosity
            ));
            self.verbosity = self.verbosity.max(verbosity);
        }
    }

    pub(crate) fn notice(&mut self, message: String) {
        log::warn!("{message}");
        self.notices.push(message);
    }

    /// Run one engine call. Any status other than `OK`, warnings included, becomes an error
    /// naming the building, the object and the call.
    pub(crate) fn call(
        &mut self,
        call: &'static str,
        object: &str,
        f: impl FnOnce(&mut dyn CoSimulationEngine) -> Result<Fmi2Res, Fmi2Error>,
    ) -> Result<(), Error> {
        let Self {
            engine,
            config,
            mode,
            time,
            ..
        } = self;
        let Some(engine) = engine.as_deref_mut() else {
            return Err(Error::UnexpectedMode {
                building: config.name.clone(),
                mode: *mode,
                call,
            });
        };
        log::trace!("{time:.3} {}: {call} ({object})", config.name);
        match f(engine) {
            Ok(Fmi2Res::OK) => Ok(()),
            Ok(Fmi2Res::Warning) => Err(Fmi2Error::Warning),
            Err(status) => Err(status),
        }
        .map_err(|status| Error::Protocol {
            building: config.name.clone(),
            object: object.to_owned(),
            call,
            status,
        })
    }

    /// Terminate the engine if it is running and release it. Safe to call repeatedly and on a
    /// building whose engine never loaded.
    pub(crate) fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if matches!(self.mode, Mode::Event | Mode::ContinuousTime) {
                if let Err(status) = engine.terminate() {
                    log::warn!(
                        "Building '{}': terminating the engine failed with status {status}",
                        self.config.name
                    );
                }
            }
            log::debug!("Released engine of building '{}'", self.config.name);
        }
        self.mode = Mode::Uninitialized;
    }
}

impl Drop for BuildingInstance {
    fn drop(&mut self) {
        self.teardown();
    }
}
