//! Bringing a building's engine up: load, instantiate, initialize and resolve signals.
use crate::{
    building::{BuildingInstance, Mode},
    engine::{EngineLoader, LogRoute},
    Error,
};

impl BuildingInstance {
    fn expect_mode(&self, expected: Mode, call: &'static str) -> Result<(), Error> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(Error::UnexpectedMode {
                building: self.config.name.clone(),
                mode: self.mode,
                call,
            })
        }
    }

    /// Load and instantiate the prepared package, then enable the engine log categories for the
    /// building's verbosity.
    pub(crate) fn load(&mut self, loader: &dyn EngineLoader) -> Result<(), Error> {
        self.expect_mode(Mode::Uninitialized, "fmi2Instantiate")?;

        let package = self.package_path();
        let route = LogRoute::new(self.config.name.clone(), self.verbosity.level_filter());
        log::debug!(
            "Building '{}': loading package {package:?}",
            self.config.name
        );
        self.engine = Some(loader.load(&package, &self.config.name, route)?);
        self.mode = Mode::Instantiation;

        let wanted = self.verbosity.categories();
        let categories = self
            .engine
            .as_deref()
            .map(|engine| engine.log_categories().to_vec())
            .unwrap_or_default();
        if categories.len() < wanted {
            return Err(Error::Config {
                building: self.config.name.clone(),
                reason: format!(
                    "verbosity '{}' needs {wanted} log categories, but the engine only declares {}",
                    self.verbosity,
                    categories.len()
                ),
            });
        }
        let enabled: Vec<&str> = categories[..wanted].iter().map(String::as_str).collect();
        let name = self.config.name.clone();
        self.call("fmi2SetDebugLogging", &name, |engine| {
            engine.set_debug_logging(true, &enabled)
        })?;
        Ok(())
    }

    /// Resolve every declared signal against the engine's variables.
    pub(crate) fn resolve_signals(&mut self) -> Result<(), Error> {
        let Self {
            engine,
            signals,
            config,
            notices,
            ..
        } = self;
        let Some(engine) = engine.as_deref() else {
            return Err(Error::UnexpectedMode {
                building: config.name.clone(),
                mode: Mode::Uninitialized,
                call: "resolve signals",
            });
        };

        for signal in signals.descriptors_mut() {
            let variable = engine
                .variables()
                .iter()
                .find(|variable| variable.name == signal.name())
                .ok_or_else(|| Error::Resolution {
                    building: config.name.clone(),
                    object: signal.declared_by().to_owned(),
                    signal: signal.name().to_owned(),
                    package: config.package_path(),
                })?;
            if let Some(unit) = &variable.unit {
                if unit.factor == 0.0 || !unit.factor.is_finite() || !unit.offset.is_finite() {
                    return Err(Error::Config {
                        building: config.name.clone(),
                        reason: format!(
                            "unit '{}' of variable '{}' has factor {} and offset {}; values cannot be converted",
                            unit.name, variable.name, unit.factor, unit.offset
                        ),
                    });
                }
            } else {
                let message = format!(
                    "Building '{}': variable '{}' declares no unit; its values are exchanged unconverted",
                    config.name,
                    variable.name
                );
                log::warn!("{message}");
                notices.push(message);
            }
            signal.resolve(variable.value_reference, variable.unit.clone());
        }
        log::debug!(
            "Building '{}': resolved {} signals",
            config.name,
            signals.len()
        );
        Ok(())
    }

    /// Resolve signals, set up the experiment and enter initialization mode.
    pub(crate) fn enter_initialization(&mut self) -> Result<(), Error> {
        self.expect_mode(Mode::Instantiation, "fmi2EnterInitializationMode")?;
        self.resolve_signals()?;

        let name = self.config.name.clone();
        let start_time = self.config.start_time;
        self.call("fmi2SetupExperiment", &name, |engine| {
            engine.setup_experiment(None, start_time, None)
        })?;
        self.call("fmi2EnterInitializationMode", &name, |engine| {
            engine.enter_initialization_mode()
        })?;
        self.mode = Mode::Initialization;
        self.time = start_time;
        log::debug!("{start_time:.3} {name}: entered initialization mode");
        Ok(())
    }

    /// Leave initialization mode; the engine is in event mode afterwards.
    pub(crate) fn exit_initialization(&mut self, object: &str) -> Result<(), Error> {
        self.expect_mode(Mode::Initialization, "fmi2ExitInitializationMode")?;
        self.call("fmi2ExitInitializationMode", object, |engine| {
            engine.exit_initialization_mode()
        })?;
        self.mode = Mode::Event;
        self.epoch += 1;
        self.events = None;
        log::debug!(
            "{:.3} {}: exited initialization mode ({object})",
            self.time,
            self.config.name
        );
        Ok(())
    }
}
