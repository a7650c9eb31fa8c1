//! The simulation engine behind a building.
//!
//! [`CoSimulationEngine`] is the FMI 2.0 Model-Exchange surface the bridge drives. The production
//! implementation, [`fmu::FmuEngine`], loads the shared library shipped inside a generated
//! package; tests substitute scripted engines through [`EngineLoader`].

mod event_flags;
pub mod fmu;
mod schema;
mod status;

use std::path::Path;

pub use event_flags::EventFlags;
pub use spawn_sys::logger::LogRoute;
pub use status::{Fmi2Error, Fmi2Res, Fmi2Status};

use crate::{signal::Unit, Error};

/// A real-valued variable exposed by a loaded engine.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub value_reference: u32,
    /// Unit and conversion to SI, when the engine declares one.
    pub unit: Option<Unit>,
}

/// FMI 2.0 Model-Exchange calls used by the bridge.
///
/// Implementations own the instance they drive and release it on drop.
pub trait CoSimulationEngine {
    /// Real variables declared by the engine.
    fn variables(&self) -> &[VariableInfo];

    /// Log categories advertised by the engine, in declaration order.
    fn log_categories(&self) -> &[String];

    fn set_debug_logging(
        &mut self,
        logging_on: bool,
        categories: &[&str],
    ) -> Result<Fmi2Res, Fmi2Error>;

    fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Result<Fmi2Res, Fmi2Error>;

    fn enter_initialization_mode(&mut self) -> Result<Fmi2Res, Fmi2Error>;

    fn exit_initialization_mode(&mut self) -> Result<Fmi2Res, Fmi2Error>;

    fn enter_event_mode(&mut self) -> Result<Fmi2Res, Fmi2Error>;

    /// Run one event iteration, filling `event_flags`.
    fn new_discrete_states(&mut self, event_flags: &mut EventFlags)
        -> Result<Fmi2Res, Fmi2Error>;

    fn enter_continuous_time_mode(&mut self) -> Result<Fmi2Res, Fmi2Error>;

    fn completed_integrator_step(
        &mut self,
        no_set_fmu_state_prior: bool,
        enter_event_mode: &mut bool,
        terminate_simulation: &mut bool,
    ) -> Result<Fmi2Res, Fmi2Error>;

    fn set_time(&mut self, time: f64) -> Result<Fmi2Res, Fmi2Error>;

    fn get_real(&mut self, vrs: &[u32], values: &mut [f64]) -> Result<Fmi2Res, Fmi2Error>;

    fn set_real(&mut self, vrs: &[u32], values: &[f64]) -> Result<Fmi2Res, Fmi2Error>;

    fn terminate(&mut self) -> Result<Fmi2Res, Fmi2Error>;
}

/// Creates an engine instance from a package file.
pub trait EngineLoader {
    /// Load `package` and instantiate it as `instance_name`. Engine log messages are delivered
    /// through `route`, which the engine keeps alive for its lifetime.
    fn load(
        &self,
        package: &Path,
        instance_name: &str,
        route: LogRoute,
    ) -> Result<Box<dyn CoSimulationEngine>, Error>;
}
