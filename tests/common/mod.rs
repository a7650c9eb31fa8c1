//! Scripted engine, loader and generator shared by the integration tests.
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use spawn::{
    engine::{
        CoSimulationEngine, EngineLoader, EventFlags, Fmi2Error, Fmi2Res, LogRoute, VariableInfo,
    },
    signal::Unit,
    BuildingConfig, Error, ObjectKind, ObjectSpec, PackageGenerator, SignalSpec,
};

/// Everything the scripted engines did, shared between all engines of one loader.
#[derive(Debug, Default)]
pub struct EngineLog {
    /// `<instance>:<call>` in call order.
    pub calls: Vec<String>,
    pub set_times: Vec<f64>,
    pub get_real_calls: usize,
    pub set_real_calls: usize,
    pub debug_categories: Vec<String>,
    pub last_set: HashMap<u32, f64>,
}

impl EngineLog {
    pub fn count(&self, call: &str) -> usize {
        self.calls
            .iter()
            .filter(|entry| entry.rsplit(':').next() == Some(call))
            .count()
    }

    pub fn calls_of(&self, instance: &str) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|entry| entry.strip_prefix(instance)?.strip_prefix(':'))
            .collect()
    }
}

/// A call that returns `status` instead of `OK` on the engine named `instance`.
#[derive(Debug, Clone, Copy)]
pub struct Failure {
    pub instance: &'static str,
    pub call: &'static str,
    pub status: Result<Fmi2Res, Fmi2Error>,
}

impl Failure {
    pub fn new(
        instance: &'static str,
        call: &'static str,
        status: Result<Fmi2Res, Fmi2Error>,
    ) -> Self {
        Self {
            instance,
            call,
            status,
        }
    }
}

/// Behaviour of the scripted engines.
#[derive(Debug, Clone)]
pub struct Script {
    pub variables: Vec<VariableInfo>,
    pub categories: Vec<String>,
    /// The next event lies this far after the current time.
    pub step: f64,
    /// `completed_integrator_step` reports termination at or after this time.
    pub terminate_at: Option<f64>,
    /// `new_discrete_states` never converges.
    pub never_converge: bool,
    /// `output = gain * input + 100 + value reference`, per (output, input, gain).
    pub links: Vec<(u32, u32, f64)>,
    pub failure: Option<Failure>,
}

impl Script {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let variables = names
            .into_iter()
            .enumerate()
            .map(|(vr, name)| VariableInfo {
                name: name.to_owned(),
                value_reference: vr as u32,
                unit: None,
            })
            .collect();
        Self {
            variables,
            categories: (1..=5).map(|i| format!("logLevel{i}")).collect(),
            step: 60.0,
            terminate_at: None,
            never_converge: false,
            links: Vec::new(),
            failure: None,
        }
    }

    pub fn vr(&self, name: &str) -> u32 {
        self.variables
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| variable.value_reference)
            .unwrap()
    }

    pub fn with_unit(mut self, name: &str, unit: &str, factor: f64, offset: f64) -> Self {
        for variable in self.variables.iter_mut().filter(|v| v.name == name) {
            variable.unit = Some(Unit {
                name: unit.to_owned(),
                factor,
                offset,
            });
        }
        self
    }

    pub fn with_link(mut self, output: &str, input: &str, gain: f64) -> Self {
        let link = (self.vr(output), self.vr(input), gain);
        self.links.push(link);
        self
    }
}

pub struct ScriptedEngine {
    name: String,
    script: Rc<Script>,
    log: Rc<RefCell<EngineLog>>,
    inputs: HashMap<u32, f64>,
    time: f64,
}

impl ScriptedEngine {
    fn record(&self, call: &str) {
        self.log
            .borrow_mut()
            .calls
            .push(format!("{}:{call}", self.name));
    }

    fn outcome(&self, call: &str) -> Result<Fmi2Res, Fmi2Error> {
        match self.script.failure {
            Some(failure) if failure.instance == self.name && failure.call == call => failure.status,
            _ => Ok(Fmi2Res::OK),
        }
    }

    fn value(&self, vr: u32) -> f64 {
        if let Some(value) = self.inputs.get(&vr) {
            return *value;
        }
        let linked: f64 = self
            .script
            .links
            .iter()
            .filter(|(output, _, _)| *output == vr)
            .map(|(_, input, gain)| gain * self.inputs.get(input).copied().unwrap_or(0.0))
            .sum();
        linked + 100.0 + vr as f64
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.record("free");
    }
}

impl CoSimulationEngine for ScriptedEngine {
    fn variables(&self) -> &[VariableInfo] {
        &self.script.variables
    }

    fn log_categories(&self) -> &[String] {
        &self.script.categories
    }

    fn set_debug_logging(
        &mut self,
        _logging_on: bool,
        categories: &[&str],
    ) -> Result<Fmi2Res, Fmi2Error> {
        self.record("set_debug_logging");
        self.log.borrow_mut().debug_categories =
            categories.iter().map(|c| c.to_string()).collect();
        self.outcome("set_debug_logging")
    }

    fn setup_experiment(
        &mut self,
        _tolerance: Option<f64>,
        start_time: f64,
        _stop_time: Option<f64>,
    ) -> Result<Fmi2Res, Fmi2Error> {
        self.record("setup_experiment");
        self.time = start_time;
        self.outcome("setup_experiment")
    }

    fn enter_initialization_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        self.record("enter_initialization_mode");
        self.outcome("enter_initialization_mode")
    }

    fn exit_initialization_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        self.record("exit_initialization_mode");
        self.outcome("exit_initialization_mode")
    }

    fn enter_event_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        self.record("enter_event_mode");
        self.outcome("enter_event_mode")
    }

    fn new_discrete_states(
        &mut self,
        event_flags: &mut EventFlags,
    ) -> Result<Fmi2Res, Fmi2Error> {
        self.record("new_discrete_states");
        event_flags.discrete_states_need_update = self.script.never_converge;
        event_flags.next_event_time = Some(self.time + self.script.step);
        self.outcome("new_discrete_states")
    }

    fn enter_continuous_time_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        self.record("enter_continuous_time_mode");
        self.outcome("enter_continuous_time_mode")
    }

    fn completed_integrator_step(
        &mut self,
        _no_set_fmu_state_prior: bool,
        enter_event_mode: &mut bool,
        terminate_simulation: &mut bool,
    ) -> Result<Fmi2Res, Fmi2Error> {
        self.record("completed_integrator_step");
        *enter_event_mode = false;
        *terminate_simulation = self
            .script
            .terminate_at
            .is_some_and(|terminate_at| self.time >= terminate_at);
        self.outcome("completed_integrator_step")
    }

    fn set_time(&mut self, time: f64) -> Result<Fmi2Res, Fmi2Error> {
        self.record("set_time");
        self.time = time;
        self.log.borrow_mut().set_times.push(time);
        self.outcome("set_time")
    }

    fn get_real(&mut self, vrs: &[u32], values: &mut [f64]) -> Result<Fmi2Res, Fmi2Error> {
        self.record("get_real");
        self.log.borrow_mut().get_real_calls += 1;
        for (value, &vr) in values.iter_mut().zip(vrs) {
            *value = self.value(vr);
        }
        self.outcome("get_real")
    }

    fn set_real(&mut self, vrs: &[u32], values: &[f64]) -> Result<Fmi2Res, Fmi2Error> {
        self.record("set_real");
        let mut log = self.log.borrow_mut();
        log.set_real_calls += 1;
        for (&vr, &value) in vrs.iter().zip(values) {
            self.inputs.insert(vr, value);
            log.last_set.insert(vr, value);
        }
        self.outcome("set_real")
    }

    fn terminate(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        self.record("terminate");
        self.outcome("terminate")
    }
}

/// Hands out scripted engines and counts loads.
#[derive(Clone)]
pub struct ScriptedLoader {
    pub script: Rc<Script>,
    pub log: Rc<RefCell<EngineLog>>,
    pub loads: Rc<Cell<usize>>,
    pub fail: bool,
}

impl ScriptedLoader {
    pub fn new(script: Script) -> Self {
        Self {
            script: Rc::new(script),
            log: Rc::default(),
            loads: Rc::default(),
            fail: false,
        }
    }

    pub fn failing(script: Script) -> Self {
        Self {
            fail: true,
            ..Self::new(script)
        }
    }
}

impl EngineLoader for ScriptedLoader {
    fn load(
        &self,
        package: &Path,
        instance_name: &str,
        _route: LogRoute,
    ) -> Result<Box<dyn CoSimulationEngine>, Error> {
        assert!(package.is_file(), "package {package:?} must exist before loading");
        if self.fail {
            return Err(Error::Instantiation(instance_name.to_owned()));
        }
        self.loads.set(self.loads.get() + 1);
        let engine = ScriptedEngine {
            name: instance_name.to_owned(),
            script: self.script.clone(),
            log: self.log.clone(),
            inputs: HashMap::new(),
            time: 0.0,
        };
        engine.record("instantiate");
        Ok(Box::new(engine))
    }
}

/// Writes a placeholder package and counts invocations.
#[derive(Clone, Default)]
pub struct CountingGenerator {
    pub runs: Rc<Cell<usize>>,
    pub descriptions: Rc<RefCell<Vec<String>>>,
    /// Run without producing the package.
    pub broken: bool,
}

impl PackageGenerator for CountingGenerator {
    fn generate(
        &self,
        _config: &BuildingConfig,
        description: &Path,
        package: &Path,
    ) -> Result<(), Error> {
        self.runs.set(self.runs.get() + 1);
        self.descriptions
            .borrow_mut()
            .push(std::fs::read_to_string(description)?);
        if !self.broken {
            std::fs::write(package, b"PK")?;
        }
        Ok(())
    }
}

/// Model and weather files in a temporary working directory.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub idf: PathBuf,
    pub weather: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let idf = dir.path().join("RefBldgSmallOffice.idf");
        let weather = dir.path().join("USA_IL_Chicago-OHare.mos");
        std::fs::write(&idf, "Version,9.6;").unwrap();
        std::fs::write(&weather, "#1\ndouble tab1(8760,29)\n").unwrap();
        Self { dir, idf, weather }
    }

    pub fn config(&self, building: &str) -> BuildingConfig {
        BuildingConfig::new(building, &self.idf, &self.weather).with_work_dir(self.dir.path())
    }
}

/// A thermal zone writing `<zone>_T` and reading `<zone>_QConSen_flow`, with parameter `<zone>_V`.
pub fn zone(name: &str, engine_name: &str) -> ObjectSpec {
    ObjectSpec::new(name, ObjectKind::ThermalZone, engine_name)
        .with_parameters([SignalSpec::new("V").with_unit("m3")])
        .with_inputs([SignalSpec::new("T").with_unit("K")])
        .with_outputs([SignalSpec::new("QConSen_flow").with_unit("W")])
}

/// Engine variables of [`zone`] for each of `zones`.
pub fn zone_variables(zones: &[&str]) -> Vec<String> {
    zones
        .iter()
        .flat_map(|zone| {
            ["V", "T", "QConSen_flow"]
                .into_iter()
                .map(move |signal| format!("{zone}_{signal}"))
        })
        .collect()
}

pub fn script_for_zones(zones: &[&str]) -> Script {
    let names = zone_variables(zones);
    Script::new(names.iter().map(String::as_str))
}
