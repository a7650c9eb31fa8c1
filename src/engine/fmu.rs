//! Engine backed by an FMI 2.0 Model-Exchange package loaded at runtime.
use std::{
    ffi::{CStr, CString},
    path::{Path, PathBuf},
};

use hard_xml::XmlRead;
use spawn_sys::{self as binding, logger};

use super::{
    schema, CoSimulationEngine, EngineLoader, EventFlags, Fmi2Error, Fmi2Res, Fmi2Status,
    LogRoute, VariableInfo,
};
use crate::Error;

const MODEL_DESCRIPTION: &str = "modelDescription.xml";

/// Loads packages with [`FmuEngine::new`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FmuLoader;

impl EngineLoader for FmuLoader {
    fn load(
        &self,
        package: &Path,
        instance_name: &str,
        route: LogRoute,
    ) -> Result<Box<dyn CoSimulationEngine>, Error> {
        Ok(Box::new(FmuEngine::new(package, instance_name, route)?))
    }
}

pub struct FmuEngine {
    /// Copy of the instance name
    name: String,
    /// Raw FMI 2.0 bindings
    binding: binding::Fmi2Binding,
    /// Pointer to the raw FMI 2.0 instance
    component: binding::fmi2Component,
    /// Callbacks struct, referenced by the instance
    #[allow(dead_code)]
    callbacks: Box<binding::fmi2CallbackFunctions>,
    /// Component environment handed to the logger
    #[allow(dead_code)]
    route: Box<LogRoute>,
    variables: Vec<VariableInfo>,
    log_categories: Vec<String>,
    /// Extraction directory, removed on drop
    _dir: Option<tempfile::TempDir>,
}

impl std::fmt::Debug for FmuEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FmuEngine")
            .field("name", &self.name)
            .field("component", &self.component)
            .field("variables", &self.variables.len())
            .finish()
    }
}

/// Extract a package archive into a fresh temporary directory.
fn extract(package: &Path) -> Result<tempfile::TempDir, Error> {
    let file = std::fs::File::open(package)?;
    log::debug!("Opening package {package:?}");
    let mut archive = zip::ZipArchive::new(file)?;
    let temp_dir = tempfile::Builder::new().prefix("spawn-fmu").tempdir()?;
    log::debug!("Extracting into {temp_dir:?}");
    archive.extract(&temp_dir)?;
    for fname in archive.file_names() {
        log::trace!("  - {}", fname);
    }
    Ok(temp_dir)
}

/// Path of the shared library relative to the package root.
fn shared_lib_path(model_identifier: &str) -> Result<PathBuf, Error> {
    let platform_folder = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", "x86_64") => "win64",
        ("windows", "x86") => "win32",
        ("linux", "x86_64") => "linux64",
        ("linux", "x86") => "linux32",
        ("macos", "x86_64") | ("macos", "aarch64") => "darwin64",
        _ => {
            return Err(Error::UnsupportedPlatform {
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            });
        }
    };
    let fname = format!("{model_identifier}{}", std::env::consts::DLL_SUFFIX);
    Ok(PathBuf::from("binaries").join(platform_folder).join(fname))
}

impl FmuEngine {
    /// Load `package`, which is either a package archive or an already extracted directory, and
    /// instantiate it for Model-Exchange.
    pub fn new(package: &Path, instance_name: &str, route: LogRoute) -> Result<Self, Error> {
        let dir = if package.is_dir() {
            None
        } else {
            Some(extract(package)?)
        };
        let root = dir
            .as_ref()
            .map_or_else(|| package.to_path_buf(), |dir| dir.path().to_path_buf());

        let xml = std::fs::read_to_string(root.join(MODEL_DESCRIPTION))?;
        let model_description = schema::ModelDescription::from_str(&xml)?;
        if !model_description.fmi_version.starts_with("2.") {
            return Err(Error::UnsupportedFmiVersion(
                model_description.fmi_version.clone(),
            ));
        }
        let model_exchange = model_description
            .model_exchange
            .as_ref()
            .ok_or_else(|| Error::UnsupportedFmuType("ModelExchange".to_owned()))?;

        let lib_path = root.join(shared_lib_path(&model_exchange.model_identifier)?);
        log::trace!("Loading shared library {lib_path:?}");
        let binding = unsafe { binding::Fmi2Binding::new(&lib_path)? };

        let platform = unsafe { CStr::from_ptr((binding.fmi2GetTypesPlatform)()) }
            .to_string_lossy()
            .into_owned();
        if platform != "default" {
            return Err(Error::TypesPlatformMismatch(platform));
        }
        let version = unsafe { CStr::from_ptr((binding.fmi2GetVersion)()) }.to_string_lossy();
        log::debug!("Loaded {lib_path:?}, FMI version {version}");

        let resources = std::path::absolute(root.join("resources"))?;
        let resource_url = url::Url::from_directory_path(&resources)
            .map_err(|_| Error::ArchiveStructure(format!("invalid resource path {resources:?}")))?;

        let route = Box::new(route);
        let callbacks = Box::new(binding::fmi2CallbackFunctions {
            logger: Some(logger::spawn_logger_trampoline as _),
            allocateMemory: Some(libc::calloc),
            freeMemory: Some(libc::free),
            stepFinished: None,
            componentEnvironment: &*route as *const LogRoute as binding::fmi2ComponentEnvironment,
        });

        let name = instance_name.to_owned();
        let instance_name = CString::new(instance_name)?;
        let guid = CString::new(model_description.guid.as_bytes())?;
        let resource_url = CString::new(resource_url.as_str())?;

        let component = unsafe {
            (binding.fmi2Instantiate)(
                instance_name.as_ptr(),
                binding::fmi2Type_fmi2ModelExchange,
                guid.as_ptr(),
                resource_url.as_ptr(),
                &*callbacks as *const binding::fmi2CallbackFunctions,
                binding::fmi2False,
                binding::fmi2True,
            )
        };
        if component.is_null() {
            return Err(Error::Instantiation(name));
        }
        log::trace!("Created FMI2.0 ME component {component:?}");

        let variables = model_description
            .real_variables()
            .map(|(variable, unit)| VariableInfo {
                name: variable.name.clone(),
                value_reference: variable.value_reference,
                unit,
            })
            .collect();

        Ok(Self {
            name,
            binding,
            component,
            callbacks,
            route,
            variables,
            log_categories: model_description.log_category_names(),
            _dir: dir,
        })
    }
}

impl Drop for FmuEngine {
    fn drop(&mut self) {
        log::trace!("Freeing component {:?}", self.component);
        unsafe { (self.binding.fmi2FreeInstance)(self.component) };
    }
}

impl CoSimulationEngine for FmuEngine {
    fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    fn log_categories(&self) -> &[String] {
        &self.log_categories
    }

    fn set_debug_logging(
        &mut self,
        logging_on: bool,
        categories: &[&str],
    ) -> Result<Fmi2Res, Fmi2Error> {
        let category_cstr = categories
            .iter()
            .map(|c| CString::new(*c))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Fmi2Error::Error)?;
        let category_ptrs: Vec<_> = category_cstr.iter().map(|c| c.as_ptr()).collect();

        Fmi2Status::from(unsafe {
            (self.binding.fmi2SetDebugLogging)(
                self.component,
                logging_on as binding::fmi2Boolean,
                category_ptrs.len(),
                category_ptrs.as_ptr(),
            )
        })
        .ok()
    }

    fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Result<Fmi2Res, Fmi2Error> {
        Fmi2Status::from(unsafe {
            (self.binding.fmi2SetupExperiment)(
                self.component,
                tolerance.is_some() as binding::fmi2Boolean,
                tolerance.unwrap_or(0.0),
                start_time,
                stop_time.is_some() as binding::fmi2Boolean,
                stop_time.unwrap_or(0.0),
            )
        })
        .ok()
    }

    fn enter_initialization_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        Fmi2Status::from(unsafe { (self.binding.fmi2EnterInitializationMode)(self.component) })
            .ok()
    }

    fn exit_initialization_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        Fmi2Status::from(unsafe { (self.binding.fmi2ExitInitializationMode)(self.component) }).ok()
    }

    fn enter_event_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        Fmi2Status::from(unsafe { (self.binding.fmi2EnterEventMode)(self.component) }).ok()
    }

    fn new_discrete_states(
        &mut self,
        event_flags: &mut EventFlags,
    ) -> Result<Fmi2Res, Fmi2Error> {
        let mut event_info = binding::fmi2EventInfo::default();
        let res = Fmi2Status::from(unsafe {
            (self.binding.fmi2NewDiscreteStates)(self.component, &mut event_info)
        })
        .ok()?;
        *event_flags = EventFlags::from(event_info);
        Ok(res)
    }

    fn enter_continuous_time_mode(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        Fmi2Status::from(unsafe { (self.binding.fmi2EnterContinuousTimeMode)(self.component) })
            .ok()
    }

    fn completed_integrator_step(
        &mut self,
        no_set_fmu_state_prior: bool,
        enter_event_mode: &mut bool,
        terminate_simulation: &mut bool,
    ) -> Result<Fmi2Res, Fmi2Error> {
        let mut enter = binding::fmi2False;
        let mut terminate = binding::fmi2False;
        let res = Fmi2Status::from(unsafe {
            (self.binding.fmi2CompletedIntegratorStep)(
                self.component,
                no_set_fmu_state_prior as binding::fmi2Boolean,
                &mut enter,
                &mut terminate,
            )
        })
        .ok()?;
        *enter_event_mode = enter != binding::fmi2False;
        *terminate_simulation = terminate != binding::fmi2False;
        Ok(res)
    }

    fn set_time(&mut self, time: f64) -> Result<Fmi2Res, Fmi2Error> {
        Fmi2Status::from(unsafe { (self.binding.fmi2SetTime)(self.component, time) }).ok()
    }

    fn get_real(&mut self, vrs: &[u32], values: &mut [f64]) -> Result<Fmi2Res, Fmi2Error> {
        if vrs.len() != values.len() {
            return Err(Fmi2Error::Error);
        }
        Fmi2Status::from(unsafe {
            (self.binding.fmi2GetReal)(self.component, vrs.as_ptr(), vrs.len(), values.as_mut_ptr())
        })
        .ok()
    }

    fn set_real(&mut self, vrs: &[u32], values: &[f64]) -> Result<Fmi2Res, Fmi2Error> {
        if vrs.len() != values.len() {
            return Err(Fmi2Error::Error);
        }
        Fmi2Status::from(unsafe {
            (self.binding.fmi2SetReal)(self.component, vrs.as_ptr(), vrs.len(), values.as_ptr())
        })
        .ok()
    }

    fn terminate(&mut self) -> Result<Fmi2Res, Fmi2Error> {
        Fmi2Status::from(unsafe { (self.binding.fmi2Terminate)(self.component) }).ok()
    }
}
