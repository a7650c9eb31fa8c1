#![doc=include_str!( "../README.md")]
#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::os::raw::{c_char, c_int, c_uint, c_void};

pub mod logger;

pub type fmi2Component = *mut c_void;
pub type fmi2ComponentEnvironment = *mut c_void;
pub type fmi2ValueReference = c_uint;
pub type fmi2Real = f64;
pub type fmi2Integer = c_int;
pub type fmi2Boolean = c_int;
pub type fmi2Char = c_char;
pub type fmi2String = *const fmi2Char;

pub const fmi2True: fmi2Boolean = 1;
pub const fmi2False: fmi2Boolean = 0;

pub type fmi2Status = c_uint;
pub const fmi2Status_fmi2OK: fmi2Status = 0;
pub const fmi2Status_fmi2Warning: fmi2Status = 1;
pub const fmi2Status_fmi2Discard: fmi2Status = 2;
pub const fmi2Status_fmi2Error: fmi2Status = 3;
pub const fmi2Status_fmi2Fatal: fmi2Status = 4;
pub const fmi2Status_fmi2Pending: fmi2Status = 5;

pub type fmi2Type = c_uint;
pub const fmi2Type_fmi2ModelExchange: fmi2Type = 0;
pub const fmi2Type_fmi2CoSimulation: fmi2Type = 1;

pub type fmi2CallbackLogger = Option<
    unsafe extern "C" fn(
        componentEnvironment: fmi2ComponentEnvironment,
        instanceName: fmi2String,
        status: fmi2Status,
        category: fmi2String,
        message: fmi2String,
        ...
    ),
>;
pub type fmi2CallbackAllocateMemory =
    Option<unsafe extern "C" fn(nobj: usize, size: usize) -> *mut c_void>;
pub type fmi2CallbackFreeMemory = Option<unsafe extern "C" fn(obj: *mut c_void)>;
pub type fmi2StepFinished =
    Option<unsafe extern "C" fn(componentEnvironment: fmi2ComponentEnvironment, status: fmi2Status)>;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct fmi2CallbackFunctions {
    pub logger: fmi2CallbackLogger,
    pub allocateMemory: fmi2CallbackAllocateMemory,
    pub freeMemory: fmi2CallbackFreeMemory,
    pub stepFinished: fmi2StepFinished,
    pub componentEnvironment: fmi2ComponentEnvironment,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct fmi2EventInfo {
    pub newDiscreteStatesNeeded: fmi2Boolean,
    pub terminateSimulation: fmi2Boolean,
    pub nominalsOfContinuousStatesChanged: fmi2Boolean,
    pub valuesOfContinuousStatesChanged: fmi2Boolean,
    pub nextEventTimeDefined: fmi2Boolean,
    pub nextEventTime: fmi2Real,
}

/// Declares the `Fmi2Binding` function table. Every listed symbol is required; loading fails on
/// the first one the library does not export.
macro_rules! fmi2_binding {
    ($($name:ident: fn($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        /// FMI 2.0 Model-Exchange entry points resolved from a shared library at runtime.
        pub struct Fmi2Binding {
            __library: ::libloading::Library,
            $(pub $name: unsafe extern "C" fn($($arg: $ty),*) $(-> $ret)?,)*
        }

        impl Fmi2Binding {
            /// Load the shared library at `path` and resolve all entry points.
            ///
            /// # Safety
            /// Loading a library runs its initialisation routines, and the resolved symbols are
            /// trusted to have the FMI 2.0 signatures.
            pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
            where
                P: AsRef<::std::ffi::OsStr>,
            {
                let library = ::libloading::Library::new(path)?;
                Self::from_library(library)
            }

            /// # Safety
            /// See [`Fmi2Binding::new`].
            pub unsafe fn from_library<L>(library: L) -> Result<Self, ::libloading::Error>
            where
                L: Into<::libloading::Library>,
            {
                let __library = library.into();
                $(
                    let $name = *__library.get::<unsafe extern "C" fn($($ty),*) $(-> $ret)?>(
                        concat!(stringify!($name), "\0").as_bytes(),
                    )?;
                )*
                Ok(Self { __library, $($name,)* })
            }
        }
    };
}

fmi2_binding! {
    fmi2GetTypesPlatform: fn() -> *const c_char;
    fmi2GetVersion: fn() -> *const c_char;
    fmi2SetDebugLogging: fn(
        c: fmi2Component,
        loggingOn: fmi2Boolean,
        nCategories: usize,
        categories: *const fmi2String,
    ) -> fmi2Status;
    fmi2Instantiate: fn(
        instanceName: fmi2String,
        fmuType: fmi2Type,
        fmuGUID: fmi2String,
        fmuResourceLocation: fmi2String,
        functions: *const fmi2CallbackFunctions,
        visible: fmi2Boolean,
        loggingOn: fmi2Boolean,
    ) -> fmi2Component;
    fmi2FreeInstance: fn(c: fmi2Component);
    fmi2SetupExperiment: fn(
        c: fmi2Component,
        toleranceDefined: fmi2Boolean,
        tolerance: fmi2Real,
        startTime: fmi2Real,
        stopTimeDefined: fmi2Boolean,
        stopTime: fmi2Real,
    ) -> fmi2Status;
    fmi2EnterInitializationMode: fn(c: fmi2Component) -> fmi2Status;
    fmi2ExitInitializationMode: fn(c: fmi2Component) -> fmi2Status;
    fmi2Terminate: fn(c: fmi2Component) -> fmi2Status;
    fmi2GetReal: fn(
        c: fmi2Component,
        vr: *const fmi2ValueReference,
        nvr: usize,
        value: *mut fmi2Real,
    ) -> fmi2Status;
    fmi2SetReal: fn(
        c: fmi2Component,
        vr: *const fmi2ValueReference,
        nvr: usize,
        value: *const fmi2Real,
    ) -> fmi2Status;
    fmi2EnterEventMode: fn(c: fmi2Component) -> fmi2Status;
    fmi2NewDiscreteStates: fn(c: fmi2Component, fmi2eventInfo: *mut fmi2EventInfo) -> fmi2Status;
    fmi2EnterContinuousTimeMode: fn(c: fmi2Component) -> fmi2Status;
    fmi2CompletedIntegratorStep: fn(
        c: fmi2Component,
        noSetFMUStatePriorToCurrentPoint: fmi2Boolean,
        enterEventMode: *mut fmi2Boolean,
        terminateSimulation: *mut fmi2Boolean,
    ) -> fmi2Status;
    fmi2SetTime: fn(c: fmi2Component, time: fmi2Real) -> fmi2Status;
}
