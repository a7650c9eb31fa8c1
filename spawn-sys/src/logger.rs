//! Forwarding of engine log messages to the `log` facade.
use std::ffi::CStr;

use crate as binding;

/// Per-instance routing for engine log messages.
///
/// A boxed `LogRoute` is handed to the engine as its component environment, so each message
/// arrives tagged with the building that produced it and is filtered by that building's
/// verbosity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRoute {
    /// Log target the messages are emitted under.
    pub target: String,
    /// Messages less severe than this are dropped.
    pub max_level: log::LevelFilter,
}

impl LogRoute {
    pub fn new(target: impl Into<String>, max_level: log::LevelFilter) -> Self {
        Self {
            target: target.into(),
            max_level,
        }
    }

    /// Map an engine status to the level its message is emitted at.
    pub fn level(status: binding::fmi2Status) -> log::Level {
        match status {
            binding::fmi2Status_fmi2OK
            | binding::fmi2Status_fmi2Pending
            | binding::fmi2Status_fmi2Discard => log::Level::Info,
            binding::fmi2Status_fmi2Warning => log::Level::Warn,
            _ => log::Level::Error,
        }
    }

    fn accepts(&self, level: log::Level) -> bool {
        level == log::Level::Error || level <= self.max_level
    }
}

unsafe fn lossy<'a>(ptr: binding::fmi2String, default: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(default)
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// This function gets called from logger.c
#[no_mangle]
extern "C" fn spawn_log_sink(
    component_environment: binding::fmi2ComponentEnvironment,
    instance_name: binding::fmi2String,
    status: binding::fmi2Status,
    category: binding::fmi2String,
    message: binding::fmi2String,
) {
    let level = LogRoute::level(status);
    let instance_name = unsafe { lossy(instance_name, "NULL") };

    let route = unsafe { (component_environment as *const LogRoute).as_ref() };
    let target = match route {
        Some(route) if !route.accepts(level) => return,
        Some(route) => route.target.as_str(),
        None => instance_name.as_ref(),
    };

    let category = unsafe { lossy(category, "NULL") };
    let message = unsafe { lossy(message, "") };

    log::logger().log(
        &log::Record::builder()
            .args(format_args!("[{category}] {message}"))
            .level(level)
            .module_path(Some("logger"))
            .target(target)
            .build(),
    );
}

#[link(name = "spawnlogger", kind = "static")]
extern "C" {
    /// This function is implemented in logger.c
    /// Note: This can be re-implemented in pure Rust once the `c_variadics` feature stabilizes.
    pub fn spawn_logger_trampoline(
        componentEnvironment: binding::fmi2ComponentEnvironment,
        instanceName: binding::fmi2String,
        status: binding::fmi2Status,
        category: binding::fmi2String,
        message: binding::fmi2String,
        ...
    );
}
