//! The boundary towards the host simulator.
//!
//! The host cannot receive Rust errors. [`Bridge`] wraps a [`Registry`] and reports failures and
//! notices through the function pointers in [`HostCallbacks`]; an operation that failed returns
//! `None`, after which the host is expected to abort.

use crate::{
    config::BuildingConfig,
    object::ObjectSpec,
    registry::{ObjectHandle, Registry},
    sync::Exchange,
    Error,
};

/// Message and error channels supplied by the host.
#[derive(Clone, Copy)]
pub struct HostCallbacks {
    pub message: fn(&str),
    pub error: fn(&str),
}

impl std::fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCallbacks").finish_non_exhaustive()
    }
}

impl Default for HostCallbacks {
    fn default() -> Self {
        fn message(text: &str) {
            log::info!("{text}");
        }
        fn error(text: &str) {
            log::error!("{text}");
        }
        Self { message, error }
    }
}

#[derive(Debug, Default)]
pub struct Bridge {
    registry: Registry,
    callbacks: HostCallbacks,
}

impl Bridge {
    pub fn new(registry: Registry, callbacks: HostCallbacks) -> Self {
        Self {
            registry,
            callbacks,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn report<T>(&mut self, result: Result<T, Error>) -> Option<T> {
        for notice in self.registry.take_notices() {
            (self.callbacks.message)(&notice);
        }
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                (self.callbacks.error)(&err.to_string());
                None
            }
        }
    }

    pub fn allocate(&mut self, config: &BuildingConfig, spec: ObjectSpec) -> Option<ObjectHandle> {
        let result = self.registry.allocate(config, spec);
        self.report(result)
    }

    pub fn instantiate(&mut self, handle: ObjectHandle) -> Option<Vec<f64>> {
        let result = self.registry.instantiate(handle);
        self.report(result)
    }

    pub fn exchange(
        &mut self,
        handle: ObjectHandle,
        initial_call: bool,
        inputs: &[f64],
        time: f64,
    ) -> Option<Exchange> {
        let result = self.registry.exchange(handle, initial_call, inputs, time);
        self.report(result)
    }

    pub fn free(&mut self, handle: ObjectHandle) {
        self.registry.free(handle);
        self.report(Ok(()));
    }
}
