//! Exchange objects: the host-side components multiplexed onto a building.
use serde_json::{Map, Value};

use crate::{arena::Index, signal::SignalId, signal::SignalSpec};

/// Kind of an exchange object. The kind decides under which key the object appears in the
/// canonical building description and whether duplicate declarations are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    ThermalZone,
    Schedule,
    Actuator,
    OutputVariable,
    Surface,
    DetailedSurface,
}

impl ObjectKind {
    /// All kinds, in the order they appear in the canonical description.
    pub const ALL: [ObjectKind; 6] = [
        ObjectKind::ThermalZone,
        ObjectKind::Schedule,
        ObjectKind::Actuator,
        ObjectKind::OutputVariable,
        ObjectKind::Surface,
        ObjectKind::DetailedSurface,
    ];

    /// Key of the array holding objects of this kind in the canonical description.
    pub fn description_key(self) -> &'static str {
        match self {
            ObjectKind::ThermalZone => "zones",
            ObjectKind::Schedule => "schedules",
            ObjectKind::Actuator => "emsActuators",
            ObjectKind::OutputVariable => "outputVariables",
            ObjectKind::Surface => "zoneSurfaces",
            ObjectKind::DetailedSurface => "buildingSurfaceDetailed",
        }
    }

    /// Whether two objects of this kind with identical key/values are a declaration error.
    /// Output variables may be read by any number of objects.
    pub fn is_exclusive(self) -> bool {
        matches!(
            self,
            ObjectKind::ThermalZone | ObjectKind::Schedule | ObjectKind::Actuator
        )
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObjectKind::ThermalZone => "thermal zone",
            ObjectKind::Schedule => "schedule",
            ObjectKind::Actuator => "actuator",
            ObjectKind::OutputVariable => "output variable",
            ObjectKind::Surface => "surface",
            ObjectKind::DetailedSurface => "detailed surface",
        };
        write!(f, "{name}")
    }
}

/// Finite-difference derivative `d output / d input` requested by an object, as indices into
/// its output and input lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivative {
    pub output: usize,
    pub input: usize,
    /// Perturbation applied to the input, in SI units. Must be non-zero.
    pub delta: f64,
}

/// Host request to allocate an exchange object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    /// Host-side name, stable across calls. Allocating the same name and kind again returns the
    /// existing object.
    pub name: String,
    pub kind: ObjectKind,
    /// Name of the object inside the building model; prefixes its signal names.
    pub engine_name: String,
    /// Key/values describing the object in the canonical building description.
    pub key_values: Map<String, Value>,
    pub parameters: Vec<SignalSpec>,
    pub inputs: Vec<SignalSpec>,
    pub outputs: Vec<SignalSpec>,
    pub derivatives: Vec<Derivative>,
    /// Report the units of the outputs once, on the first exchange.
    pub print_unit: bool,
}

impl ObjectSpec {
    pub fn new(name: impl Into<String>, kind: ObjectKind, engine_name: impl Into<String>) -> Self {
        let engine_name = engine_name.into();
        let mut key_values = Map::new();
        key_values.insert("name".to_owned(), Value::String(engine_name.clone()));
        Self {
            name: name.into(),
            kind,
            engine_name,
            key_values,
            parameters: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            derivatives: Vec::new(),
            print_unit: false,
        }
    }

    /// Set a key/value of the description entry, replacing an earlier one with the same key.
    pub fn with_key_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.key_values.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = SignalSpec>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = SignalSpec>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = SignalSpec>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn with_derivative(mut self, output: usize, input: usize, delta: f64) -> Self {
        self.derivatives.push(Derivative {
            output,
            input,
            delta,
        });
        self
    }

    pub fn with_print_unit(mut self, print_unit: bool) -> Self {
        self.print_unit = print_unit;
        self
    }

    /// Check the request on its own, before it is matched against a building.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("object name must not be empty".to_owned());
        }
        for derivative in &self.derivatives {
            if derivative.output >= self.outputs.len() || derivative.input >= self.inputs.len() {
                return Err(format!(
                    "derivative d y[{}] / d u[{}] of '{}' refers to an undeclared signal",
                    derivative.output, derivative.input, self.name
                ));
            }
            if derivative.delta == 0.0 || !derivative.delta.is_finite() {
                return Err(format!(
                    "derivative d y[{}] / d u[{}] of '{}' needs a finite, non-zero increment",
                    derivative.output, derivative.input, self.name
                ));
            }
        }
        Ok(())
    }
}

/// An allocated exchange object.
#[derive(Debug)]
pub struct ExchangeObject {
    pub(crate) name: String,
    pub(crate) kind: ObjectKind,
    pub(crate) engine_name: String,
    pub(crate) key_values: Map<String, Value>,
    /// Owning building. Weak: the building may already be gone.
    pub(crate) building: Index,
    pub(crate) parameters: Vec<SignalId>,
    pub(crate) inputs: Vec<SignalId>,
    pub(crate) outputs: Vec<SignalId>,
    pub(crate) derivatives: Vec<Derivative>,
    pub(crate) print_unit: bool,
    pub(crate) parameter_values: Vec<f64>,
    pub(crate) instantiated: bool,
    /// Set by the object's first initial exchange.
    pub(crate) initialized: bool,
    /// Outstanding allocations; the object is released when this reaches zero.
    pub(crate) allocations: usize,
}

impl ExchangeObject {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    pub fn key_values(&self) -> &Map<String, Value> {
        &self.key_values
    }

    pub fn parameters(&self) -> &[SignalId] {
        &self.parameters
    }

    pub fn inputs(&self) -> &[SignalId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SignalId] {
        &self.outputs
    }

    /// Parameter values read at instantiation, in SI units.
    pub fn parameter_values(&self) -> &[f64] {
        &self.parameter_values
    }

    pub fn is_instantiated(&self) -> bool {
        self.instantiated
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }
}
