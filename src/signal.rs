//! Signals shared between exchange objects and the engine.
//!
//! Every engine variable an object reads or writes is described once per building by a
//! [`SignalDescriptor`]. Outputs and parameters declared by several objects share one descriptor
//! and keep a use count; an input has exactly one writer.

use crate::{
    arena::{Arena, Index},
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Read once, while the building is initializing.
    Parameter,
    /// Written by the host on every exchange.
    Input,
    /// Read on every exchange.
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Parameter => write!(f, "parameter"),
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Engine unit and its conversion to SI: `si = factor * value + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub factor: f64,
    pub offset: f64,
}

impl Unit {
    pub fn to_si(&self, value: f64) -> f64 {
        self.factor * value + self.offset
    }

    pub fn from_si(&self, value: f64) -> f64 {
        (value - self.offset) / self.factor
    }
}

/// A signal as declared by an exchange object.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    /// Signal name. Unless the spec is [`global`](SignalSpec::global), the engine variable is
    /// named `<engine object>_<name>`.
    pub name: String,
    /// Unit the host expects the value in, for reporting.
    pub host_unit: Option<String>,
    global: bool,
}

impl SignalSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_unit: None,
            global: false,
        }
    }

    /// A signal whose engine variable is named exactly `name`.
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            global: true,
            ..Self::new(name)
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.host_unit = Some(unit.into());
        self
    }

    /// Name of the engine variable this signal maps to.
    pub fn engine_name(&self, engine_object: &str) -> String {
        if self.global || engine_object.is_empty() {
            self.name.clone()
        } else {
            format!("{engine_object}_{}", self.name)
        }
    }
}

/// Building-wide record of one engine variable.
#[derive(Debug)]
pub struct SignalDescriptor {
    name: String,
    direction: Direction,
    declared_by: String,
    host_unit: Option<String>,
    value_reference: Option<u32>,
    unit: Option<Unit>,
    /// Last value written or read, in SI.
    value: Option<f64>,
    /// State epoch `value` was read at. Only meaningful for parameters and outputs.
    fresh_at: Option<u64>,
    uses: usize,
}

impl SignalDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Exchange object that first declared the signal.
    pub fn declared_by(&self) -> &str {
        &self.declared_by
    }

    pub fn host_unit(&self) -> Option<&str> {
        self.host_unit.as_deref()
    }

    /// Engine identifier, available once the building has resolved its signals.
    pub fn value_reference(&self) -> Result<u32, Error> {
        self.value_reference.ok_or_else(|| Error::Unresolved {
            signal: self.name.clone(),
        })
    }

    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Number of exchange objects referring to this signal.
    pub fn uses(&self) -> usize {
        self.uses
    }

    pub(crate) fn resolve(&mut self, value_reference: u32, unit: Option<Unit>) {
        self.value_reference = Some(value_reference);
        self.unit = unit;
    }

    pub(crate) fn is_fresh(&self, epoch: u64) -> bool {
        self.fresh_at == Some(epoch)
    }

    /// Store a value received from the engine, converted to SI.
    pub(crate) fn record_read(&mut self, raw: f64, epoch: u64) -> f64 {
        let value = self.unit.as_ref().map_or(raw, |unit| unit.to_si(raw));
        self.value = Some(value);
        self.fresh_at = Some(epoch);
        value
    }

    /// Store a value sent by the host and return it in engine units.
    pub(crate) fn record_write(&mut self, value: f64) -> f64 {
        self.value = Some(value);
        self.unit.as_ref().map_or(value, |unit| unit.from_si(value))
    }
}

/// Identifier of a descriptor within its building.
pub type SignalId = Index;

/// The descriptors of one building.
#[derive(Debug, Default)]
pub struct SignalTable {
    signals: Arena<SignalDescriptor>,
}

impl SignalTable {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn get(&self, id: SignalId) -> Option<&SignalDescriptor> {
        self.signals.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: SignalId) -> Option<&mut SignalDescriptor> {
        self.signals.get_mut(id)
    }

    pub fn find(&self, name: &str, direction: Direction) -> Option<(SignalId, &SignalDescriptor)> {
        self.signals
            .iter()
            .find(|(_, signal)| signal.name == name && signal.direction == direction)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &SignalDescriptor)> {
        self.signals.iter()
    }

    pub(crate) fn descriptors_mut(&mut self) -> impl Iterator<Item = &mut SignalDescriptor> {
        self.signals.values_mut()
    }

    /// Fail if `name` can not be declared by `object`. Only inputs are exclusive.
    pub(crate) fn check_declare(
        &self,
        name: &str,
        direction: Direction,
        object: &str,
    ) -> Result<(), String> {
        match self.find(name, direction) {
            Some((_, existing)) if direction == Direction::Input => Err(format!(
                "input '{name}' of '{object}' is already written by '{}'",
                existing.declared_by
            )),
            _ => Ok(()),
        }
    }

    /// Declare a signal, sharing an existing descriptor for parameters and outputs.
    pub(crate) fn declare(
        &mut self,
        name: String,
        direction: Direction,
        object: &str,
        host_unit: Option<String>,
    ) -> SignalId {
        if let Some((id, _)) = self.find(&name, direction) {
            if let Some(signal) = self.signals.get_mut(id) {
                signal.uses += 1;
            }
            return id;
        }
        self.signals.insert(SignalDescriptor {
            name,
            direction,
            declared_by: object.to_owned(),
            host_unit,
            value_reference: None,
            unit: None,
            value: None,
            fresh_at: None,
            uses: 1,
        })
    }

    /// Drop one use of a descriptor, removing it with the last.
    pub(crate) fn release(&mut self, id: SignalId) {
        let remove = match self.signals.get_mut(id) {
            Some(signal) => {
                signal.uses -= 1;
                signal.uses == 0
            }
            None => false,
        };
        if remove {
            self.signals.remove(id);
        }
    }
}
