//! Time synchronization and the exchange of values between the host and a building.
//!
//! Many objects call into the same building at the same instant. The building only advances when
//! a request lies beyond its current time by more than the tolerance; inputs are written only
//! when they change, and outputs and event iterations are cached until the engine state changes.

use crate::{
    building::{BuildingInstance, Mode},
    engine::EventFlags,
    object::ExchangeObject,
    signal::SignalId,
    Error,
};

/// Result of one exchange, all values in SI units.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub outputs: Vec<f64>,
    /// Finite-difference derivatives, in the order the object declared them.
    pub derivatives: Vec<f64>,
    /// Time the host must call back at, at the latest.
    pub next_event_time: f64,
}

/// Zero-length steps are reported as an error rather than iterated.
const MIN_STEP: f64 = 1e-6;

impl BuildingInstance {
    /// Advance the engine to `time` and enter event mode there.
    pub(crate) fn advance(&mut self, time: f64, object: &str) -> Result<(), Error> {
        if self.mode == Mode::Initialization {
            self.exit_initialization(object)?;
        }
        if self.mode == Mode::Event {
            self.call("fmi2EnterContinuousTimeMode", object, |engine| {
                engine.enter_continuous_time_mode()
            })?;
            self.mode = Mode::ContinuousTime;
        }
        if self.mode != Mode::ContinuousTime {
            return Err(Error::UnexpectedMode {
                building: self.config.name.clone(),
                mode: self.mode,
                call: "fmi2SetTime",
            });
        }

        self.call("fmi2SetTime", object, |engine| engine.set_time(time))?;
        self.time = time;

        let mut enter_event_mode = false;
        let mut terminate_simulation = false;
        self.call("fmi2CompletedIntegratorStep", object, |engine| {
            engine.completed_integrator_step(true, &mut enter_event_mode, &mut terminate_simulation)
        })?;
        if terminate_simulation {
            return Err(Error::Terminated {
                building: self.config.name.clone(),
                time,
            });
        }
        if enter_event_mode {
            log::trace!("{time:.3} {}: engine requested event mode", self.config.name);
        }

        self.call("fmi2EnterEventMode", object, |engine| engine.enter_event_mode())?;
        self.mode = Mode::Event;
        self.epoch += 1;
        log::debug!("{time:.3} {}: advanced time ({object})", self.config.name);
        Ok(())
    }

    /// Run the event iteration and return the next event time. During initialization this is the
    /// current time. The result is reused until the engine state changes.
    pub(crate) fn next_event_time(&mut self, object: &str) -> Result<f64, Error> {
        match self.mode {
            Mode::Initialization => return Ok(self.time),
            Mode::Event => {}
            mode => {
                return Err(Error::UnexpectedMode {
                    building: self.config.name.clone(),
                    mode,
                    call: "fmi2NewDiscreteStates",
                })
            }
        }
        if let Some((epoch, next)) = self.events {
            if epoch == self.epoch {
                return Ok(next);
            }
        }

        let iterations = self.config.max_event_iterations;
        let mut flags = EventFlags::default();
        let mut converged = false;
        for _ in 0..iterations {
            flags.reset();
            self.call("fmi2NewDiscreteStates", object, |engine| {
                engine.new_discrete_states(&mut flags)
            })?;
            if flags.terminate_simulation {
                return Err(Error::Terminated {
                    building: self.config.name.clone(),
                    time: self.time,
                });
            }
            if !flags.discrete_states_need_update {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(Error::EventIteration {
                building: self.config.name.clone(),
                iterations,
                time: self.time,
            });
        }

        let next = flags.next_event_time.ok_or_else(|| Error::NoNextEvent {
            building: self.config.name.clone(),
            time: self.time,
        })?;
        if next <= self.time + MIN_STEP {
            return Err(Error::NonPositiveStep {
                building: self.config.name.clone(),
                time: self.time,
                next,
            });
        }

        self.epoch += 1;
        self.events = Some((self.epoch, next));
        log::trace!(
            "{:.3} {}: next event at {next:.3} ({object})",
            self.time,
            self.config.name
        );
        Ok(next)
    }

    /// Write input values given in SI units. Nothing is sent if every value is unchanged.
    pub(crate) fn write_inputs(
        &mut self,
        ids: &[SignalId],
        values: &[f64],
        object: &str,
    ) -> Result<(), Error> {
        let changed = ids
            .iter()
            .zip(values)
            .any(|(&id, &value)| self.signals.get(id).map_or(true, |s| s.value() != Some(value)));
        if !changed {
            return Ok(());
        }

        let mut vrs = Vec::with_capacity(ids.len());
        let mut raw = Vec::with_capacity(ids.len());
        for (&id, &value) in ids.iter().zip(values) {
            let time = self.time;
            let building = &self.config.name;
            let signal = self.signals.get_mut(id).ok_or(Error::StaleHandle)?;
            let vr = signal.value_reference()?;
            // Conversion to the engine unit can overflow a finite SI value.
            let converted = signal.record_write(value);
            if !value.is_finite() || !converted.is_finite() {
                return Err(Error::NonFinite {
                    building: building.clone(),
                    signal: signal.name().to_owned(),
                    time,
                });
            }
            vrs.push(vr);
            raw.push(converted);
        }
        self.call("fmi2SetReal", object, |engine| engine.set_real(&vrs, &raw))?;
        self.epoch += 1;
        Ok(())
    }

    /// Read values in SI units, querying the engine only for those not read since the last state
    /// change.
    pub(crate) fn read(&mut self, ids: &[SignalId], object: &str) -> Result<Vec<f64>, Error> {
        let epoch = self.epoch;
        let mut stale = Vec::new();
        let mut vrs = Vec::new();
        for &id in ids {
            let signal = self.signal(id)?;
            if !signal.is_fresh(epoch) && !stale.contains(&id) {
                vrs.push(signal.value_reference()?);
                stale.push(id);
            }
        }

        if !vrs.is_empty() {
            let mut raw = vec![0.0; vrs.len()];
            self.call("fmi2GetReal", object, |engine| engine.get_real(&vrs, &mut raw))?;
            for (id, raw) in stale.into_iter().zip(raw) {
                let time = self.time;
                let building = &self.config.name;
                let signal = self.signals.get_mut(id).ok_or(Error::StaleHandle)?;
                if !raw.is_finite() {
                    return Err(Error::NonFinite {
                        building: building.clone(),
                        signal: signal.name().to_owned(),
                        time,
                    });
                }
                signal.record_read(raw, epoch);
            }
        }

        ids.iter()
            .map(|&id| {
                let signal = self.signal(id)?;
                signal.value().ok_or_else(|| Error::Unresolved {
                    signal: signal.name().to_owned(),
                })
            })
            .collect()
    }

    /// Report the units of an object's outputs once.
    fn report_units(&mut self, object: &ExchangeObject) {
        for &id in &object.outputs {
            let Some(signal) = self.signals.get(id) else {
                continue;
            };
            let message = match (signal.unit(), signal.host_unit()) {
                (Some(unit), Some(host)) => format!(
                    "Output {}.{} has in the host the unit '{host}' and in the building '{}'",
                    object.name,
                    signal.name(),
                    unit.name
                ),
                (Some(unit), None) => format!(
                    "Output {}.{} has in the building the unit '{}'",
                    object.name,
                    signal.name(),
                    unit.name
                ),
                (None, _) => format!(
                    "Output {}.{} has the same unit as received from the building, which does not declare one",
                    object.name,
                    signal.name()
                ),
            };
            log::info!("{message}");
            self.notices.push(message);
        }
    }
}

/// Serve one exchange call of `object`.
///
/// `pending` names an object of the building that has not completed its initial exchange yet;
/// time can not advance while there is one.
pub(crate) fn exchange(
    building: &mut BuildingInstance,
    object: &mut ExchangeObject,
    pending: Option<&str>,
    initial_call: bool,
    inputs: &[f64],
    time: f64,
) -> Result<Exchange, Error> {
    if inputs.len() != object.inputs.len() {
        return Err(Error::InputCount {
            object: object.name.clone(),
            expected: object.inputs.len(),
            found: inputs.len(),
        });
    }

    if !initial_call && building.mode == Mode::Initialization {
        building.exit_initialization(&object.name)?;
    }

    if time - building.time > building.config.time_tolerance {
        if let Some(pending) = pending {
            return Err(Error::PendingInitialization {
                building: building.config.name.clone(),
                object: pending.to_owned(),
                time,
            });
        }
        building.advance(time, &object.name)?;
    } else if time < building.time {
        log::trace!(
            "{:.3} {}: request for t = {time:.3} by '{}' served at the current time",
            building.time,
            building.config.name,
            object.name
        );
    }

    let mut derivatives = Vec::with_capacity(object.derivatives.len());
    if !object.derivatives.is_empty() {
        let mut perturbed = inputs.to_vec();
        for derivative in &object.derivatives {
            perturbed.copy_from_slice(inputs);
            perturbed[derivative.input] += derivative.delta;
            building.write_inputs(&object.inputs, &perturbed, &object.name)?;
            let outputs = building.read(&object.outputs, &object.name)?;
            derivatives.push(outputs[derivative.output]);
        }
        building.write_inputs(&object.inputs, inputs, &object.name)?;
        let outputs = building.read(&object.outputs, &object.name)?;
        for (value, derivative) in derivatives.iter_mut().zip(&object.derivatives) {
            *value = (*value - outputs[derivative.output]) / derivative.delta;
        }
    } else {
        building.write_inputs(&object.inputs, inputs, &object.name)?;
    }

    let next_event_time = building.next_event_time(&object.name)?;
    let outputs = building.read(&object.outputs, &object.name)?;

    if object.print_unit {
        building.report_units(object);
        object.print_unit = false;
    }

    Ok(Exchange {
        outputs,
        derivatives,
        next_event_time,
    })
}
