use spawn_sys as binding;

/// Event flags filled in by [`super::CoSimulationEngine::new_discrete_states`].
#[derive(Default, Debug, Clone, PartialEq)]
pub struct EventFlags {
    /// The engine must stay in event mode for another event iteration.
    pub discrete_states_need_update: bool,
    /// The engine requests to stop the simulation.
    pub terminate_simulation: bool,
    pub nominals_of_continuous_states_changed: bool,
    pub values_of_continuous_states_changed: bool,
    /// The absolute time of the next time event. The building is advanced to this time at the
    /// latest, after which event mode is entered again.
    pub next_event_time: Option<f64>,
}

impl EventFlags {
    /// Reset all event flags to their default state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl From<binding::fmi2EventInfo> for EventFlags {
    fn from(info: binding::fmi2EventInfo) -> Self {
        let set = |flag: binding::fmi2Boolean| flag != binding::fmi2False;
        Self {
            discrete_states_need_update: set(info.newDiscreteStatesNeeded),
            terminate_simulation: set(info.terminateSimulation),
            nominals_of_continuous_states_changed: set(info.nominalsOfContinuousStatesChanged),
            values_of_continuous_states_changed: set(info.valuesOfContinuousStatesChanged),
            next_event_time: set(info.nextEventTimeDefined).then_some(info.nextEventTime),
        }
    }
}
