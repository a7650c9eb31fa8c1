//! Registry of live buildings and exchange objects.
//!
//! Buildings are found by name and created on first use. Objects are addressed by
//! [`ObjectHandle`]s, which are weak: a handle to a released object simply stops resolving.

use std::collections::HashSet;

use itertools::Itertools;

use crate::{
    arena::{Arena, Index},
    building::{BuildingInstance, Mode},
    config::BuildingConfig,
    description,
    engine::{fmu::FmuLoader, EngineLoader},
    generate::{self, CommandGenerator, PackageGenerator, PackageSource},
    object::{ExchangeObject, ObjectSpec},
    signal::{Direction, SignalId, SignalSpec, SignalTable},
    sync::{self, Exchange},
    Error,
};

/// Handle of an allocated exchange object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(Index);

pub struct Registry {
    buildings: Arena<BuildingInstance>,
    objects: Arena<ExchangeObject>,
    loader: Box<dyn EngineLoader>,
    generator: Box<dyn PackageGenerator>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(FmuLoader, CommandGenerator)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("buildings", &self.buildings)
            .field("objects", &self.objects.len())
            .finish()
    }
}

fn declare_all(
    signals: &mut SignalTable,
    specs: &[SignalSpec],
    engine_object: &str,
    direction: Direction,
    object: &str,
) -> Vec<SignalId> {
    specs
        .iter()
        .map(|spec| {
            signals.declare(
                spec.engine_name(engine_object),
                direction,
                object,
                spec.host_unit.clone(),
            )
        })
        .collect()
}

impl Registry {
    pub fn new(
        loader: impl EngineLoader + 'static,
        generator: impl PackageGenerator + 'static,
    ) -> Self {
        Self {
            buildings: Arena::new(),
            objects: Arena::new(),
            loader: Box::new(loader),
            generator: Box::new(generator),
        }
    }

    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&ExchangeObject> {
        self.objects.get(handle.0)
    }

    /// The building an object belongs to.
    pub fn building(&self, handle: ObjectHandle) -> Option<&BuildingInstance> {
        self.objects
            .get(handle.0)
            .and_then(|object| self.buildings.get(object.building))
    }

    pub fn find_building(&self, name: &str) -> Option<&BuildingInstance> {
        self.buildings.values().find(|building| building.name() == name)
    }

    fn building_index(&self, name: &str) -> Option<Index> {
        self.buildings
            .iter()
            .find(|(_, building)| building.name() == name)
            .map(|(index, _)| index)
    }

    /// Drain the messages meant for the host's message channel.
    pub fn take_notices(&mut self) -> Vec<String> {
        self.buildings
            .values_mut()
            .flat_map(|building| std::mem::take(&mut building.notices))
            .collect()
    }

    /// Allocate an exchange object in the building named by `config`, creating the building on
    /// first use. Allocating an object with the same name and kind again returns its handle.
    pub fn allocate(
        &mut self,
        config: &BuildingConfig,
        spec: ObjectSpec,
    ) -> Result<ObjectHandle, Error> {
        config.validate()?;
        spec.validate().map_err(|reason| Error::Config {
            building: config.name.clone(),
            reason,
        })?;

        let existing = self
            .objects
            .iter()
            .find(|(_, object)| object.name == spec.name && object.kind == spec.kind)
            .map(|(index, _)| index);
        if let Some(index) = existing {
            return self.reallocate(index, config);
        }

        let (building_index, created) = match self.building_index(&config.name) {
            Some(index) => (index, false),
            None => {
                let building = BuildingInstance::new(config.clone())?;
                (self.buildings.insert(building), true)
            }
        };
        if let Err(err) = self.check_allocation(building_index, config, &spec) {
            if created {
                self.buildings.remove(building_index);
            }
            return Err(err);
        }

        let Some(building) = self.buildings.get_mut(building_index) else {
            return Err(Error::StaleHandle);
        };
        building.request_verbosity(config.verbosity);
        let parameters = declare_all(
            &mut building.signals,
            &spec.parameters,
            &spec.engine_name,
            Direction::Parameter,
            &spec.name,
        );
        let inputs = declare_all(
            &mut building.signals,
            &spec.inputs,
            &spec.engine_name,
            Direction::Input,
            &spec.name,
        );
        let outputs = declare_all(
            &mut building.signals,
            &spec.outputs,
            &spec.engine_name,
            Direction::Output,
            &spec.name,
        );

        let index = self.objects.insert(ExchangeObject {
            name: spec.name,
            kind: spec.kind,
            engine_name: spec.engine_name,
            key_values: spec.key_values,
            building: building_index,
            parameters,
            inputs,
            outputs,
            derivatives: spec.derivatives,
            print_unit: spec.print_unit,
            parameter_values: Vec::new(),
            instantiated: false,
            initialized: false,
            allocations: 1,
        });
        building.objects.push(index);

        log::debug!(
            "Allocated {} '{}' in building '{}' ({} objects, {} signals)",
            spec.kind,
            self.objects.get(index).map_or("", |object| object.name()),
            building.name(),
            building.objects.len(),
            building.signals.len()
        );
        Ok(ObjectHandle(index))
    }

    fn reallocate(&mut self, index: Index, config: &BuildingConfig) -> Result<ObjectHandle, Error> {
        let Some(object) = self.objects.get_mut(index) else {
            return Err(Error::StaleHandle);
        };
        let owner = self
            .buildings
            .get(object.building)
            .map(|building| building.name().to_owned())
            .unwrap_or_default();
        if owner != config.name {
            return Err(Error::Config {
                building: config.name.clone(),
                reason: format!(
                    "object '{}' is already allocated in building '{owner}'",
                    object.name
                ),
            });
        }
        object.allocations += 1;
        log::debug!(
            "Object '{}' allocated again ({} allocations)",
            object.name,
            object.allocations
        );
        Ok(ObjectHandle(index))
    }

    /// Reject a declaration that conflicts with the building it joins.
    fn check_allocation(
        &self,
        building_index: Index,
        config: &BuildingConfig,
        spec: &ObjectSpec,
    ) -> Result<(), Error> {
        let building = self
            .buildings
            .get(building_index)
            .ok_or(Error::StaleHandle)?;
        let fail = |reason: String| Error::Config {
            building: config.name.clone(),
            reason,
        };

        if let Some(reason) = &building.failure {
            return Err(Error::StaleBuilding {
                building: config.name.clone(),
                reason: reason.clone(),
            });
        }
        config.check_consistent(&building.config)?;
        if building.mode != Mode::Uninitialized {
            return Err(fail(format!(
                "cannot add '{}' after the building has been instantiated",
                spec.name
            )));
        }

        if spec.kind.is_exclusive() {
            let duplicate = building
                .objects
                .iter()
                .filter_map(|&index| self.objects.get(index))
                .find(|object| object.kind == spec.kind && object.key_values == spec.key_values);
            if let Some(other) = duplicate {
                return Err(fail(format!(
                    "{} {} is declared by both '{}' and '{}'",
                    spec.kind,
                    serde_json::Value::Object(spec.key_values.clone()),
                    other.name,
                    spec.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for input in &spec.inputs {
            let name = input.engine_name(&spec.engine_name);
            if !seen.insert(name.clone()) {
                return Err(fail(format!(
                    "input '{name}' is listed twice by '{}'",
                    spec.name
                )));
            }
            building
                .signals
                .check_declare(&name, Direction::Input, &spec.name)
                .map_err(fail)?;
        }
        Ok(())
    }

    /// Generate, load and initialize the building if that has not happened yet. A failure is
    /// recorded on the building and reported again on every later use.
    fn ensure_initialized(&mut self, building_index: Index) -> Result<(), Error> {
        let building = self
            .buildings
            .get(building_index)
            .ok_or(Error::StaleHandle)?;
        if let Some(reason) = &building.failure {
            return Err(Error::StaleBuilding {
                building: building.name().to_owned(),
                reason: reason.clone(),
            });
        }
        if building.mode != Mode::Uninitialized {
            return Ok(());
        }

        let result = self.bring_up(building_index);
        if let Err(err) = &result {
            if let Some(building) = self.buildings.get_mut(building_index) {
                building.teardown();
                building.failure = Some(err.to_string());
            }
        }
        result
    }

    fn bring_up(&mut self, building_index: Index) -> Result<(), Error> {
        let building = self
            .buildings
            .get(building_index)
            .ok_or(Error::StaleHandle)?;
        let description = description::describe(building, &self.objects)?;
        let source = match &building.config.precompiled_package {
            Some(package) => PackageSource::Precompiled(package.clone()),
            None => self
                .find_reusable_package(building_index, &description.hash)
                .unwrap_or(PackageSource::Generate),
        };
        log::debug!(
            "Building '{}': description hash {}",
            building.name(),
            description.hash
        );

        let building = self
            .buildings
            .get_mut(building_index)
            .ok_or(Error::StaleHandle)?;
        generate::prepare_package(building, &description, source, self.generator.as_ref())?;
        building.load(self.loader.as_ref())?;
        building.enter_initialization()
    }

    /// A live sibling whose package was prepared from an identical description.
    fn find_reusable_package(&self, building_index: Index, hash: &str) -> Option<PackageSource> {
        self.buildings
            .iter()
            .filter(|(index, _)| *index != building_index)
            .map(|(_, building)| building)
            .find(|building| {
                building.content_hash() == Some(hash) && building.package_path().is_file()
            })
            .map(|building| PackageSource::Sibling {
                building: building.name().to_owned(),
                package: building.package_path(),
            })
    }

    /// Bring up the object's building if needed and read the object's parameters, in SI units.
    pub fn instantiate(&mut self, handle: ObjectHandle) -> Result<Vec<f64>, Error> {
        let building_index = self
            .objects
            .get(handle.0)
            .ok_or(Error::StaleHandle)?
            .building;
        self.ensure_initialized(building_index)?;

        let building = self
            .buildings
            .get_mut(building_index)
            .ok_or(Error::StaleHandle)?;
        let object = self.objects.get_mut(handle.0).ok_or(Error::StaleHandle)?;
        if !object.instantiated {
            let values = building.read(&object.parameters, &object.name);
            let values = Self::record_failure(building, values)?;
            log::debug!(
                "Instantiated '{}' with parameters [{}]",
                object.name,
                values.iter().join(", ")
            );
            object.parameter_values = values;
            object.instantiated = true;
        }
        Ok(object.parameter_values.clone())
    }

    fn record_failure<T>(building: &mut BuildingInstance, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = &result {
            if err.poisons_building() {
                building.failure = Some(err.to_string());
            }
        }
        result
    }

    /// Exchange values with the object's building at `time`.
    ///
    /// An object that has not been instantiated is instantiated first. `initial_call` marks the
    /// object's exchanges during the initialization of the building; the first non-initial
    /// exchange of any object ends the initialization.
    pub fn exchange(
        &mut self,
        handle: ObjectHandle,
        initial_call: bool,
        inputs: &[f64],
        time: f64,
    ) -> Result<Exchange, Error> {
        let object = self.objects.get(handle.0).ok_or(Error::StaleHandle)?;
        let building_index = object.building;
        if object.instantiated {
            let building = self
                .buildings
                .get(building_index)
                .ok_or(Error::StaleHandle)?;
            if let Some(reason) = &building.failure {
                return Err(Error::StaleBuilding {
                    building: building.name().to_owned(),
                    reason: reason.clone(),
                });
            }
        } else {
            self.instantiate(handle)?;
        }

        if initial_call {
            if let Some(object) = self.objects.get_mut(handle.0) {
                object.initialized = true;
            }
        }

        let building = self
            .buildings
            .get_mut(building_index)
            .ok_or(Error::StaleHandle)?;
        let pending = building
            .objects
            .iter()
            .filter_map(|&index| self.objects.get(index))
            .find(|object| !object.initialized)
            .map(|object| object.name.clone());
        let object = self.objects.get_mut(handle.0).ok_or(Error::StaleHandle)?;

        let result = sync::exchange(building, object, pending.as_deref(), initial_call, inputs, time);
        Self::record_failure(building, result)
    }

    /// Release one allocation of an object. The last release removes the object, and the last
    /// object of a building tears the building down. Releasing a stale handle does nothing.
    pub fn free(&mut self, handle: ObjectHandle) {
        let Some(object) = self.objects.get_mut(handle.0) else {
            log::debug!("Ignoring release of a stale object handle");
            return;
        };
        object.allocations = object.allocations.saturating_sub(1);
        if object.allocations > 0 {
            return;
        }
        let Some(object) = self.objects.remove(handle.0) else {
            return;
        };

        let Some(building) = self.buildings.get_mut(object.building) else {
            return;
        };
        building.objects.retain(|&index| index != handle.0);
        for &id in object
            .parameters
            .iter()
            .chain(&object.inputs)
            .chain(&object.outputs)
        {
            building.signals.release(id);
        }
        log::debug!(
            "Released '{}' from building '{}' ({} objects left)",
            object.name,
            building.name(),
            building.objects.len()
        );

        if building.objects.is_empty() {
            if let Some(mut building) = self.buildings.remove(object.building) {
                building.teardown();
                log::debug!("Removed building '{}'", building.name());
            }
        }
    }
}
