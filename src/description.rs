//! Canonical building description and its content hash.
//!
//! The description is the input of the package generator. Its text without the package section
//! is hashed; buildings with equal hashes can share one generated package.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{
    arena::Arena,
    building::BuildingInstance,
    object::{ExchangeObject, ObjectKind},
    signal::SignalId,
    Error,
};

const DESCRIPTION_VERSION: &str = "0.1";

#[derive(Serialize)]
struct Description<'a> {
    version: &'static str,
    #[serde(rename = "EnergyPlus")]
    energy_plus: EnergyPlus<'a>,
    model: Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    fmu: Option<Package<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnergyPlus<'a> {
    idf: &'a Path,
    weather: &'a Path,
    relative_surface_tolerance: f64,
}

/// Objects grouped by kind; the field order is the order kinds appear in the text.
#[derive(Serialize, Default)]
struct Model {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    zones: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    schedules: Vec<Value>,
    #[serde(rename = "emsActuators", skip_serializing_if = "Vec::is_empty")]
    ems_actuators: Vec<Value>,
    #[serde(rename = "outputVariables", skip_serializing_if = "Vec::is_empty")]
    output_variables: Vec<Value>,
    #[serde(rename = "zoneSurfaces", skip_serializing_if = "Vec::is_empty")]
    zone_surfaces: Vec<Value>,
    #[serde(rename = "buildingSurfaceDetailed", skip_serializing_if = "Vec::is_empty")]
    building_surface_detailed: Vec<Value>,
}

impl Model {
    fn entries(&mut self, kind: ObjectKind) -> &mut Vec<Value> {
        match kind {
            ObjectKind::ThermalZone => &mut self.zones,
            ObjectKind::Schedule => &mut self.schedules,
            ObjectKind::Actuator => &mut self.ems_actuators,
            ObjectKind::OutputVariable => &mut self.output_variables,
            ObjectKind::Surface => &mut self.zone_surfaces,
            ObjectKind::DetailedSurface => &mut self.building_surface_detailed,
        }
    }
}

#[derive(Serialize)]
struct Package<'a> {
    name: &'a Path,
    version: &'static str,
    kind: &'static str,
}

/// The canonical description of a building, ready to be written for the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingDescription {
    /// Full document, including the package section.
    pub document: String,
    /// Hex SHA-256 of the document without the package section.
    pub hash: String,
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn signal_names(building: &BuildingInstance, ids: &[SignalId]) -> Value {
    ids.iter()
        .filter_map(|&id| building.signals.get(id))
        .map(|signal| Value::String(signal.name().to_owned()))
        .collect()
}

fn entry(building: &BuildingInstance, object: &ExchangeObject) -> Value {
    let mut entry: Map<String, Value> = object.key_values.clone();
    for (key, ids) in [
        ("parameters", &object.parameters),
        ("inputs", &object.inputs),
        ("outputs", &object.outputs),
    ] {
        if !ids.is_empty() {
            entry.insert(key.to_owned(), signal_names(building, ids));
        }
    }
    Value::Object(entry)
}

/// Build the canonical description of `building` from its objects in declaration order.
///
/// The host-side object names are not part of the description, so two buildings that declare
/// the same engine objects and signals in the same order produce the same hash.
pub(crate) fn describe(
    building: &BuildingInstance,
    objects: &Arena<ExchangeObject>,
) -> Result<BuildingDescription, Error> {
    let mut model = Model::default();
    for object in building.objects.iter().filter_map(|&index| objects.get(index)) {
        model
            .entries(object.kind)
            .push(entry(building, object));
    }

    let config = &building.config;
    let package = config.package_path();
    let mut description = Description {
        version: DESCRIPTION_VERSION,
        energy_plus: EnergyPlus {
            idf: &config.idf,
            weather: &config.weather,
            relative_surface_tolerance: config.relative_surface_tolerance,
        },
        model,
        fmu: None,
    };
    let hash = content_hash(&serde_json::to_string_pretty(&description)?);

    description.fmu = Some(Package {
        name: &package,
        version: "2.0",
        kind: "ME",
    });
    let document = serde_json::to_string_pretty(&description)?;

    Ok(BuildingDescription { document, hash })
}
