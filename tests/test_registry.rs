//! Test building and object bookkeeping of the registry.

mod common;

use common::{script_for_zones, zone, CountingGenerator, Fixture, ScriptedLoader};
use rstest::rstest;
use spawn::{Direction, Error, ObjectKind, ObjectSpec, Registry, SignalSpec};

fn registry_for(zones: &[&str]) -> (Registry, ScriptedLoader, CountingGenerator) {
    let loader = ScriptedLoader::new(script_for_zones(zones));
    let generator = CountingGenerator::default();
    let registry = Registry::new(loader.clone(), generator.clone());
    (registry, loader, generator)
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(7)]
fn one_engine_per_building(#[case] objects: usize) {
    let fixture = Fixture::new();
    let names: Vec<String> = (0..objects).map(|i| format!("Zone{i}")).collect();
    let zones: Vec<&str> = names.iter().map(String::as_str).collect();
    let (mut registry, loader, generator) = registry_for(&zones);

    let config = fixture.config("bui");
    let handles: Vec<_> = zones
        .iter()
        .map(|z| registry.allocate(&config, zone(&format!("bui.{z}"), z)).unwrap())
        .collect();

    assert_eq!(registry.building_count(), 1);
    assert_eq!(registry.object_count(), objects);
    assert_eq!(registry.find_building("bui").unwrap().object_count(), objects);
    assert_eq!(
        registry.find_building("bui").unwrap().signals().len(),
        3 * objects
    );

    for handle in &handles {
        registry.instantiate(*handle).unwrap();
    }
    assert_eq!(loader.loads.get(), 1);
    assert_eq!(generator.runs.get(), 1);
}

#[test]
fn buildings_are_keyed_by_name() {
    let fixture = Fixture::new();
    let (mut registry, loader, _) = registry_for(&["Core_ZN"]);

    let a = registry
        .allocate(&fixture.config("bui1"), zone("bui1.zon", "Core_ZN"))
        .unwrap();
    let b = registry
        .allocate(&fixture.config("bui2"), zone("bui2.zon", "Core_ZN"))
        .unwrap();
    assert_eq!(registry.building_count(), 2);
    assert_ne!(
        registry.building(a).unwrap().name(),
        registry.building(b).unwrap().name()
    );

    registry.instantiate(a).unwrap();
    registry.instantiate(b).unwrap();
    assert_eq!(loader.loads.get(), 2);
}

#[test]
fn reallocation_returns_same_handle() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&["Core_ZN"]);
    let config = fixture.config("bui");

    let first = registry.allocate(&config, zone("bui.zon", "Core_ZN")).unwrap();
    let second = registry.allocate(&config, zone("bui.zon", "Core_ZN")).unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.object(first).unwrap().allocations(), 2);
    assert_eq!(registry.object_count(), 1);

    registry.free(first);
    assert!(registry.object(first).is_some());
    assert_eq!(registry.building_count(), 1);

    registry.free(second);
    assert!(registry.object(first).is_none());
    assert_eq!(registry.building_count(), 0);

    // Stale handles are ignored.
    registry.free(first);
    assert_eq!(registry.object_count(), 0);
}

#[test]
fn release_keeps_building_until_last_object() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&["Z1", "Z2"]);
    let config = fixture.config("bui");

    let z1 = registry.allocate(&config, zone("bui.z1", "Z1")).unwrap();
    let z2 = registry.allocate(&config, zone("bui.z2", "Z2")).unwrap();

    registry.free(z1);
    assert_eq!(registry.building_count(), 1);
    assert_eq!(registry.find_building("bui").unwrap().object_count(), 1);
    assert_eq!(registry.find_building("bui").unwrap().signals().len(), 3);

    registry.free(z2);
    assert_eq!(registry.building_count(), 0);
    assert!(matches!(registry.instantiate(z2), Err(Error::StaleHandle)));
}

#[test]
fn duplicate_zone_is_rejected() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&["Core_ZN"]);
    let config = fixture.config("bui");

    registry.allocate(&config, zone("bui.zon1", "Core_ZN")).unwrap();
    let err = registry
        .allocate(&config, zone("bui.zon2", "Core_ZN"))
        .unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, Error::Config { .. }));
    assert!(message.contains("bui.zon1") && message.contains("bui.zon2"), "{message}");
    assert_eq!(registry.object_count(), 1);
}

#[test]
fn output_variables_are_shared() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&[]);
    let config = fixture.config("bui");

    let output = |name: &str| {
        ObjectSpec::new(name, ObjectKind::OutputVariable, "")
            .with_key_value("name", "Site Outdoor Air Drybulb Temperature")
            .with_key_value("key", "Environment")
            .with_outputs([SignalSpec::global("EnvironmentSiteOutdoorAirDrybulbTemperature")])
    };
    let a = registry.allocate(&config, output("bui.out1")).unwrap();
    registry.allocate(&config, output("bui.out2")).unwrap();

    let building = registry.building(a).unwrap();
    assert_eq!(building.signals().len(), 1);
    let (_, signal) = building
        .signals()
        .find("EnvironmentSiteOutdoorAirDrybulbTemperature", Direction::Output)
        .unwrap();
    assert_eq!(signal.uses(), 2);
    assert_eq!(signal.declared_by(), "bui.out1");
}

#[test]
fn second_writer_of_an_input_is_rejected() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&[]);
    let config = fixture.config("bui");

    let actuator = |name: &str, component: &str| {
        ObjectSpec::new(name, ObjectKind::Actuator, "shade")
            .with_key_value("component", component)
            .with_inputs([SignalSpec::new("u")])
    };
    registry.allocate(&config, actuator("bui.act1", "Window 1")).unwrap();
    let err = registry
        .allocate(&config, actuator("bui.act2", "Window 2"))
        .unwrap_err();
    assert!(err.to_string().contains("shade_u"), "{err}");
}

#[test]
fn inconsistent_building_declaration() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&["Z1", "Z2"]);

    registry
        .allocate(&fixture.config("bui"), zone("bui.z1", "Z1"))
        .unwrap();

    let other_weather = fixture.dir.path().join("other.mos");
    std::fs::write(&other_weather, "#1").unwrap();
    let mut config = fixture.config("bui");
    config.weather = other_weather;
    let err = registry.allocate(&config, zone("bui.z2", "Z2")).unwrap_err();
    assert!(err.to_string().contains("weather"), "{err}");
}

#[test]
fn invalid_configuration_creates_nothing() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&["Z1"]);

    let err = registry
        .allocate(&fixture.config("bui").with_start_time(-10.0), zone("bui.z1", "Z1"))
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    assert_eq!(registry.building_count(), 0);
    assert_eq!(registry.object_count(), 0);
}

#[test]
fn no_objects_after_instantiation() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&["Z1", "Z2"]);
    let config = fixture.config("bui");

    let z1 = registry.allocate(&config, zone("bui.z1", "Z1")).unwrap();
    registry.instantiate(z1).unwrap();
    let err = registry.allocate(&config, zone("bui.z2", "Z2")).unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "{err}");
}

#[test]
fn signals_are_unresolved_before_instantiation() {
    let fixture = Fixture::new();
    let (mut registry, _, _) = registry_for(&["Core_ZN"]);
    let handle = registry
        .allocate(&fixture.config("bui"), zone("bui.zon", "Core_ZN"))
        .unwrap();

    let err = {
        let building = registry.building(handle).unwrap();
        let (_, signal) = building
            .signals()
            .find("Core_ZN_T", Direction::Input)
            .unwrap();
        signal.value_reference().unwrap_err()
    };
    assert!(matches!(err, Error::Unresolved { ref signal } if signal == "Core_ZN_T"));

    registry.instantiate(handle).unwrap();
    let building = registry.building(handle).unwrap();
    let (_, signal) = building
        .signals()
        .find("Core_ZN_T", Direction::Input)
        .unwrap();
    assert_eq!(signal.value_reference().unwrap(), 1);
}
