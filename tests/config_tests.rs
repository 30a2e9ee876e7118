//! Configuration and topology validation tests

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use intersection_sim::simulation::{
    default_simultaneous, ControllerMode, Direction, Footprint, SimConfig, SimWorld,
    TopologyConfig, VehicleClass, VehicleClassConfig, DEFAULT_FOOTPRINT,
};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("intersection_sim_{}_{}.json", std::process::id(), name))
}

#[test]
fn test_builtin_topologies_are_valid() {
    TopologyConfig::two_intersections().validate().unwrap();
    TopologyConfig::single_intersection().validate().unwrap();
    SimConfig::default().validate().unwrap();
}

#[test]
fn test_pairing_must_be_a_single_cycle() {
    let mut topology = TopologyConfig::two_intersections();
    topology.simultaneous.insert(Direction::Right, Direction::Right);
    let err = topology.validate().unwrap_err();
    assert!(format!("{:#}", err).contains("paired with itself"));

    let mut topology = TopologyConfig::two_intersections();
    topology.simultaneous = BTreeMap::from([
        (Direction::Right, Direction::Down),
        (Direction::Down, Direction::Right),
        (Direction::Left, Direction::Up),
        (Direction::Up, Direction::Left),
    ]);
    let err = topology.validate().unwrap_err();
    assert!(format!("{:#}", err).contains("single cycle"));

    let mut topology = TopologyConfig::two_intersections();
    topology.simultaneous.remove(&Direction::Up);
    assert!(topology.validate().is_err());

    assert_eq!(
        TopologyConfig::two_intersections().simultaneous,
        default_simultaneous()
    );
}

#[test]
fn test_unknown_neighbor_is_rejected() {
    let mut topology = TopologyConfig::two_intersections();
    topology.intersections[0]
        .neighbors
        .insert(Direction::Down, "C".to_string());
    let err = topology.validate().unwrap_err();
    assert!(format!("{:#}", err).contains("unknown neighbor 'C'"));

    let mut topology = TopologyConfig::two_intersections();
    topology.intersections[1]
        .neighbors
        .insert(Direction::Up, "B".to_string());
    assert!(topology.validate().is_err(), "self links are rejected");
}

#[test]
fn test_duplicate_names_are_rejected() {
    let mut topology = TopologyConfig::two_intersections();
    topology.intersections[1].name = "A".to_string();
    assert!(topology.validate().is_err());
}

#[test]
fn test_default_stop_beyond_stop_line_is_rejected() {
    let mut topology = TopologyConfig::single_intersection();
    topology.intersections[0].default_stops.left = 370.0;
    let err = topology.validate().unwrap_err();
    assert!(format!("{:#}", err).contains("beyond its stop line"));
}

#[test]
fn test_empty_spawn_directions_are_rejected() {
    let mut topology = TopologyConfig::single_intersection();
    topology.intersections[0].allowed_spawn_directions.clear();
    assert!(topology.validate().is_err());
}

#[test]
fn test_world_rejects_invalid_topology() {
    let mut topology = TopologyConfig::two_intersections();
    topology.intersections.clear();
    assert!(SimWorld::from_config(SimConfig::default(), &topology, None).is_err());
}

#[test]
fn test_sim_config_validation() {
    let mut config = SimConfig::default();
    config.timing.min_green = 30;
    assert!(config.validate().is_err());

    let mut config = SimConfig::default();
    config.spawn.interval_secs = 0.0;
    assert!(config.validate().is_err());

    let mut config = SimConfig::default();
    for class in &mut config.vehicle_classes {
        class.enabled = false;
    }
    assert!(config.validate().is_err());
}

#[test]
fn test_topology_round_trips_through_json() {
    let path = temp_path("topology");
    let topology = TopologyConfig::two_intersections();
    fs::write(&path, serde_json::to_string_pretty(&topology).unwrap()).unwrap();

    let loaded = TopologyConfig::load(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(loaded.intersections.len(), 2);
    assert_eq!(loaded.intersections[1].x_offset, 748.0);
    assert_eq!(
        loaded.intersections[0].neighbors.get(&Direction::Right),
        Some(&"B".to_string())
    );
    assert_eq!(loaded.bounds, topology.bounds);
    assert_eq!(loaded.simultaneous, topology.simultaneous);
}

#[test]
fn test_partial_config_uses_defaults() {
    let path = temp_path("partial_config");
    fs::write(
        &path,
        r#"{ "simulation_time_secs": 42, "controller_mode": "manual", "timing": { "max_green": 12 } }"#,
    )
    .unwrap();

    let config = SimConfig::load(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(config.simulation_time_secs, 42);
    assert_eq!(config.controller_mode, ControllerMode::Manual);
    assert_eq!(config.timing.max_green, 12);
    assert_eq!(config.timing.min_green, 1);
    assert_eq!(config.tick_rate, 60);
    assert_eq!(config.vehicle_classes.len(), 4);
}

#[test]
fn test_missing_files_are_reported() {
    let err = TopologyConfig::load(temp_path("does_not_exist")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read topology"));

    let err = SimConfig::load(temp_path("also_missing")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read config"));
}

#[test]
fn test_malformed_json_is_reported() {
    let path = temp_path("malformed");
    fs::write(&path, "{ not json").unwrap();
    let err = TopologyConfig::load(&path).unwrap_err();
    fs::remove_file(&path).ok();
    assert!(format!("{:#}", err).contains("Failed to parse topology"));
}

#[test]
fn test_invalid_footprint_falls_back_to_default() {
    let mut config = SimConfig::default();
    config.vehicle_classes = vec![
        VehicleClassConfig {
            class: VehicleClass::Truck,
            enabled: true,
            speed: Some(1.5),
            footprint: Some(Footprint::new(-5.0, 10.0)),
        },
        VehicleClassConfig {
            class: VehicleClass::Bike,
            enabled: false,
            speed: None,
            footprint: None,
        },
    ];

    let profiles = config.class_profiles();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].class, VehicleClass::Truck);
    assert_eq!(profiles[0].speed, 1.5);
    assert_eq!(profiles[0].footprint, DEFAULT_FOOTPRINT);
}

#[test]
fn test_direction_names_parse() {
    assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
    assert_eq!("North".parse::<Direction>().unwrap(), Direction::Down);
    assert_eq!(" w ".parse::<Direction>().unwrap(), Direction::Right);
    assert_eq!("EAST".parse::<Direction>().unwrap(), Direction::Left);
    let err = "diagonal".parse::<Direction>().unwrap_err();
    assert!(err.to_string().contains("unrecognized direction 'diagonal'"));
}
