//! Multi-intersection coordination tests

use intersection_sim::simulation::{
    Direction, Lane, Position, SimConfig, SimWorld, TopologyConfig, VehicleClass, VehicleId,
};

fn linked_world() -> SimWorld {
    let mut config = SimConfig::default();
    config.spawn.enabled = false;
    config.startup_delay_secs = 1;
    SimWorld::from_config(config, &TopologyConfig::two_intersections(), Some(3))
        .expect("default config is valid")
}

/// Number of lane queues (across all intersections) holding `id`
fn queue_memberships(world: &SimWorld, id: VehicleId) -> usize {
    world
        .intersections
        .values()
        .flat_map(|i| {
            Direction::ALL
                .into_iter()
                .flat_map(move |d| Lane::ALL.into_iter().map(move |l| (d, l)))
                .map(move |(d, l)| i.lanes.queue(d, l))
        })
        .filter(|queue| queue.vehicles.contains(&id))
        .count()
}

fn assert_queue_indices(world: &SimWorld) {
    for intersection in world.intersections.values() {
        for direction in Direction::ALL {
            for lane in Lane::ALL {
                let queue = intersection.lanes.queue(direction, lane);
                for (index, id) in queue.vehicles.iter().enumerate() {
                    let vehicle = world.vehicle(*id).expect("queued vehicle exists");
                    assert_eq!(vehicle.queue_index, index, "{} out of place", id);
                    assert_eq!(vehicle.intersection, intersection.id);
                    assert_eq!(vehicle.direction, direction);
                    assert_eq!(vehicle.lane, lane);
                }
            }
        }
    }
}

#[test]
fn test_neighbors_follow_topology() {
    let world = linked_world();
    let a = world.intersection_id("A").unwrap();
    let b = world.intersection_id("B").unwrap();

    assert_eq!(world.coordinator.link_count(), 2);
    assert_eq!(world.coordinator.neighbor(a, Direction::Right), Some(b));
    assert_eq!(world.coordinator.neighbor(b, Direction::Left), Some(a));
    assert_eq!(world.coordinator.neighbor(a, Direction::Left), None);
    assert_eq!(world.coordinator.neighbor(b, Direction::Up), None);
    assert_eq!(world.coordinator.links_from(a), vec![(Direction::Right, b)]);
}

#[test]
fn test_congestion_reports_neighbor_queue_depth() {
    let mut world = linked_world();
    let a = world.intersection_id("A").unwrap();
    let b = world.intersection_id("B").unwrap();
    for _ in 0..3 {
        world
            .spawn_vehicle(b, Direction::Right, Lane::Straight, VehicleClass::Car)
            .unwrap();
    }

    let view = world.coordinator.congestion_for(&world.intersections, a);
    assert_eq!(view.depth(Direction::Right, Lane::Straight), Some(3));
    assert_eq!(view.depth(Direction::Left, Lane::Straight), None);
    // a left turn from the west approach heads up, where A has no neighbor
    assert_eq!(view.depth(Direction::Right, Lane::LeftTurn), None);

    assert_eq!(
        world
            .coordinator
            .remaining_count(&world.intersections, b, Direction::Right, Lane::Straight),
        3
    );
}

#[test]
fn test_full_neighbor_holds_feeding_lane() {
    let mut world = linked_world();
    let a = world.intersection_id("A").unwrap();
    let b = world.intersection_id("B").unwrap();
    for _ in 0..5 {
        world
            .spawn_vehicle(b, Direction::Right, Lane::Straight, VehicleClass::Car)
            .unwrap();
    }
    world
        .spawn_vehicle(a, Direction::Right, Lane::Straight, VehicleClass::Car)
        .unwrap();

    let intersection = world.intersection(a).unwrap();
    let congestion = world.coordinator.congestion_for(&world.intersections, a);
    let phase = intersection
        .controller
        .build_phase(Direction::Right, &intersection.counts(), &congestion);
    assert_eq!(phase.lanes[Lane::Straight.index()].green, 0);
    assert!(phase.lanes[Lane::LeftTurn.index()].green > 0);
    assert!(phase.green_remaining >= 1);
}

#[test]
fn test_vehicle_is_handed_off_to_neighbor() {
    let mut world = linked_world();
    let a = world.intersection_id("A").unwrap();
    let b = world.intersection_id("B").unwrap();
    let id = world
        .spawn_vehicle(a, Direction::Right, Lane::Straight, VehicleClass::Car)
        .unwrap();

    let mut ticks = 0;
    while world.stats.handoffs == 0 {
        world.tick();
        ticks += 1;
        assert!(ticks < 30 * 60, "vehicle never reached the neighbor");
        assert_eq!(queue_memberships(&world, id), 1);
    }

    let vehicle = world.vehicle(id).unwrap();
    assert_eq!(vehicle.intersection, b);
    assert_eq!(vehicle.direction, Direction::Right);
    assert_eq!(vehicle.lane, Lane::Straight);
    assert!(vehicle.handed_off);
    assert!(!vehicle.crossed, "handed-off vehicle approaches a new stop line");
    assert!(b_zone_contains(&world, vehicle.position));

    let from = world.intersection(a).unwrap().lanes.queue(Direction::Right, Lane::Straight);
    assert!(from.vehicles.is_empty());
    assert_eq!(from.crossed, 1);
    let to = world.intersection(b).unwrap().lanes.queue(Direction::Right, Lane::Straight);
    assert_eq!(to.vehicles, vec![id]);
    assert_eq!(to.arrived, 1);
    assert_eq!(to.remaining(), 1);
    assert_eq!(queue_memberships(&world, id), 1);
}

fn b_zone_contains(world: &SimWorld, position: Position) -> bool {
    let b = world.intersection_id("B").unwrap();
    world
        .intersection(b)
        .unwrap()
        .entry_zone(Direction::Right)
        .is_some_and(|zone| zone.contains(position))
}

#[test]
fn test_queue_indices_stay_contiguous_through_handoffs() {
    let mut world = linked_world();
    let a = world.intersection_id("A").unwrap();
    let ids: Vec<VehicleId> = (0..3)
        .map(|_| {
            world
                .spawn_vehicle(a, Direction::Right, Lane::Straight, VehicleClass::Car)
                .unwrap()
        })
        .collect();

    for _ in 0..(40 * 60) {
        world.tick();
        assert_queue_indices(&world);
        for &id in &ids {
            if world.vehicle(id).is_some() {
                assert_eq!(queue_memberships(&world, id), 1);
            }
        }
    }

    assert_eq!(world.stats.handoffs, 3);
    assert_eq!(world.stats.dropped, 0);
    assert_eq!(world.total_arrived(), 6, "each vehicle arrives at both intersections");
}
