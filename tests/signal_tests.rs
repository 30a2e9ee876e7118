//! Signal controller validation tests

use intersection_sim::simulation::{
    default_simultaneous, CongestionView, ControllerMode, ControllerState, Direction,
    IntersectionId, Lane, QueueCounts, SignalController, SignalDisplay, SignalPhase, SignalState,
    SignalTiming, SimConfig, SimId, SimWorld, TopologyConfig,
};

fn controller(mode: ControllerMode, startup_secs: u32) -> SignalController {
    SignalController::new(
        IntersectionId(SimId(0)),
        mode,
        SignalTiming::default(),
        startup_secs,
        default_simultaneous(),
    )
}

fn counts(per_direction: &[(Direction, usize)]) -> QueueCounts {
    let mut counts = QueueCounts::default();
    for &(direction, vehicles) in per_direction {
        counts.set(direction, Lane::Straight, vehicles);
    }
    counts
}

/// Step whole seconds until a new phase starts, checking the green set on the way
fn next_phase(ctrl: &mut SignalController, counts: &QueueCounts) -> SignalPhase {
    let started = ctrl.phases_started();
    for _ in 0..200 {
        ctrl.on_second(counts, &CongestionView::default());
        assert_single_green_set(ctrl);
        if ctrl.phases_started() > started {
            return ctrl.phase().cloned().expect("a phase just started");
        }
    }
    panic!("controller never started another phase");
}

fn assert_single_green_set(ctrl: &SignalController) {
    let Some(phase) = ctrl.phase() else {
        for direction in Direction::ALL {
            for lane in Lane::ALL {
                assert!(!ctrl.is_green(direction, lane));
            }
        }
        return;
    };
    for direction in Direction::ALL {
        for lane in Lane::ALL {
            if ctrl.is_green(direction, lane) {
                let primary = direction == phase.primary;
                let partner_left = direction == phase.partner && lane == Lane::LeftTurn;
                assert!(
                    primary || partner_left,
                    "{} lane {} green outside primary {} / partner {}",
                    direction,
                    lane,
                    phase.primary,
                    phase.partner
                );
            }
        }
    }
}

#[test]
fn test_startup_is_all_red() {
    let ctrl = controller(ControllerMode::Adaptive, 5);
    assert_eq!(ctrl.state(), &ControllerState::Startup { remaining: 5 });
    for state in ctrl.display() {
        assert_eq!(
            state,
            SignalState {
                display: SignalDisplay::Red,
                countdown: 5
            }
        );
    }
    assert_single_green_set(&ctrl);
}

#[test]
fn test_greedy_picks_longest_queue_then_rotates() {
    let mut ctrl = controller(ControllerMode::Adaptive, 1);
    let counts = counts(&[(Direction::Right, 10), (Direction::Down, 8)]);

    assert_eq!(next_phase(&mut ctrl, &counts).primary, Direction::Right);
    // the last green is skipped while another direction is waiting
    assert_eq!(next_phase(&mut ctrl, &counts).primary, Direction::Down);
}

#[test]
fn test_starved_direction_is_served() {
    let mut ctrl = controller(ControllerMode::Adaptive, 1);
    let counts = counts(&[
        (Direction::Right, 10),
        (Direction::Down, 8),
        (Direction::Left, 1),
    ]);

    let order: Vec<Direction> = (0..4).map(|_| next_phase(&mut ctrl, &counts).primary).collect();
    assert_eq!(
        order,
        vec![
            Direction::Right,
            Direction::Down,
            Direction::Left,
            Direction::Right
        ]
    );
    assert_eq!(ctrl.wait_cycles(Direction::Right), 0);
    assert_eq!(ctrl.wait_cycles(Direction::Left), 1);
}

#[test]
fn test_empty_directions_never_chosen() {
    let mut ctrl = controller(ControllerMode::Adaptive, 1);
    let counts = counts(&[(Direction::Right, 5), (Direction::Up, 3)]);

    for _ in 0..10 {
        let primary = next_phase(&mut ctrl, &counts).primary;
        assert!(
            primary == Direction::Right || primary == Direction::Up,
            "picked {} with nothing waiting",
            primary
        );
    }
}

#[test]
fn test_single_loaded_direction_repeats() {
    let mut ctrl = controller(ControllerMode::Adaptive, 1);
    let counts = counts(&[(Direction::Up, 4)]);

    for _ in 0..3 {
        assert_eq!(next_phase(&mut ctrl, &counts).primary, Direction::Up);
    }
}

#[test]
fn test_no_demand_falls_back_to_first_direction() {
    let mut ctrl = controller(ControllerMode::Adaptive, 1);
    let phase = next_phase(&mut ctrl, &QueueCounts::default());
    assert_eq!(phase.primary, Direction::Right);
    assert_eq!(phase.partner, Direction::Up);
}

#[test]
fn test_green_scales_with_queue_and_is_clamped() {
    let ctrl = controller(ControllerMode::Adaptive, 1);
    let mut counts = QueueCounts::default();
    counts.set(Direction::Down, Lane::LeftTurn, 0);
    counts.set(Direction::Down, Lane::Straight, 7);
    counts.set(Direction::Down, Lane::RightTurn, 100);
    counts.set(Direction::Right, Lane::LeftTurn, 4);

    let phase = ctrl.build_phase(Direction::Down, &counts, &CongestionView::default());
    assert_eq!(phase.partner, Direction::Right);
    assert_eq!(phase.lanes[0].green, 1); // min green
    assert_eq!(phase.lanes[1].green, 4); // round(3.5)
    assert_eq!(phase.lanes[2].green, 20); // max green
    assert_eq!(phase.partner_left.green, 2);
    assert_eq!(phase.green_remaining, 20);
}

#[test]
fn test_congested_neighbor_throttles_lanes() {
    let ctrl = controller(ControllerMode::Adaptive, 1);
    let mut counts = QueueCounts::default();
    for lane in Lane::ALL {
        counts.set(Direction::Right, lane, 10);
    }
    let mut congestion = CongestionView::default();
    congestion.set(Direction::Right, Lane::LeftTurn, Some(5));
    congestion.set(Direction::Right, Lane::Straight, Some(3));

    let phase = ctrl.build_phase(Direction::Right, &counts, &congestion);
    assert_eq!(phase.lanes[0].green, 0, "full neighbor must hold the lane red");
    // at most ceiling - depth = 2 vehicles released
    assert_eq!(phase.lanes[1].green, 1);
    assert_eq!(phase.lanes[2].green, 5);
    assert_eq!(phase.green_remaining, 5);
}

#[test]
fn test_lane_green_ends_with_yellow() {
    let mut ctrl = controller(ControllerMode::Adaptive, 1);
    let counts = counts(&[(Direction::Left, 4)]);
    let congestion = CongestionView::default();

    ctrl.on_second(&counts, &congestion);
    let phase = ctrl.phase().cloned().unwrap();
    assert_eq!(phase.primary, Direction::Left);
    assert_eq!(phase.lanes[1].green, 2);

    let expired = ctrl.on_second(&counts, &congestion);
    // lanes with a one-second green expire first
    assert!(expired.contains(&(Direction::Left, Lane::LeftTurn)));
    assert!(!expired.contains(&(Direction::Left, Lane::Straight)));
    assert!(ctrl.is_green(Direction::Left, Lane::Straight));
    assert!(!ctrl.is_green(Direction::Left, Lane::LeftTurn));

    let expired = ctrl.on_second(&counts, &congestion);
    assert!(expired.contains(&(Direction::Left, Lane::Straight)));
    assert_eq!(ctrl.display()[Direction::Left.index()].display, SignalDisplay::Yellow);
}

#[test]
fn test_override_replaces_one_selection() {
    let mut ctrl = controller(ControllerMode::Adaptive, 1);
    let counts = counts(&[(Direction::Right, 10)]);

    ctrl.request_green(Direction::Left);
    assert_eq!(ctrl.pending_override(), Some(Direction::Left));

    let phase = next_phase(&mut ctrl, &counts);
    assert_eq!(phase.primary, Direction::Left);
    assert_eq!(ctrl.pending_override(), None);

    assert_eq!(next_phase(&mut ctrl, &counts).primary, Direction::Right);
}

#[test]
fn test_manual_mode_waits_for_override() {
    let mut ctrl = controller(ControllerMode::Manual, 1);
    let counts = counts(&[(Direction::Right, 10)]);
    let congestion = CongestionView::default();

    for _ in 0..5 {
        ctrl.on_second(&counts, &congestion);
        assert_eq!(ctrl.state(), &ControllerState::AwaitingOverride);
        assert_single_green_set(&ctrl);
    }

    ctrl.request_green(Direction::Down);
    ctrl.on_second(&counts, &congestion);
    let phase = ctrl.phase().cloned().expect("override starts a phase");
    assert_eq!(phase.primary, Direction::Down);
    assert_eq!(phase.partner, Direction::Right);
    assert!(phase.lanes.iter().all(|lane| lane.green == 10));
    assert_eq!(phase.partner_left.green, 10);

    let display = ctrl.display();
    assert_eq!(
        display[Direction::Down.index()],
        SignalState {
            display: SignalDisplay::Green,
            countdown: 10
        }
    );
    assert_eq!(display[Direction::Right.index()].display, SignalDisplay::GreenLeft);
    assert_eq!(display[Direction::Left.index()].display, SignalDisplay::Red);

    let mut expired = Vec::new();
    for _ in 0..10 {
        expired = ctrl.on_second(&counts, &congestion);
    }
    assert_eq!(expired.len(), 4);
    let display = ctrl.display();
    assert_eq!(display[Direction::Down.index()].display, SignalDisplay::Yellow);
    assert_eq!(display[Direction::Right.index()].display, SignalDisplay::YellowLeft);

    ctrl.on_second(&counts, &congestion);
    assert_eq!(ctrl.state(), &ControllerState::AwaitingOverride);
}

#[test]
fn test_suggestion_matches_adaptive_choice() {
    let ctrl = controller(ControllerMode::Manual, 1);
    let counts = counts(&[(Direction::Up, 6), (Direction::Left, 2)]);

    let suggestion = ctrl.suggestion(&counts, &CongestionView::default());
    assert_eq!(suggestion.direction, Direction::Up);
    assert_eq!(suggestion.vehicles, 6);
    assert_eq!(suggestion.green_secs, 3);
}

#[test]
fn test_world_override_validation() {
    let mut config = SimConfig::default();
    config.spawn.enabled = false;
    let mut world =
        SimWorld::from_config(config, &TopologyConfig::two_intersections(), Some(1)).unwrap();
    let a = world.intersection_id("A").unwrap();

    let err = world.set_override(a, "sideways").unwrap_err();
    assert!(err.to_string().contains("unrecognized direction"));
    assert_eq!(world.intersection(a).unwrap().controller.pending_override(), None);

    assert_eq!(world.set_override(a, "South").unwrap(), Direction::Up);
    assert_eq!(
        world.intersection(a).unwrap().controller.pending_override(),
        Some(Direction::Up)
    );

    assert!(world.set_override(IntersectionId(SimId(99)), "up").is_err());
}
