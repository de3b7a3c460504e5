use std::{
    collections::HashSet,
    sync::Arc,
    thread,
    time::Duration,
};

use crowd_sim_controller::{ControllerConfig, CrowdController, CrowdService};
use crowd_sim_core::{AgentId, AgentState, CrowdState, Position, Timestamp};
use crowd_sim_world::{CrowdConfig, FieldConfig, WalkableField};

fn open_field(width: u32, height: u32) -> Arc<WalkableField> {
    let cells = (width * height) as usize;
    Arc::new(
        WalkableField::from_mask(width, height, vec![true; cells], &FieldConfig::default())
            .expect("field"),
    )
}

fn config(seed: u64) -> ControllerConfig {
    ControllerConfig {
        seed,
        epoch: Timestamp::from_secs(1_700_000_000.0),
        ..ControllerConfig::default()
    }
}

fn ids(state: &CrowdState) -> HashSet<AgentId> {
    state.people.iter().map(|agent| agent.id).collect()
}

fn assert_consistent(state: &CrowdState, max_agents: usize) {
    assert!(state.people.len() <= max_agents);
    assert_eq!(state.counts.total(), state.people.len());
    let large = state
        .people
        .iter()
        .filter(|agent| agent.state == AgentState::Large)
        .count();
    assert_eq!(state.counts.large, large);
    assert!(state
        .people
        .windows(2)
        .all(|pair| pair[0].id < pair[1].id));
    assert!((0.0..=1.0).contains(&state.tracking.confidence));
}

#[test]
fn initial_snapshot_holds_small_crowd() {
    let controller = CrowdController::new(open_field(100, 100), config(1));
    let state = controller.snapshot();

    assert!((5..=7).contains(&state.people.len()));
    assert_eq!(state.counts.small, state.people.len());
    assert_eq!(state.map.width, 100);
    assert_eq!(controller.field_dimensions(), state.map);
    assert!((state.tracking.confidence - 0.1).abs() < f32::EPSILON);
}

#[test]
fn ticks_advance_the_published_clock() {
    let controller = CrowdController::new(open_field(100, 100), config(2));
    let before = controller.snapshot().timestamp;

    for _ in 0..30 {
        controller.tick_once();
    }

    let elapsed = controller.snapshot().timestamp.seconds_since(before);
    assert!((elapsed - 1.0).abs() < 1e-4, "elapsed {elapsed}");
}

#[test]
fn move_clamps_into_field_and_publishes_immediately() {
    let controller = CrowdController::new(open_field(200, 200), config(3));
    let agent = controller.snapshot().people[0].id;

    assert!(controller.move_agent(agent, -10.0, 50.0));

    let state = controller.snapshot();
    let moved = state
        .people
        .iter()
        .find(|person| person.id == agent)
        .expect("moved agent");
    assert_eq!(moved.position, Position::new(0.0, 50.0));
}

#[test]
fn unknown_agents_are_refused_without_republishing() {
    let controller = CrowdController::new(open_field(80, 80), config(4));
    let before = controller.snapshot();
    let ghost = AgentId::new(9_999);

    assert!(!controller.move_agent(ghost, 10.0, 10.0));
    assert!(!controller.toggle_agent(ghost, None));
    assert!(Arc::ptr_eq(&before, &controller.snapshot()));
}

#[test]
fn toggles_flip_or_set_state() {
    let controller = CrowdController::new(open_field(80, 80), config(5));
    let agent = controller.snapshot().people[0].id;

    assert!(controller.toggle_agent(agent, None));
    assert_eq!(controller.snapshot().counts.large, 1);

    assert!(controller.toggle_agent(agent, Some(AgentState::Large)));
    assert_eq!(controller.snapshot().counts.large, 1);

    assert!(controller.toggle_agent(agent, Some(AgentState::Small)));
    assert_eq!(controller.snapshot().counts.large, 0);
}

#[test]
fn reset_replaces_every_agent() {
    let controller = CrowdController::new(open_field(120, 120), config(6));
    for _ in 0..10 {
        controller.tick_once();
    }
    let previous = ids(&controller.snapshot());

    controller.reset();
    controller.tick_once();

    let state = controller.snapshot();
    assert!((5..=7).contains(&state.people.len()));
    assert!(ids(&state).is_disjoint(&previous));
    assert_eq!(state.counts.large, 0);
}

#[test]
fn large_majority_is_topped_up_within_capacity() {
    let mut settings = config(7);
    settings.crowd = CrowdConfig {
        max_agents: 9,
        ..CrowdConfig::default()
    };
    let controller = CrowdController::new(open_field(100, 100), settings);
    for person in controller.snapshot().people.iter() {
        assert!(controller.toggle_agent(person.id, Some(AgentState::Large)));
    }
    let before = controller.snapshot().counts;

    controller.tick_once();

    let after = controller.snapshot().counts;
    assert!(after.small > before.small);
    assert!(after.total() <= 9);
}

#[test]
fn concurrent_readers_never_observe_torn_snapshots() {
    let mut settings = config(8);
    settings.tick_interval = Duration::from_millis(1);
    let controller = Arc::new(
        CrowdController::spawn(open_field(150, 150), settings).expect("tick thread"),
    );
    let max_agents = CrowdConfig::default().max_agents;

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                for _ in 0..500 {
                    assert_consistent(&controller.snapshot(), max_agents);
                }
            })
        })
        .collect();

    let writer = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || {
            for round in 0..200u32 {
                let state = controller.snapshot();
                if let Some(person) = state.people.first() {
                    let _ = controller.toggle_agent(person.id, None);
                    let _ = controller.move_agent(person.id, (round % 150) as f32, 75.0);
                }
                if round % 50 == 0 {
                    controller.reset();
                }
            }
        })
    };

    for reader in readers {
        reader.join().expect("reader");
    }
    writer.join().expect("writer");
    controller.stop();
    assert!(!controller.is_running());
}

#[test]
fn stop_halts_the_tick_thread() {
    let mut settings = config(9);
    settings.tick_interval = Duration::from_millis(2);
    let controller = CrowdController::spawn(open_field(60, 60), settings).expect("tick thread");
    assert!(controller.is_running());

    thread::sleep(Duration::from_millis(30));
    controller.stop();
    let stopped_at = controller.snapshot().timestamp;
    thread::sleep(Duration::from_millis(20));

    assert_eq!(controller.snapshot().timestamp, stopped_at);
    assert!(!controller.is_running());
    controller.stop();
}
