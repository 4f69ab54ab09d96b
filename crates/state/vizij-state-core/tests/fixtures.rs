use std::sync::Arc;

use vizij_blend::StaticClipTable;
use vizij_state::{
    ChannelMask, DenialReason, Lane, MachineSpec, StateEvent, StateGraph, StateId, StateMachine,
};
use vizij_test_fixtures::state_graphs;

const DT: f32 = 1.0 / 60.0;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

fn locomotion() -> StateMachine {
    let spec: MachineSpec = state_graphs::load("locomotion").expect("load locomotion fixture");
    let clips: StaticClipTable = state_graphs::clips("locomotion")
        .expect("load locomotion clips")
        .expect("locomotion ships a clip table");
    let (graph, report) = StateGraph::build(&spec.graph);
    assert!(report.is_clean(), "{:?}", report.messages());
    StateMachine::with_clips(graph, spec.config.clone(), Arc::new(clips))
}

fn movement_paths() -> StateMachine {
    let json = state_graphs::json("movement-paths").expect("load movement-paths fixture");
    let machine = StateMachine::from_json(&json).expect("parse movement-paths fixture");
    assert!(machine.validation().is_clean(), "{:?}", machine.validation().messages());
    machine
}

#[test]
fn every_graph_fixture_parses_and_validates() {
    for key in state_graphs::keys() {
        let spec: MachineSpec = state_graphs::load(&key).unwrap();
        let (graph, report) = StateGraph::build(&spec.graph);
        assert!(report.errors().next().is_none(), "{key}: {:?}", report.messages());
        assert_eq!(graph.len(), spec.graph.states.len(), "{key}");
    }
}

#[test]
fn locomotion_starts_in_its_initial_states() {
    let mut m = locomotion();
    assert_eq!(m.lane_weight(Lane::Basic), 0.5);

    let out = m.tick(DT);
    assert_eq!(out.entered().collect::<Vec<_>>(), vec![StateId(5), StateId(1)]);
    assert_eq!(out.lane(Lane::Basic).and_then(|l| l.current), Some(StateId(5)));
    assert_eq!(out.lane(Lane::Main).and_then(|l| l.current), Some(StateId(1)));
    assert_eq!(out.lane(Lane::Buff).and_then(|l| l.current), None);
}

#[test]
fn speed_drives_locomotion_blend() {
    let mut m = locomotion();
    m.tick(DT);

    m.context_mut().set_float("speed", 2.75);
    let out = m.tick(DT);
    assert!(out.events.contains(&StateEvent::Transitioned {
        from: StateId(1),
        to: StateId(2),
        lane: Lane::Main,
    }));

    m.tick(DT);
    assert_eq!(m.blend_weights(Lane::Main), &[0.0, 0.5, 0.5, 0.0]);
    let snap = m.outputs().lane(Lane::Main).cloned().unwrap();
    assert_eq!(snap.outgoing, Some(StateId(1)));
    assert!(snap.fade[1] > 0.0 && snap.fade[1] < 1.0);
}

#[test]
fn jump_runs_its_phases_and_hands_the_lane_back() {
    let mut m = locomotion();
    m.tick(DT);
    m.context_mut().set_float("speed", 2.75);
    m.tick(DT);
    m.tick(DT);

    m.context_mut().set_trigger("jump");
    let out = m.tick(DT);
    assert!(out.events.contains(&StateEvent::Transitioned {
        from: StateId(2),
        to: StateId(3),
        lane: Lane::Main,
    }));
    assert!(m.context().has_flag("airborne"));
    assert!(!m.context().get_trigger("jump"));
    assert!(approx(m.ledger().occupancy_of(ChannelMask::DOUBLE_LEG), 0.7));
    assert_eq!(m.ledger().pending_returns(), 1);

    assert_eq!(
        m.try_enter_state_detailed("Wave", None, false),
        Err(DenialReason::ConditionNotMet)
    );

    let mut phases = Vec::new();
    let mut finished = false;
    for _ in 0..90 {
        let out = m.tick(DT);
        for event in &out.events {
            if let StateEvent::PhaseChanged { state: StateId(3), name: Some(name), .. } = event {
                phases.push(name.clone());
            }
        }
        if out.exited().any(|s| s == StateId(3)) {
            assert_eq!(m.current_state(Lane::Main), Some(StateId(1)));
            finished = true;
            break;
        }
    }
    assert!(finished, "jump never finished");
    assert_eq!(phases, vec!["main", "wait", "released"]);
    assert!(!m.context().has_flag("airborne"));
    assert_eq!(m.ledger().occupancy_of(ChannelMask::DOUBLE_LEG), 0.0);
    assert_eq!(m.ledger().pending_returns(), 0);

    assert!(m.try_enter_state("Wave", None, false));
    assert_eq!(m.current_state(Lane::Buff), Some(StateId(4)));
    assert!(approx(m.ledger().occupancy_of(ChannelMask::RIGHT_HAND), 0.6));
}

#[test]
fn sprint_leaves_when_its_keep_condition_drops() {
    let mut m = movement_paths();
    m.context_mut().set_bool("sprint_held", true);
    assert!(m.try_enter_state("Sprint", None, false));
    let out = m.tick(DT);
    assert_eq!(out.entered().collect::<Vec<_>>(), vec![StateId(3)]);
    assert!(approx(m.ledger().occupancy_of(ChannelMask::DOUBLE_LEG), 0.9));

    m.context_mut().set_bool("sprint_held", false);
    let out = m.tick(DT);
    assert_eq!(out.exited().collect::<Vec<_>>(), vec![StateId(3)]);
    assert_eq!(m.current_state(Lane::Main), None);
    assert_eq!(m.ledger().occupancy_of(ChannelMask::DOUBLE_LEG), 0.0);
}

#[test]
fn walk_request_degrades_sprint_to_run() {
    let mut m = movement_paths();
    m.context_mut().set_bool("sprint_held", true);
    assert!(m.try_enter_state("Sprint", None, false));

    assert_eq!(
        m.try_enter_state_detailed("Walk", None, false),
        Err(DenialReason::SamePathDegrading)
    );
    assert_eq!(m.current_state(Lane::Main), Some(StateId(2)));
    assert!(approx(m.ledger().occupancy_of(ChannelMask::DOUBLE_LEG), 0.5));

    let out = m.tick(DT);
    assert!(out.events.contains(&StateEvent::Degraded {
        from: StateId(3),
        to: StateId(2),
        requested: StateId(1),
        lane: Lane::Main,
    }));
}

#[test]
fn aim_grid_blends_the_four_surrounding_poses() {
    let mut m = movement_paths();
    m.context_mut().set_float("aim_x", 0.5);
    m.context_mut().set_float("aim_y", 0.5);
    assert!(m.try_enter_state("Aim", None, false));
    assert_eq!(m.lane_of(StateId(10)), Some(Lane::Buff));

    m.tick(DT);
    let w = m.blend_weights(Lane::Buff);
    assert_eq!(w.len(), 9);
    for i in [4, 5, 7, 8] {
        assert!(approx(w[i], 0.25), "{w:?}");
    }
    assert!(approx(w.iter().sum::<f32>(), 1.0));
    assert!(approx(m.ledger().occupancy_of(ChannelMask::HEAD), 0.5));
}
