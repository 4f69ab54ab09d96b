use vizij_blend::{BlendSpec, DirectSource, DirectSpec, Phase4Spec, PhaseSpec, WeightEventSpec};
use vizij_params::{Compare, Condition};
use vizij_state::{
    ChannelMask, CostSpec, DenialReason, Lane, MachineConfig, SamePath, StateComponent,
    StateDefinition, StateEvent, StateGraph, StateGraphSpec, StateId, StateMachine, StateRef,
    TransitionSpec,
};

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

fn machine(states: Vec<StateDefinition>, config: MachineConfig) -> StateMachine {
    let (graph, report) = StateGraph::build(&StateGraphSpec { states });
    assert!(report.errors().next().is_none(), "{:?}", report.messages());
    StateMachine::new(graph, config)
}

fn to(target: u32, conditions: Vec<Condition>) -> TransitionSpec {
    TransitionSpec {
        target: StateRef::Id(target),
        conditions,
        exit_time: None,
        force: false,
    }
}

fn with_fallback(name: &str) -> MachineConfig {
    let mut config = MachineConfig::default();
    config.lanes.main.fallback = Some(name.into());
    config
}

#[test]
fn preemption_waits_for_scheduled_return() {
    let a = StateDefinition::new(1, "A")
        .priority(50)
        .duration(2.0)
        .cost(CostSpec::new(ChannelMask::DOUBLE_HAND, 1.0))
        .recovery(0.25, 0.4);
    let b = StateDefinition::new(2, "B")
        .priority(80)
        .cost(CostSpec::new(ChannelMask::DOUBLE_HAND, 0.8));
    let mut m = machine(vec![a, b], MachineConfig::default());

    assert!(m.try_enter_state(StateId(1), None, false));
    assert_eq!(
        m.try_enter_state_detailed(StateId(2), None, false),
        Err(DenialReason::CostNotEnough)
    );

    for _ in 0..3 {
        m.tick(0.25);
    }
    assert!(approx(m.ledger().occupancy(0), 0.375));
    assert_eq!(
        m.try_enter_state_detailed(StateId(2), None, false),
        Err(DenialReason::CostNotEnough)
    );
    assert_eq!(m.current_state(Lane::Main), Some(StateId(1)));

    m.tick(0.25);
    assert_eq!(m.ledger().occupancy(0), 0.0);
    assert_eq!(m.ledger().pending_returns(), 0);
    assert!(m.try_enter_state(StateId(2), None, false));
    assert_eq!(m.current_state(Lane::Main), Some(StateId(2)));

    let out = m.tick(0.0);
    assert!(out.events.contains(&StateEvent::Exited {
        state: StateId(1),
        lane: Lane::Main
    }));
    assert_eq!(out.entered().collect::<Vec<_>>(), vec![StateId(2)]);
    assert!(approx(m.ledger().occupancy(1), 0.8));
}

fn locomotion(weak_interrupt: bool) -> Vec<StateDefinition> {
    let walk = StateDefinition::new(1, "Walk")
        .priority(30)
        .same_path(SamePath::Run)
        .cost(CostSpec::new(ChannelMask::DOUBLE_LEG, 0.4));
    let run = StateDefinition::new(2, "Run")
        .priority(40)
        .same_path(SamePath::Run)
        .cost(CostSpec::new(ChannelMask::DOUBLE_LEG, 0.5));
    let mut sprint = StateDefinition::new(3, "Sprint")
        .priority(60)
        .same_path(SamePath::Run)
        .cost(CostSpec::new(ChannelMask::DOUBLE_LEG, 0.9))
        .degrade_to("Run");
    sprint.weak_interrupt = weak_interrupt;
    sprint.enter_conditions.push(Condition::bool("sprint_held", true));
    vec![walk, run, sprint]
}

#[test]
fn same_path_request_degrades_sprint_to_run() {
    let mut m = machine(locomotion(true), MachineConfig::default());
    m.context_mut().set_bool("sprint_held", true);
    assert!(m.try_enter_state("Sprint", None, false));

    m.context_mut().set_bool("sprint_held", false);
    assert_eq!(
        m.try_enter_state_detailed("Walk", None, false),
        Err(DenialReason::SamePathDegrading)
    );
    assert_eq!(m.current_state(Lane::Main), Some(StateId(2)));
    assert!(approx(m.ledger().occupancy(2), 0.5));
    assert_eq!(m.ledger().holders(2).collect::<Vec<_>>(), vec![StateId(2)]);
    assert_eq!(m.denial_reason(StateId(1)), DenialReason::SamePathDegrading);

    let out = m.tick(1.0 / 60.0);
    assert!(out.events.contains(&StateEvent::Degraded {
        from: StateId(3),
        to: StateId(2),
        requested: StateId(1),
        lane: Lane::Main,
    }));
}

#[test]
fn without_weak_interrupt_the_request_is_refused() {
    let mut m = machine(locomotion(false), MachineConfig::default());
    m.context_mut().set_bool("sprint_held", true);
    assert!(m.try_enter_state("Sprint", None, false));
    assert_eq!(
        m.try_enter_state_detailed("Walk", None, false),
        Err(DenialReason::PriorityTooLow)
    );
    assert_eq!(m.current_state(Lane::Main), Some(StateId(3)));
}

#[test]
fn transitions_leave_lower_priority_sources_behind() {
    let idle = StateDefinition::new(1, "Idle")
        .priority(10)
        .transition(to(2, vec![Condition::float("speed", Compare::Greater, 0.1)]));
    let moving = StateDefinition::new(2, "Move")
        .priority(20)
        .transition(to(1, vec![Condition::float("speed", Compare::Less, 0.05)]));
    let mut m = machine(vec![idle, moving], with_fallback("Idle"));

    let out = m.tick(0.1);
    assert_eq!(out.entered().collect::<Vec<_>>(), vec![StateId(1)]);

    m.context_mut().set_float("speed", 1.0);
    let out = m.tick(0.1);
    assert!(out.events.contains(&StateEvent::Transitioned {
        from: StateId(1),
        to: StateId(2),
        lane: Lane::Main
    }));
    assert_eq!(out.exited().collect::<Vec<_>>(), vec![StateId(1)]);

    m.context_mut().set_float("speed", 0.0);
    m.tick(0.1);
    assert_eq!(m.current_state(Lane::Main), Some(StateId(1)));
}

#[test]
fn host_triggers_last_one_tick() {
    let idle = StateDefinition::new(1, "Idle").transition(to(2, vec![Condition::trigger("jump")]));
    let jump = StateDefinition::new(2, "Jump").priority(5);
    let mut m = machine(vec![idle, jump], MachineConfig::default());
    assert!(m.try_enter_state("Idle", None, false));

    m.context_mut().set_trigger("jump");
    m.tick(0.016);
    assert_eq!(m.current_state(Lane::Main), Some(StateId(2)));
    assert!(!m.context().get_trigger("jump"));
}

#[test]
fn re_requesting_the_running_state_does_not_degrade_it() {
    let mut m = machine(locomotion(true), MachineConfig::default());
    m.context_mut().set_bool("sprint_held", true);
    assert!(m.try_enter_state("Sprint", None, false));

    assert_eq!(
        m.try_enter_state_detailed("Sprint", None, false),
        Err(DenialReason::PriorityTooLow)
    );
    assert_eq!(m.current_state(Lane::Main), Some(StateId(3)));
    assert!(approx(m.ledger().occupancy(2), 0.9));
    let out = m.tick(1.0 / 60.0);
    assert!(!out.events.iter().any(|e| matches!(e, StateEvent::Degraded { .. })));
}

#[test]
fn lower_priority_with_room_is_refused_without_degrading() {
    let mut states = locomotion(true);
    states[2] = states[2].clone().cost(CostSpec::new(ChannelMask::DOUBLE_LEG, 0.5));
    let mut m = machine(states, MachineConfig::default());
    m.context_mut().set_bool("sprint_held", true);
    assert!(m.try_enter_state("Sprint", None, false));

    assert_eq!(
        m.try_enter_state_detailed("Walk", None, false),
        Err(DenialReason::PriorityTooLow)
    );
    assert_eq!(m.current_state(Lane::Main), Some(StateId(3)));
}

#[test]
fn forced_entry_skips_enter_conditions() {
    let mut m = machine(locomotion(true), MachineConfig::default());
    assert_eq!(
        m.try_enter_state_detailed("Sprint", None, false),
        Err(DenialReason::ConditionNotMet)
    );
    assert_eq!(m.try_enter_state_detailed("Sprint", None, true), Ok(()));
    assert_eq!(m.current_state(Lane::Main), Some(StateId(3)));
    assert!(approx(m.ledger().occupancy(2), 0.9));
}

#[test]
fn denials_are_memoized_until_timeout() {
    let mut guarded = StateDefinition::new(1, "Guarded");
    guarded.enter_conditions.push(Condition::Flag {
        name: "armed".into(),
    });
    let mut m = machine(vec![guarded], MachineConfig::default());

    assert_eq!(
        m.try_enter_state_detailed(StateId(1), None, false),
        Err(DenialReason::ConditionNotMet)
    );
    m.context_mut().set_flag("armed");
    assert_eq!(
        m.try_enter_state_detailed(StateId(1), None, false),
        Err(DenialReason::ConditionNotMet)
    );

    let out = m.tick(0.5);
    let denied = out
        .events
        .iter()
        .filter(|e| matches!(e, StateEvent::Denied { .. }))
        .count();
    assert_eq!(denied, 1);

    m.tick(0.5);
    assert!(!m.try_enter_state(StateId(1), None, false));
    m.tick(0.25);
    assert!(m.try_enter_state(StateId(1), None, false));
}

#[test]
fn blocked_states_refuse_even_forced_entry() {
    let mut m = machine(vec![StateDefinition::new(1, "Emote")], MachineConfig::default());
    m.block_state(StateId(1));
    assert_eq!(
        m.try_enter_state_detailed(StateId(1), None, true),
        Err(DenialReason::ManualBlock)
    );
    m.unblock_state(StateId(1));
    assert!(m.try_enter_state(StateId(1), None, false));
}

#[test]
fn finished_state_returns_cost_and_falls_back() {
    let idle = StateDefinition::new(1, "Idle").priority(0);
    let jump = StateDefinition::new(2, "Jump")
        .priority(60)
        .duration(0.5)
        .cost(CostSpec::new(ChannelMask::DOUBLE_LEG, 0.7))
        .recovery(0.5, 0.2);
    let mut m = machine(vec![idle, jump], with_fallback("Idle"));
    m.tick(0.0);
    assert!(m.try_enter_state("Jump", None, false));
    assert!(approx(m.ledger().occupancy(3), 0.7));

    m.tick(0.125);
    m.tick(0.125);
    m.tick(0.125);
    assert!(approx(m.ledger().occupancy(3), 0.7 * 0.375));

    let out = m.tick(0.125);
    assert!(out.exited().any(|s| s == StateId(2)));
    assert_eq!(m.current_state(Lane::Main), Some(StateId(1)));
    assert_eq!(m.ledger().occupancy(3), 0.0);
}

#[test]
fn ignore_cost_and_force_bypass_the_ledger() {
    let hog = StateDefinition::new(1, "Hog").cost(CostSpec::new(ChannelMask::HEAD, 1.0));
    let mut free = StateDefinition::new(2, "Free")
        .lane(Lane::Buff)
        .cost(CostSpec::new(ChannelMask::HEAD, 1.0));
    free.ignore_cost = true;
    let blocked = StateDefinition::new(3, "Look")
        .lane(Lane::Basic)
        .cost(CostSpec::new(ChannelMask::HEAD, 0.5));
    let mut m = machine(vec![hog, free, blocked], MachineConfig::default());

    assert!(m.try_enter_state("Hog", None, false));
    assert!(m.try_enter_state("Free", None, false));
    assert_eq!(
        m.try_enter_state_detailed("Look", None, false),
        Err(DenialReason::CostNotEnough)
    );
    assert!(m.try_enter_state("Look", None, true));
    assert_eq!(m.ledger().occupancy(4), 1.0);
    assert_eq!(m.ledger().holders(4).count(), 2);
}

#[test]
fn lane_lock_refuses_entries_mid_fade() {
    let a = StateDefinition::new(1, "A");
    let b = StateDefinition::new(2, "B")
        .priority(60)
        .component(StateComponent::Transition(Default::default()));
    let c = StateDefinition::new(3, "C").priority(70);
    let mut config = MachineConfig::default();
    config.lock_during_transition = true;
    let mut m = machine(vec![a, b, c], config);

    assert!(m.try_enter_state("A", None, false));
    assert!(m.try_enter_state("B", None, false));
    assert!(m.pipeline(Lane::Main).is_transitioning());
    assert_eq!(
        m.try_enter_state_detailed("C", None, false),
        Err(DenialReason::InTransition)
    );
    m.tick(0.35);
    assert!(!m.pipeline(Lane::Main).is_transitioning());
    assert!(m.try_enter_state("C", None, false));
}

#[test]
fn direct_weight_events_surface_as_triggers_and_events() {
    let breath = StateDefinition::new(1, "Breath")
        .lane(Lane::Buff)
        .component(StateComponent::Blend {
            engine: BlendSpec::Direct(DirectSpec {
                sources: vec![DirectSource {
                    source: Some("breath".into()),
                    weight: Some("breath_w".into()),
                    default_weight: 0.0,
                    curve: None,
                }],
                auto_normalize: false,
                smooth_time: 0.0,
                events: vec![WeightEventSpec {
                    name: Some("Peak".into()),
                    source: 0,
                    threshold: 0.5,
                    on_rising: true,
                    on_falling: false,
                }],
                event_prefix: "OnWeight_".into(),
            }),
        });
    let mut m = machine(vec![breath], MachineConfig::default());
    assert!(m.try_enter_state("Breath", None, false));
    m.tick(0.016);

    m.context_mut().set_float("breath_w", 1.0);
    let out = m.tick(0.016);
    assert!(out.events.contains(&StateEvent::WeightEvent {
        state: StateId(1),
        lane: Lane::Buff,
        trigger: "OnWeight_Peak".into(),
    }));
    assert!(!m.context().get_trigger("OnWeight_Peak"));
    assert_eq!(m.blend_weights(Lane::Buff), &[1.0]);
}

#[test]
fn phase_changes_are_published() {
    let leaf = |name: &str| PhaseSpec {
        primary: Some(name.into()),
        ..Default::default()
    };
    let attack = StateDefinition::new(1, "Attack").component(StateComponent::Blend {
        engine: BlendSpec::Phase4(Phase4Spec {
            pre: leaf("windup"),
            main: leaf("swing"),
            wait: leaf("hold"),
            released: leaf("recover"),
            transition_duration: 0.1,
            blend_smooth_time: 0.05,
        }),
    });
    let mut m = machine(vec![attack], MachineConfig::default());
    assert!(m.try_enter_state("Attack", None, false));

    let mut changes = Vec::new();
    for _ in 0..10 {
        let out = m.tick(0.05);
        changes.extend(out.events.iter().filter_map(|e| match e {
            StateEvent::PhaseChanged { phase, name, .. } => Some((*phase, name.clone())),
            _ => None,
        }));
    }
    assert_eq!(changes, vec![(1, Some("main".to_string()))]);
    assert_eq!(m.phase_of(Lane::Main).map(|p| p.index), Some(1));
}

#[test]
fn outputs_snapshot_every_lane() {
    let mut m = machine(vec![StateDefinition::new(1, "Idle")], MachineConfig::default());
    m.set_lane_weight(Lane::Buff, 0.25);
    assert!(m.try_enter_state("Idle", Some(Lane::Basic), false));
    let out = m.tick(0.5);
    assert_eq!(out.lanes.len(), Lane::COUNT);
    let basic = out.lane(Lane::Basic).unwrap();
    assert_eq!(basic.current, Some(StateId(1)));
    assert_eq!(basic.fade, [0.0, 1.0]);
    assert!(approx(basic.elapsed, 0.5));
    assert_eq!(out.lane(Lane::Buff).unwrap().weight, 0.25);
    assert_eq!(m.lane_of(StateId(1)), Some(Lane::Basic));
}
