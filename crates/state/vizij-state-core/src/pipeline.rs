//! One scheduling lane: at most one current state plus the state it is
//! fading out of.

use std::sync::Arc;

use vizij_blend::ClipTable;
use vizij_params::{all_hold, any_holds, Curve, ParamContext};

use crate::graph::CompiledState;
use crate::ids::{Lane, StateId};
use crate::instance::StateInstance;
use crate::outputs::{LaneSnapshot, StateEvent};

/// What the current state asks of the controller after an update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LaneSignal {
    KeepFailed,
    ExitRequested,
    TransitionRequested { target: StateId, force: bool },
    /// Finite duration (or one-shot phase sequence) ran out with no
    /// transition taking over.
    Completed,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneReport {
    pub needs_fallback: bool,
    pub signal: Option<LaneSignal>,
    /// Outgoing state whose fade finished this update.
    pub faded_out: Option<StateId>,
}

#[derive(Debug)]
struct ActiveFade {
    elapsed: f32,
    duration: f32,
    curve: Curve,
}

impl ActiveFade {
    fn progress(&self) -> f32 {
        let t = (self.elapsed / self.duration).clamp(0.0, 1.0);
        self.curve.evaluate(t).clamp(0.0, 1.0)
    }
}

#[derive(Debug)]
pub struct Pipeline {
    lane: Lane,
    weight: f32,
    fallback: Option<StateId>,
    current: Option<StateInstance>,
    outgoing: Option<StateInstance>,
    fade: Option<ActiveFade>,
}

impl Pipeline {
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            weight: 1.0,
            fallback: None,
            current: None,
            outgoing: None,
            fade: None,
        }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn fallback(&self) -> Option<StateId> {
        self.fallback
    }

    pub fn set_fallback(&mut self, fallback: Option<StateId>) {
        self.fallback = fallback;
    }

    pub fn current(&self) -> Option<&StateInstance> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut StateInstance> {
        self.current.as_mut()
    }

    pub fn current_id(&self) -> Option<StateId> {
        self.current.as_ref().map(|c| c.id())
    }

    pub fn outgoing(&self) -> Option<&StateInstance> {
        self.outgoing.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_transitioning(&self) -> bool {
        self.fade.is_some()
    }

    /// Empty lane, or strictly higher priority than what runs now.
    pub fn can_enter_state(&self, state: &CompiledState) -> bool {
        match &self.current {
            None => true,
            Some(current) => state.priority() > current.state().priority(),
        }
    }

    /// Start `state`. With a fade configured the previous state keeps running
    /// as the outgoing one; otherwise it exits on the spot. Any state still
    /// fading out from an earlier switch exits immediately. Returns the id of
    /// the displaced current state.
    pub fn enter_state(
        &mut self,
        state: Arc<CompiledState>,
        ctx: &mut ParamContext,
        clips: &dyn ClipTable,
        now: f64,
        events: &mut Vec<StateEvent>,
    ) -> Option<StateId> {
        if let Some(mut old) = self.outgoing.take() {
            old.exit(ctx);
            events.push(StateEvent::Exited {
                state: old.id(),
                lane: self.lane,
            });
        }
        self.fade = None;

        let fade = state.fade().cloned();
        let mut next = StateInstance::new(state, clips, now);
        let displaced = self.current.take().map(|mut previous| {
            let id = previous.id();
            match &fade {
                Some(f) => {
                    self.fade = Some(ActiveFade {
                        elapsed: 0.0,
                        duration: f.duration,
                        curve: f.curve.clone(),
                    });
                    self.outgoing = Some(previous);
                }
                None => {
                    previous.exit(ctx);
                    events.push(StateEvent::Exited { state: id, lane: self.lane });
                }
            }
            id
        });
        next.enter(ctx);
        self.current = Some(next);
        displaced
    }

    /// Advance fades and instances, then ask the current state what it wants.
    pub fn update(&mut self, ctx: &mut ParamContext, dt: f32, events: &mut Vec<StateEvent>) -> LaneReport {
        let mut report = LaneReport::default();

        if let Some(fade) = &mut self.fade {
            fade.elapsed += dt.max(0.0);
            if fade.elapsed >= fade.duration {
                self.fade = None;
                if let Some(mut old) = self.outgoing.take() {
                    old.exit(ctx);
                    events.push(StateEvent::Exited {
                        state: old.id(),
                        lane: self.lane,
                    });
                    report.faded_out = Some(old.id());
                }
            }
        }
        if let Some(old) = &mut self.outgoing {
            old.update(ctx, dt, self.lane, events);
        }

        let Some(current) = &mut self.current else {
            report.needs_fallback = self.fallback.is_some();
            return report;
        };
        current.update(ctx, dt, self.lane, events);
        report.signal = evaluate(current, ctx);
        report
    }

    /// Exit the current and outgoing states immediately. Returns the
    /// current state's id.
    pub fn exit_current_state(&mut self, ctx: &mut ParamContext, events: &mut Vec<StateEvent>) -> Option<StateId> {
        self.fade = None;
        if let Some(mut old) = self.outgoing.take() {
            old.exit(ctx);
            events.push(StateEvent::Exited {
                state: old.id(),
                lane: self.lane,
            });
        }
        let mut current = self.current.take()?;
        current.exit(ctx);
        events.push(StateEvent::Exited {
            state: current.id(),
            lane: self.lane,
        });
        Some(current.id())
    }

    /// (outgoing, current) weights of the running cross-fade.
    pub fn cross_fade_weights(&self) -> (f32, f32) {
        match (&self.fade, &self.current) {
            (Some(fade), _) => {
                let c = fade.progress();
                (1.0 - c, c)
            }
            (None, Some(_)) => (0.0, 1.0),
            (None, None) => (0.0, 0.0),
        }
    }

    pub fn snapshot(&self) -> LaneSnapshot {
        let (out_w, cur_w) = self.cross_fade_weights();
        let mut snap = LaneSnapshot::empty(self.lane);
        snap.weight = self.weight;
        snap.fade = [out_w, cur_w];
        snap.outgoing = self.outgoing.as_ref().map(|o| o.id());
        if let Some(current) = &self.current {
            snap.current = Some(current.id());
            snap.elapsed = current.elapsed();
            snap.normalized_time = current.normalized_time();
            snap.phase = current.phase().map(|p| p.index);
        }
        snap
    }
}

fn evaluate(instance: &StateInstance, ctx: &ParamContext) -> Option<LaneSignal> {
    let state = instance.state();
    let def = state.definition();
    if !all_hold(&def.keep_conditions, ctx) {
        return Some(LaneSignal::KeepFailed);
    }
    if any_holds(&def.exit_conditions, ctx) {
        return Some(LaneSignal::ExitRequested);
    }
    for t in state.transitions() {
        if t.exit_time.is_some_and(|gate| instance.normalized_time() < gate) {
            continue;
        }
        if all_hold(&t.conditions, ctx) {
            return Some(LaneSignal::TransitionRequested {
                target: t.target,
                force: t.force,
            });
        }
    }
    if instance.is_finished() {
        return Some(LaneSignal::Completed);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CrossFadeSpec, StateComponent, StateDefinition, StateGraph, StateGraphSpec, TransitionSpec};
    use vizij_blend::NoClips;
    use vizij_params::{Compare, Condition};

    fn build(states: Vec<StateDefinition>) -> StateGraph {
        StateGraph::build(&StateGraphSpec { states }).0
    }

    fn fading(id: u32, name: &str, duration: f32) -> StateDefinition {
        StateDefinition::new(id, name).component(StateComponent::Transition(CrossFadeSpec {
            duration,
            curve: Some(Curve::linear()),
            mode: Default::default(),
        }))
    }

    #[test]
    fn priority_gate_is_strict() {
        let g = build(vec![
            StateDefinition::new(1, "A").priority(50),
            StateDefinition::new(2, "B").priority(50),
            StateDefinition::new(3, "C").priority(51),
        ]);
        let mut lane = Pipeline::new(Lane::Main);
        let mut ctx = ParamContext::new();
        let mut events = Vec::new();
        assert!(lane.can_enter_state(g.get(StateId(1)).unwrap()));
        lane.enter_state(g.get(StateId(1)).unwrap().clone(), &mut ctx, &NoClips, 0.0, &mut events);
        assert!(!lane.can_enter_state(g.get(StateId(2)).unwrap()));
        assert!(lane.can_enter_state(g.get(StateId(3)).unwrap()));
    }

    #[test]
    fn cross_fade_hands_over_and_exits_outgoing() {
        let g = build(vec![StateDefinition::new(1, "A"), fading(2, "B", 0.5)]);
        let mut lane = Pipeline::new(Lane::Main);
        let mut ctx = ParamContext::new();
        let mut events = Vec::new();
        lane.enter_state(g.get(StateId(1)).unwrap().clone(), &mut ctx, &NoClips, 0.0, &mut events);
        let displaced = lane.enter_state(g.get(StateId(2)).unwrap().clone(), &mut ctx, &NoClips, 0.0, &mut events);
        assert_eq!(displaced, Some(StateId(1)));
        assert!(events.is_empty());
        assert!(lane.is_transitioning());

        lane.update(&mut ctx, 0.25, &mut events);
        let (out_w, cur_w) = lane.cross_fade_weights();
        assert!((out_w - 0.5).abs() < 1e-4);
        assert!((cur_w - 0.5).abs() < 1e-4);

        let report = lane.update(&mut ctx, 0.25, &mut events);
        assert_eq!(report.faded_out, Some(StateId(1)));
        assert_eq!(lane.cross_fade_weights(), (0.0, 1.0));
        assert_eq!(
            events,
            vec![StateEvent::Exited {
                state: StateId(1),
                lane: Lane::Main
            }]
        );
    }

    #[test]
    fn hard_cut_exits_immediately() {
        let g = build(vec![StateDefinition::new(1, "A"), StateDefinition::new(2, "B")]);
        let mut lane = Pipeline::new(Lane::Basic);
        let mut ctx = ParamContext::new();
        let mut events = Vec::new();
        lane.enter_state(g.get(StateId(1)).unwrap().clone(), &mut ctx, &NoClips, 0.0, &mut events);
        lane.enter_state(g.get(StateId(2)).unwrap().clone(), &mut ctx, &NoClips, 0.0, &mut events);
        assert!(!lane.is_transitioning());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn signals_follow_keep_exit_transition_order() {
        let mut a = StateDefinition::new(1, "A").duration(1.0).transition(TransitionSpec {
            target: StateId(2).into(),
            conditions: vec![],
            exit_time: Some(0.5),
            force: false,
        });
        a.keep_conditions.push(Condition::bool("alive", true));
        a.exit_conditions.push(Condition::float("hp", Compare::LessOrEqual, 0.0));
        let g = build(vec![a, StateDefinition::new(2, "B")]);

        let mut lane = Pipeline::new(Lane::Main);
        let mut ctx = ParamContext::new();
        ctx.set_bool("alive", true);
        ctx.set_float("hp", 10.0);
        let mut events = Vec::new();
        lane.enter_state(g.get(StateId(1)).unwrap().clone(), &mut ctx, &NoClips, 0.0, &mut events);

        assert_eq!(lane.update(&mut ctx, 0.1, &mut events).signal, None);
        assert_eq!(
            lane.update(&mut ctx, 0.4, &mut events).signal,
            Some(LaneSignal::TransitionRequested {
                target: StateId(2),
                force: false
            })
        );
        ctx.set_float("hp", 0.0);
        assert_eq!(lane.update(&mut ctx, 0.0, &mut events).signal, Some(LaneSignal::ExitRequested));
        ctx.set_bool("alive", false);
        assert_eq!(lane.update(&mut ctx, 0.0, &mut events).signal, Some(LaneSignal::KeepFailed));
    }

    #[test]
    fn finite_state_completes() {
        let g = build(vec![StateDefinition::new(1, "Hit").duration(0.2)]);
        let mut lane = Pipeline::new(Lane::Main);
        lane.set_fallback(Some(StateId(1)));
        let mut ctx = ParamContext::new();
        let mut events = Vec::new();
        assert!(lane.update(&mut ctx, 0.1, &mut events).needs_fallback);
        lane.enter_state(g.get(StateId(1)).unwrap().clone(), &mut ctx, &NoClips, 0.0, &mut events);
        assert_eq!(lane.update(&mut ctx, 0.1, &mut events).signal, None);
        assert_eq!(lane.update(&mut ctx, 0.1, &mut events).signal, Some(LaneSignal::Completed));
        assert_eq!(lane.exit_current_state(&mut ctx, &mut events), Some(StateId(1)));
        assert!(lane.is_empty());
    }
}
