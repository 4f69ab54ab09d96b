//! A running state: its clock, its blend runtime and its timed actions.

use std::sync::Arc;

use vizij_blend::{BlendRuntime, ClipTable, PhaseStatus, SourceRef};
use vizij_params::ParamContext;

use crate::graph::CompiledState;
use crate::ids::{Lane, StateId};
use crate::outputs::StateEvent;

#[derive(Debug)]
pub struct StateInstance {
    state: Arc<CompiledState>,
    entered_at: f64,
    elapsed: f32,
    blend: Option<BlendRuntime>,
    next_timed: usize,
    phase: Option<PhaseStatus>,
}

impl StateInstance {
    pub fn new(state: Arc<CompiledState>, clips: &dyn ClipTable, now: f64) -> Self {
        let blend = state.blend().map(|engine| engine.init_runtime(clips));
        let phase = blend.as_ref().and_then(|rt| rt.phase());
        Self {
            state,
            entered_at: now,
            elapsed: 0.0,
            blend,
            next_timed: 0,
            phase,
        }
    }

    #[inline]
    pub fn id(&self) -> StateId {
        self.state.id()
    }

    pub fn state(&self) -> &Arc<CompiledState> {
        &self.state
    }

    pub fn entered_at(&self) -> f64 {
        self.entered_at
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// `elapsed / duration` clamped to [0, 1]; 0 for unbounded states.
    pub fn normalized_time(&self) -> f32 {
        let duration = self.state.definition().duration;
        if duration > 0.0 {
            (self.elapsed / duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Finite duration used up, or a one-shot phase sequence completed.
    pub fn is_finished(&self) -> bool {
        let duration = self.state.definition().duration;
        (duration > 0.0 && self.elapsed >= duration) || self.phase.is_some_and(|p| p.completed)
    }

    pub fn blend_runtime(&self) -> Option<&BlendRuntime> {
        self.blend.as_ref()
    }

    pub fn weights(&self) -> &[f32] {
        self.blend.as_ref().map_or(&[][..], |rt| rt.weights())
    }

    pub fn current_source(&self) -> Option<&SourceRef> {
        let engine = self.state.blend()?;
        engine.current_source(self.blend.as_ref()?)
    }

    pub fn phase(&self) -> Option<PhaseStatus> {
        self.phase
    }

    pub fn phase_name(&self) -> Option<&str> {
        let index = self.phase?.index;
        self.state.blend()?.phase_name(index)
    }

    /// Nominal length: the definition's duration when finite, otherwise
    /// whatever the blend engine reports.
    pub fn standard_duration(&self) -> f32 {
        let duration = self.state.definition().duration;
        if duration > 0.0 {
            return duration;
        }
        match (self.state.blend(), &self.blend) {
            (Some(engine), Some(rt)) => engine.standard_duration(rt),
            _ => 0.0,
        }
    }

    pub fn override_source(&mut self, index: usize, source: SourceRef, clips: &dyn ClipTable) -> bool {
        match (self.state.blend(), &mut self.blend) {
            (Some(engine), Some(rt)) => engine.override_source(rt, index, source, clips),
            _ => false,
        }
    }

    pub fn force_phase(&mut self, name: &str) -> bool {
        match (self.state.blend(), &mut self.blend) {
            (Some(engine), Some(rt)) => {
                let switched = engine.force_phase(rt, name);
                self.phase = rt.phase();
                switched
            }
            _ => false,
        }
    }

    pub(crate) fn enter(&mut self, ctx: &mut ParamContext) {
        for action in self.state.on_enter() {
            action.apply(ctx);
        }
    }

    pub(crate) fn exit(&mut self, ctx: &mut ParamContext) {
        for action in self.state.on_exit() {
            action.apply(ctx);
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut ParamContext, dt: f32, lane: Lane, events: &mut Vec<StateEvent>) {
        self.elapsed += dt.max(0.0);

        let timed = self.state.timed();
        while let Some(entry) = timed.get(self.next_timed) {
            if entry.time > self.elapsed {
                break;
            }
            entry.action.apply(ctx);
            self.next_timed += 1;
        }

        let (Some(engine), Some(rt)) = (self.state.blend(), self.blend.as_mut()) else {
            return;
        };
        engine.update_weights(rt, ctx, dt);
        let state = self.state.id();
        for trigger in engine.fired_triggers(rt) {
            ctx.set_trigger(trigger);
            events.push(StateEvent::WeightEvent {
                state,
                lane,
                trigger: trigger.to_string(),
            });
        }
        self.phase = rt.phase();
        if let Some(status) = self.phase.filter(|p| p.changed) {
            events.push(StateEvent::PhaseChanged {
                state,
                lane,
                phase: status.index,
                name: engine.phase_name(status.index).map(str::to_string),
            });
        }
    }
}
