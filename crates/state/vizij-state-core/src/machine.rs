//! The state machine controller: admission, preemption, degrade and the
//! per-frame tick across all lanes.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use hashbrown::HashSet;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use vizij_blend::{ClipTable, NoClips, PhaseStatus, SourceRef};
use vizij_params::{all_hold, ParamContext};

use crate::config::MachineConfig;
use crate::denial::{DenialCache, DenialReason};
use crate::error::ValidationReport;
use crate::graph::{CompiledState, StateGraph, StateGraphSpec};
use crate::ids::{Lane, StateId, StateRef};
use crate::instance::StateInstance;
use crate::ledger::CostLedger;
use crate::outputs::{Outputs, StateEvent};
use crate::pipeline::{LaneSignal, Pipeline};

/// A graph plus the configuration to run it, as loaded from JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    #[serde(default)]
    pub config: MachineConfig,
    #[serde(flatten)]
    pub graph: StateGraphSpec,
}

pub struct StateMachine {
    graph: Arc<StateGraph>,
    config: MachineConfig,
    ctx: ParamContext,
    ledger: CostLedger,
    denials: DenialCache,
    lanes: [Pipeline; Lane::COUNT],
    clips: Arc<dyn ClipTable>,
    blocked: HashSet<StateId>,
    now: f64,
    pending: Vec<StateEvent>,
    outputs: Outputs,
    report: ValidationReport,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("states", &self.graph.len())
            .field("now", &self.now)
            .field("lanes", &self.lanes)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl StateMachine {
    pub fn new(graph: StateGraph, config: MachineConfig) -> Self {
        Self::with_clips(graph, config, Arc::new(NoClips))
    }

    /// Build a machine whose blend engines resolve clip lengths through `clips`.
    /// Configured parameter defaults are written, lane fallbacks resolved and
    /// initial states entered (forced) before this returns.
    pub fn with_clips(graph: StateGraph, config: MachineConfig, clips: Arc<dyn ClipTable>) -> Self {
        let mut ctx = ParamContext::new();
        for (key, value) in &config.params.floats {
            ctx.set_float(key.as_str(), *value);
        }
        for (key, value) in &config.params.ints {
            ctx.set_int(key, *value);
        }
        for (key, value) in &config.params.bools {
            ctx.set_bool(key.as_str(), *value);
        }

        let mut lanes = Lane::ALL.map(Pipeline::new);
        for lane in &mut lanes {
            let lane_config = config.lanes.get(lane.lane());
            lane.set_weight(lane_config.weight);
            if let Some(fallback) = &lane_config.fallback {
                match graph.resolve(fallback) {
                    Some(id) => lane.set_fallback(Some(id)),
                    None => warn!("lane {}: fallback state {fallback} not found", lane.lane()),
                }
            }
        }

        let mut machine = Self {
            graph: Arc::new(graph),
            ledger: CostLedger::with_release_threshold(config.release_threshold),
            denials: DenialCache::new(config.denial_timeout),
            config,
            ctx,
            lanes,
            clips,
            blocked: HashSet::new(),
            now: 0.0,
            pending: Vec::new(),
            outputs: Outputs::default(),
            report: ValidationReport::default(),
        };
        let initial = machine.config.initial_states.clone();
        for state in &initial {
            if let Err(reason) = machine.try_enter_state_detailed(state.clone(), None, true) {
                warn!("initial state {state} not entered: {reason:?}");
            }
        }
        machine
    }

    /// Validate and compile `spec`; graph problems are logged and kept in
    /// [`validation`](Self::validation).
    pub fn from_spec(spec: &MachineSpec) -> Self {
        let (graph, report) = StateGraph::build(&spec.graph);
        let mut machine = Self::new(graph, spec.config.clone());
        machine.report = report;
        machine
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let spec: MachineSpec = serde_json::from_str(json).context("state machine json parse error")?;
        Ok(Self::from_spec(&spec))
    }

    pub fn set_clip_table(&mut self, clips: Arc<dyn ClipTable>) {
        self.clips = clips;
    }

    /// Advance by `dt` seconds. Order: cost returns, then each lane (update,
    /// act on its signal, fallback), then denial memo refresh; triggers are
    /// cleared last so host triggers set before the tick were visible to it.
    pub fn tick(&mut self, dt: f32) -> &Outputs {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.outputs.clear();
        let mut events = std::mem::take(&mut self.pending);
        self.now += f64::from(dt);

        if self.config.derive_locomotion {
            self.ctx.derive_locomotion();
        }
        if self.ledger.tick(self.now) > 0 {
            self.denials.mark_dirty();
        }

        for lane in Lane::ALL {
            let i = lane.index();
            let report = self.lanes[i].update(&mut self.ctx, dt, &mut events);
            if report.faded_out.is_some() {
                self.denials.mark_dirty();
            }
            match report.signal {
                Some(LaneSignal::TransitionRequested { target, force }) => {
                    let from = self.lanes[i].current_id();
                    if let Err(reason) = self.admit(target, Some(lane), force, from, &mut events) {
                        debug!("lane {lane}: transition to {target} refused: {reason:?}");
                    }
                }
                Some(signal @ (LaneSignal::KeepFailed | LaneSignal::ExitRequested | LaneSignal::Completed)) => {
                    debug!("lane {lane}: leaving current state ({signal:?})");
                    self.exit_lane_with(lane, &mut events);
                }
                None => {}
            }
            if report.needs_fallback || self.lanes[i].is_empty() {
                if let Some(fallback) = self.lanes[i].fallback() {
                    if let Err(reason) = self.admit(fallback, Some(lane), false, None, &mut events) {
                        debug!("lane {lane}: fallback {fallback} refused: {reason:?}");
                    }
                }
            }
        }

        self.denials.refresh();
        self.ctx.begin_tick();

        self.outputs.events = events;
        self.outputs.lanes.extend(self.lanes.iter().map(Pipeline::snapshot));
        &self.outputs
    }

    /// Request entry; true when the state was entered.
    pub fn try_enter_state(&mut self, state: impl Into<StateRef>, lane: Option<Lane>, force: bool) -> bool {
        self.try_enter_state_detailed(state, lane, force).is_ok()
    }

    /// Request entry. `lane` overrides the state's own lane; `force` skips
    /// everything but a manual block.
    pub fn try_enter_state_detailed(
        &mut self,
        state: impl Into<StateRef>,
        lane: Option<Lane>,
        force: bool,
    ) -> Result<(), DenialReason> {
        let state = state.into();
        let Some(id) = self.graph.resolve(&state) else {
            warn!("try_enter_state: unknown state {state}");
            return Err(DenialReason::UnknownState);
        };
        let mut events = std::mem::take(&mut self.pending);
        let result = self.admit(id, lane, force, None, &mut events);
        self.pending = events;
        result
    }

    fn admit(
        &mut self,
        id: StateId,
        lane: Option<Lane>,
        force: bool,
        replacing: Option<StateId>,
        events: &mut Vec<StateEvent>,
    ) -> Result<(), DenialReason> {
        let Some(state) = self.graph.get(id).cloned() else {
            warn!("unknown state {id}");
            return Err(DenialReason::UnknownState);
        };
        let lane = lane.unwrap_or(state.lane());
        let now = self.now;

        if !force && self.denials.is_denied(id, now) {
            return Err(self.denials.reason(id));
        }
        if self.blocked.contains(&id) {
            return self.deny(id, DenialReason::ManualBlock, events);
        }
        if force {
            self.enter(state, lane, replacing, events);
            return Ok(());
        }
        if !all_hold(&state.definition().enter_conditions, &self.ctx) {
            return self.deny(id, DenialReason::ConditionNotMet, events);
        }

        let pipeline = &self.lanes[lane.index()];
        if self.config.lock_during_transition && pipeline.is_transitioning() {
            return self.deny(id, DenialReason::InTransition, events);
        }
        // A transition leaves its source state, so the source's priority
        // and holdings do not stand in the way. Re-requesting the running
        // state fails on priority.
        let leaving = replacing.filter(|r| Some(*r) == pipeline.current_id());
        let priority_ok = leaving.is_some() || pipeline.can_enter_state(&state);
        let cost_ok = self
            .ledger
            .can_afford_replacing(state.ledger_cost(), id, leaving);
        if !cost_ok {
            if let Some(target) = self.degrade_target(&state, lane) {
                self.degrade(id, target, lane, events);
                return Err(DenialReason::SamePathDegrading);
            }
        }
        if !priority_ok {
            return self.deny(id, DenialReason::PriorityTooLow, events);
        }
        if !cost_ok {
            return self.deny(id, DenialReason::CostNotEnough, events);
        }

        self.enter(state, lane, replacing, events);
        Ok(())
    }

    fn deny(&mut self, id: StateId, reason: DenialReason, events: &mut Vec<StateEvent>) -> Result<(), DenialReason> {
        debug!("entry into {id} denied: {reason:?}");
        self.denials.record_denial(id, reason, self.now);
        events.push(StateEvent::Denied { state: id, reason });
        Err(reason)
    }

    /// The running state's step-down target when `requested` shares its
    /// locomotion family and it tolerates weak interruption.
    fn degrade_target(&self, requested: &CompiledState, lane: Lane) -> Option<Arc<CompiledState>> {
        let running = self.lanes[lane.index()].current()?.state();
        if !running.definition().weak_interrupt || !running.shares_path_with(requested) {
            return None;
        }
        let target = running.degrade_target()?;
        if target == running.id() {
            return None;
        }
        self.graph.get(target).cloned()
    }

    fn degrade(&mut self, requested: StateId, target: Arc<CompiledState>, lane: Lane, events: &mut Vec<StateEvent>) {
        let from = self.lanes[lane.index()].current_id();
        let to = target.id();
        info!("lane {lane}: degrading to '{}' instead of entering {requested}", target.name());
        self.enter(target, lane, None, events);
        if let Some(from) = from {
            events.push(StateEvent::Degraded {
                from,
                to,
                requested,
                lane,
            });
        }
        self.denials
            .record_denial(requested, DenialReason::SamePathDegrading, self.now);
    }

    fn enter(&mut self, state: Arc<CompiledState>, lane: Lane, transition_from: Option<StateId>, events: &mut Vec<StateEvent>) {
        let i = lane.index();
        let id = state.id();
        let now = self.now;

        if let Some(previous) = self.lanes[i].current_id() {
            self.ledger.release_state(previous);
        }
        self.ledger.consume(state.ledger_cost(), id);

        let displaced = self.lanes[i].enter_state(Arc::clone(&state), &mut self.ctx, &*self.clips, now, events);

        let def = state.definition();
        if def.duration > 0.0 && !def.ignore_cost {
            if let Some(cost) = state.cost() {
                let start = now + f64::from(def.duration * def.recovery_start.clamp(0.0, 1.0));
                self.ledger
                    .schedule_return(Arc::clone(cost), id, start, def.recovery_duration.max(0.0));
            }
        }

        self.denials.remove(id);
        self.denials.mark_dirty();
        debug!("lane {lane}: entered '{}'", state.name());
        events.push(StateEvent::Entered { state: id, lane });
        if let Some(from) = transition_from.filter(|f| Some(*f) == displaced) {
            events.push(StateEvent::Transitioned { from, to: id, lane });
        }
    }

    fn exit_lane_with(&mut self, lane: Lane, events: &mut Vec<StateEvent>) -> Option<StateId> {
        let id = self.lanes[lane.index()].exit_current_state(&mut self.ctx, events)?;
        self.ledger.release_state(id);
        self.denials.mark_dirty();
        Some(id)
    }

    /// Exit whatever runs in `lane`, returning its cost at once.
    pub fn exit_lane(&mut self, lane: Lane) -> Option<StateId> {
        let mut events = std::mem::take(&mut self.pending);
        let exited = self.exit_lane_with(lane, &mut events);
        self.pending = events;
        exited
    }

    /// Refuse every entry into `state` until unblocked. A running instance
    /// is left alone.
    pub fn block_state(&mut self, state: StateId) {
        self.blocked.insert(state);
    }

    pub fn unblock_state(&mut self, state: StateId) {
        if self.blocked.remove(&state) {
            self.denials.remove(state);
        }
    }

    pub fn is_blocked(&self, state: StateId) -> bool {
        self.blocked.contains(&state)
    }

    pub fn current_state(&self, lane: Lane) -> Option<StateId> {
        self.lanes[lane.index()].current_id()
    }

    pub fn current_instance(&self, lane: Lane) -> Option<&StateInstance> {
        self.lanes[lane.index()].current()
    }

    /// Lane currently running `state`, if any.
    pub fn lane_of(&self, state: StateId) -> Option<Lane> {
        Lane::ALL
            .into_iter()
            .find(|lane| self.lanes[lane.index()].current_id() == Some(state))
    }

    pub fn pipeline(&self, lane: Lane) -> &Pipeline {
        &self.lanes[lane.index()]
    }

    pub fn lane_weight(&self, lane: Lane) -> f32 {
        self.lanes[lane.index()].weight()
    }

    pub fn set_lane_weight(&mut self, lane: Lane, weight: f32) {
        self.lanes[lane.index()].set_weight(weight);
    }

    /// Phase observer output of the lane's current state.
    pub fn phase_of(&self, lane: Lane) -> Option<PhaseStatus> {
        self.lanes[lane.index()].current()?.phase()
    }

    pub fn blend_weights(&self, lane: Lane) -> &[f32] {
        self.lanes[lane.index()]
            .current()
            .map_or(&[][..], |c| c.weights())
    }

    /// Hot-swap a blend source of the lane's current state by slot index.
    pub fn override_source(&mut self, lane: Lane, index: usize, source: SourceRef) -> bool {
        let clips = Arc::clone(&self.clips);
        match self.lanes[lane.index()].current_mut() {
            Some(instance) => instance.override_source(index, source, &*clips),
            None => false,
        }
    }

    pub fn force_phase(&mut self, lane: Lane, phase: &str) -> bool {
        self.lanes[lane.index()]
            .current_mut()
            .is_some_and(|instance| instance.force_phase(phase))
    }

    pub fn denial_reason(&self, state: StateId) -> DenialReason {
        self.denials.reason(state)
    }

    pub fn context(&self) -> &ParamContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ParamContext {
        &mut self.ctx
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn denials(&self) -> &DenialCache {
        &self.denials
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.report
    }

    /// Seconds simulated so far.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Exit every lane and forget costs, memos and blocks. The clock keeps
    /// running; initial states are not re-entered.
    pub fn reset(&mut self) {
        let mut events = std::mem::take(&mut self.pending);
        for lane in Lane::ALL {
            self.lanes[lane.index()].exit_current_state(&mut self.ctx, &mut events);
        }
        self.pending = events;
        self.ledger.reset();
        self.denials.clear();
        self.blocked.clear();
    }
}
