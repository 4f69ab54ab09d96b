//! Phase-sequential engines: a fixed four-phase sequence
//! (pre, main, wait, released) and an open-ended N-phase sequence.
//!
//! Each phase is either a leaf (a primary source, optionally cross-blended
//! with a secondary one by a context parameter) or a nested engine. Phases
//! advance by the first matching rule, checked in this order:
//!
//! 1. the sequence already completed: stay;
//! 2. the extra condition, once `min_duration` has elapsed;
//! 3. `max_duration` reached (when > 0);
//! 4. `auto_advance`, once `min_duration` has elapsed;
//! 5. stay while `min_duration` has not elapsed;
//! 6. the phase's non-looping source reached its end (`advance_on_end`);
//! 7. the generic condition.
//!
//! Switching phases cross-fades linearly over `transition_duration`. The
//! final phase of a one-shot sequence completes the sequence when its
//! maximum duration elapses or its animation ends.

use serde::{Deserialize, Serialize};
use vizij_params::{Condition, ParamContext, ParamKey};

use crate::engine::{BlendEngine, BlendSpec};
use crate::error::BlendConfigError;
use crate::runtime::{BlendRuntime, PhaseStatus};
use crate::smoothing::smooth_damp;
use crate::source::{ClipTable, SourceRef};

const END_EPSILON: f32 = 1e-4;

fn default_transition_duration() -> f32 {
    0.1
}

fn default_blend_smooth_time() -> f32 {
    0.05
}

/// Where a phase goes when a rule fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTarget {
    #[default]
    Next,
    Pre,
    Main,
    Wait,
    Released,
    Index(usize),
    /// Complete the sequence without switching.
    Terminate,
}

impl PhaseTarget {
    fn explicit_index(self) -> Option<usize> {
        match self {
            PhaseTarget::Pre => Some(0),
            PhaseTarget::Main => Some(1),
            PhaseTarget::Wait => Some(2),
            PhaseTarget::Released => Some(3),
            PhaseTarget::Index(i) => Some(i),
            PhaseTarget::Next | PhaseTarget::Terminate => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Once,
    Loop,
    PingPong,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary: Option<SourceRef>,
    #[serde(default)]
    pub secondary: Option<SourceRef>,
    /// 0 = all primary, 1 = all secondary.
    #[serde(default)]
    pub blend_parameter: Option<ParamKey>,
    /// Takes precedence over `primary`/`secondary`.
    #[serde(default)]
    pub nested: Option<Box<BlendSpec>>,
    #[serde(default)]
    pub min_duration: f32,
    /// `None` uses the sequence default; `<= 0` means no limit.
    #[serde(default)]
    pub max_duration: Option<f32>,
    #[serde(default)]
    pub auto_advance: bool,
    #[serde(default)]
    pub advance_on_end: Option<bool>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub target: PhaseTarget,
    #[serde(default)]
    pub extra_condition: Option<Condition>,
    #[serde(default)]
    pub extra_target: Option<PhaseTarget>,
}

/// Wind-up, action, hold and recovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phase4Spec {
    pub pre: PhaseSpec,
    pub main: PhaseSpec,
    pub wait: PhaseSpec,
    pub released: PhaseSpec,
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f32,
    #[serde(default = "default_blend_smooth_time")]
    pub blend_smooth_time: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceSpec {
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f32,
    #[serde(default = "default_blend_smooth_time")]
    pub blend_smooth_time: f32,
}

#[derive(Debug)]
enum PhaseContent {
    Leaf {
        secondary: bool,
        blend: Option<ParamKey>,
    },
    Nested(BlendEngine),
}

#[derive(Debug)]
struct CompiledPhase {
    name: String,
    content: PhaseContent,
    /// First flattened slot owned by this phase.
    offset: usize,
    len: usize,
    min_duration: f32,
    max_duration: f32,
    auto_advance: bool,
    advance_on_end: bool,
    condition: Option<Condition>,
    target: PhaseTarget,
    extra_condition: Option<Condition>,
    extra_target: PhaseTarget,
}

#[derive(Debug)]
pub struct PhaseSequence {
    phases: Vec<CompiledPhase>,
    sources: Vec<SourceRef>,
    loop_mode: LoopMode,
    transition_duration: f32,
    blend_smooth_time: f32,
}

/// Phase-specific defaults applied where a four-phase spec leaves them open.
struct PhaseDefaults {
    name: &'static str,
    max_duration: f32,
    advance_on_end: bool,
    extra_target: PhaseTarget,
}

const PHASE4_DEFAULTS: [PhaseDefaults; 4] = [
    PhaseDefaults {
        name: "pre",
        max_duration: 0.1,
        advance_on_end: false,
        extra_target: PhaseTarget::Next,
    },
    PhaseDefaults {
        name: "main",
        max_duration: 0.0,
        advance_on_end: false,
        extra_target: PhaseTarget::Next,
    },
    PhaseDefaults {
        name: "wait",
        max_duration: 0.0,
        advance_on_end: false,
        extra_target: PhaseTarget::Main,
    },
    PhaseDefaults {
        name: "released",
        max_duration: 0.2,
        advance_on_end: true,
        extra_target: PhaseTarget::Next,
    },
];

const SEQUENCE_DEFAULTS: PhaseDefaults = PhaseDefaults {
    name: "",
    max_duration: 0.0,
    advance_on_end: false,
    extra_target: PhaseTarget::Next,
};

impl PhaseSequence {
    pub(crate) fn compile_phase4(spec: &Phase4Spec) -> Result<Self, BlendConfigError> {
        let phases = [&spec.pre, &spec.main, &spec.wait, &spec.released];
        Self::compile_phases(
            phases.into_iter().zip(PHASE4_DEFAULTS.iter()),
            LoopMode::Once,
            spec.transition_duration,
            spec.blend_smooth_time,
        )
    }

    pub(crate) fn compile_sequence(spec: &SequenceSpec) -> Result<Self, BlendConfigError> {
        Self::compile_phases(
            spec.phases.iter().zip(std::iter::repeat(&SEQUENCE_DEFAULTS)),
            spec.loop_mode,
            spec.transition_duration,
            spec.blend_smooth_time,
        )
    }

    fn compile_phases<'a>(
        phases: impl Iterator<Item = (&'a PhaseSpec, &'a PhaseDefaults)>,
        loop_mode: LoopMode,
        transition_duration: f32,
        blend_smooth_time: f32,
    ) -> Result<Self, BlendConfigError> {
        let mut compiled = Vec::new();
        let mut sources = Vec::new();
        for (index, (spec, defaults)) in phases.enumerate() {
            let name = if spec.name.is_empty() {
                if defaults.name.is_empty() {
                    format!("phase{index}")
                } else {
                    defaults.name.to_string()
                }
            } else {
                spec.name.clone()
            };
            let offset = sources.len();
            let content = match (&spec.nested, &spec.primary) {
                (Some(nested), _) => {
                    let engine = BlendEngine::compile(nested).map_err(|inner| BlendConfigError::Nested {
                        phase: name.clone(),
                        inner: Box::new(inner),
                    })?;
                    sources.extend(engine.sources().iter().cloned());
                    PhaseContent::Nested(engine)
                }
                (None, Some(primary)) => {
                    sources.push(primary.clone());
                    if let Some(secondary) = &spec.secondary {
                        sources.push(secondary.clone());
                    }
                    PhaseContent::Leaf {
                        secondary: spec.secondary.is_some(),
                        blend: spec.blend_parameter.clone(),
                    }
                }
                (None, None) => return Err(BlendConfigError::EmptyPhase { phase: name }),
            };
            compiled.push(CompiledPhase {
                name,
                content,
                offset,
                len: sources.len() - offset,
                min_duration: spec.min_duration.max(0.0),
                max_duration: spec.max_duration.unwrap_or(defaults.max_duration),
                auto_advance: spec.auto_advance,
                advance_on_end: spec.advance_on_end.unwrap_or(defaults.advance_on_end),
                condition: spec.condition.clone(),
                target: spec.target,
                extra_condition: spec.extra_condition.clone(),
                extra_target: spec.extra_target.unwrap_or(defaults.extra_target),
            });
        }
        if compiled.is_empty() {
            return Err(BlendConfigError::NoPhases);
        }
        let count = compiled.len();
        for phase in &compiled {
            for target in [phase.target, phase.extra_target] {
                if let Some(i) = target.explicit_index() {
                    if i >= count {
                        return Err(BlendConfigError::PhaseTargetOutOfRange {
                            phase: phase.name.clone(),
                            target: i,
                            count,
                        });
                    }
                }
            }
        }
        Ok(Self {
            phases: compiled,
            sources,
            loop_mode,
            transition_duration: transition_duration.max(0.0),
            blend_smooth_time: blend_smooth_time.max(0.0),
        })
    }

    pub(crate) fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn phase_name(&self, index: usize) -> Option<&str> {
        self.phases.get(index).map(|p| p.name.as_str())
    }

    pub fn phase_index(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name == name)
    }

    /// Sum of every phase's maximum duration, or 0 when any phase is open-ended.
    pub fn standard_duration(&self) -> f32 {
        if self.phases.iter().any(|p| p.max_duration <= 0.0) {
            return 0.0;
        }
        self.phases.iter().map(|p| p.max_duration).sum()
    }

    pub(crate) fn init_runtime(&self, rt: &mut BlendRuntime, clips: &dyn ClipTable) {
        let nested = self
            .phases
            .iter()
            .map(|p| match &p.content {
                PhaseContent::Nested(engine) => Some(engine.init_runtime(clips)),
                PhaseContent::Leaf { .. } => None,
            })
            .collect();
        let n = self.phases.len();
        rt.phases = Some(Box::new(PhaseRuntime {
            current: 0,
            previous: None,
            fade: 1.0,
            elapsed: 0.0,
            completed: false,
            changed: false,
            forward: true,
            blend: vec![0.0; n],
            blend_velocity: vec![0.0; n],
            blend_primed: vec![false; n],
            nested,
        }));
        // Before the first update the first phase's primary source is on.
        if let Some(first) = self.phases.first() {
            rt.targets[first.offset] = 1.0;
            rt.set_weights_from_targets();
        }
    }

    /// Map a flattened slot to `(phase, local index)`.
    pub(crate) fn locate(&self, slot: usize) -> Option<(usize, usize)> {
        self.phases
            .iter()
            .position(|p| slot >= p.offset && slot < p.offset + p.len)
            .map(|i| (i, slot - self.phases[i].offset))
    }

    pub(crate) fn override_nested(
        &self,
        rt: &mut BlendRuntime,
        slot: usize,
        source: &SourceRef,
        clips: &dyn ClipTable,
    ) {
        let Some((phase, local)) = self.locate(slot) else {
            return;
        };
        let PhaseContent::Nested(engine) = &self.phases[phase].content else {
            return;
        };
        if let Some(Some(nested)) = rt.phases.as_mut().map(|p| &mut p.nested[phase]) {
            engine.override_source(nested, local, source.clone(), clips);
        }
    }

    fn resolve(&self, pr: &mut PhaseRuntime, target: PhaseTarget) -> Resolved {
        if let Some(i) = target.explicit_index() {
            return Resolved::Go(i);
        }
        if target == PhaseTarget::Terminate {
            return Resolved::Complete;
        }
        let last = self.phases.len() - 1;
        let cur = pr.current;
        match self.loop_mode {
            LoopMode::Once => Resolved::Go((cur + 1).min(last)),
            LoopMode::Loop => Resolved::Go(if cur >= last { 0 } else { cur + 1 }),
            LoopMode::PingPong => {
                if last == 0 {
                    return Resolved::Go(0);
                }
                if pr.forward && cur >= last {
                    pr.forward = false;
                } else if !pr.forward && cur == 0 {
                    pr.forward = true;
                }
                Resolved::Go(if pr.forward { cur + 1 } else { cur - 1 })
            }
        }
    }

    fn animation_ended(&self, rt: &BlendRuntime, pr: &PhaseRuntime, index: usize) -> bool {
        let phase = &self.phases[index];
        let slot = match (&phase.content, pr.nested[index].as_ref()) {
            (PhaseContent::Nested(_), Some(nested)) => match nested.dominant_index() {
                Some(local) => phase.offset + local,
                None => return false,
            },
            (PhaseContent::Leaf { secondary, .. }, _) => {
                if *secondary && pr.blend[index] > 0.5 {
                    phase.offset + 1
                } else {
                    phase.offset
                }
            }
            _ => return false,
        };
        match rt.clip_info(slot) {
            Some(info) if !info.looping && info.length > 0.0 => pr.elapsed >= info.length - END_EPSILON,
            _ => false,
        }
    }

    fn decide(&self, rt: &BlendRuntime, pr: &mut PhaseRuntime, ctx: &ParamContext) -> Resolved {
        if pr.completed {
            return Resolved::Stay;
        }
        let cur = pr.current;
        let phase = &self.phases[cur];
        let t = pr.elapsed;

        if t >= phase.min_duration {
            if let Some(cond) = &phase.extra_condition {
                if cond.evaluate(ctx) {
                    match self.resolve(pr, phase.extra_target) {
                        Resolved::Go(i) if i == cur => {}
                        other => return other,
                    }
                }
            }
        }
        if phase.max_duration > 0.0 && t >= phase.max_duration {
            return self.resolve(pr, phase.target);
        }
        if phase.auto_advance && t >= phase.min_duration {
            return self.resolve(pr, phase.target);
        }
        if t < phase.min_duration {
            return Resolved::Stay;
        }
        if phase.advance_on_end && self.animation_ended(rt, pr, cur) {
            return self.resolve(pr, phase.target);
        }
        if let Some(cond) = &phase.condition {
            if cond.evaluate(ctx) {
                return self.resolve(pr, phase.target);
            }
        }
        Resolved::Stay
    }

    fn switch_to(&self, pr: &mut PhaseRuntime, target: usize, immediate: bool) {
        if target == pr.current || target >= self.phases.len() {
            return;
        }
        if self.transition_duration > 0.001 && !immediate {
            pr.previous = Some(pr.current);
            pr.fade = 0.0;
        } else {
            pr.previous = None;
            pr.fade = 1.0;
        }
        pr.current = target;
        pr.elapsed = 0.0;
        pr.changed = true;
        pr.blend_primed[target] = false;
        if let Some(nested) = pr.nested[target].as_mut() {
            nested.primed = false;
        }
    }

    /// Jump straight to `index`, cross-fading as a normal switch would.
    pub(crate) fn force_phase(&self, rt: &mut BlendRuntime, index: usize) -> bool {
        let Some(pr) = rt.phases.as_mut() else {
            return false;
        };
        if index >= self.phases.len() {
            return false;
        }
        self.switch_to(pr, index, false);
        true
    }

    fn update_phase_output(&self, pr: &mut PhaseRuntime, index: usize, ctx: &ParamContext, dt: f32, immediate: bool) {
        match &self.phases[index].content {
            PhaseContent::Leaf {
                secondary: true,
                blend: Some(key),
            } => {
                let raw = ctx.get_float(key).clamp(0.0, 1.0);
                if immediate || !pr.blend_primed[index] || self.blend_smooth_time <= 0.001 {
                    pr.blend[index] = raw;
                    pr.blend_velocity[index] = 0.0;
                } else {
                    pr.blend[index] = smooth_damp(
                        pr.blend[index],
                        raw,
                        &mut pr.blend_velocity[index],
                        self.blend_smooth_time,
                        dt,
                    );
                }
                pr.blend_primed[index] = true;
            }
            PhaseContent::Leaf { .. } => {
                pr.blend[index] = 0.0;
                pr.blend_primed[index] = true;
            }
            PhaseContent::Nested(engine) => {
                if let Some(nested) = pr.nested[index].as_mut() {
                    if immediate {
                        engine.immediate_update(nested, ctx);
                    } else {
                        engine.update_weights(nested, ctx, dt);
                    }
                }
            }
        }
    }

    fn write_phase(&self, rt: &mut BlendRuntime, pr: &PhaseRuntime, index: usize, scale: f32) {
        let phase = &self.phases[index];
        match &phase.content {
            PhaseContent::Leaf { secondary, .. } => {
                let b = if *secondary { pr.blend[index] } else { 0.0 };
                rt.targets[phase.offset] += (1.0 - b) * scale;
                if *secondary {
                    rt.targets[phase.offset + 1] += b * scale;
                }
            }
            PhaseContent::Nested(_) => {
                if let Some(nested) = pr.nested[index].as_ref() {
                    for (k, w) in nested.weights().iter().enumerate() {
                        rt.targets[phase.offset + k] += w * scale;
                    }
                }
            }
        }
    }

    pub(crate) fn update(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32, immediate: bool) {
        let Some(mut pr) = rt.phases.take() else {
            return;
        };
        pr.changed = false;

        if !pr.completed {
            pr.elapsed += dt;
            match self.decide(rt, &mut pr, ctx) {
                Resolved::Stay => {}
                Resolved::Complete => pr.completed = true,
                Resolved::Go(target) => self.switch_to(&mut pr, target, immediate),
            }
        }

        if pr.previous.is_some() {
            if immediate || self.transition_duration <= 0.001 {
                pr.previous = None;
                pr.fade = 1.0;
            } else {
                pr.fade = (pr.fade + dt / self.transition_duration).min(1.0);
            }
        }

        let cur = pr.current;
        self.update_phase_output(&mut pr, cur, ctx, dt, immediate);
        if let Some(prev) = pr.previous {
            self.update_phase_output(&mut pr, prev, ctx, dt, immediate);
        }

        rt.clear_targets();
        match pr.previous {
            Some(prev) if pr.fade < 1.0 => {
                self.write_phase(rt, &pr, cur, pr.fade);
                self.write_phase(rt, &pr, prev, 1.0 - pr.fade);
            }
            _ => {
                pr.previous = None;
                self.write_phase(rt, &pr, cur, 1.0);
            }
        }
        rt.set_weights_from_targets();
        rt.primed = true;

        // The last phase of a one-shot sequence ends the sequence.
        let last = self.phases.len() - 1;
        if !pr.completed && self.loop_mode == LoopMode::Once && cur == last {
            let phase = &self.phases[cur];
            let timed_out = phase.max_duration > 0.0 && pr.elapsed >= phase.max_duration;
            if timed_out || (phase.advance_on_end && self.animation_ended(rt, &pr, cur)) {
                pr.completed = true;
            }
        }

        rt.phases = Some(pr);
    }
}

enum Resolved {
    Stay,
    Go(usize),
    Complete,
}

#[derive(Clone, Debug)]
pub struct PhaseRuntime {
    current: usize,
    previous: Option<usize>,
    /// Cross-fade progress toward `current`, 1 when settled.
    fade: f32,
    elapsed: f32,
    completed: bool,
    changed: bool,
    forward: bool,
    blend: Vec<f32>,
    blend_velocity: Vec<f32>,
    blend_primed: Vec<bool>,
    nested: Vec<Option<BlendRuntime>>,
}

impl PhaseRuntime {
    pub(crate) fn status(&self) -> PhaseStatus {
        PhaseStatus {
            index: self.current,
            elapsed: self.elapsed,
            completed: self.completed,
            changed: self.changed,
        }
    }
}
