//! State definitions and their compiled, shareable form.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use vizij_blend::{BlendEngine, BlendSpec};
use vizij_params::{Condition, Curve, ParamContext, ParamKey};

use crate::cost::CostSpec;
use crate::error::{GraphError, ValidationReport};
use crate::ids::{Lane, StateId, StateRef};

fn default_priority() -> i32 {
    50
}

fn default_duration() -> f32 {
    -1.0
}

fn default_recovery_start() -> f32 {
    0.7
}

fn default_recovery_duration() -> f32 {
    0.3
}

fn default_fade_duration() -> f32 {
    0.3
}

/// Locomotion family used for same-path degrade.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamePath {
    #[default]
    None,
    Idle,
    Walk,
    Run,
    Sprint,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub target: StateRef,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Normalized time the source state must reach first.
    #[serde(default)]
    pub exit_time: Option<f32>,
    /// Skip priority and cost checks.
    #[serde(default)]
    pub force: bool,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeMode {
    #[default]
    Blend,
    CrossFade,
    Cut,
}

/// How a state fades in over whatever the lane was running.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossFadeSpec {
    #[serde(default = "default_fade_duration")]
    pub duration: f32,
    /// Defaults to ease-in-out.
    #[serde(default)]
    pub curve: Option<Curve>,
    #[serde(default)]
    pub mode: FadeMode,
}

impl Default for CrossFadeSpec {
    fn default() -> Self {
        Self {
            duration: default_fade_duration(),
            curve: None,
            mode: FadeMode::Blend,
        }
    }
}

/// A write into the parameter context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ParamAction {
    SetFloat { key: ParamKey, value: f32 },
    SetInt { key: String, value: i32 },
    SetBool { key: ParamKey, value: bool },
    Trigger { key: String },
    ResetTrigger { key: String },
    SetFlag { name: String },
    ClearFlag { name: String },
}

impl ParamAction {
    pub fn apply(&self, ctx: &mut ParamContext) {
        match self {
            ParamAction::SetFloat { key, value } => ctx.set_float(key.clone(), *value),
            ParamAction::SetInt { key, value } => ctx.set_int(key, *value),
            ParamAction::SetBool { key, value } => ctx.set_bool(key.clone(), *value),
            ParamAction::Trigger { key } => ctx.set_trigger(key),
            ParamAction::ResetTrigger { key } => ctx.reset_trigger(key),
            ParamAction::SetFlag { name } => ctx.set_flag(name),
            ParamAction::ClearFlag { name } => ctx.clear_flag(name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedAction {
    /// Seconds since the state was entered.
    pub time: f32,
    pub action: ParamAction,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSet {
    #[serde(default)]
    pub on_enter: Vec<ParamAction>,
    #[serde(default)]
    pub on_exit: Vec<ParamAction>,
    #[serde(default)]
    pub timed: Vec<TimedAction>,
}

/// Behavior attached to a state, applied in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateComponent {
    Blend { engine: BlendSpec },
    Transition(CrossFadeSpec),
    Actions(ActionSet),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDefinition {
    pub id: StateId,
    pub name: String,
    #[serde(default)]
    pub lane: Lane,
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Seconds; negative means unbounded.
    #[serde(default = "default_duration")]
    pub duration: f32,
    #[serde(default)]
    pub cost: Option<CostSpec>,
    #[serde(default)]
    pub ignore_cost: bool,
    /// Normalized time at which the cost starts coming back.
    #[serde(default = "default_recovery_start")]
    pub recovery_start: f32,
    #[serde(default = "default_recovery_duration")]
    pub recovery_duration: f32,
    #[serde(default)]
    pub same_path: SamePath,
    #[serde(default)]
    pub degrade_target: Option<StateRef>,
    #[serde(default)]
    pub weak_interrupt: bool,
    #[serde(default)]
    pub enter_conditions: Vec<Condition>,
    #[serde(default)]
    pub keep_conditions: Vec<Condition>,
    #[serde(default)]
    pub exit_conditions: Vec<Condition>,
    #[serde(default)]
    pub components: Vec<StateComponent>,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StateDefinition {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: StateId(id),
            name: name.into(),
            lane: Lane::default(),
            priority: default_priority(),
            duration: default_duration(),
            cost: None,
            ignore_cost: false,
            recovery_start: default_recovery_start(),
            recovery_duration: default_recovery_duration(),
            same_path: SamePath::None,
            degrade_target: None,
            weak_interrupt: false,
            enter_conditions: Vec::new(),
            keep_conditions: Vec::new(),
            exit_conditions: Vec::new(),
            components: Vec::new(),
            transitions: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn lane(mut self, lane: Lane) -> Self {
        self.lane = lane;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn duration(mut self, duration: f32) -> Self {
        self.duration = duration;
        self
    }

    pub fn cost(mut self, cost: CostSpec) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn recovery(mut self, start: f32, duration: f32) -> Self {
        self.recovery_start = start;
        self.recovery_duration = duration;
        self
    }

    pub fn same_path(mut self, path: SamePath) -> Self {
        self.same_path = path;
        self
    }

    pub fn degrade_to(mut self, target: impl Into<StateRef>) -> Self {
        self.degrade_target = Some(target.into());
        self.weak_interrupt = true;
        self
    }

    pub fn component(mut self, component: StateComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn transition(mut self, transition: TransitionSpec) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateGraphSpec {
    pub states: Vec<StateDefinition>,
}

#[derive(Clone, Debug)]
pub struct CompiledTransition {
    pub target: StateId,
    pub conditions: Vec<Condition>,
    pub exit_time: Option<f32>,
    pub force: bool,
}

/// Resolved fade settings; absent means a hard cut.
#[derive(Clone, Debug)]
pub struct Fade {
    pub duration: f32,
    pub curve: Curve,
}

/// A validated state definition with its engine compiled and every
/// reference resolved. Shared read-only by every instance of the state.
#[derive(Debug)]
pub struct CompiledState {
    def: StateDefinition,
    cost: Option<Arc<CostSpec>>,
    blend: Option<BlendEngine>,
    fade: Option<Fade>,
    on_enter: Vec<ParamAction>,
    on_exit: Vec<ParamAction>,
    timed: Vec<TimedAction>,
    transitions: Vec<CompiledTransition>,
    degrade_target: Option<StateId>,
}

impl CompiledState {
    #[inline]
    pub fn id(&self) -> StateId {
        self.def.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    #[inline]
    pub fn lane(&self) -> Lane {
        self.def.lane
    }

    #[inline]
    pub fn priority(&self) -> i32 {
        self.def.priority
    }

    pub fn definition(&self) -> &StateDefinition {
        &self.def
    }

    pub fn cost(&self) -> Option<&Arc<CostSpec>> {
        self.cost.as_ref()
    }

    /// Cost the ledger should see: none when the state ignores costs.
    pub fn ledger_cost(&self) -> Option<&CostSpec> {
        if self.def.ignore_cost {
            None
        } else {
            self.cost.as_deref()
        }
    }

    pub fn blend(&self) -> Option<&BlendEngine> {
        self.blend.as_ref()
    }

    pub fn fade(&self) -> Option<&Fade> {
        self.fade.as_ref()
    }

    pub fn on_enter(&self) -> &[ParamAction] {
        &self.on_enter
    }

    pub fn on_exit(&self) -> &[ParamAction] {
        &self.on_exit
    }

    /// Timed actions sorted by time.
    pub fn timed(&self) -> &[TimedAction] {
        &self.timed
    }

    pub fn transitions(&self) -> &[CompiledTransition] {
        &self.transitions
    }

    pub fn degrade_target(&self) -> Option<StateId> {
        self.degrade_target
    }

    /// Same non-`None` locomotion family.
    pub fn shares_path_with(&self, other: &CompiledState) -> bool {
        self.def.same_path != SamePath::None && self.def.same_path == other.def.same_path
    }
}

#[derive(Debug, Default)]
pub struct StateGraph {
    states: Vec<Arc<CompiledState>>,
    by_id: HashMap<StateId, usize>,
    by_name: HashMap<String, usize>,
}

impl StateGraph {
    /// Validate and compile. Problems are logged and collected; offending
    /// parts are skipped so the rest of the graph stays usable.
    pub fn build(spec: &StateGraphSpec) -> (Self, ValidationReport) {
        let mut report = ValidationReport::default();
        let mut kept: Vec<&StateDefinition> = Vec::with_capacity(spec.states.len());
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();

        for def in &spec.states {
            if by_id.contains_key(&def.id) {
                report.push(GraphError::DuplicateId {
                    id: def.id,
                    name: def.name.clone(),
                });
                continue;
            }
            let index = kept.len();
            by_id.insert(def.id, index);
            if by_name.contains_key(&def.name) {
                report.push(GraphError::DuplicateName {
                    name: def.name.clone(),
                });
            } else {
                by_name.insert(def.name.clone(), index);
            }
            kept.push(def);
        }

        let resolve = |r: &StateRef| -> Option<StateId> {
            match r {
                StateRef::Id(id) => by_id.contains_key(&StateId(*id)).then_some(StateId(*id)),
                StateRef::Name(name) => by_name.get(name).map(|&i| kept[i].id),
            }
        };

        let states = kept
            .iter()
            .map(|def| Arc::new(compile_state(def, &resolve, &mut report)))
            .collect();

        (
            Self {
                states,
                by_id,
                by_name,
            },
            report,
        )
    }

    pub fn get(&self, id: StateId) -> Option<&Arc<CompiledState>> {
        self.by_id.get(&id).map(|&i| &self.states[i])
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<CompiledState>> {
        self.by_name.get(name).map(|&i| &self.states[i])
    }

    pub fn resolve(&self, state: &StateRef) -> Option<StateId> {
        match state {
            StateRef::Id(id) => self.get(StateId(*id)).map(|s| s.id()),
            StateRef::Name(name) => self.by_name(name).map(|s| s.id()),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompiledState>> {
        self.states.iter()
    }

    pub fn with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Arc<CompiledState>> + 'a {
        self.states.iter().filter(move |s| s.def.has_tag(tag))
    }
}

fn compile_state(
    def: &StateDefinition,
    resolve: &dyn Fn(&StateRef) -> Option<StateId>,
    report: &mut ValidationReport,
) -> CompiledState {
    if let Some(cost) = &def.cost {
        for (part, value) in cost.out_of_range() {
            report.push(GraphError::CostOutOfRange {
                state: def.name.clone(),
                part,
                value,
            });
        }
        for (channel, total) in cost.overcommitted() {
            report.push(GraphError::CostOverCapacity {
                state: def.name.clone(),
                channel,
                total,
            });
        }
    }

    let mut blend = None;
    let mut blend_seen = false;
    let mut fade = None;
    let mut on_enter = Vec::new();
    let mut on_exit = Vec::new();
    let mut timed = Vec::new();
    for component in &def.components {
        match component {
            StateComponent::Blend { engine } => {
                if blend_seen {
                    report.push(GraphError::MultipleBlends {
                        state: def.name.clone(),
                    });
                    continue;
                }
                blend_seen = true;
                match BlendEngine::compile(engine) {
                    Ok(e) => blend = Some(e),
                    Err(source) => report.push(GraphError::Blend {
                        state: def.name.clone(),
                        source,
                    }),
                }
            }
            StateComponent::Transition(spec) => {
                fade = match spec.mode {
                    FadeMode::Cut => None,
                    _ if spec.duration <= 0.0 => None,
                    _ => Some(Fade {
                        duration: spec.duration,
                        curve: spec.curve.clone().unwrap_or_else(Curve::ease_in_out),
                    }),
                };
            }
            StateComponent::Actions(set) => {
                on_enter.extend(set.on_enter.iter().cloned());
                on_exit.extend(set.on_exit.iter().cloned());
                timed.extend(set.timed.iter().cloned());
            }
        }
    }
    timed.sort_by(|a: &TimedAction, b: &TimedAction| a.time.total_cmp(&b.time));

    let mut transitions = Vec::with_capacity(def.transitions.len());
    for t in &def.transitions {
        match resolve(&t.target) {
            Some(target) => transitions.push(CompiledTransition {
                target,
                conditions: t.conditions.clone(),
                exit_time: t.exit_time,
                force: t.force,
            }),
            None => report.push(GraphError::UnknownTransitionTarget {
                state: def.name.clone(),
                target: t.target.clone(),
            }),
        }
    }

    let degrade_target = def.degrade_target.as_ref().and_then(|target| match resolve(target) {
        Some(id) if id == def.id => {
            report.push(GraphError::SelfDegrade {
                state: def.name.clone(),
            });
            None
        }
        Some(id) => Some(id),
        None => {
            report.push(GraphError::UnknownDegradeTarget {
                state: def.name.clone(),
                target: target.clone(),
            });
            None
        }
    });

    CompiledState {
        def: def.clone(),
        cost: def.cost.clone().map(Arc::new),
        blend,
        fade,
        on_enter,
        on_exit,
        timed,
        transitions,
        degrade_target,
    }
}
