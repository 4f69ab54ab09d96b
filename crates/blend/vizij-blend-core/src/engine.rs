//! Blend engine selection and dispatch.
//!
//! A [`BlendSpec`] is plain configuration. [`BlendEngine::compile`] validates
//! it once and produces an immutable, reference-counted engine that any
//! number of [`BlendRuntime`]s can share.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use vizij_params::ParamContext;

use crate::direct::{Direct, DirectSpec};
use crate::error::BlendConfigError;
use crate::grid::Grid2d;
use crate::phase::{Phase4Spec, PhaseSequence, SequenceSpec};
use crate::planar::Planar2dSpec;
use crate::runtime::BlendRuntime;
use crate::source::{ClipTable, SourceRef};
use crate::threshold::{Threshold1d, Threshold1dSpec};
use crate::triangulated::Triangulated2d;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleSpec {
    pub source: Option<SourceRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlendSpec {
    Single(SingleSpec),
    #[serde(rename = "threshold_1d")]
    Threshold1d(Threshold1dSpec),
    #[serde(rename = "triangulated_2d")]
    Triangulated2d(Planar2dSpec),
    #[serde(rename = "grid_2d")]
    Grid2d(Planar2dSpec),
    Direct(DirectSpec),
    Phase4(Phase4Spec),
    Sequence(SequenceSpec),
}

impl BlendSpec {
    pub fn single(source: impl Into<SourceRef>) -> Self {
        BlendSpec::Single(SingleSpec {
            source: Some(source.into()),
        })
    }
}

#[derive(Debug)]
enum Compiled {
    Single(SourceRef),
    Threshold1d(Threshold1d),
    Triangulated2d(Triangulated2d),
    Grid2d(Grid2d),
    Direct(Direct),
    Phases(PhaseSequence),
}

/// Shared, read-only compiled engine.
#[derive(Clone, Debug)]
pub struct BlendEngine {
    inner: Arc<Compiled>,
    sources: Arc<[SourceRef]>,
}

impl BlendEngine {
    pub fn compile(spec: &BlendSpec) -> Result<Self, BlendConfigError> {
        let inner = match spec {
            BlendSpec::Single(s) => Compiled::Single(s.source.clone().ok_or(BlendConfigError::MissingSource {
                engine: "single",
                index: 0,
            })?),
            BlendSpec::Threshold1d(s) => Compiled::Threshold1d(Threshold1d::compile(s)?),
            BlendSpec::Triangulated2d(s) => Compiled::Triangulated2d(Triangulated2d::compile(s)?),
            BlendSpec::Grid2d(s) => Compiled::Grid2d(Grid2d::compile(s)?),
            BlendSpec::Direct(s) => Compiled::Direct(Direct::compile(s)?),
            BlendSpec::Phase4(s) => Compiled::Phases(PhaseSequence::compile_phase4(s)?),
            BlendSpec::Sequence(s) => Compiled::Phases(PhaseSequence::compile_sequence(s)?),
        };
        let sources: Arc<[SourceRef]> = match &inner {
            Compiled::Single(s) => Arc::from(vec![s.clone()]),
            Compiled::Threshold1d(e) => Arc::from(e.sources()),
            Compiled::Triangulated2d(e) => Arc::from(e.sources()),
            Compiled::Grid2d(e) => Arc::from(e.sources()),
            Compiled::Direct(e) => Arc::from(e.sources()),
            Compiled::Phases(e) => Arc::from(e.sources()),
        };
        Ok(Self {
            inner: Arc::new(inner),
            sources,
        })
    }

    /// Sources as configured, in slot order.
    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    pub fn kind(&self) -> &'static str {
        match &*self.inner {
            Compiled::Single(_) => "single",
            Compiled::Threshold1d(_) => "threshold_1d",
            Compiled::Triangulated2d(_) => "triangulated_2d",
            Compiled::Grid2d(_) => "grid_2d",
            Compiled::Direct(_) => "direct",
            Compiled::Phases(_) => "phases",
        }
    }

    /// True when both handles point at the same compiled configuration.
    pub fn shares_config(&self, other: &BlendEngine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fresh runtime sized to this engine's sources.
    pub fn init_runtime(&self, clips: &dyn ClipTable) -> BlendRuntime {
        let mut rt = BlendRuntime::new(self.sources.to_vec(), clips);
        for (i, source) in rt.sources().enumerate() {
            if rt.clips[i].is_none() {
                debug!("blend source {source} has no clip info");
            }
        }
        match &*self.inner {
            Compiled::Single(_) => {
                rt.targets[0] = 1.0;
                rt.set_weights_from_targets();
            }
            Compiled::Triangulated2d(e) => e.prime(&mut rt),
            Compiled::Grid2d(e) => e.prime(&mut rt),
            Compiled::Direct(e) => rt.fired.reserve(e.event_count()),
            Compiled::Phases(e) => e.init_runtime(&mut rt, clips),
            Compiled::Threshold1d(_) => {}
        }
        rt
    }

    /// Per-tick weight update. Does not allocate.
    pub fn update_weights(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32) {
        self.dispatch(rt, ctx, dt, false);
    }

    /// Jump to target weights without smoothing.
    pub fn immediate_update(&self, rt: &mut BlendRuntime, ctx: &ParamContext) {
        self.dispatch(rt, ctx, 0.0, true);
    }

    fn dispatch(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32, immediate: bool) {
        if rt.len() != self.sources.len() {
            warn!(
                "blend runtime has {} slots but engine expects {}; skipping update",
                rt.len(),
                self.sources.len()
            );
            return;
        }
        match &*self.inner {
            Compiled::Single(_) => {
                rt.primed = true;
            }
            Compiled::Threshold1d(e) => e.update(rt, ctx, dt, immediate),
            Compiled::Triangulated2d(e) => e.update(rt, ctx, dt, immediate),
            Compiled::Grid2d(e) => e.update(rt, ctx, dt, immediate),
            Compiled::Direct(e) => e.update(rt, ctx, dt, immediate),
            Compiled::Phases(e) => e.update(rt, ctx, dt, immediate),
        }
    }

    /// Heaviest source, for diagnostics.
    pub fn current_source<'a>(&self, rt: &'a BlendRuntime) -> Option<&'a SourceRef> {
        rt.dominant_index().and_then(|i| rt.source(i))
    }

    /// Hot-swap the source at `index`. Slot positions never move.
    pub fn override_source(
        &self,
        rt: &mut BlendRuntime,
        index: usize,
        source: SourceRef,
        clips: &dyn ClipTable,
    ) -> bool {
        if index >= rt.len() {
            warn!("override_source: index {index} out of range ({} slots)", rt.len());
            return false;
        }
        if let Compiled::Phases(e) = &*self.inner {
            e.override_nested(rt, index, &source, clips);
        }
        rt.replace_source(index, source, clips)
    }

    /// Nominal length of one pass: the phase budget for sequences, otherwise
    /// the length of the heaviest source (0 when unknown).
    pub fn standard_duration(&self, rt: &BlendRuntime) -> f32 {
        if let Compiled::Phases(e) = &*self.inner {
            return e.standard_duration();
        }
        rt.dominant_index()
            .or(if rt.is_empty() { None } else { Some(0) })
            .and_then(|i| rt.clip_info(i))
            .map_or(0.0, |c| c.length)
    }

    /// Trigger keys fired by the last update (direct engines only).
    pub fn fired_triggers<'a>(&'a self, rt: &'a BlendRuntime) -> impl Iterator<Item = &'a str> + 'a {
        let direct = match &*self.inner {
            Compiled::Direct(e) => Some(e),
            _ => None,
        };
        rt.fired
            .iter()
            .filter_map(move |&i| direct.and_then(|d| d.event_trigger(i)))
    }

    pub fn phase_name(&self, index: usize) -> Option<&str> {
        match &*self.inner {
            Compiled::Phases(e) => e.phase_name(index),
            _ => None,
        }
    }

    pub fn phase_count(&self) -> usize {
        match &*self.inner {
            Compiled::Phases(e) => e.phase_count(),
            _ => 0,
        }
    }

    /// Force a phase switch by name; false if there is no such phase.
    pub fn force_phase(&self, rt: &mut BlendRuntime, name: &str) -> bool {
        match &*self.inner {
            Compiled::Phases(e) => match e.phase_index(name) {
                Some(i) => e.force_phase(rt, i),
                None => false,
            },
            _ => false,
        }
    }

    /// Triangle list of a triangulated engine, for diagnostics.
    pub fn triangles(&self) -> Option<&[[usize; 3]]> {
        match &*self.inner {
            Compiled::Triangulated2d(e) => Some(e.triangles()),
            _ => None,
        }
    }
}
