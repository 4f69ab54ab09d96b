//! Per-instance mutable blend state.

use crate::phase::PhaseRuntime;
use crate::source::{ClipInfo, ClipTable, SourceRef, SourceSlots};

/// Index-stable weight arrays for one running engine instance.
///
/// Array lengths are fixed at construction. Only contents change afterwards.
#[derive(Clone, Debug)]
pub struct BlendRuntime {
    pub(crate) slots: SourceSlots,
    pub(crate) clips: Vec<Option<ClipInfo>>,
    pub(crate) weights: Vec<f32>,
    pub(crate) targets: Vec<f32>,
    pub(crate) velocities: Vec<f32>,
    /// Smoothed engine input (1D uses `[0]`, 2D uses both).
    pub(crate) input: [f32; 2],
    pub(crate) input_velocity: [f32; 2],
    /// False until the first update; the first update snaps instead of smoothing.
    pub(crate) primed: bool,
    /// Weight events fired by the last update (indices into the engine's event list).
    pub(crate) fired: Vec<usize>,
    pub(crate) phases: Option<Box<PhaseRuntime>>,
}

impl BlendRuntime {
    pub(crate) fn new(sources: Vec<SourceRef>, clips: &dyn ClipTable) -> Self {
        let n = sources.len();
        let infos = sources.iter().map(|s| clips.clip(s)).collect();
        Self {
            slots: SourceSlots::new(sources),
            clips: infos,
            weights: vec![0.0; n],
            targets: vec![0.0; n],
            velocities: vec![0.0; n],
            input: [0.0; 2],
            input_velocity: [0.0; 2],
            primed: false,
            fired: Vec::new(),
            phases: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Current (smoothed) weights, one per source slot.
    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Unsmoothed targets from the last update.
    #[inline]
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    #[inline]
    pub fn source(&self, index: usize) -> Option<&SourceRef> {
        self.slots.get(index)
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceRef> {
        self.slots.iter()
    }

    #[inline]
    pub fn clip_info(&self, index: usize) -> Option<ClipInfo> {
        self.clips.get(index).copied().flatten()
    }

    /// Smoothed engine input, for diagnostics.
    pub fn input(&self) -> [f32; 2] {
        self.input
    }

    /// Phase observer output; `None` for non-phase engines.
    pub fn phase(&self) -> Option<PhaseStatus> {
        self.phases.as_ref().map(|p| p.status())
    }

    /// Index of the heaviest slot. Ties resolve to the lowest index;
    /// `None` when every weight is zero.
    pub fn dominant_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &w) in self.weights.iter().enumerate() {
            if w > 0.0 && best.map_or(true, |(_, bw)| w > bw) {
                best = Some((i, w));
            }
        }
        best.map(|(i, _)| i)
    }

    pub(crate) fn set_weights_from_targets(&mut self) {
        self.weights.copy_from_slice(&self.targets);
        self.velocities.iter_mut().for_each(|v| *v = 0.0);
    }

    pub(crate) fn clear_targets(&mut self) {
        self.targets.iter_mut().for_each(|t| *t = 0.0);
    }

    pub(crate) fn replace_source(&mut self, index: usize, source: SourceRef, clips: &dyn ClipTable) -> bool {
        let info = clips.clip(&source);
        if !self.slots.replace(index, source) {
            return false;
        }
        if let Some(slot) = self.clips.get_mut(index) {
            *slot = info;
        }
        true
    }
}

/// What a phase engine reports after each update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseStatus {
    pub index: usize,
    /// Seconds spent in the current phase.
    pub elapsed: f32,
    pub completed: bool,
    /// True when the last update switched phases.
    pub changed: bool,
}
