//! Shared pieces of the two 2D engines: sample configuration, input
//! smoothing and nearest-sample lookup.

use serde::{Deserialize, Serialize};
use vizij_params::{ParamContext, ParamKey};

use crate::error::BlendConfigError;
use crate::runtime::BlendRuntime;
use crate::smoothing::smooth_damp;
use crate::source::SourceRef;

fn default_smooth_time() -> f32 {
    0.1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarSample {
    pub position: [f32; 2],
    #[serde(default)]
    pub source: Option<SourceRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Planar2dSpec {
    pub x: ParamKey,
    pub y: ParamKey,
    pub samples: Vec<PlanarSample>,
    #[serde(default = "default_smooth_time")]
    pub smooth_time: f32,
}

/// Validated sample set shared by both 2D engines.
#[derive(Debug)]
pub(crate) struct PlanarSamples {
    pub x: ParamKey,
    pub y: ParamKey,
    pub positions: Vec<[f32; 2]>,
    pub sources: Vec<SourceRef>,
    pub smooth_time: f32,
}

impl PlanarSamples {
    pub fn compile(spec: &Planar2dSpec, engine: &'static str) -> Result<Self, BlendConfigError> {
        let count = spec.samples.len();
        if count == 0 {
            return Err(BlendConfigError::EmptySamples { engine });
        }
        if count == 2 {
            return Err(BlendConfigError::TooFewSamples { count });
        }
        let mut positions = Vec::with_capacity(count);
        let mut sources = Vec::with_capacity(count);
        for (index, sample) in spec.samples.iter().enumerate() {
            let source = sample
                .source
                .clone()
                .ok_or(BlendConfigError::MissingSource { engine, index })?;
            if !sample.position.iter().all(|c| c.is_finite()) {
                return Err(BlendConfigError::NonFinite { engine, index });
            }
            positions.push(sample.position);
            sources.push(source);
        }
        Ok(Self {
            x: spec.x.clone(),
            y: spec.y.clone(),
            positions,
            sources,
            smooth_time: spec.smooth_time.max(0.0),
        })
    }

    /// Index of the sample closest to `p`.
    pub fn nearest(&self, p: [f32; 2]) -> usize {
        let mut best = 0;
        let mut best_d = f32::INFINITY;
        for (i, q) in self.positions.iter().enumerate() {
            let d = dist2(p, *q);
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }

    /// Read and smooth the 2D input; returns the point to evaluate.
    pub fn advance_input(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32, immediate: bool) -> [f32; 2] {
        let raw = [ctx.get_float(&self.x), ctx.get_float(&self.y)];
        if immediate || !rt.primed || self.smooth_time <= 0.001 {
            rt.input = raw;
            rt.input_velocity = [0.0; 2];
        } else {
            for axis in 0..2 {
                rt.input[axis] = smooth_damp(
                    rt.input[axis],
                    raw[axis],
                    &mut rt.input_velocity[axis],
                    self.smooth_time,
                    dt,
                );
            }
        }
        rt.primed = true;
        rt.input
    }

    pub fn set_single(&self, rt: &mut BlendRuntime, index: usize) {
        rt.clear_targets();
        rt.targets[index] = 1.0;
        rt.set_weights_from_targets();
    }
}

#[inline]
pub(crate) fn dist2(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}
