//! Threshold-1D: linear interpolation between the two samples bracketing a
//! scalar input.

use serde::{Deserialize, Serialize};
use vizij_params::{Curve, ParamContext, ParamKey};

use crate::error::BlendConfigError;
use crate::runtime::BlendRuntime;
use crate::smoothing::{smooth_damp, smooth_damp_slice};
use crate::source::SourceRef;

fn default_smooth_time() -> f32 {
    0.1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSample {
    pub threshold: f32,
    #[serde(default)]
    pub source: Option<SourceRef>,
}

/// Optional reshaping of the raw input before it meets the thresholds:
/// `[input_min, input_max]` is normalized, passed through `curve` and
/// spread over the threshold range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputRemap {
    pub input_min: f32,
    pub input_max: f32,
    #[serde(default)]
    pub curve: Option<Curve>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Threshold1dSpec {
    pub parameter: ParamKey,
    pub samples: Vec<ThresholdSample>,
    #[serde(default = "default_smooth_time")]
    pub smooth_time: f32,
    #[serde(default)]
    pub remap: Option<InputRemap>,
}

#[derive(Debug)]
pub struct Threshold1d {
    parameter: ParamKey,
    /// Ascending thresholds paired with the slot index of their source.
    sorted: Vec<(f32, usize)>,
    sources: Vec<SourceRef>,
    smooth_time: f32,
    remap: Option<InputRemap>,
}

impl Threshold1d {
    pub(crate) fn compile(spec: &Threshold1dSpec) -> Result<Self, BlendConfigError> {
        const ENGINE: &str = "threshold-1d";
        if spec.samples.is_empty() {
            return Err(BlendConfigError::EmptySamples { engine: ENGINE });
        }
        let mut sources = Vec::with_capacity(spec.samples.len());
        let mut sorted = Vec::with_capacity(spec.samples.len());
        for (index, sample) in spec.samples.iter().enumerate() {
            let source = sample
                .source
                .clone()
                .ok_or(BlendConfigError::MissingSource { engine: ENGINE, index })?;
            if !sample.threshold.is_finite() {
                return Err(BlendConfigError::NonFinite { engine: ENGINE, index });
            }
            sources.push(source);
            sorted.push((sample.threshold, index));
        }
        // Stable: equal thresholds keep declaration order.
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self {
            parameter: spec.parameter.clone(),
            sorted,
            sources,
            smooth_time: spec.smooth_time.max(0.0),
            remap: spec.remap.clone(),
        })
    }

    pub(crate) fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    fn map_input(&self, raw: f32) -> f32 {
        let Some(remap) = &self.remap else {
            return raw;
        };
        let span = remap.input_max - remap.input_min;
        let n = if span.abs() > f32::EPSILON {
            ((raw - remap.input_min) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let shaped = match &remap.curve {
            Some(curve) if !curve.is_empty() => curve.evaluate(n).clamp(0.0, 1.0),
            _ => n,
        };
        let lo = self.sorted.first().map_or(0.0, |s| s.0);
        let hi = self.sorted.last().map_or(1.0, |s| s.0);
        lo + (hi - lo) * shaped
    }

    /// Write exactly one or two non-zero targets for `input`.
    fn write_targets(&self, rt: &mut BlendRuntime, input: f32) {
        rt.clear_targets();
        let n = self.sorted.len();
        let (first_t, first_i) = self.sorted[0];
        let (last_t, last_i) = self.sorted[n - 1];
        if n == 1 || input <= first_t {
            rt.targets[first_i] = 1.0;
            return;
        }
        if input >= last_t {
            rt.targets[last_i] = 1.0;
            return;
        }
        // First threshold strictly above input; input is inside the range so 1 <= hi < n.
        let hi = self.sorted.partition_point(|s| s.0 <= input);
        let lo = hi - 1;
        let (t0, i0) = self.sorted[lo];
        let (t1, i1) = self.sorted[hi];
        let span = t1 - t0;
        let t = if span > f32::EPSILON {
            ((input - t0) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        rt.targets[i0] = 1.0 - t;
        rt.targets[i1] = t;
    }

    pub(crate) fn update(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32, immediate: bool) {
        let raw = self.map_input(ctx.get_float(&self.parameter));
        if self.sorted.len() == 1 {
            rt.targets[self.sorted[0].1] = 1.0;
            rt.set_weights_from_targets();
            rt.input[0] = raw;
            rt.primed = true;
            return;
        }
        let snap = immediate || !rt.primed;
        if snap || self.smooth_time <= 0.001 {
            rt.input[0] = raw;
            rt.input_velocity[0] = 0.0;
        } else {
            rt.input[0] = smooth_damp(rt.input[0], raw, &mut rt.input_velocity[0], self.smooth_time, dt);
        }
        let input = rt.input[0];
        self.write_targets(rt, input);

        let weight_time = self.smooth_time * 0.5;
        if snap || self.smooth_time <= 0.001 {
            rt.set_weights_from_targets();
        } else {
            smooth_damp_slice(&mut rt.weights, &rt.targets, &mut rt.velocities, weight_time, dt);
        }
        rt.primed = true;
    }
}
