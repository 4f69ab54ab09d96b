//! Direct: every source reads its own weight from the context.

use serde::{Deserialize, Serialize};
use vizij_params::{Curve, ParamContext, ParamKey};

use crate::error::BlendConfigError;
use crate::runtime::BlendRuntime;
use crate::smoothing::{smooth_damp, smooth_damp_slice};
use crate::source::SourceRef;

fn default_smooth_time() -> f32 {
    0.05
}

fn default_event_prefix() -> String {
    "OnWeight_".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectSource {
    #[serde(default)]
    pub source: Option<SourceRef>,
    /// Parameter holding this source's weight; `default_weight` when unset or missing.
    #[serde(default)]
    pub weight: Option<ParamKey>,
    #[serde(default)]
    pub default_weight: f32,
    /// Response curve applied to the raw weight.
    #[serde(default)]
    pub curve: Option<Curve>,
}

/// Sets trigger `<prefix><name>` (or `<prefix><source index>`) when the
/// source's weight crosses `threshold`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightEventSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub source: usize,
    pub threshold: f32,
    #[serde(default = "default_true")]
    pub on_rising: bool,
    #[serde(default)]
    pub on_falling: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectSpec {
    pub sources: Vec<DirectSource>,
    #[serde(default)]
    pub auto_normalize: bool,
    #[serde(default = "default_smooth_time")]
    pub smooth_time: f32,
    #[serde(default)]
    pub events: Vec<WeightEventSpec>,
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
}

#[derive(Debug)]
struct WeightEvent {
    source: usize,
    threshold: f32,
    on_rising: bool,
    on_falling: bool,
    trigger: String,
}

#[derive(Debug)]
pub struct Direct {
    entries: Vec<DirectSource>,
    sources: Vec<SourceRef>,
    auto_normalize: bool,
    smooth_time: f32,
    events: Vec<WeightEvent>,
}

impl Direct {
    pub(crate) fn compile(spec: &DirectSpec) -> Result<Self, BlendConfigError> {
        const ENGINE: &str = "direct";
        if spec.sources.is_empty() {
            return Err(BlendConfigError::EmptySamples { engine: ENGINE });
        }
        let mut sources = Vec::with_capacity(spec.sources.len());
        for (index, entry) in spec.sources.iter().enumerate() {
            let source = entry
                .source
                .clone()
                .ok_or(BlendConfigError::MissingSource { engine: ENGINE, index })?;
            sources.push(source);
        }
        let mut events = Vec::with_capacity(spec.events.len());
        for (index, ev) in spec.events.iter().enumerate() {
            if ev.source >= sources.len() {
                return Err(BlendConfigError::EventSourceOutOfRange {
                    index,
                    source_index: ev.source,
                    count: sources.len(),
                });
            }
            let suffix = match &ev.name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => ev.source.to_string(),
            };
            events.push(WeightEvent {
                source: ev.source,
                threshold: ev.threshold,
                on_rising: ev.on_rising,
                on_falling: ev.on_falling,
                trigger: format!("{}{}", spec.event_prefix, suffix),
            });
        }
        Ok(Self {
            entries: spec.sources.clone(),
            sources,
            auto_normalize: spec.auto_normalize,
            smooth_time: spec.smooth_time.max(0.0),
            events,
        })
    }

    pub(crate) fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// Trigger key of event `index`.
    pub(crate) fn event_trigger(&self, index: usize) -> Option<&str> {
        self.events.get(index).map(|e| e.trigger.as_str())
    }

    pub(crate) fn event_count(&self) -> usize {
        self.events.len()
    }

    fn write_targets(&self, rt: &mut BlendRuntime, ctx: &ParamContext) {
        let mut sum = 0.0;
        for (i, entry) in self.entries.iter().enumerate() {
            let raw = match &entry.weight {
                Some(key) => ctx.get_float_or(key, entry.default_weight),
                None => entry.default_weight,
            };
            let shaped = match &entry.curve {
                Some(curve) if !curve.is_empty() => curve.evaluate(raw),
                _ => raw,
            };
            let w = shaped.clamp(0.0, 1.0);
            rt.targets[i] = w;
            sum += w;
        }
        if self.auto_normalize && sum > 0.001 {
            rt.targets.iter_mut().for_each(|t| *t /= sum);
        }
    }

    pub(crate) fn update(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32, immediate: bool) {
        rt.fired.clear();
        self.write_targets(rt, ctx);
        let snap = immediate || !rt.primed || self.smooth_time <= 0.001;

        // Crossings compare last tick's weight with the one about to be
        // written; nothing fires on the first update.
        if rt.primed {
            for (index, ev) in self.events.iter().enumerate() {
                let prev = rt.weights[ev.source];
                let next = if snap {
                    rt.targets[ev.source]
                } else {
                    let mut v = rt.velocities[ev.source];
                    smooth_damp(prev, rt.targets[ev.source], &mut v, self.smooth_time, dt)
                };
                let rising = ev.on_rising && prev < ev.threshold && next >= ev.threshold;
                let falling = ev.on_falling && prev > ev.threshold && next <= ev.threshold;
                if rising || falling {
                    rt.fired.push(index);
                }
            }
        }

        if snap {
            rt.set_weights_from_targets();
        } else {
            smooth_damp_slice(&mut rt.weights, &rt.targets, &mut rt.velocities, self.smooth_time, dt);
        }
        rt.primed = true;
    }
}
