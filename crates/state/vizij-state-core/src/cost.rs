//! Cost specifications attached to state definitions.

use serde::{Deserialize, Serialize};
use vizij_params::Curve;

use crate::channel::ChannelMask;

fn default_enter_cost() -> f32 {
    0.5
}

/// One slice of a state's cost: how much of each channel in `mask` the state
/// occupies while active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostPart {
    pub mask: ChannelMask,
    #[serde(default = "default_enter_cost")]
    pub enter_cost: f32,
    /// Channels released progressively by a scheduled return. Defaults to `mask`.
    #[serde(default)]
    pub return_mask: Option<ChannelMask>,
    /// Maps normalized return progress to the fraction returned so far.
    #[serde(default)]
    pub return_curve: Option<Curve>,
}

impl CostPart {
    pub fn new(mask: ChannelMask, enter_cost: f32) -> Self {
        Self {
            mask,
            enter_cost,
            return_mask: None,
            return_curve: None,
        }
    }

    #[inline]
    pub fn cost(&self) -> f32 {
        if self.enter_cost.is_finite() {
            self.enter_cost.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Channels that follow the progressive return schedule.
    #[inline]
    pub fn progressive_mask(&self) -> ChannelMask {
        match self.return_mask {
            Some(m) => m & self.mask,
            None => self.mask,
        }
    }

    /// Returned fraction at normalized progress `t`.
    pub fn return_fraction(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match &self.return_curve {
            Some(curve) if !curve.is_empty() => curve.evaluate(t).clamp(0.0, 1.0),
            _ => t,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostSpec {
    pub main: CostPart,
    #[serde(default)]
    pub extra: Vec<CostPart>,
}

impl Default for CostSpec {
    fn default() -> Self {
        Self {
            main: CostPart::new(ChannelMask::ALL_BODY_ACTIVE, 0.8),
            extra: Vec::new(),
        }
    }
}

impl CostSpec {
    pub fn new(mask: ChannelMask, enter_cost: f32) -> Self {
        Self {
            main: CostPart::new(mask, enter_cost),
            extra: Vec::new(),
        }
    }

    pub fn with_part(mut self, part: CostPart) -> Self {
        self.extra.push(part);
        self
    }

    /// Main part first, then extras in order.
    pub fn parts(&self) -> impl Iterator<Item = &CostPart> {
        std::iter::once(&self.main).chain(self.extra.iter())
    }

    pub fn part_count(&self) -> usize {
        1 + self.extra.len()
    }

    /// Union of all parts' channels.
    pub fn mask(&self) -> ChannelMask {
        self.parts().fold(ChannelMask::NONE, |acc, p| acc | p.mask)
    }

    /// Channels whose summed (clamped) enter cost exceeds 1.
    pub fn overcommitted(&self) -> Vec<(usize, f32)> {
        const EPS: f32 = 1e-5;
        let mut totals = [0.0f32; ChannelMask::CAPACITY];
        for part in self.parts() {
            for ch in part.mask.channels() {
                totals[ch] += part.cost();
            }
        }
        totals
            .iter()
            .enumerate()
            .filter(|(_, total)| **total > 1.0 + EPS)
            .map(|(ch, total)| (ch, *total))
            .collect()
    }

    /// Parts whose raw enter cost lies outside [0, 1].
    pub fn out_of_range(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.parts()
            .enumerate()
            .filter(|(_, p)| !(0.0..=1.0).contains(&p.enter_cost))
            .map(|(i, p)| (i, p.enter_cost))
    }
}
