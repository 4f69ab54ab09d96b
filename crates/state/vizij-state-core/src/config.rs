use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::denial::DEFAULT_DENIAL_TIMEOUT;
use crate::ids::{Lane, StateRef};
use crate::ledger::DEFAULT_RELEASE_THRESHOLD;

fn default_lane_weight() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    #[serde(default = "default_lane_weight")]
    pub weight: f32,
    /// State entered whenever the lane runs empty.
    #[serde(default)]
    pub fallback: Option<StateRef>,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            weight: default_lane_weight(),
            fallback: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneConfigs {
    #[serde(default)]
    pub basic: LaneConfig,
    #[serde(default)]
    pub main: LaneConfig,
    #[serde(default)]
    pub buff: LaneConfig,
}

impl LaneConfigs {
    pub fn get(&self, lane: Lane) -> &LaneConfig {
        match lane {
            Lane::Basic => &self.basic,
            Lane::Main => &self.main,
            Lane::Buff => &self.buff,
        }
    }

    pub fn get_mut(&mut self, lane: Lane) -> &mut LaneConfig {
        match lane {
            Lane::Basic => &mut self.basic,
            Lane::Main => &mut self.main,
            Lane::Buff => &mut self.buff,
        }
    }
}

/// Values written into the context when the machine is built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamDefaults {
    #[serde(default)]
    pub floats: HashMap<String, f32>,
    #[serde(default)]
    pub ints: HashMap<String, i32>,
    #[serde(default)]
    pub bools: HashMap<String, bool>,
}

/// State machine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub lanes: LaneConfigs,
    /// Entered (forced) when the machine is built, in order.
    pub initial_states: Vec<StateRef>,
    pub params: ParamDefaults,
    /// Seconds a refused entry stays memoized.
    pub denial_timeout: f32,
    pub release_threshold: f32,
    /// Refuse non-forced entries into a lane while it is cross-fading.
    pub lock_during_transition: bool,
    /// Recompute speed and locomotion flags from the velocity slots each tick.
    pub derive_locomotion: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            lanes: LaneConfigs::default(),
            initial_states: Vec::new(),
            params: ParamDefaults::default(),
            denial_timeout: DEFAULT_DENIAL_TIMEOUT,
            release_threshold: DEFAULT_RELEASE_THRESHOLD,
            lock_during_transition: false,
            derive_locomotion: false,
        }
    }
}
