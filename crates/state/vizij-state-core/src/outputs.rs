//! Per-tick output of the state machine: semantic events plus a snapshot of
//! every lane. Hosts read these after each `tick`.

use serde::{Deserialize, Serialize};

use crate::denial::DenialReason;
use crate::ids::{Lane, StateId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StateEvent {
    Entered {
        state: StateId,
        lane: Lane,
    },
    Exited {
        state: StateId,
        lane: Lane,
    },
    Transitioned {
        from: StateId,
        to: StateId,
        lane: Lane,
    },
    /// `requested` was refused and the running `from` stepped down to `to`.
    Degraded {
        from: StateId,
        to: StateId,
        requested: StateId,
        lane: Lane,
    },
    /// A fresh refusal (memo hits are not reported again).
    Denied {
        state: StateId,
        reason: DenialReason,
    },
    PhaseChanged {
        state: StateId,
        lane: Lane,
        phase: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// A direct-blend weight crossed its threshold and set `trigger`.
    WeightEvent {
        state: StateId,
        lane: Lane,
        trigger: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneSnapshot {
    pub lane: Lane,
    pub weight: f32,
    #[serde(default)]
    pub current: Option<StateId>,
    #[serde(default)]
    pub outgoing: Option<StateId>,
    /// (outgoing, current) cross-fade weights.
    pub fade: [f32; 2],
    pub elapsed: f32,
    pub normalized_time: f32,
    #[serde(default)]
    pub phase: Option<usize>,
}

impl LaneSnapshot {
    pub fn empty(lane: Lane) -> Self {
        Self {
            lane,
            weight: 0.0,
            current: None,
            outgoing: None,
            fade: [0.0, 0.0],
            elapsed: 0.0,
            normalized_time: 0.0,
            phase: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub events: Vec<StateEvent>,
    #[serde(default)]
    pub lanes: Vec<LaneSnapshot>,
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
        self.lanes.clear();
    }

    #[inline]
    pub fn push_event(&mut self, event: StateEvent) {
        self.events.push(event);
    }

    pub fn lane(&self, lane: Lane) -> Option<&LaneSnapshot> {
        self.lanes.iter().find(|l| l.lane == lane)
    }

    pub fn entered(&self) -> impl Iterator<Item = StateId> + '_ {
        self.events.iter().filter_map(|e| match e {
            StateEvent::Entered { state, .. } => Some(*state),
            _ => None,
        })
    }

    pub fn exited(&self) -> impl Iterator<Item = StateId> + '_ {
        self.events.iter().filter_map(|e| match e {
            StateEvent::Exited { state, .. } => Some(*state),
            _ => None,
        })
    }
}
