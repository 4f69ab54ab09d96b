//! vizij-state-core: lane-scheduled animation state machines.
//!
//! - [`StateGraph`]: validated, compiled state definitions (costs, blend
//!   engines, transitions, actions). Compiled states are shared via `Arc`.
//! - [`CostLedger`]: per-channel occupancy that gates entry and is handed
//!   back on a schedule once a state passes its recovery point.
//! - [`DenialCache`]: memo of refused entries, invalidated on state changes.
//! - [`Pipeline`]: one lane with a current state and an optional cross-fade.
//! - [`StateMachine`]: the controller that ties them together and runs the
//!   per-frame [`tick`](StateMachine::tick).

pub mod channel;
pub mod config;
pub mod cost;
pub mod denial;
pub mod error;
pub mod graph;
pub mod ids;
pub mod instance;
pub mod ledger;
pub mod machine;
pub mod outputs;
pub mod pipeline;

pub use channel::ChannelMask;
pub use config::{LaneConfig, LaneConfigs, MachineConfig, ParamDefaults};
pub use cost::{CostPart, CostSpec};
pub use denial::{DenialCache, DenialReason};
pub use error::{GraphError, ValidationReport};
pub use graph::{
    ActionSet, CompiledState, CompiledTransition, CrossFadeSpec, Fade, FadeMode, ParamAction,
    SamePath, StateComponent, StateDefinition, StateGraph, StateGraphSpec, TimedAction,
    TransitionSpec,
};
pub use ids::{Lane, StateId, StateRef};
pub use instance::StateInstance;
pub use ledger::{CostLedger, ScheduledReturn};
pub use machine::{MachineSpec, StateMachine};
pub use outputs::{LaneSnapshot, Outputs, StateEvent};
pub use pipeline::{LaneReport, LaneSignal, Pipeline};

pub use vizij_blend;
pub use vizij_params;
