use log::{error, warn};
use thiserror::Error;
use vizij_blend::BlendConfigError;

use crate::ids::{StateId, StateRef};

/// Problems found while compiling a state graph. None of them abort the
/// build: the offending state, engine or transition is skipped instead.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate state id {id} ('{name}'); later definition skipped")]
    DuplicateId { id: StateId, name: String },
    #[error("duplicate state name '{name}'; lookups by name resolve to the first")]
    DuplicateName { name: String },
    #[error("state '{state}': blend engine disabled: {source}")]
    Blend {
        state: String,
        #[source]
        source: BlendConfigError,
    },
    #[error("state '{state}': more than one blend component; only the first is used")]
    MultipleBlends { state: String },
    #[error("state '{state}': transition target {target} does not exist")]
    UnknownTransitionTarget { state: String, target: StateRef },
    #[error("state '{state}': degrade target {target} does not exist")]
    UnknownDegradeTarget { state: String, target: StateRef },
    #[error("state '{state}': degrade target is the state itself")]
    SelfDegrade { state: String },
    #[error("state '{state}': cost on channel {channel} sums to {total:.3} (> 1)")]
    CostOverCapacity { state: String, channel: usize, total: f32 },
    #[error("state '{state}': cost part {part} enter cost {value} outside [0, 1]; clamped")]
    CostOutOfRange { state: String, part: usize, value: f32 },
}

impl GraphError {
    /// Issues that only shape behavior (clamping, over-capacity costs) rather
    /// than disabling part of the graph.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            GraphError::DuplicateName { .. }
                | GraphError::CostOverCapacity { .. }
                | GraphError::CostOutOfRange { .. }
        )
    }
}

/// Everything a graph build reported.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<GraphError>,
}

impl ValidationReport {
    pub fn push(&mut self, issue: GraphError) {
        if issue.is_warning() {
            warn!("{issue}");
        } else {
            error!("{issue}");
        }
        self.issues.push(issue);
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &GraphError> {
        self.issues.iter().filter(|i| !i.is_warning())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &GraphError> {
        self.issues.iter().filter(|i| i.is_warning())
    }

    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.to_string()).collect()
    }
}
