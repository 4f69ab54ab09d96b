use thiserror::Error;

/// Problems found while compiling a blend specification. A spec that fails
/// to compile leaves its state without a blend engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlendConfigError {
    #[error("{engine} blend has no samples")]
    EmptySamples { engine: &'static str },
    #[error("{engine} blend sample {index} has no source")]
    MissingSource { engine: &'static str, index: usize },
    #[error("{engine} blend sample {index} has a non-finite coordinate")]
    NonFinite { engine: &'static str, index: usize },
    #[error("2D blend needs 1 or at least 3 samples, got {count}")]
    TooFewSamples { count: usize },
    #[error("weight event {index} points at source {source_index} but only {count} sources exist")]
    EventSourceOutOfRange {
        index: usize,
        source_index: usize,
        count: usize,
    },
    #[error("phase sequence has no phases")]
    NoPhases,
    #[error("phase '{phase}' has neither a source nor a nested blend")]
    EmptyPhase { phase: String },
    #[error("phase '{phase}' targets phase {target} but only {count} phases exist")]
    PhaseTargetOutOfRange {
        phase: String,
        target: usize,
        count: usize,
    },
    #[error("in phase '{phase}': {inner}")]
    Nested {
        phase: String,
        inner: Box<BlendConfigError>,
    },
}
