//! vizij-blend-core: blend-weight engines for Vizij state machines.
//!
//! Every engine turns context parameters into one weight per animation
//! source. Configuration ([`BlendSpec`]) compiles once into a shared
//! [`BlendEngine`]; each running state owns a [`BlendRuntime`] whose arrays
//! are sized at construction and never reallocated.
//!
//! Engines:
//! - `threshold_1d`: two-sample linear interpolation along one parameter.
//! - `triangulated_2d`: barycentric weights over a fan triangulation.
//! - `grid_2d`: bilinear weights over a rectangular sample grid.
//! - `direct`: one context parameter per source.
//! - `phase4` / `sequence`: conditionally advancing phase sequences.

pub mod direct;
pub mod engine;
pub mod error;
pub mod grid;
pub mod phase;
pub mod planar;
pub mod runtime;
pub mod smoothing;
pub mod source;
pub mod threshold;
pub mod triangulated;

pub use direct::{DirectSource, DirectSpec, WeightEventSpec};
pub use engine::{BlendEngine, BlendSpec, SingleSpec};
pub use error::BlendConfigError;
pub use phase::{LoopMode, Phase4Spec, PhaseSpec, PhaseTarget, SequenceSpec};
pub use planar::{Planar2dSpec, PlanarSample};
pub use runtime::{BlendRuntime, PhaseStatus};
pub use source::{ClipInfo, ClipTable, NoClips, SourceRef, SourceSlots, StaticClipTable};
pub use threshold::{InputRemap, Threshold1dSpec, ThresholdSample};
