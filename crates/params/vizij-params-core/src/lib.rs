//! vizij-params-core: the parameter store driving Vizij state machines.
//!
//! - [`ParamContext`]: enumerated float slots plus string-keyed floats, ints,
//!   bools, one-shot triggers, curves, tags and flags.
//! - [`Condition`]: predicate trees evaluated against a context.
//! - [`Curve`]: keyframed scalar curves with bezier easing, used for
//!   cross-fades, cost return shaping and direct-blend response.

pub mod condition;
pub mod context;
pub mod curve;
pub mod ids;

pub use condition::{all_hold, any_holds, Compare, Condition};
pub use context::{MapSource, ParamContext, ParamSource};
pub use curve::{Curve, CurveKey};
pub use ids::{ParamId, ParamKey};
