//! Composable boolean predicates evaluated against a [`ParamContext`].

use serde::{Deserialize, Serialize};

use crate::context::ParamContext;
use crate::ids::ParamKey;

/// Tolerance for float equality comparisons.
pub const FLOAT_EQ_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compare {
    Greater,
    Less,
    Equal,
    GreaterOrEqual,
    LessOrEqual,
    NotEqual,
}

impl Compare {
    #[inline]
    pub fn test_f32(self, lhs: f32, rhs: f32) -> bool {
        match self {
            Compare::Greater => lhs > rhs,
            Compare::Less => lhs < rhs,
            Compare::Equal => (lhs - rhs).abs() <= FLOAT_EQ_EPSILON,
            Compare::GreaterOrEqual => lhs >= rhs,
            Compare::LessOrEqual => lhs <= rhs,
            Compare::NotEqual => (lhs - rhs).abs() > FLOAT_EQ_EPSILON,
        }
    }

    #[inline]
    pub fn test_i32(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Compare::Greater => lhs > rhs,
            Compare::Less => lhs < rhs,
            Compare::Equal => lhs == rhs,
            Compare::GreaterOrEqual => lhs >= rhs,
            Compare::LessOrEqual => lhs <= rhs,
            Compare::NotEqual => lhs != rhs,
        }
    }
}

/// A predicate tree.
///
/// JSON shape: `{ "kind": "float", "key": "speed", "cmp": "greater", "value": 0.5 }`,
/// `{ "kind": "all", "of": [ ... ] }`, `{ "kind": "not", "of": { ... } }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Float {
        key: ParamKey,
        cmp: Compare,
        value: f32,
    },
    Int {
        key: String,
        cmp: Compare,
        value: i32,
    },
    Bool {
        key: ParamKey,
        #[serde(default = "default_true")]
        value: bool,
    },
    Trigger {
        key: String,
    },
    Flag {
        name: String,
    },
    All {
        of: Vec<Condition>,
    },
    Any {
        of: Vec<Condition>,
    },
    Not {
        of: Box<Condition>,
    },
}

fn default_true() -> bool {
    true
}

impl Condition {
    pub fn float(key: impl Into<ParamKey>, cmp: Compare, value: f32) -> Self {
        Condition::Float {
            key: key.into(),
            cmp,
            value,
        }
    }

    pub fn int(key: &str, cmp: Compare, value: i32) -> Self {
        Condition::Int {
            key: key.to_string(),
            cmp,
            value,
        }
    }

    pub fn bool(key: impl Into<ParamKey>, value: bool) -> Self {
        Condition::Bool {
            key: key.into(),
            value,
        }
    }

    pub fn trigger(key: &str) -> Self {
        Condition::Trigger {
            key: key.to_string(),
        }
    }

    pub fn not(inner: Condition) -> Self {
        Condition::Not {
            of: Box::new(inner),
        }
    }

    /// Empty `All` is true, empty `Any` is false.
    pub fn evaluate(&self, ctx: &ParamContext) -> bool {
        match self {
            Condition::Float { key, cmp, value } => cmp.test_f32(ctx.get_float(key), *value),
            Condition::Int { key, cmp, value } => cmp.test_i32(ctx.get_int(key), *value),
            Condition::Bool { key, value } => ctx.get_bool(key) == *value,
            Condition::Trigger { key } => ctx.get_trigger(key),
            Condition::Flag { name } => ctx.has_flag(name),
            Condition::All { of } => of.iter().all(|c| c.evaluate(ctx)),
            Condition::Any { of } => of.iter().any(|c| c.evaluate(ctx)),
            Condition::Not { of } => !of.evaluate(ctx),
        }
    }
}

/// All must hold; an empty list holds.
pub fn all_hold(conditions: &[Condition], ctx: &ParamContext) -> bool {
    conditions.iter().all(|c| c.evaluate(ctx))
}

/// At least one must hold; an empty list does not.
pub fn any_holds(conditions: &[Condition], ctx: &ParamContext) -> bool {
    conditions.iter().any(|c| c.evaluate(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ParamId;

    #[test]
    fn float_compare_modes() {
        let mut ctx = ParamContext::new();
        ctx.set(ParamId::Speed, 1.0);
        assert!(Condition::float(ParamId::Speed, Compare::GreaterOrEqual, 1.0).evaluate(&ctx));
        assert!(!Condition::float(ParamId::Speed, Compare::Greater, 1.0).evaluate(&ctx));
        assert!(Condition::float(ParamId::Speed, Compare::Equal, 1.00005).evaluate(&ctx));
        assert!(Condition::float(ParamId::Speed, Compare::NotEqual, 1.1).evaluate(&ctx));
    }

    #[test]
    fn empty_composites() {
        let ctx = ParamContext::new();
        assert!(Condition::All { of: vec![] }.evaluate(&ctx));
        assert!(!Condition::Any { of: vec![] }.evaluate(&ctx));
        assert!(all_hold(&[], &ctx));
        assert!(!any_holds(&[], &ctx));
    }

    #[test]
    fn json_tree() {
        let json = r#"{
            "kind": "all",
            "of": [
                { "kind": "float", "key": "stamina", "cmp": "greater", "value": 0.2 },
                { "kind": "not", "of": { "kind": "trigger", "key": "stagger" } },
                { "kind": "bool", "key": "is_grounded" }
            ]
        }"#;
        let cond: Condition = serde_json::from_str(json).unwrap();
        let mut ctx = ParamContext::new();
        ctx.set_float("stamina", 0.5);
        assert!(cond.evaluate(&ctx));
        ctx.set_trigger("stagger");
        assert!(!cond.evaluate(&ctx));
    }

    #[test]
    fn int_and_flag() {
        let mut ctx = ParamContext::new();
        ctx.set_int("combo", 2);
        ctx.set_flag("armed");
        let c = Condition::All {
            of: vec![
                Condition::int("combo", Compare::GreaterOrEqual, 2),
                Condition::Flag {
                    name: "armed".into(),
                },
            ],
        };
        assert!(c.evaluate(&ctx));
        ctx.clear_flag("armed");
        assert!(!c.evaluate(&ctx));
    }
}
