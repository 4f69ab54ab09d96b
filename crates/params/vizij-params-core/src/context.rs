//! Parameter context: the read/write value store every other component reads.

use std::fmt;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use log::warn;

use crate::curve::Curve;
use crate::ids::{ParamId, ParamKey};

/// External pool consulted when a string key is missing locally.
pub trait ParamSource {
    fn float(&self, key: &str) -> Option<f32>;

    fn int(&self, _key: &str) -> Option<i32> {
        None
    }

    fn bool(&self, _key: &str) -> Option<bool> {
        None
    }
}

/// Plain map-backed pool, mostly for hosts and tests.
#[derive(Clone, Debug, Default)]
pub struct MapSource {
    pub floats: HashMap<String, f32>,
    pub ints: HashMap<String, i32>,
    pub bools: HashMap<String, bool>,
}

impl ParamSource for MapSource {
    fn float(&self, key: &str) -> Option<f32> {
        self.floats.get(key).copied()
    }

    fn int(&self, key: &str) -> Option<i32> {
        self.ints.get(key).copied()
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.bools.get(key).copied()
    }
}

#[derive(Clone)]
pub struct ParamContext {
    slots: [f32; ParamId::COUNT],
    floats: HashMap<String, f32>,
    ints: HashMap<String, i32>,
    bools: HashMap<String, bool>,
    triggers: HashSet<String>,
    tags: HashMap<String, String>,
    curves: HashMap<String, Curve>,
    flags: HashSet<String>,
    fallback: Option<Arc<dyn ParamSource>>,
    revision: u64,
}

impl Default for ParamContext {
    fn default() -> Self {
        let mut slots = [0.0; ParamId::COUNT];
        for id in ParamId::ALL {
            slots[id.index()] = id.default_value();
        }
        Self {
            slots,
            floats: HashMap::new(),
            ints: HashMap::new(),
            bools: HashMap::new(),
            triggers: HashSet::new(),
            tags: HashMap::new(),
            curves: HashMap::new(),
            flags: HashSet::new(),
            fallback: None,
            revision: 0,
        }
    }
}

impl fmt::Debug for ParamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamContext")
            .field("slots", &self.slots)
            .field("floats", &self.floats)
            .field("ints", &self.ints)
            .field("bools", &self.bools)
            .field("triggers", &self.triggers)
            .field("flags", &self.flags)
            .field("has_fallback", &self.fallback.is_some())
            .field("revision", &self.revision)
            .finish()
    }
}

impl ParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, source: Arc<dyn ParamSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    pub fn set_fallback(&mut self, source: Option<Arc<dyn ParamSource>>) {
        self.fallback = source;
    }

    /// Bumped on every write; cheap change detection for hosts.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Called once per tick: one-shot triggers expire.
    pub fn begin_tick(&mut self) {
        self.triggers.clear();
    }

    // ---- enumerated slots ----

    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        self.slots[id.index()]
    }

    #[inline]
    pub fn set(&mut self, id: ParamId, value: f32) {
        if !value.is_finite() {
            warn!("ignoring non-finite value for parameter '{}'", id.name());
            return;
        }
        self.slots[id.index()] = value;
        self.revision += 1;
    }

    // ---- floats ----

    pub fn try_float(&self, key: &ParamKey) -> Option<f32> {
        match key {
            ParamKey::Id(id) => Some(self.get(*id)),
            ParamKey::Name(name) => self
                .floats
                .get(name.as_str())
                .copied()
                .or_else(|| self.fallback.as_ref().and_then(|f| f.float(name))),
        }
    }

    pub fn get_float(&self, key: &ParamKey) -> f32 {
        self.try_float(key).unwrap_or(0.0)
    }

    pub fn get_float_or(&self, key: &ParamKey, default: f32) -> f32 {
        self.try_float(key).unwrap_or(default)
    }

    /// String lookup; enumerated names hit their slot.
    pub fn get_float_named(&self, name: &str) -> f32 {
        match ParamId::from_name(name) {
            Some(id) => self.get(id),
            None => self.try_float(&ParamKey::Name(name.to_string())).unwrap_or(0.0),
        }
    }

    pub fn set_float(&mut self, key: impl Into<ParamKey>, value: f32) {
        match key.into() {
            ParamKey::Id(id) => self.set(id, value),
            ParamKey::Name(name) => {
                if !value.is_finite() {
                    warn!("ignoring non-finite value for parameter '{name}'");
                    return;
                }
                self.floats.insert(name, value);
                self.revision += 1;
            }
        }
    }

    // ---- ints ----

    pub fn try_int(&self, key: &str) -> Option<i32> {
        self.ints
            .get(key)
            .copied()
            .or_else(|| self.fallback.as_ref().and_then(|f| f.int(key)))
    }

    pub fn get_int(&self, key: &str) -> i32 {
        self.try_int(key).unwrap_or(0)
    }

    pub fn set_int(&mut self, key: &str, value: i32) {
        self.ints.insert(key.to_string(), value);
        self.revision += 1;
    }

    // ---- bools ----

    /// Enumerated slots read as `value > 0.5`.
    pub fn try_bool(&self, key: &ParamKey) -> Option<bool> {
        match key {
            ParamKey::Id(id) => Some(self.get(*id) > 0.5),
            ParamKey::Name(name) => self
                .bools
                .get(name.as_str())
                .copied()
                .or_else(|| self.fallback.as_ref().and_then(|f| f.bool(name))),
        }
    }

    pub fn get_bool(&self, key: &ParamKey) -> bool {
        self.try_bool(key).unwrap_or(false)
    }

    pub fn set_bool(&mut self, key: impl Into<ParamKey>, value: bool) {
        match key.into() {
            ParamKey::Id(id) => self.set(id, if value { 1.0 } else { 0.0 }),
            ParamKey::Name(name) => {
                self.bools.insert(name, value);
                self.revision += 1;
            }
        }
    }

    // ---- triggers ----

    pub fn set_trigger(&mut self, key: &str) {
        self.triggers.insert(key.to_string());
        self.revision += 1;
    }

    pub fn get_trigger(&self, key: &str) -> bool {
        self.triggers.contains(key)
    }

    /// Read and clear in one step.
    pub fn consume_trigger(&mut self, key: &str) -> bool {
        self.triggers.remove(key)
    }

    pub fn reset_trigger(&mut self, key: &str) {
        self.triggers.remove(key);
    }

    // ---- string tags ----

    pub fn set_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
        self.revision += 1;
    }

    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    // ---- curves ----

    pub fn set_curve(&mut self, key: &str, curve: Curve) {
        self.curves.insert(key.to_string(), curve);
        self.revision += 1;
    }

    pub fn get_curve(&self, key: &str) -> Option<&Curve> {
        self.curves.get(key)
    }

    pub fn evaluate_curve(&self, key: &str, t: f32, default: f32) -> f32 {
        match self.curves.get(key) {
            Some(curve) if !curve.is_empty() => curve.evaluate(t),
            _ => default,
        }
    }

    // ---- flags ----

    pub fn set_flag(&mut self, name: &str) {
        if self.flags.insert(name.to_string()) {
            self.revision += 1;
        }
    }

    pub fn clear_flag(&mut self, name: &str) {
        if self.flags.remove(name) {
            self.revision += 1;
        }
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    /// Drop a string key from every typed map.
    pub fn remove(&mut self, key: &str) {
        self.floats.remove(key);
        self.ints.remove(key);
        self.bools.remove(key);
        self.triggers.remove(key);
        self.tags.remove(key);
        self.curves.remove(key);
        self.revision += 1;
    }

    /// Reset to a fresh context, keeping the fallback pool.
    pub fn clear(&mut self) {
        let fallback = self.fallback.take();
        let revision = self.revision + 1;
        *self = Self::default();
        self.fallback = fallback;
        self.revision = revision;
    }

    /// Clamp planar speed and refresh the walk/run/sprint markers from it.
    ///
    /// Planar speed is `|(speed_x, speed_z)|`, capped at the sprint threshold
    /// while `sprint_held` is set and at the walk threshold otherwise.
    pub fn derive_locomotion(&mut self) {
        let sx = self.get(ParamId::SpeedX);
        let sz = self.get(ParamId::SpeedZ);
        let mut planar = (sx * sx + sz * sz).sqrt();
        let sprinting = self.get(ParamId::SprintHeld) > 0.5;
        let cap = if sprinting {
            self.get(ParamId::SprintThreshold)
        } else {
            self.get(ParamId::WalkThreshold)
        };
        if planar > cap && planar > 0.0 {
            let scale = cap / planar;
            self.slots[ParamId::SpeedX.index()] = sx * scale;
            self.slots[ParamId::SpeedZ.index()] = sz * scale;
            planar = cap;
        }
        self.slots[ParamId::Speed.index()] = planar;

        let (walk, run, sprint) = if planar <= 0.01 {
            (0.0, 0.0, 0.0)
        } else if sprinting {
            (0.0, 0.0, 1.0)
        } else if planar > self.get(ParamId::RunThreshold) * 0.8 {
            (0.0, 1.0, 0.0)
        } else {
            (1.0, 0.0, 0.0)
        };
        self.slots[ParamId::IsWalking.index()] = walk;
        self.slots[ParamId::IsRunning.index()] = run;
        self.slots[ParamId::IsSprinting.index()] = sprint;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_seed_thresholds() {
        let ctx = ParamContext::new();
        assert_eq!(ctx.get(ParamId::RunThreshold), 1.0);
        assert_eq!(ctx.get(ParamId::Speed), 0.0);
    }

    #[test]
    fn named_float_resolves_enumerated_slot() {
        let mut ctx = ParamContext::new();
        ctx.set_float("speed", 3.0);
        assert_eq!(ctx.get(ParamId::Speed), 3.0);
        assert_eq!(ctx.get_float_named("speed"), 3.0);
    }

    #[test]
    fn triggers_expire_on_tick() {
        let mut ctx = ParamContext::new();
        ctx.set_trigger("jump");
        assert!(ctx.get_trigger("jump"));
        ctx.begin_tick();
        assert!(!ctx.get_trigger("jump"));
    }

    #[test]
    fn non_finite_writes_are_ignored() {
        let mut ctx = ParamContext::new();
        ctx.set_float("charge", 0.5);
        ctx.set_float("charge", f32::NAN);
        assert_eq!(ctx.get_float(&"charge".into()), 0.5);
    }

    #[test]
    fn fallback_pool_consulted_on_miss() {
        let mut pool = MapSource::default();
        pool.floats.insert("stamina".into(), 0.25);
        pool.bools.insert("armed".into(), true);
        let mut ctx = ParamContext::new().with_fallback(Arc::new(pool));
        assert_eq!(ctx.get_float(&"stamina".into()), 0.25);
        assert!(ctx.get_bool(&"armed".into()));
        ctx.set_float("stamina", 0.75);
        assert_eq!(ctx.get_float(&"stamina".into()), 0.75);
    }

    #[test]
    fn locomotion_caps_and_marks() {
        let mut ctx = ParamContext::new();
        ctx.set(ParamId::SpeedX, 3.0);
        ctx.set(ParamId::SpeedZ, 4.0);
        ctx.derive_locomotion();
        assert!((ctx.get(ParamId::Speed) - 0.65).abs() < 1e-5);
        assert_eq!(ctx.get(ParamId::IsWalking), 1.0);

        ctx.set(ParamId::SprintHeld, 1.0);
        ctx.set(ParamId::SpeedX, 3.0);
        ctx.set(ParamId::SpeedZ, 4.0);
        ctx.derive_locomotion();
        assert!((ctx.get(ParamId::Speed) - 1.5).abs() < 1e-5);
        assert_eq!(ctx.get(ParamId::IsSprinting), 1.0);
        assert_eq!(ctx.get(ParamId::IsWalking), 0.0);
    }

    #[test]
    fn clear_keeps_fallback() {
        let mut pool = MapSource::default();
        pool.ints.insert("combo".into(), 2);
        let mut ctx = ParamContext::new().with_fallback(Arc::new(pool));
        ctx.set_int("combo", 5);
        ctx.clear();
        assert_eq!(ctx.get_int("combo"), 2);
    }
}
