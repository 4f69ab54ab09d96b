//! Short-lived memo of refused state entries.
//!
//! A denied state is not re-evaluated until its memo times out or the cache
//! is marked dirty by a state change (enter, exit, degrade).

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::ids::StateId;

pub const DEFAULT_DENIAL_TIMEOUT: f32 = 1.0;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    #[default]
    None,
    ConditionNotMet,
    PriorityTooLow,
    SamePathDegrading,
    InTransition,
    ManualBlock,
    CostNotEnough,
    UnknownState,
}

#[derive(Copy, Clone, Debug)]
struct Memo {
    at: f64,
    reason: DenialReason,
}

#[derive(Clone, Debug)]
pub struct DenialCache {
    memos: HashMap<StateId, Memo>,
    dirty: bool,
    timeout: f32,
}

impl Default for DenialCache {
    fn default() -> Self {
        Self::new(DEFAULT_DENIAL_TIMEOUT)
    }
}

impl DenialCache {
    pub fn new(timeout: f32) -> Self {
        Self {
            memos: HashMap::new(),
            dirty: false,
            timeout: timeout.max(0.0),
        }
    }

    /// True while a fresh memo exists and the cache is clean. Expired memos
    /// are dropped on lookup.
    pub fn is_denied(&mut self, state: StateId, now: f64) -> bool {
        if self.dirty {
            return false;
        }
        match self.memos.get(&state) {
            Some(memo) if now - memo.at > f64::from(self.timeout) => {
                self.memos.remove(&state);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn record_denial(&mut self, state: StateId, reason: DenialReason, now: f64) {
        self.memos.insert(state, Memo { at: now, reason });
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drops every memo if dirty; otherwise does nothing.
    pub fn refresh(&mut self) {
        if self.dirty {
            self.memos.clear();
            self.dirty = false;
        }
    }

    pub fn remove(&mut self, state: StateId) {
        self.memos.remove(&state);
    }

    /// Last recorded reason, `None` when there is no memo.
    pub fn reason(&self, state: StateId) -> DenialReason {
        self.memos.get(&state).map_or(DenialReason::None, |m| m.reason)
    }

    pub fn clear(&mut self) {
        self.memos.clear();
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.memos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memos.is_empty()
    }

    pub fn timeout(&self) -> f32 {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: StateId = StateId(7);

    #[test]
    fn memo_expires_after_timeout() {
        let mut cache = DenialCache::default();
        cache.record_denial(S, DenialReason::CostNotEnough, 10.0);
        assert!(cache.is_denied(S, 10.5));
        assert!(cache.is_denied(S, 11.0));
        assert!(!cache.is_denied(S, 11.01));
        assert_eq!(cache.reason(S), DenialReason::None);
    }

    #[test]
    fn dirty_cache_denies_nothing_until_refreshed() {
        let mut cache = DenialCache::default();
        cache.record_denial(S, DenialReason::PriorityTooLow, 0.0);
        cache.mark_dirty();
        assert!(!cache.is_denied(S, 0.1));
        assert_eq!(cache.reason(S), DenialReason::PriorityTooLow);

        cache.refresh();
        assert!(!cache.is_dirty());
        assert!(cache.is_empty());
        assert!(!cache.is_denied(S, 0.2));
    }

    #[test]
    fn refresh_is_a_no_op_when_clean() {
        let mut cache = DenialCache::default();
        cache.record_denial(S, DenialReason::ManualBlock, 0.0);
        cache.refresh();
        assert!(cache.is_denied(S, 0.5));
    }
}
