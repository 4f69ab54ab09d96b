//! Channel-partitioned cost accounting.
//!
//! Every channel carries an occupancy in `[0, 1]` that is derived from the
//! contributions of the states holding it. Contributions are kept per holder
//! in insertion order, so consuming a cost and returning it immediately
//! restores the previous occupancy bit for bit.

use std::sync::Arc;

use log::{debug, trace};

use crate::channel::ChannelMask;
use crate::cost::CostSpec;
use crate::ids::StateId;

/// Holders whose contribution (or whose channel's occupancy) falls to this
/// level are dropped from the channel.
pub const DEFAULT_RELEASE_THRESHOLD: f32 = 0.01;

const AFFORD_EPSILON: f32 = 1e-5;

#[derive(Clone, Copy, Debug)]
struct Holding {
    state: StateId,
    amount: f32,
}

#[derive(Clone, Debug, Default)]
struct Channel {
    occupancy: f32,
    holders: Vec<Holding>,
}

impl Channel {
    fn recompute(&mut self) {
        let sum: f32 = self.holders.iter().map(|h| h.amount).sum();
        self.occupancy = sum.clamp(0.0, 1.0);
    }

    fn occupancy_without(&self, skip: &dyn Fn(StateId) -> bool) -> f32 {
        let sum: f32 = self
            .holders
            .iter()
            .filter(|h| !skip(h.state))
            .map(|h| h.amount)
            .sum();
        sum.clamp(0.0, 1.0)
    }

    fn holds(&self, state: StateId) -> bool {
        self.holders.iter().any(|h| h.state == state)
    }

    fn add(&mut self, state: StateId, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        match self.holders.iter_mut().find(|h| h.state == state) {
            Some(h) => h.amount += amount,
            None => self.holders.push(Holding { state, amount }),
        }
        self.recompute();
    }

    fn take(&mut self, state: StateId, amount: f32, threshold: f32) {
        let Some(pos) = self.holders.iter().position(|h| h.state == state) else {
            return;
        };
        let left = (self.holders[pos].amount - amount).max(0.0);
        self.holders[pos].amount = left;
        self.recompute();
        if left <= threshold || self.occupancy <= threshold {
            self.holders.remove(pos);
            self.recompute();
        }
    }

    fn release(&mut self, state: StateId) -> bool {
        let before = self.holders.len();
        self.holders.retain(|h| h.state != state);
        if self.holders.len() != before {
            self.recompute();
            true
        } else {
            false
        }
    }
}

/// A cost being handed back over time.
#[derive(Clone, Debug)]
pub struct ScheduledReturn {
    pub state: StateId,
    pub cost: Arc<CostSpec>,
    pub start: f64,
    pub duration: f32,
    /// Fraction of each part already returned on its progressive channels.
    returned: Vec<f32>,
}

impl ScheduledReturn {
    pub fn returned(&self) -> &[f32] {
        &self.returned
    }
}

#[derive(Clone, Debug)]
pub struct CostLedger {
    channels: Vec<Channel>,
    schedules: Vec<ScheduledReturn>,
    release_threshold: f32,
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl CostLedger {
    pub fn new() -> Self {
        Self::with_release_threshold(DEFAULT_RELEASE_THRESHOLD)
    }

    pub fn with_release_threshold(release_threshold: f32) -> Self {
        Self {
            channels: vec![Channel::default(); ChannelMask::CAPACITY],
            schedules: Vec::new(),
            release_threshold: release_threshold.max(0.0),
        }
    }

    /// True when every channel of every part has room for the part's cost.
    /// With `allow_interrupt`, a channel `state` already holds always passes
    /// so a running state can renew itself. A missing cost is always
    /// affordable.
    pub fn can_afford(&self, cost: Option<&CostSpec>, state: StateId, allow_interrupt: bool) -> bool {
        let renewing = allow_interrupt.then_some(state);
        self.fits(cost, renewing, &|_| false)
    }

    /// Like [`can_afford`](Self::can_afford) with interruption, but also
    /// treats `replacing`'s holdings as free (the state being left).
    pub fn can_afford_replacing(
        &self,
        cost: Option<&CostSpec>,
        state: StateId,
        replacing: Option<StateId>,
    ) -> bool {
        match replacing {
            Some(other) => self.fits(cost, Some(state), &|holder| holder == other),
            None => self.can_afford(cost, state, true),
        }
    }

    fn fits(&self, cost: Option<&CostSpec>, renewing: Option<StateId>, free: &dyn Fn(StateId) -> bool) -> bool {
        let Some(cost) = cost else {
            return true;
        };
        let mut demand = [0.0f32; ChannelMask::CAPACITY];
        for part in cost.parts() {
            for ch in part.mask.channels() {
                demand[ch] += part.cost();
            }
        }
        demand.iter().enumerate().all(|(ch, need)| {
            let channel = &self.channels[ch];
            *need <= 0.0
                || renewing.is_some_and(|s| channel.holds(s))
                || {
                    let free_room = 1.0 - channel.occupancy_without(free);
                    free_room + AFFORD_EPSILON >= *need
                }
        })
    }

    /// Adds every part's cost to its channels and registers `state` as holder.
    pub fn consume(&mut self, cost: Option<&CostSpec>, state: StateId) {
        let Some(cost) = cost else {
            return;
        };
        for part in cost.parts() {
            let amount = part.cost();
            for ch in part.mask.channels() {
                self.channels[ch].add(state, amount);
            }
        }
    }

    /// Starts returning `cost` progressively from `start` over `duration`
    /// seconds. A non-positive duration returns everything on the first tick
    /// at or after `start`.
    pub fn schedule_return(&mut self, cost: Arc<CostSpec>, state: StateId, start: f64, duration: f32) {
        let returned = vec![0.0; cost.part_count()];
        self.schedules.push(ScheduledReturn {
            state,
            cost,
            start,
            duration,
            returned,
        });
    }

    /// Hands back the whole cost now and cancels any schedule for `state`.
    pub fn return_immediately(&mut self, cost: Option<&CostSpec>, state: StateId) {
        self.cancel_schedules(state);
        let Some(cost) = cost else {
            return;
        };
        for part in cost.parts() {
            self.take_mask(state, part.mask, part.cost());
        }
    }

    /// Drops everything `state` holds on every channel and cancels its
    /// schedules. Returns true when it held anything.
    pub fn release_state(&mut self, state: StateId) -> bool {
        self.cancel_schedules(state);
        let mut held = false;
        for channel in &mut self.channels {
            held |= channel.release(state);
        }
        held
    }

    pub fn cancel_schedules(&mut self, state: StateId) {
        self.schedules.retain(|s| s.state != state);
    }

    /// Advances every scheduled return to `now`; finished schedules are
    /// removed. Returns how many finished.
    pub fn tick(&mut self, now: f64) -> usize {
        if self.schedules.is_empty() {
            return 0;
        }
        let mut schedules = std::mem::take(&mut self.schedules);
        let before = schedules.len();
        schedules.retain_mut(|s| !self.advance(s, now));
        let finished = before - schedules.len();
        self.schedules = schedules;
        finished
    }

    fn advance(&mut self, schedule: &mut ScheduledReturn, now: f64) -> bool {
        let elapsed = (now - schedule.start) as f32;
        if elapsed < 0.0 {
            return false;
        }
        let complete = schedule.duration <= 0.0 || elapsed >= schedule.duration;
        let cost = Arc::clone(&schedule.cost);
        for (i, part) in cost.parts().enumerate() {
            let progressive = part.progressive_mask();
            let done = schedule.returned[i];
            if complete {
                if done < 1.0 {
                    self.take_mask(schedule.state, progressive, part.cost() * (1.0 - done));
                }
                self.take_mask(schedule.state, part.mask & !progressive, part.cost());
                schedule.returned[i] = 1.0;
            } else {
                let target = part.return_fraction(elapsed / schedule.duration).max(done);
                if target > done {
                    trace!("state {} part {i}: returned {target:.3}", schedule.state);
                    self.take_mask(schedule.state, progressive, part.cost() * (target - done));
                    schedule.returned[i] = target;
                }
            }
        }
        if complete {
            debug!("cost return for state {} complete", schedule.state);
        }
        complete
    }

    fn take_mask(&mut self, state: StateId, mask: ChannelMask, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        let threshold = self.release_threshold;
        for ch in mask.channels() {
            self.channels[ch].take(state, amount, threshold);
        }
    }

    /// Occupancy of channel index `channel` (0 when out of range).
    pub fn occupancy(&self, channel: usize) -> f32 {
        self.channels.get(channel).map_or(0.0, |c| c.occupancy)
    }

    /// Highest occupancy among the channels of `mask`.
    pub fn occupancy_of(&self, mask: ChannelMask) -> f32 {
        mask.channels()
            .map(|ch| self.channels[ch].occupancy)
            .fold(0.0, f32::max)
    }

    /// States holding channel index `channel`, in the order they arrived.
    pub fn holders(&self, channel: usize) -> impl Iterator<Item = StateId> + '_ {
        self.channels
            .get(channel)
            .into_iter()
            .flat_map(|c| c.holders.iter().map(|h| h.state))
    }

    /// What `state` contributes to channel index `channel`.
    pub fn contribution(&self, channel: usize, state: StateId) -> f32 {
        self.channels
            .get(channel)
            .and_then(|c| c.holders.iter().find(|h| h.state == state))
            .map_or(0.0, |h| h.amount)
    }

    pub fn holds_any(&self, state: StateId) -> bool {
        self.channels
            .iter()
            .any(|c| c.holders.iter().any(|h| h.state == state))
    }

    pub fn pending_returns(&self) -> usize {
        self.schedules.len()
    }

    pub fn schedules(&self) -> &[ScheduledReturn] {
        &self.schedules
    }

    pub fn release_threshold(&self) -> f32 {
        self.release_threshold
    }

    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.holders.clear();
            channel.occupancy = 0.0;
        }
        self.schedules.clear();
    }
}
