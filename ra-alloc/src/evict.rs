//! Eviction
//!
//! A range that finds no free register may take one from ranges that are
//! worth less. Cascade numbers keep this from looping: an evicted range
//! inherits the cascade of its evictor and may only evict ranges with a
//! lower cascade, so two ranges can never keep evicting each other. On top
//! of that the chain of evictions started by one range is bounded by
//! `max_cascade_depth`.

use crate::live::LiveInterval;
use crate::monitor::HYSTERESIS;
use crate::order::AllocationOrder;
use crate::queue::AllocQueue;
use crate::session::AllocSession;
use log::{debug, trace};
use ra_common::{PhysReg, Stage, VirtReg};
use std::collections::BTreeMap;

/// Cost of evicting the interference of one register, compared
/// lexicographically
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvictionCost {
    /// Hints broken by the eviction
    pub broken_hints: u32,
    /// Heaviest spill weight among the evicted ranges
    pub max_weight: f32,
}

impl EvictionCost {
    pub fn max() -> Self {
        Self {
            broken_hints: u32::MAX,
            max_weight: f32::INFINITY,
        }
    }

    pub fn is_max(&self) -> bool {
        self.broken_hints == u32::MAX
    }

    pub fn less_than(&self, other: &EvictionCost) -> bool {
        (self.broken_hints, self.max_weight) < (other.broken_hints, other.max_weight)
    }
}

/// Eviction history: evictee -> (evictor, register it was evicted from)
#[derive(Debug, Clone, Default)]
pub struct EvictionTrack {
    evictees: BTreeMap<VirtReg, (VirtReg, PhysReg)>,
}

impl EvictionTrack {
    pub fn add_eviction(&mut self, preg: PhysReg, evictor: VirtReg, evictee: VirtReg) {
        self.evictees.insert(evictee, (evictor, preg));
    }

    pub fn evictor_of(&self, evictee: VirtReg) -> Option<(VirtReg, PhysReg)> {
        self.evictees.get(&evictee).copied()
    }

    pub fn clear_evictee(&mut self, evictee: VirtReg) {
        self.evictees.remove(&evictee);
    }

    /// Drop every entry mentioning `vreg`
    pub fn forget(&mut self, vreg: VirtReg) {
        self.evictees.retain(|evictee, (evictor, _)| *evictee != vreg && *evictor != vreg);
    }

    pub fn mentions(&self, vreg: VirtReg) -> bool {
        self.evictees.iter().any(|(evictee, (evictor, _))| *evictee == vreg || *evictor == vreg)
    }

    pub fn len(&self) -> usize {
        self.evictees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evictees.is_empty()
    }
}

/// Decides whether one range is worth more than another
pub trait EvictionPolicy {
    /// May `evictor` take the register of `evictee`?
    ///
    /// `is_hint` is set when the register is a hint of the evictor,
    /// `breaks_hint` when the evictee currently sits in one of its own hints.
    fn should_evict(
        &self,
        evictor: &LiveInterval,
        is_hint: bool,
        evictee: &LiveInterval,
        breaks_hint: bool,
        evictee_stage: Stage,
    ) -> bool;

    /// Longest eviction chain a range may extend
    fn max_cascade_depth(&self) -> u32;
}

/// Heavier ranges evict lighter ones
#[derive(Debug, Clone, Copy)]
pub struct WeightEviction {
    pub max_depth: u32,
}

impl Default for WeightEviction {
    fn default() -> Self {
        Self { max_depth: 8 }
    }
}

impl EvictionPolicy for WeightEviction {
    fn should_evict(
        &self,
        evictor: &LiveInterval,
        is_hint: bool,
        evictee: &LiveInterval,
        breaks_hint: bool,
        evictee_stage: Stage,
    ) -> bool {
        // A hint is worth taking from a range that can still be split
        if is_hint && !breaks_hint && evictee_stage < Stage::Spill {
            return true;
        }
        evictor.weight * HYSTERESIS > evictee.weight
    }

    fn max_cascade_depth(&self) -> u32 {
        self.max_depth
    }
}

/// Cost of evicting everything that keeps `vreg` out of `preg`, or `None`
/// when that is not allowed or not cheaper than `max_cost`
pub fn can_evict_interference<E: EvictionPolicy + ?Sized>(
    policy: &E,
    session: &mut AllocSession<'_>,
    vreg: VirtReg,
    preg: PhysReg,
    is_hint: bool,
    max_cost: &EvictionCost,
) -> Option<EvictionCost> {
    let q = session.matrix.query(&session.lis, vreg, preg);
    // Fixed ranges and clobbers cannot be moved out of the way
    if q.fixed || q.mask {
        return None;
    }
    let li = session.lis.get(vreg)?;
    let urgent_self = !li.spillable || li.weight.is_infinite();
    let cascade = session.registry.peek_cascade(vreg);
    if !q.vregs.is_empty() && session.registry.depth(vreg) + 1 > policy.max_cascade_depth() {
        trace!("{} may not extend its eviction chain", vreg);
        return None;
    }
    let own_choices = session.order.order(li.class, &[]).len();

    let mut cost = EvictionCost::default();
    for &other in &q.vregs {
        let evictee = session.lis.get(other)?;
        let stage = session.registry.stage(other);
        if stage == Stage::Done {
            return None;
        }
        let urgent = urgent_self && evictee.weight.is_finite();
        if cascade <= session.registry.cascade(other) {
            if !urgent {
                return None;
            }
            // Breaking the cascade is a last resort
            cost.broken_hints += 10;
        }
        let breaks_hint = session.matrix.phys(other).is_some_and(|p| evictee.hints.contains(&p));
        cost.broken_hints += u32::from(breaks_hint);
        cost.max_weight = cost.max_weight.max(evictee.weight);
        if !cost.less_than(max_cost) {
            return None;
        }
        if urgent {
            continue;
        }
        // A range with fewer registers to go to keeps the one it has
        if session.order.order(evictee.class, &[]).len() < own_choices {
            return None;
        }
        if !policy.should_evict(li, is_hint, evictee, breaks_hint, stage) {
            return None;
        }
    }
    trace!("{} can evict {:?} from {} at {:?}", vreg, q.vregs, preg, cost);
    Some(cost)
}

/// Evict everything interfering with `vreg` in `preg` and requeue it
pub fn evict_interference(
    session: &mut AllocSession<'_>,
    queue: &mut dyn AllocQueue,
    vreg: VirtReg,
    preg: PhysReg,
) -> Vec<VirtReg> {
    let q = session.matrix.query(&session.lis, vreg, preg);
    let cascade = session.registry.ensure_cascade(vreg);
    let depth = session.registry.depth(vreg) + 1;
    for &other in &q.vregs {
        debug!(
            "{} evicts {} from {} (cascade {}, depth {})",
            vreg,
            other,
            session.target.reg_name(preg),
            cascade,
            depth
        );
        session.matrix.unassign(other);
        session.evictions.add_eviction(preg, vreg, other);
        session.registry.set_evicted(other, cascade, depth);
        queue.enqueue(&session.lis, &session.registry, other);
        session.stats.evictions += 1;
    }
    q.vregs
}

/// Find the cheapest register to evict for `vreg`; the eviction is done and
/// the register returned
pub fn try_evict<E: EvictionPolicy + ?Sized>(
    policy: &E,
    session: &mut AllocSession<'_>,
    queue: &mut dyn AllocQueue,
    vreg: VirtReg,
    order: &mut AllocationOrder,
) -> Option<PhysReg> {
    let mut best_cost = EvictionCost::max();
    let mut best = None;
    order.rewind();
    while let Some(preg) = order.next() {
        let is_hint = order.is_hint(preg);
        if let Some(cost) = can_evict_interference(policy, session, vreg, preg, is_hint, &best_cost) {
            best_cost = cost;
            best = Some(preg);
            if is_hint {
                break;
            }
        }
    }
    let preg = best?;
    evict_interference(session, queue, vreg, preg);
    Some(preg)
}
