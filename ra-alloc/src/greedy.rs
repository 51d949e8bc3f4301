//! Greedy variant
//!
//! Each range walks the stage lattice: a plain assignment attempt, then an
//! eviction, then a deferral to `Split`, then the splitting engine, and
//! finally a spill. Products re-enter the queue at a later stage, so every
//! range eventually gets a register or runs out of options.

use crate::config::AllocConfig;
use crate::driver::{SelectOrSplit, Selection};
use crate::evict::{try_evict, EvictionPolicy, WeightEviction};
use crate::interference::InterferenceKind;
use crate::order::AllocationOrder;
use crate::queue::AllocQueue;
use crate::session::AllocSession;
use crate::split::{SplitOutcome, SplitPipeline, SplitStrategy};
use log::debug;
use ra_common::{AllocError, PhysReg, Stage, VirtReg};

pub struct GreedyAllocator<E = WeightEviction, S = SplitPipeline> {
    pub policy: E,
    pub splitter: S,
}

impl GreedyAllocator {
    pub fn new(config: &AllocConfig) -> Self {
        Self {
            policy: WeightEviction {
                max_depth: config.max_cascade_depth,
            },
            splitter: SplitPipeline,
        }
    }
}

impl<E: EvictionPolicy, S: SplitStrategy> GreedyAllocator<E, S> {
    pub fn with_parts(policy: E, splitter: S) -> Self {
        Self { policy, splitter }
    }

    /// First register in `order` with no interference at all
    fn try_assign(session: &mut AllocSession<'_>, vreg: VirtReg, order: &mut AllocationOrder) -> Option<PhysReg> {
        order.rewind();
        for preg in order.by_ref() {
            if session.matrix.check_interference(&session.lis, vreg, preg) == InterferenceKind::Free {
                return Some(preg);
            }
        }
        None
    }

    /// Taking an unused callee-saved register costs a save and a restore;
    /// a range at `Spill` that is cheaper to keep in memory should not pay it
    fn avoid_csr(session: &AllocSession<'_>, vreg: VirtReg, preg: PhysReg) -> bool {
        let csr_cost = session.config.csr_cost;
        if csr_cost <= 0.0
            || session.registry.stage(vreg) != Stage::Spill
            || !session.target.is_callee_saved(preg)
            || session.matrix.is_phys_used(preg)
        {
            return false;
        }
        session.lis.get(vreg).is_some_and(|li| session.lis.use_freq(li) < csr_cost)
    }

    fn spill_or_give_up(session: &mut AllocSession<'_>, vreg: VirtReg) -> Result<Selection, AllocError> {
        let li = session.interval(vreg)?;
        if !li.spillable || li.has_fixed_use() || session.registry.stage(vreg) >= Stage::Memory {
            return Ok(Selection::Exhausted);
        }
        debug!("spilling {}", vreg);
        Ok(Selection::Replaced(session.spill_range(vreg)))
    }
}

impl<E: EvictionPolicy, S: SplitStrategy> SelectOrSplit for GreedyAllocator<E, S> {
    fn select_or_split(
        &mut self,
        session: &mut AllocSession<'_>,
        queue: &mut dyn AllocQueue,
        vreg: VirtReg,
    ) -> Result<Selection, AllocError> {
        if session.registry.stage(vreg) == Stage::New {
            session.registry.set_stage(vreg, Stage::Assign);
        }
        let li = session.interval(vreg)?;
        let mut order = session.order.order(li.class, &li.hints);
        if order.is_empty() {
            return Ok(Selection::Exhausted);
        }

        if let Some(preg) = Self::try_assign(session, vreg, &mut order) {
            if !Self::avoid_csr(session, vreg, preg) {
                return Ok(Selection::Assigned(preg));
            }
            debug!(
                "{} is cheaper in memory than in callee-saved {}",
                vreg,
                session.target.reg_name(preg)
            );
            return Self::spill_or_give_up(session, vreg);
        }

        let stage = session.registry.stage(vreg);
        if stage != Stage::Split {
            if let Some(preg) = try_evict(&self.policy, session, queue, vreg, &mut order) {
                return Ok(Selection::Assigned(preg));
            }
        }

        // Give everything else a chance at a register before splitting
        if stage < Stage::Split {
            debug!("deferring {} to the split stage", vreg);
            session.registry.set_stage(vreg, Stage::Split);
            return Ok(Selection::Replaced(vec![vreg]));
        }

        if stage < Stage::Spill {
            match self.splitter.try_split(session, &self.policy, queue, vreg, &mut order)? {
                SplitOutcome::Assigned(preg) => return Ok(Selection::Assigned(preg)),
                SplitOutcome::Split(new) => return Ok(Selection::Replaced(new)),
                SplitOutcome::Declined => {}
            }
        }

        Self::spill_or_give_up(session, vreg)
    }
}
