//! Splitting engine
//!
//! When neither a free register nor an eviction works, the range is carved
//! into smaller ranges that are easier to place. The strategies run in a
//! fixed order per stage and each one either splits or declines:
//!
//! - region split over block groups, for ranges crossing blocks
//! - block split around the uses in each block
//! - local split, inside a single block
//! - instruction split around every use, the finest granularity
//!
//! Products of region, block and local splits come back at `Split2`, which
//! only allows an instruction split. Instruction split products come back at
//! `Spill`. Spilling is the last resort and lives in the greedy variant.

mod analysis;
mod block;
mod editor;
mod instr;
mod local;
mod region;

pub use analysis::{BlockInfo, SplitAnalysis};
pub use editor::SplitEditor;

use crate::evict::EvictionPolicy;
use crate::order::AllocationOrder;
use crate::queue::AllocQueue;
use crate::session::AllocSession;
use log::debug;
use ra_common::{AllocError, PhysReg, Stage, VirtReg};

/// What a split attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    /// Evicting turned out cheaper than splitting; the register is free now
    Assigned(PhysReg),
    /// The range was retired in favor of these
    Split(Vec<VirtReg>),
    Declined,
}

pub trait SplitStrategy {
    fn try_split(
        &mut self,
        session: &mut AllocSession<'_>,
        policy: &dyn EvictionPolicy,
        queue: &mut dyn AllocQueue,
        vreg: VirtReg,
        order: &mut AllocationOrder,
    ) -> Result<SplitOutcome, AllocError>;
}

/// The standard strategy order
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitPipeline;

impl SplitStrategy for SplitPipeline {
    fn try_split(
        &mut self,
        session: &mut AllocSession<'_>,
        policy: &dyn EvictionPolicy,
        queue: &mut dyn AllocQueue,
        vreg: VirtReg,
        order: &mut AllocationOrder,
    ) -> Result<SplitOutcome, AllocError> {
        let stage = session.registry.stage(vreg);
        let sa = SplitAnalysis::new(session.interval(vreg)?, &session.lis);

        if sa.is_local() {
            if stage < Stage::Split2 {
                let new = local::try_local_split(session, vreg, order, &sa)?;
                if !new.is_empty() {
                    return Ok(SplitOutcome::Split(new));
                }
            }
            return split_around_instructions(session, vreg);
        }

        if stage < Stage::Split2 {
            match region::try_region_split(session, policy, queue, vreg, order, &sa)? {
                SplitOutcome::Declined => {}
                done => return Ok(done),
            }
            let new = block::try_block_split(session, vreg, &sa);
            if !new.is_empty() {
                return Ok(SplitOutcome::Split(new));
            }
        }
        split_around_instructions(session, vreg)
    }
}

fn split_around_instructions(session: &mut AllocSession<'_>, vreg: VirtReg) -> Result<SplitOutcome, AllocError> {
    let new = instr::try_instruction_split(session, vreg)?;
    if new.is_empty() {
        debug!("no split found for {}", vreg);
        Ok(SplitOutcome::Declined)
    } else {
        Ok(SplitOutcome::Split(new))
    }
}
