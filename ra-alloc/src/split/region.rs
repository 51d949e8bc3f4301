//! Region splitting
//!
//! For each candidate register, find the blocks where the range could live
//! in it without interference, then choose which of those blocks actually
//! hold the register. Blocks left out keep the value in memory and pay one
//! access per use; every switch between the two at a block boundary pays
//! for a copy. Everything is weighted by block frequency.

use super::analysis::{BlockInfo, SplitAnalysis};
use super::editor::SplitEditor;
use super::SplitOutcome;
use crate::evict::{can_evict_interference, evict_interference, EvictionCost, EvictionPolicy};
use crate::interference::Occupant;
use crate::order::AllocationOrder;
use crate::queue::AllocQueue;
use crate::session::AllocSession;
use log::{debug, trace};
use ra_common::{AllocError, PhysReg, Stage, VirtReg};

/// Passes of the placement improvement loop
const PLACEMENT_PASSES: usize = 8;

#[derive(Debug, Clone)]
struct Candidate {
    preg: PhysReg,
    in_reg: Vec<bool>,
    cost: f32,
    /// The range was evicted from this register before
    evicted_from: bool,
    groups: usize,
}

impl Candidate {
    fn better_than(&self, other: &Candidate) -> bool {
        match (self.evicted_from, other.evicted_from) {
            (false, true) => return true,
            (true, false) => return false,
            _ => {}
        }
        if self.cost != other.cost {
            return self.cost < other.cost;
        }
        self.groups < other.groups
    }
}

fn block_cost(b: &BlockInfo, in_reg: bool) -> f32 {
    if in_reg {
        0.0
    } else {
        b.uses.len() as f32 * b.freq
    }
}

fn boundary_cost(a: &BlockInfo, b: &BlockInfo, ra: bool, rb: bool) -> f32 {
    if ra != rb && a.block + 1 == b.block && a.live_out && b.live_in {
        a.freq.min(b.freq)
    } else {
        0.0
    }
}

fn placement_cost(blocks: &[BlockInfo], in_reg: &[bool]) -> f32 {
    let mut cost: f32 = blocks.iter().zip(in_reg).map(|(b, r)| block_cost(b, *r)).sum();
    for i in 1..blocks.len() {
        cost += boundary_cost(&blocks[i - 1], &blocks[i], in_reg[i - 1], in_reg[i]);
    }
    cost
}

/// Cost of block `i` and its two boundaries if it were placed as `r`
fn local_cost(blocks: &[BlockInfo], in_reg: &[bool], i: usize, r: bool) -> f32 {
    let mut cost = block_cost(&blocks[i], r);
    if i > 0 {
        cost += boundary_cost(&blocks[i - 1], &blocks[i], in_reg[i - 1], r);
    }
    if i + 1 < blocks.len() {
        cost += boundary_cost(&blocks[i], &blocks[i + 1], r, in_reg[i + 1]);
    }
    cost
}

/// Start from every free block and flip blocks while that helps
fn place(blocks: &[BlockInfo], free: &[bool]) -> Vec<bool> {
    let mut in_reg = free.to_vec();
    for _ in 0..PLACEMENT_PASSES {
        let mut changed = false;
        for i in 0..blocks.len() {
            if !free[i] {
                continue;
            }
            let keep = local_cost(blocks, &in_reg, i, in_reg[i]);
            let flip = local_cost(blocks, &in_reg, i, !in_reg[i]);
            if flip < keep {
                in_reg[i] = !in_reg[i];
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    in_reg
}

fn count_groups(in_reg: &[bool]) -> usize {
    let mut groups = 0;
    let mut prev = false;
    for &r in in_reg {
        if r && !prev {
            groups += 1;
        }
        prev = r;
    }
    groups
}

fn free_blocks(session: &AllocSession<'_>, vreg: VirtReg, preg: PhysReg, sa: &SplitAnalysis) -> Vec<bool> {
    let occupied = session.matrix.occupied(preg);
    sa.blocks
        .iter()
        .map(|b| {
            !b.live.iter().any(|seg| {
                occupied
                    .iter()
                    .any(|o| o.occupant != Occupant::Virt(vreg) && o.segment.overlaps(seg))
            })
        })
        .collect()
}

/// Cheapest register to evict for `vreg`, with the memory traffic the
/// evicted ranges stand to cause
fn cheapest_eviction(
    session: &mut AllocSession<'_>,
    policy: &dyn EvictionPolicy,
    vreg: VirtReg,
    order: &AllocationOrder,
) -> Option<(PhysReg, f32)> {
    let mut best: Option<(PhysReg, f32)> = None;
    for &preg in order.as_slice() {
        let is_hint = order.is_hint(preg);
        if can_evict_interference(policy, session, vreg, preg, is_hint, &EvictionCost::max()).is_none() {
            continue;
        }
        let q = session.matrix.query(&session.lis, vreg, preg);
        let cost: f32 = q
            .vregs
            .iter()
            .filter_map(|v| session.lis.get(*v))
            .map(|li| session.lis.use_freq(li))
            .sum();
        if best.is_none_or(|(_, c)| cost < c) {
            best = Some((preg, cost));
        }
    }
    best
}

pub(crate) fn try_region_split(
    session: &mut AllocSession<'_>,
    policy: &dyn EvictionPolicy,
    queue: &mut dyn AllocQueue,
    vreg: VirtReg,
    order: &mut AllocationOrder,
    sa: &SplitAnalysis,
) -> Result<SplitOutcome, AllocError> {
    let li = session.interval(vreg)?;
    let spill_cost = session.lis.use_freq(li);
    let previous = session.evictions.evictor_of(vreg).map(|(_, preg)| preg);
    let limit = session.config.region_split_candidates.max(1);

    let mut best: Option<Candidate> = None;
    for &preg in order.as_slice().iter().take(limit) {
        let free = free_blocks(session, vreg, preg, sa);
        if !sa.blocks.iter().zip(&free).any(|(b, f)| *f && b.has_uses()) {
            continue;
        }
        let in_reg = place(&sa.blocks, &free);
        if in_reg.iter().all(|r| *r) || !in_reg.iter().any(|r| *r) {
            continue;
        }
        let mut cost = placement_cost(&sa.blocks, &in_reg);
        if session.target.is_callee_saved(preg) && !session.matrix.is_phys_used(preg) {
            cost += session.config.csr_cost;
        }
        let candidate = Candidate {
            preg,
            groups: count_groups(&in_reg),
            in_reg,
            cost,
            evicted_from: previous == Some(preg),
        };
        trace!(
            "region split of {} into {}: cost {} over {} groups",
            vreg,
            session.target.reg_name(preg),
            candidate.cost,
            candidate.groups
        );
        if best.as_ref().is_none_or(|b| candidate.better_than(b)) {
            best = Some(candidate);
        }
    }

    let Some(best) = best else {
        return Ok(SplitOutcome::Declined);
    };
    if best.cost >= spill_cost {
        trace!("region split of {} costs {} vs spill {}", vreg, best.cost, spill_cost);
        return Ok(SplitOutcome::Declined);
    }
    if let Some((preg, evict_cost)) = cheapest_eviction(session, policy, vreg, order) {
        if evict_cost < best.cost {
            debug!("evicting beats region split for {} ({} < {})", vreg, evict_cost, best.cost);
            evict_interference(session, queue, vreg, preg);
            return Ok(SplitOutcome::Assigned(preg));
        }
    }

    let mut editor = SplitEditor::new(vreg);
    let piece = editor.open_interval(Some(best.preg));
    for (b, in_reg) in sa.blocks.iter().zip(&best.in_reg) {
        if *in_reg {
            editor.add(piece, b.live.iter().copied());
        }
    }
    let new = editor.finish(session, Stage::Split2);
    if new.is_empty() {
        return Ok(SplitOutcome::Declined);
    }
    debug!("region split {} around {}", vreg, session.target.reg_name(best.preg));
    Ok(SplitOutcome::Split(new))
}
