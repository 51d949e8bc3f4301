//! Potential spill cost of the current allocation state

use crate::interference::InterferenceLayer;
use crate::live::LiveIntervals;
use log::trace;

pub trait CostModel {
    fn potential_spill_cost(&self, lis: &LiveIntervals, matrix: &dyn InterferenceLayer) -> f32;
}

/// Weight already sent to memory plus the weight of every spillable range
/// still waiting for a register
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingWeightCost;

impl CostModel for PendingWeightCost {
    fn potential_spill_cost(&self, lis: &LiveIntervals, matrix: &dyn InterferenceLayer) -> f32 {
        let pending: f32 = lis
            .iter()
            .filter(|li| !li.is_empty() && li.weight.is_finite() && matrix.phys(li.reg).is_none())
            .map(|li| li.weight)
            .sum();
        let cost = lis.spilled_weight() + pending;
        trace!("potential spill cost {} (spilled {})", cost, lis.spilled_weight());
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Block, Function, UseSlot, VRegDesc};
    use crate::interference::LiveRegMatrix;
    use crate::spiller::{InlineSpiller, Spiller};
    use crate::target::TargetInfo;
    use ra_common::{PhysReg, RegClassId, Segment, VirtReg};

    #[test]
    fn test_cost_tracks_assignment_and_spills() {
        let mut func = Function::new("f");
        func.blocks = vec![Block::new(0, 10, 1.0)];
        for id in 0..2u32 {
            func.vregs.push(VRegDesc {
                id: VirtReg::new(id),
                class: RegClassId(0),
                segments: vec![Segment::new(0, 5)],
                uses: vec![UseSlot::def(0), UseSlot::read(4)],
                hints: Vec::new(),
            });
        }
        let target = TargetInfo::uniform(1);
        let mut lis = LiveIntervals::new(&func);
        let mut matrix = LiveRegMatrix::new(&target, &func);
        let weight = 2.0 / 30.0;

        let cost = PendingWeightCost.potential_spill_cost(&lis, &matrix);
        assert!((cost - 2.0 * weight).abs() < 1e-6);

        matrix.assign(&lis, VirtReg::new(0), PhysReg::new(0));
        let cost = PendingWeightCost.potential_spill_cost(&lis, &matrix);
        assert!((cost - weight).abs() < 1e-6);

        // Spill products are unspillable and do not count again
        InlineSpiller::new().spill(&mut lis, VirtReg::new(1));
        let cost = PendingWeightCost.potential_spill_cost(&lis, &matrix);
        assert!((cost - weight).abs() < 1e-6);
    }
}
