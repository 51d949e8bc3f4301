//! Basic variant: heaviest ranges first, no splitting. A range that finds no
//! free register either spills the lighter ranges in its way or spills itself.

use crate::driver::{SelectOrSplit, Selection};
use crate::interference::InterferenceKind;
use crate::queue::AllocQueue;
use crate::session::AllocSession;
use log::debug;
use ra_common::{AllocError, PhysReg, VirtReg};

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicAllocator;

impl BasicAllocator {
    /// A register whose whole interference is spillable and lighter than `vreg`
    fn cheaper_interference(session: &mut AllocSession<'_>, vreg: VirtReg) -> Result<Option<(PhysReg, Vec<VirtReg>)>, AllocError> {
        let li = session.interval(vreg)?;
        let (class, weight) = (li.class, li.weight);
        let order = session.order.order(class, &li.hints);
        for preg in order {
            let q = session.matrix.query(&session.lis, vreg, preg);
            if q.fixed || q.mask || q.vregs.is_empty() {
                continue;
            }
            let cheaper = q.vregs.iter().all(|v| {
                session
                    .lis
                    .get(*v)
                    .is_some_and(|other| other.spillable && !other.has_fixed_use() && other.weight < weight)
            });
            if cheaper {
                return Ok(Some((preg, q.vregs)));
            }
        }
        Ok(None)
    }
}

impl SelectOrSplit for BasicAllocator {
    fn select_or_split(
        &mut self,
        session: &mut AllocSession<'_>,
        queue: &mut dyn AllocQueue,
        vreg: VirtReg,
    ) -> Result<Selection, AllocError> {
        let li = session.interval(vreg)?;
        let order = session.order.order(li.class, &li.hints);
        if order.is_empty() {
            return Ok(Selection::Exhausted);
        }
        for preg in order {
            if session.matrix.check_interference(&session.lis, vreg, preg) == InterferenceKind::Free {
                return Ok(Selection::Assigned(preg));
            }
        }

        if let Some((preg, victims)) = Self::cheaper_interference(session, vreg)? {
            for victim in victims {
                debug!("{} spills {} out of {}", vreg, victim, session.target.reg_name(preg));
                let products = session.spill_range(victim);
                session.enqueue_new(queue, &products);
            }
            return Ok(Selection::Assigned(preg));
        }

        let li = session.interval(vreg)?;
        if !li.spillable || li.has_fixed_use() {
            return Ok(Selection::Exhausted);
        }
        debug!("spilling {}", vreg);
        Ok(Selection::Replaced(session.spill_range(vreg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocConfig;
    use crate::driver::allocate_phys_regs;
    use crate::function::{Block, Function, UseSlot, VRegDesc};
    use crate::queue::SpillWeightQueue;
    use crate::target::TargetInfo;
    use pretty_assertions::assert_eq;
    use ra_common::{RegClassId, Segment};

    #[test]
    fn test_lighter_range_goes_to_memory() {
        let mut func = Function::new("basic");
        func.blocks = vec![Block::new(0, 40, 1.0)];
        func.vregs.push(VRegDesc {
            id: VirtReg::new(0),
            class: RegClassId(0),
            segments: vec![Segment::new(0, 30)],
            uses: vec![UseSlot::def(0), UseSlot::read(29)],
            hints: Vec::new(),
        });
        func.vregs.push(VRegDesc {
            id: VirtReg::new(1),
            class: RegClassId(0),
            segments: vec![Segment::new(10, 14)],
            uses: vec![UseSlot::def(10), UseSlot::read(11), UseSlot::read(13)],
            hints: Vec::new(),
        });
        let target = TargetInfo::uniform(1);
        let config = AllocConfig::default();
        let mut session = AllocSession::new(&func, &target, &config).unwrap();
        allocate_phys_regs(&mut session, &mut SpillWeightQueue::new(), &mut BasicAllocator).unwrap();

        assert_eq!(session.matrix.phys(VirtReg::new(1)), Some(PhysReg::new(0)));
        assert_eq!(session.stats.spills, 1);
        assert!(session.spiller.slots().contains_key(&VirtReg::new(0)));
        // Both reload/store ranges of the light range found room
        assert!(session.forced().is_empty());
        assert_eq!(session.pending(), Vec::<VirtReg>::new());
    }
}
