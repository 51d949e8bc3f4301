//! Splitting inside a single block
//!
//! Look for a window of consecutive uses whose gaps are only occupied by
//! ranges lighter than the window itself would be. The window gets its own
//! range hinted to that register; the rest of the block stays behind.

use super::analysis::SplitAnalysis;
use super::editor::SplitEditor;
use crate::interference::Occupant;
use crate::live::{clip, WEIGHT_SIZE_BIAS};
use crate::monitor::HYSTERESIS;
use crate::order::AllocationOrder;
use crate::session::AllocSession;
use log::{debug, trace};
use ra_common::{AllocError, PhysReg, Segment, SlotIndex, Stage, VirtReg};

#[derive(Debug, Clone, Copy)]
struct Window {
    first: usize,
    last: usize,
    preg: PhysReg,
    span: u32,
}

impl Window {
    fn uses(&self) -> usize {
        self.last - self.first + 1
    }

    fn better_than(&self, other: &Window) -> bool {
        (self.uses(), std::cmp::Reverse(self.span)) > (other.uses(), std::cmp::Reverse(other.span))
    }
}

/// Heaviest interference in the gap between each pair of consecutive uses
fn gap_weights(session: &AllocSession<'_>, vreg: VirtReg, preg: PhysReg, live: &[Segment], slots: &[SlotIndex]) -> Vec<f32> {
    let occupied = session.matrix.occupied(preg);
    slots
        .windows(2)
        .map(|pair| {
            let gap = clip(live, &Segment::new(pair[0], pair[1] + 1));
            occupied
                .iter()
                .filter(|o| o.occupant != Occupant::Virt(vreg))
                .filter(|o| gap.iter().any(|g| g.overlaps(&o.segment)))
                .map(|o| match o.occupant {
                    Occupant::Virt(other) => session.lis.get(other).map_or(0.0, |li| li.weight),
                    Occupant::Fixed(_) | Occupant::Mask => f32::INFINITY,
                })
                .fold(0.0, f32::max)
        })
        .collect()
}

pub(crate) fn try_local_split(
    session: &mut AllocSession<'_>,
    vreg: VirtReg,
    order: &AllocationOrder,
    sa: &SplitAnalysis,
) -> Result<Vec<VirtReg>, AllocError> {
    let li = session.interval(vreg)?;
    let slots = li.use_slots();
    // A window must leave at least one use outside
    if slots.len() < 3 {
        return Ok(Vec::new());
    }
    let live = li.segments.clone();
    let freq = sa.blocks.first().map_or(1.0, |b| b.freq);
    let limit = session.config.region_split_candidates.max(1);

    let mut best: Option<Window> = None;
    for &preg in order.as_slice().iter().take(limit) {
        let gaps = gap_weights(session, vreg, preg, &live, &slots);
        for first in 0..slots.len() - 1 {
            let mut max_gap: f32 = 0.0;
            for last in first + 1..slots.len() {
                max_gap = max_gap.max(gaps[last - 1]);
                if max_gap.is_infinite() {
                    break;
                }
                if first == 0 && last == slots.len() - 1 {
                    continue;
                }
                let span = slots[last] + 1 - slots[first];
                let window = Window {
                    first,
                    last,
                    preg,
                    span,
                };
                let estimate = window.uses() as f32 * freq / (span as f32 + WEIGHT_SIZE_BIAS);
                if estimate * HYSTERESIS <= max_gap {
                    continue;
                }
                if best.is_none_or(|b| window.better_than(&b)) {
                    best = Some(window);
                }
            }
        }
    }

    let Some(best) = best else {
        trace!("no local split window for {}", vreg);
        return Ok(Vec::new());
    };
    debug!(
        "local split of {} around uses {}..={} for {}",
        vreg,
        slots[best.first],
        slots[best.last],
        session.target.reg_name(best.preg)
    );
    let mut editor = SplitEditor::new(vreg);
    let piece = editor.open_interval(Some(best.preg));
    editor.add(piece, clip(&live, &Segment::new(slots[best.first], slots[best.last] + 1)));
    Ok(editor.finish(session, Stage::Split2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocConfig;
    use crate::function::{Block, Function, UseSlot, VRegDesc};
    use crate::target::TargetInfo;
    use pretty_assertions::assert_eq;
    use ra_common::RegClassId;

    #[test]
    fn test_window_skips_heavy_interference() {
        let mut func = Function::new("loc");
        func.blocks = vec![Block::new(0, 100, 1.0)];
        // v0 has a dense cluster of uses early and one late use
        func.vregs.push(VRegDesc {
            id: VirtReg::new(0),
            class: RegClassId(0),
            segments: vec![Segment::new(0, 90)],
            uses: vec![UseSlot::def(0), UseSlot::read(2), UseSlot::read(4), UseSlot::read(89)],
            hints: Vec::new(),
        });
        // v1 sits in the long gap and is heavier than any window spanning it
        func.vregs.push(VRegDesc {
            id: VirtReg::new(1),
            class: RegClassId(0),
            segments: vec![Segment::new(40, 44)],
            uses: vec![UseSlot::def(40), UseSlot::read(41), UseSlot::read(42), UseSlot::read(43)],
            hints: Vec::new(),
        });
        let target = TargetInfo::uniform(1);
        let config = AllocConfig::default();
        let mut session = AllocSession::new(&func, &target, &config).unwrap();
        session.assign(VirtReg::new(1), PhysReg::new(0));

        let li = session.lis.get(VirtReg::new(0)).unwrap();
        let sa = SplitAnalysis::new(li, &session.lis);
        let order = session.order.order(RegClassId(0), &[]);
        let new = try_local_split(&mut session, VirtReg::new(0), &order, &sa).unwrap();

        assert_eq!(new.len(), 2);
        let window = session.lis.get(new[0]).unwrap();
        assert_eq!(window.segments, vec![Segment::new(0, 5)]);
        assert_eq!(window.hints, vec![PhysReg::new(0)]);
        assert_eq!(session.registry.stage(new[0]), Stage::Split2);
        assert_eq!(session.lis.get(new[1]).unwrap().uses, vec![UseSlot::read(89)]);
    }
}
