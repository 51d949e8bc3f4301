//! Independent check of a finished assignment

use crate::function::Function;
use crate::live::LiveIntervals;
use crate::target::TargetInfo;
use ra_common::{PhysReg, Segment, SlotIndex, VirtReg};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Conflict {
    /// Two ranges in aliasing registers are live at the same time
    #[error("{a} in {preg_a} and {b} in {preg_b} overlap at {at}")]
    Overlap {
        a: VirtReg,
        b: VirtReg,
        preg_a: PhysReg,
        preg_b: PhysReg,
        at: Segment,
    },
    /// A range overlaps a pre-colored physical range
    #[error("{vreg} in {preg} overlaps fixed {fixed} at {at}")]
    Fixed { vreg: VirtReg, preg: PhysReg, fixed: PhysReg, at: Segment },
    /// A range is live across an instruction clobbering its register
    #[error("{vreg} in {preg} is live across a clobber at {slot}")]
    Clobbered { vreg: VirtReg, preg: PhysReg, slot: SlotIndex },
}

fn first_overlap(a: &[Segment], b: &[Segment]) -> Option<Segment> {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if let Some(seg) = a[i].intersect(&b[j]) {
            return Some(seg);
        }
        if a[i].end <= b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    None
}

/// Every pair of assigned ranges sharing a register unit while both are
/// live, every clash with a fixed range and every live-across clobber.
/// Ranges without a live interval are ignored.
pub fn verify_assignment(
    func: &Function,
    target: &TargetInfo,
    lis: &LiveIntervals,
    assignment: &BTreeMap<VirtReg, PhysReg>,
) -> Vec<Conflict> {
    let assigned: Vec<_> = assignment
        .iter()
        .filter_map(|(v, p)| lis.get(*v).map(|li| (li, *p)))
        .collect();
    let mut conflicts = Vec::new();

    for (i, (a, preg_a)) in assigned.iter().enumerate() {
        for (b, preg_b) in &assigned[i + 1..] {
            if !target.aliases(*preg_a, *preg_b) {
                continue;
            }
            if let Some(at) = first_overlap(&a.segments, &b.segments) {
                conflicts.push(Conflict::Overlap {
                    a: a.reg,
                    b: b.reg,
                    preg_a: *preg_a,
                    preg_b: *preg_b,
                    at,
                });
            }
        }
        for fixed in &func.fixed {
            if !target.aliases(*preg_a, fixed.preg) {
                continue;
            }
            if let Some(at) = first_overlap(&a.segments, &fixed.segments) {
                conflicts.push(Conflict::Fixed {
                    vreg: a.reg,
                    preg: *preg_a,
                    fixed: fixed.preg,
                    at,
                });
            }
        }
        for mask in &func.regmasks {
            if mask.clobbers.iter().any(|c| target.aliases(*c, *preg_a)) && a.live_across(mask.slot) {
                conflicts.push(Conflict::Clobbered {
                    vreg: a.reg,
                    preg: *preg_a,
                    slot: mask.slot,
                });
            }
        }
    }
    conflicts
}
