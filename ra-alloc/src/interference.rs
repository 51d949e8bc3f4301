//! Interference layer
//!
//! Tracks which virtual registers currently occupy each register unit and
//! answers "is this physical register free for this range" queries. Query
//! results are cached per (range, register) pair and tagged with the matrix
//! version; every mutation bumps the version, so a stale answer is never
//! served after an assign, unassign or explicit invalidation.

use crate::function::Function;
use crate::live::LiveIntervals;
use crate::target::TargetInfo;
use log::trace;
use ra_common::{PhysReg, RegUnit, Segment, SlotIndex, VirtReg};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Outcome of a single interference check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterferenceKind {
    Free,
    /// Another live range (virtual or fixed) occupies a unit of the register
    UnitConflict,
    /// The range is live across an instruction clobbering the register
    MaskConflict,
}

/// Everything standing between a range and a physical register
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interference {
    /// Assigned virtual registers overlapping the range, in ascending order
    pub vregs: Vec<VirtReg>,
    /// A pre-colored physical range overlaps
    pub fixed: bool,
    /// A register mask clobbers the register while the range is live
    pub mask: bool,
}

impl Interference {
    pub fn kind(&self) -> InterferenceKind {
        if !self.vregs.is_empty() || self.fixed {
            InterferenceKind::UnitConflict
        } else if self.mask {
            InterferenceKind::MaskConflict
        } else {
            InterferenceKind::Free
        }
    }
}

/// Who occupies a segment of a register unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Virt(VirtReg),
    Fixed(PhysReg),
    /// A clobbering instruction
    Mask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub segment: Segment,
    pub occupant: Occupant,
}

pub trait InterferenceLayer {
    /// Full interference of `vreg` with `preg`
    fn query(&mut self, lis: &LiveIntervals, vreg: VirtReg, preg: PhysReg) -> Interference;

    fn check_interference(&mut self, lis: &LiveIntervals, vreg: VirtReg, preg: PhysReg) -> InterferenceKind {
        self.query(lis, vreg, preg).kind()
    }

    fn assign(&mut self, lis: &LiveIntervals, vreg: VirtReg, preg: PhysReg);

    fn unassign(&mut self, vreg: VirtReg);

    /// Drop every cached query result
    fn invalidate(&mut self);

    fn phys(&self, vreg: VirtReg) -> Option<PhysReg>;

    fn assignments(&self) -> BTreeMap<VirtReg, PhysReg>;

    /// Everything occupying any unit of `preg`, sorted by segment start
    fn occupied(&self, preg: PhysReg) -> Vec<Occupancy>;

    /// `preg` has been handed out at least once during the run
    fn is_phys_used(&self, preg: PhysReg) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct UnitEntry {
    segment: Segment,
    occupant: Occupant,
}

/// Per-unit segment lists with a versioned query cache
pub struct LiveRegMatrix {
    units: BTreeMap<PhysReg, Vec<RegUnit>>,
    unions: BTreeMap<RegUnit, Vec<UnitEntry>>,
    masks: Vec<(SlotIndex, BTreeSet<RegUnit>)>,
    assigned: BTreeMap<VirtReg, PhysReg>,
    used: BTreeSet<PhysReg>,
    version: u64,
    cache: HashMap<(VirtReg, PhysReg), (u64, Interference)>,
}

impl LiveRegMatrix {
    pub fn new(target: &TargetInfo, func: &Function) -> Self {
        let units: BTreeMap<PhysReg, Vec<RegUnit>> =
            target.regs.iter().map(|r| (r.id, target.units(r.id))).collect();
        let mut matrix = Self {
            units,
            unions: BTreeMap::new(),
            masks: Vec::new(),
            assigned: BTreeMap::new(),
            used: BTreeSet::new(),
            version: 0,
            cache: HashMap::new(),
        };

        for range in &func.fixed {
            for unit in matrix.units_of(range.preg) {
                let entries = matrix.unions.entry(unit).or_default();
                entries.extend(range.segments.iter().map(|&segment| UnitEntry {
                    segment,
                    occupant: Occupant::Fixed(range.preg),
                }));
                entries.sort_by_key(|e| e.segment.start);
            }
        }
        for mask in &func.regmasks {
            let clobbered: BTreeSet<RegUnit> =
                mask.clobbers.iter().flat_map(|p| matrix.units_of(*p)).collect();
            matrix.masks.push((mask.slot, clobbered));
        }
        matrix.masks.sort_by_key(|(slot, _)| *slot);
        matrix
    }

    fn units_of(&self, preg: PhysReg) -> Vec<RegUnit> {
        self.units.get(&preg).cloned().unwrap_or_else(|| vec![preg.id()])
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn compute(&self, lis: &LiveIntervals, vreg: VirtReg, preg: PhysReg) -> Interference {
        let mut result = Interference::default();
        let Some(li) = lis.get(vreg) else {
            return result;
        };
        let units = self.units_of(preg);
        let mut vregs = BTreeSet::new();
        for unit in &units {
            let Some(entries) = self.unions.get(unit) else {
                continue;
            };
            for entry in entries {
                if entry.occupant == Occupant::Virt(vreg) || !li.overlaps_segment(&entry.segment) {
                    continue;
                }
                match entry.occupant {
                    Occupant::Virt(other) => {
                        vregs.insert(other);
                    }
                    Occupant::Fixed(_) => result.fixed = true,
                    Occupant::Mask => result.mask = true,
                }
            }
        }
        result.vregs = vregs.into_iter().collect();
        result.mask |= self
            .masks
            .iter()
            .any(|(slot, clobbered)| li.live_across(*slot) && units.iter().any(|u| clobbered.contains(u)));
        result
    }
}

impl InterferenceLayer for LiveRegMatrix {
    fn query(&mut self, lis: &LiveIntervals, vreg: VirtReg, preg: PhysReg) -> Interference {
        if let Some((version, cached)) = self.cache.get(&(vreg, preg)) {
            if *version == self.version {
                return cached.clone();
            }
        }
        let result = self.compute(lis, vreg, preg);
        trace!(
            "query {} in {}: {:?} vregs={:?} fixed={} mask={}",
            vreg,
            preg,
            result.kind(),
            result.vregs,
            result.fixed,
            result.mask
        );
        self.cache.insert((vreg, preg), (self.version, result.clone()));
        result
    }

    fn assign(&mut self, lis: &LiveIntervals, vreg: VirtReg, preg: PhysReg) {
        let Some(li) = lis.get(vreg) else {
            return;
        };
        for unit in self.units_of(preg) {
            let entries = self.unions.entry(unit).or_default();
            entries.extend(li.segments.iter().map(|&segment| UnitEntry {
                segment,
                occupant: Occupant::Virt(vreg),
            }));
            entries.sort_by_key(|e| e.segment.start);
        }
        self.assigned.insert(vreg, preg);
        self.used.insert(preg);
        self.version += 1;
    }

    fn unassign(&mut self, vreg: VirtReg) {
        let Some(preg) = self.assigned.remove(&vreg) else {
            return;
        };
        for unit in self.units_of(preg) {
            if let Some(entries) = self.unions.get_mut(&unit) {
                entries.retain(|e| e.occupant != Occupant::Virt(vreg));
            }
        }
        self.version += 1;
    }

    fn invalidate(&mut self) {
        self.version += 1;
        self.cache.clear();
    }

    fn phys(&self, vreg: VirtReg) -> Option<PhysReg> {
        self.assigned.get(&vreg).copied()
    }

    fn assignments(&self) -> BTreeMap<VirtReg, PhysReg> {
        self.assigned.clone()
    }

    fn occupied(&self, preg: PhysReg) -> Vec<Occupancy> {
        let units = self.units_of(preg);
        let mut out: Vec<Occupancy> = units
            .iter()
            .filter_map(|u| self.unions.get(u))
            .flatten()
            .map(|e| Occupancy {
                segment: e.segment,
                occupant: e.occupant,
            })
            .collect();
        for (slot, clobbered) in &self.masks {
            if units.iter().any(|u| clobbered.contains(u)) {
                out.push(Occupancy {
                    segment: Segment::new(*slot, slot + 1),
                    occupant: Occupant::Mask,
                });
            }
        }
        out.sort_by_key(|o| (o.segment.start, o.segment.end));
        out.dedup();
        out
    }

    fn is_phys_used(&self, preg: PhysReg) -> bool {
        self.used.contains(&preg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Block, FixedRange, RegMaskPoint, VRegDesc};
    use pretty_assertions::assert_eq;
    use ra_common::RegClassId;

    fn function() -> Function {
        let mut func = Function::new("f");
        func.blocks = vec![Block::new(0, 30, 1.0)];
        for (id, start, end) in [(0u32, 0u32, 10u32), (1, 5, 15), (2, 20, 25)] {
            func.vregs.push(VRegDesc {
                id: VirtReg::new(id),
                class: RegClassId(0),
                segments: vec![Segment::new(start, end)],
                uses: Vec::new(),
                hints: Vec::new(),
            });
        }
        func
    }

    #[test]
    fn test_assign_and_unassign() {
        let func = function();
        let target = TargetInfo::uniform(2);
        let lis = LiveIntervals::new(&func);
        let mut matrix = LiveRegMatrix::new(&target, &func);
        let (r0, v0, v1, v2) = (PhysReg::new(0), VirtReg::new(0), VirtReg::new(1), VirtReg::new(2));

        assert_eq!(matrix.check_interference(&lis, v1, r0), InterferenceKind::Free);
        matrix.assign(&lis, v0, r0);
        assert_eq!(matrix.check_interference(&lis, v1, r0), InterferenceKind::UnitConflict);
        assert_eq!(matrix.query(&lis, v1, r0).vregs, vec![v0]);
        assert_eq!(matrix.check_interference(&lis, v2, r0), InterferenceKind::Free);
        assert!(matrix.is_phys_used(r0));

        matrix.unassign(v0);
        assert_eq!(matrix.phys(v0), None);
        assert_eq!(matrix.check_interference(&lis, v1, r0), InterferenceKind::Free);
    }

    #[test]
    fn test_cached_results_follow_versions() {
        let func = function();
        let target = TargetInfo::uniform(1);
        let lis = LiveIntervals::new(&func);
        let mut matrix = LiveRegMatrix::new(&target, &func);
        let r0 = PhysReg::new(0);

        assert_eq!(matrix.check_interference(&lis, VirtReg::new(1), r0), InterferenceKind::Free);
        let before = matrix.version();
        matrix.assign(&lis, VirtReg::new(0), r0);
        assert!(matrix.version() > before);
        // The cached Free answer must not survive the assignment
        assert_eq!(
            matrix.check_interference(&lis, VirtReg::new(1), r0),
            InterferenceKind::UnitConflict
        );
    }

    #[test]
    fn test_fixed_ranges_and_masks() {
        let mut func = function();
        func.fixed.push(FixedRange {
            preg: PhysReg::new(0),
            segments: vec![Segment::new(21, 22)],
        });
        func.regmasks.push(RegMaskPoint {
            slot: 7,
            clobbers: vec![PhysReg::new(1)],
        });
        let target = TargetInfo::uniform(2);
        let lis = LiveIntervals::new(&func);
        let mut matrix = LiveRegMatrix::new(&target, &func);

        let q = matrix.query(&lis, VirtReg::new(2), PhysReg::new(0));
        assert!(q.fixed && q.vregs.is_empty());
        assert_eq!(q.kind(), InterferenceKind::UnitConflict);
        assert_eq!(
            matrix.check_interference(&lis, VirtReg::new(0), PhysReg::new(1)),
            InterferenceKind::MaskConflict
        );
        // Not live at the call
        assert_eq!(
            matrix.check_interference(&lis, VirtReg::new(2), PhysReg::new(1)),
            InterferenceKind::Free
        );
        assert_eq!(matrix.occupied(PhysReg::new(1)).len(), 1);
    }
}
