//! Allocation order: the candidate physical registers for a range

use crate::target::TargetInfo;
use ra_common::{PhysReg, RegClassId};
use std::collections::BTreeMap;

/// Restartable sequence of candidate registers, hints first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationOrder {
    regs: Vec<PhysReg>,
    hints: usize,
    pos: usize,
}

impl AllocationOrder {
    pub fn new(regs: Vec<PhysReg>, hints: usize) -> Self {
        let hints = hints.min(regs.len());
        Self { regs, hints, pos: 0 }
    }

    /// Start over from the first candidate
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn is_hint(&self, preg: PhysReg) -> bool {
        self.regs[..self.hints].contains(&preg)
    }

    pub fn first(&self) -> Option<PhysReg> {
        self.regs.first().copied()
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn as_slice(&self) -> &[PhysReg] {
        &self.regs
    }
}

impl Iterator for AllocationOrder {
    type Item = PhysReg;

    fn next(&mut self) -> Option<PhysReg> {
        let preg = self.regs.get(self.pos).copied()?;
        self.pos += 1;
        Some(preg)
    }
}

pub trait OrderProvider {
    /// Candidates of `class`, with the usable `hints` moved to the front
    fn order(&self, class: RegClassId, hints: &[PhysReg]) -> AllocationOrder;
}

/// Class member order from the target description, minus reserved registers
#[derive(Debug, Clone, Default)]
pub struct ClassOrder {
    classes: BTreeMap<RegClassId, Vec<PhysReg>>,
}

impl ClassOrder {
    pub fn new(target: &TargetInfo) -> Self {
        let classes = target
            .classes
            .iter()
            .map(|c| {
                let members = c
                    .members
                    .iter()
                    .copied()
                    .filter(|p| !target.is_reserved(*p))
                    .collect();
                (c.id, members)
            })
            .collect();
        Self { classes }
    }
}

impl OrderProvider for ClassOrder {
    fn order(&self, class: RegClassId, hints: &[PhysReg]) -> AllocationOrder {
        let Some(members) = self.classes.get(&class) else {
            return AllocationOrder::new(Vec::new(), 0);
        };
        let mut regs: Vec<PhysReg> = Vec::with_capacity(members.len());
        for hint in hints {
            if members.contains(hint) && !regs.contains(hint) {
                regs.push(*hint);
            }
        }
        let hinted = regs.len();
        regs.extend(members.iter().copied().filter(|p| !hints.contains(p)));
        AllocationOrder::new(regs, hinted)
    }
}
