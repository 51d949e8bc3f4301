//! Function description consumed by the allocator
//!
//! A function is given with liveness already computed: its blocks in layout
//! order, the live segments and uses of each virtual register, the points
//! where calls clobber registers and the pre-colored physical live ranges.

use crate::target::TargetInfo;
use ra_common::{AllocError, PhysReg, RegClassId, Segment, SlotIndex, UseKind, VirtReg};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn unit_freq() -> f32 {
    1.0
}

/// A basic block covering the slots `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub start: SlotIndex,
    pub end: SlotIndex,
    /// Relative execution frequency
    #[serde(default = "unit_freq")]
    pub freq: f32,
}

impl Block {
    pub fn new(start: SlotIndex, end: SlotIndex, freq: f32) -> Self {
        Self { start, end, freq }
    }

    pub fn range(&self) -> Segment {
        Segment::new(self.start, self.end)
    }
}

/// One instruction operand referring to a virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseSlot {
    pub slot: SlotIndex,
    pub kind: UseKind,
    /// Operand of an inline low-level instruction; cannot be spilled or split around
    #[serde(default)]
    pub fixed: bool,
}

impl UseSlot {
    pub fn def(slot: SlotIndex) -> Self {
        Self { slot, kind: UseKind::Def, fixed: false }
    }

    pub fn read(slot: SlotIndex) -> Self {
        Self { slot, kind: UseKind::Use, fixed: false }
    }

    pub fn pinned(mut self) -> Self {
        self.fixed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VRegDesc {
    pub id: VirtReg,
    pub class: RegClassId,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub uses: Vec<UseSlot>,
    /// Preferred physical registers, most preferred first
    #[serde(default)]
    pub hints: Vec<PhysReg>,
}

/// An instruction clobbering a set of physical registers (a call)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegMaskPoint {
    pub slot: SlotIndex,
    pub clobbers: Vec<PhysReg>,
}

/// A physical register that is live over some segments before allocation starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedRange {
    pub preg: PhysReg,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<Block>,
    pub vregs: Vec<VRegDesc>,
    #[serde(default)]
    pub regmasks: Vec<RegMaskPoint>,
    #[serde(default)]
    pub fixed: Vec<FixedRange>,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: Vec::new(),
            vregs: Vec::new(),
            regmasks: Vec::new(),
            fixed: Vec::new(),
        }
    }

    /// Parse a JSON function description
    pub fn from_json(text: &str) -> Result<Self, AllocError> {
        serde_json::from_str(text)
            .map_err(|e| AllocError::invalid_input(format!("function description: {e}")))
    }

    /// Index of the block containing `slot`
    pub fn block_index(&self, slot: SlotIndex) -> Option<usize> {
        let idx = self.blocks.partition_point(|b| b.end <= slot);
        self.blocks.get(idx).filter(|b| b.start <= slot).map(|_| idx)
    }

    /// Execution frequency at `slot`; slots outside every block count once
    pub fn freq_at(&self, slot: SlotIndex) -> f32 {
        self.block_index(slot).map_or(1.0, |idx| self.blocks[idx].freq)
    }

    /// One past the last slot of the function
    pub fn last_slot(&self) -> SlotIndex {
        self.blocks.last().map_or(0, |b| b.end)
    }

    pub fn vreg(&self, id: VirtReg) -> Option<&VRegDesc> {
        self.vregs.iter().find(|v| v.id == id)
    }

    /// Check the description for the shapes the allocator relies on
    pub fn validate(&self, target: &TargetInfo) -> Result<(), AllocError> {
        let mut prev_end = None;
        for (idx, block) in self.blocks.iter().enumerate() {
            if block.start >= block.end {
                return Err(AllocError::invalid_input(format!("block {idx} is empty")));
            }
            if let Some(end) = prev_end {
                if block.start != end {
                    return Err(AllocError::invalid_input(format!(
                        "block {idx} starts at {} but the previous block ends at {end}",
                        block.start
                    )));
                }
            }
            if !block.freq.is_finite() || block.freq < 0.0 {
                return Err(AllocError::invalid_input(format!(
                    "block {idx} has invalid frequency {}",
                    block.freq
                )));
            }
            prev_end = Some(block.end);
        }

        let first = self.blocks.first().map_or(0, |b| b.start);
        let last = self.last_slot();
        let in_function = |seg: &Segment| seg.start >= first && seg.end <= last;

        let mut seen = BTreeSet::new();
        for vreg in &self.vregs {
            if !seen.insert(vreg.id) {
                return Err(AllocError::invalid_input(format!("{} is described twice", vreg.id)));
            }
            if target.class(vreg.class).is_none() {
                return Err(AllocError::invalid_input(format!(
                    "{} uses unknown register class {}",
                    vreg.id, vreg.class
                )));
            }
            for pair in vreg.segments.windows(2) {
                if pair[1].start < pair[0].end {
                    return Err(AllocError::invalid_input(format!(
                        "{} has unsorted or overlapping segments {} and {}",
                        vreg.id, pair[0], pair[1]
                    )));
                }
            }
            for seg in &vreg.segments {
                if seg.is_empty() || !in_function(seg) {
                    return Err(AllocError::invalid_input(format!(
                        "{} has segment {seg} outside the function",
                        vreg.id
                    )));
                }
            }
            for u in &vreg.uses {
                if !vreg.segments.iter().any(|s| s.contains(u.slot)) {
                    return Err(AllocError::invalid_input(format!(
                        "{} is used at slot {} where it is not live",
                        vreg.id, u.slot
                    )));
                }
            }
            for hint in &vreg.hints {
                if target.reg(*hint).is_none() {
                    return Err(AllocError::invalid_input(format!(
                        "{} is hinted to unknown register {hint}",
                        vreg.id
                    )));
                }
            }
        }

        for mask in &self.regmasks {
            if let Some(preg) = mask.clobbers.iter().find(|p| target.reg(**p).is_none()) {
                return Err(AllocError::invalid_input(format!(
                    "register mask at slot {} clobbers unknown register {preg}",
                    mask.slot
                )));
            }
        }
        for range in &self.fixed {
            if target.reg(range.preg).is_none() {
                return Err(AllocError::invalid_input(format!(
                    "fixed range on unknown register {}",
                    range.preg
                )));
            }
            if range.segments.iter().any(|s| s.is_empty()) {
                return Err(AllocError::invalid_input(format!(
                    "fixed range on {} has an empty segment",
                    range.preg
                )));
            }
        }
        Ok(())
    }
}
