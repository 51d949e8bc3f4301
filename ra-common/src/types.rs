//! Common types used throughout the allocator
//!
//! This module defines the identifiers and small value types that are shared
//! by the engine, its collaborators and the driver: registers, classes,
//! blocks, program points and the live-range lifecycle stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Program point. Instructions occupy consecutive slot indices.
pub type SlotIndex = u32;

/// Eviction cascade number
pub type Cascade = u32;

/// A virtual register awaiting assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtReg(pub u32);

impl VirtReg {
    pub fn new(id: u32) -> Self {
        VirtReg(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VirtReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.0)
    }
}

/// A physical machine register
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysReg(pub u16);

impl PhysReg {
    pub fn new(id: u16) -> Self {
        PhysReg(id)
    }

    pub fn id(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$p{}", self.0)
    }
}

/// Register unit. Two physical registers alias iff they share a unit.
pub type RegUnit = u16;

/// Register class identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegClassId(pub u16);

impl fmt::Display for RegClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rc{}", self.0)
    }
}

/// Basic block index in layout order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Half-open program-point interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub start: SlotIndex,
    pub end: SlotIndex,
}

impl Segment {
    pub fn new(start: SlotIndex, end: SlotIndex) -> Self {
        Segment { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, slot: SlotIndex) -> bool {
        self.start <= slot && slot < self.end
    }

    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection, or `None` when the segments are disjoint
    pub fn intersect(&self, other: &Segment) -> Option<Segment> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Segment { start, end })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

/// Lifecycle stage of a live range. Never decreases.
///
/// Ranges produced by one of the splitting stages skip the earlier stages
/// when they are dequeued, which is what makes the splitting loop terminate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Newly created, never dequeued
    #[default]
    New,
    /// Only attempt assignment and eviction, then requeue as `Split`
    Assign,
    /// Attempt region, block and local splitting
    Split,
    /// Split product that may not be making progress; instruction split only
    Split2,
    /// Will be spilled, no more splitting
    Spill,
    /// Spill product living in memory around its uses
    Memory,
    /// Nothing more can be done
    Done,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::New,
        Stage::Assign,
        Stage::Split,
        Stage::Split2,
        Stage::Spill,
        Stage::Memory,
        Stage::Done,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::New => "new",
            Stage::Assign => "assign",
            Stage::Split => "split",
            Stage::Split2 => "split2",
            Stage::Spill => "spill",
            Stage::Memory => "memory",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an instruction touches a virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseKind {
    Def,
    Use,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_overlap() {
        let a = Segment::new(0, 10);
        let b = Segment::new(5, 15);
        let c = Segment::new(10, 20);

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&c));
        // Half-open: touching segments do not overlap
        assert!(!a.overlaps(&c));
        assert_eq!(a.intersect(&b), Some(Segment::new(5, 10)));
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_stage_ordering() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
        assert_eq!(Stage::default(), Stage::New);
    }

    #[test]
    fn test_display() {
        assert_eq!(VirtReg::new(3).to_string(), "%v3");
        assert_eq!(PhysReg::new(1).to_string(), "$p1");
        assert_eq!(Segment::new(2, 4).to_string(), "[2,4)");
    }
}
