//! Live intervals
//!
//! The live-interval provider of the engine. It owns one [`LiveInterval`] per
//! virtual register still awaiting allocation, creates the intervals that
//! splitting and spilling derive from them, and computes spill weights.

use crate::function::{Block, Function, UseSlot};
use log::trace;
use ra_common::{PhysReg, RegClassId, Segment, SlotIndex, VirtReg};
use std::collections::BTreeMap;

/// Added to the size of a range when normalizing its spill weight, so short
/// ranges do not get arbitrarily large weights
pub const WEIGHT_SIZE_BIAS: f32 = 25.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveInterval {
    pub reg: VirtReg,
    pub class: RegClassId,
    /// Sorted, disjoint, non-adjacent segments
    pub segments: Vec<Segment>,
    /// Sorted by slot
    pub uses: Vec<UseSlot>,
    pub hints: Vec<PhysReg>,
    pub weight: f32,
    pub spillable: bool,
    /// Input register this interval was split or spilled from
    pub origin: VirtReg,
}

impl LiveInterval {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// No instruction reads or writes the register any more
    pub fn is_unused(&self) -> bool {
        self.uses.is_empty()
    }

    pub fn size(&self) -> u32 {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn start(&self) -> Option<SlotIndex> {
        self.segments.first().map(|s| s.start)
    }

    pub fn end(&self) -> Option<SlotIndex> {
        self.segments.last().map(|s| s.end)
    }

    pub fn has_fixed_use(&self) -> bool {
        self.uses.iter().any(|u| u.fixed)
    }

    /// Live both before and after the instruction at `slot`
    pub fn live_across(&self, slot: SlotIndex) -> bool {
        self.segments.iter().any(|s| s.start < slot && s.end > slot + 1)
    }

    pub fn overlaps_segment(&self, seg: &Segment) -> bool {
        let idx = self.segments.partition_point(|s| s.end <= seg.start);
        self.segments.get(idx).is_some_and(|s| s.overlaps(seg))
    }

    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        segments_overlap(&self.segments, &other.segments)
    }

    /// Distinct use slots in program order
    pub fn use_slots(&self) -> Vec<SlotIndex> {
        let mut slots: Vec<SlotIndex> = self.uses.iter().map(|u| u.slot).collect();
        slots.dedup();
        slots
    }
}

/// Two sorted segment lists share a program point
pub fn segments_overlap(a: &[Segment], b: &[Segment]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].overlaps(&b[j]) {
            return true;
        }
        if a[i].end <= b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    false
}

/// Sort, drop empty segments and merge overlapping or touching ones
pub fn normalize(segments: &mut Vec<Segment>) {
    segments.retain(|s| !s.is_empty());
    segments.sort();
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments.drain(..) {
        match merged.last_mut() {
            Some(last) if seg.start <= last.end => last.end = last.end.max(seg.end),
            _ => merged.push(seg),
        }
    }
    *segments = merged;
}

/// `segments` minus every point covered by `cut`
pub fn subtract(segments: &[Segment], cut: &[Segment]) -> Vec<Segment> {
    let mut out = Vec::new();
    for seg in segments {
        let mut pieces = vec![*seg];
        for c in cut {
            pieces = pieces
                .into_iter()
                .flat_map(|p| {
                    if !p.overlaps(c) {
                        return vec![p];
                    }
                    let mut rest = Vec::new();
                    if p.start < c.start {
                        rest.push(Segment::new(p.start, c.start));
                    }
                    if c.end < p.end {
                        rest.push(Segment::new(c.end, p.end));
                    }
                    rest
                })
                .collect();
        }
        out.extend(pieces);
    }
    out
}

/// The parts of `segments` inside `window`
pub fn clip(segments: &[Segment], window: &Segment) -> Vec<Segment> {
    segments.iter().filter_map(|s| s.intersect(window)).collect()
}

/// Live intervals of every virtual register of one function
#[derive(Debug, Clone)]
pub struct LiveIntervals {
    intervals: BTreeMap<VirtReg, LiveInterval>,
    blocks: Vec<Block>,
    next_vreg: u32,
    spilled_weight: f32,
}

impl LiveIntervals {
    pub fn new(func: &Function) -> Self {
        let mut lis = Self {
            intervals: BTreeMap::new(),
            blocks: func.blocks.clone(),
            next_vreg: 0,
            spilled_weight: 0.0,
        };
        for desc in &func.vregs {
            let mut segments = desc.segments.clone();
            normalize(&mut segments);
            let mut uses = desc.uses.clone();
            uses.sort_by_key(|u| u.slot);
            let mut li = LiveInterval {
                reg: desc.id,
                class: desc.class,
                segments,
                uses,
                hints: desc.hints.clone(),
                weight: 0.0,
                spillable: true,
                origin: desc.id,
            };
            li.weight = lis.calc_weight(&li);
            lis.next_vreg = lis.next_vreg.max(desc.id.id() + 1);
            lis.intervals.insert(desc.id, li);
        }
        lis
    }

    pub fn get(&self, vreg: VirtReg) -> Option<&LiveInterval> {
        self.intervals.get(&vreg)
    }

    pub fn contains(&self, vreg: VirtReg) -> bool {
        self.intervals.contains_key(&vreg)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveInterval> {
        self.intervals.values()
    }

    pub fn vregs(&self) -> Vec<VirtReg> {
        self.intervals.keys().copied().collect()
    }

    /// Create a new interval derived from `parent` over `segments`, keeping
    /// the uses of `uses`. The parent itself is left in place.
    pub fn create_derived(
        &mut self,
        parent: &LiveInterval,
        mut segments: Vec<Segment>,
        mut uses: Vec<UseSlot>,
        spillable: bool,
    ) -> VirtReg {
        normalize(&mut segments);
        uses.sort_by_key(|u| u.slot);
        let reg = VirtReg::new(self.next_vreg);
        self.next_vreg += 1;
        let mut li = LiveInterval {
            reg,
            class: parent.class,
            segments,
            uses,
            hints: parent.hints.clone(),
            weight: 0.0,
            spillable,
            origin: parent.origin,
        };
        li.weight = self.calc_weight(&li);
        trace!(
            "created {} from {} over {:?} (weight {})",
            reg,
            parent.reg,
            li.segments,
            li.weight
        );
        self.intervals.insert(reg, li);
        reg
    }

    pub fn remove(&mut self, vreg: VirtReg) -> Option<LiveInterval> {
        self.intervals.remove(&vreg)
    }

    /// Put `preg` in front of the existing hints of `vreg`
    pub fn prefer(&mut self, vreg: VirtReg, preg: PhysReg) {
        if let Some(li) = self.intervals.get_mut(&vreg) {
            li.hints.retain(|h| *h != preg);
            li.hints.insert(0, preg);
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_of(&self, slot: SlotIndex) -> Option<usize> {
        let idx = self.blocks.partition_point(|b| b.end <= slot);
        self.blocks.get(idx).filter(|b| b.start <= slot).map(|_| idx)
    }

    pub fn freq_at(&self, slot: SlotIndex) -> f32 {
        self.block_of(slot).map_or(1.0, |idx| self.blocks[idx].freq)
    }

    pub fn last_slot(&self) -> SlotIndex {
        self.blocks.last().map_or(0, |b| b.end)
    }

    /// The interval starts and ends inside one basic block
    pub fn in_one_block(&self, li: &LiveInterval) -> bool {
        match (li.start(), li.end()) {
            (Some(start), Some(end)) => {
                self.block_of(start).is_some() && self.block_of(start) == self.block_of(end - 1)
            }
            _ => false,
        }
    }

    /// Dynamic cost of keeping `li` in memory: one access per use, weighted
    /// by block frequency
    pub fn use_freq(&self, li: &LiveInterval) -> f32 {
        li.uses.iter().map(|u| self.freq_at(u.slot)).sum()
    }

    pub fn calc_weight(&self, li: &LiveInterval) -> f32 {
        if !li.spillable || li.has_fixed_use() {
            return f32::INFINITY;
        }
        self.use_freq(li) / (li.size() as f32 + WEIGHT_SIZE_BIAS)
    }

    /// Account for the weight of a range that went to memory
    pub fn record_spill(&mut self, weight: f32) {
        if weight.is_finite() {
            self.spilled_weight += weight;
        }
    }

    pub fn spilled_weight(&self) -> f32 {
        self.spilled_weight
    }
}
