//! Per-block view of a live range

use crate::function::UseSlot;
use crate::live::{clip, LiveInterval, LiveIntervals};
use ra_common::{Segment, SlotIndex};

/// How a live range crosses one basic block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub block: usize,
    pub range: Segment,
    pub freq: f32,
    /// The parts of the range inside the block
    pub live: Vec<Segment>,
    pub uses: Vec<UseSlot>,
    /// Live on entry from the previous block
    pub live_in: bool,
    /// Live on exit into the next block
    pub live_out: bool,
}

impl BlockInfo {
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }

    pub fn first_use(&self) -> Option<SlotIndex> {
        self.uses.first().map(|u| u.slot)
    }

    pub fn last_use(&self) -> Option<SlotIndex> {
        self.uses.last().map(|u| u.slot)
    }

    /// Live through the whole block without being touched
    pub fn is_live_through(&self) -> bool {
        self.live_in && self.live_out && !self.has_uses()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitAnalysis {
    /// Blocks the range is live in, in layout order
    pub blocks: Vec<BlockInfo>,
}

impl SplitAnalysis {
    pub fn new(li: &LiveInterval, lis: &LiveIntervals) -> Self {
        let mut blocks = Vec::new();
        for (idx, block) in lis.blocks().iter().enumerate() {
            let range = block.range();
            let live = clip(&li.segments, &range);
            if live.is_empty() {
                continue;
            }
            let uses = li.uses.iter().filter(|u| range.contains(u.slot)).copied().collect();
            let live_in = li.segments.iter().any(|s| s.start < range.start && s.end > range.start);
            let live_out = li.segments.iter().any(|s| s.start < range.end && s.end > range.end);
            blocks.push(BlockInfo {
                block: idx,
                range,
                freq: block.freq,
                live,
                uses,
                live_in,
                live_out,
            });
        }
        Self { blocks }
    }

    /// The range never leaves one block
    pub fn is_local(&self) -> bool {
        self.blocks.len() <= 1
    }

    pub fn use_blocks(&self) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter().filter(|b| b.has_uses())
    }
}
