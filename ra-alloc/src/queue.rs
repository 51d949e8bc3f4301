//! Work-list queues

use crate::live::LiveIntervals;
use crate::registry::LiveRangeRegistry;
use log::trace;
use ra_common::{Stage, VirtReg};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

pub trait AllocQueue {
    fn enqueue(&mut self, lis: &LiveIntervals, registry: &LiveRangeRegistry, vreg: VirtReg);
    fn dequeue(&mut self) -> Option<VirtReg>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const GLOBAL_BIT: u32 = 1 << 29;
const HINT_BIT: u32 = 1 << 30;
const PRIMARY_BIT: u32 = 1 << 31;

/// Priority queue of the greedy variant.
///
/// Local ranges are taken in instruction order, global and split ranges
/// long to short. Ranges deferred for splitting and spill products sit below
/// all of them; spill products are taken in the reverse order they came in.
#[derive(Debug, Default)]
pub struct GreedyQueue {
    heap: BinaryHeap<(u32, Reverse<VirtReg>)>,
    memory_ops: u32,
}

impl GreedyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn priority(&mut self, lis: &LiveIntervals, registry: &LiveRangeRegistry, vreg: VirtReg) -> u32 {
        let Some(li) = lis.get(vreg) else {
            return 0;
        };
        let size = li.size().min(GLOBAL_BIT - 1);
        match registry.stage(vreg) {
            Stage::Split => size,
            Stage::Memory => {
                let prio = self.memory_ops.min(GLOBAL_BIT - 1);
                self.memory_ops = self.memory_ops.saturating_add(1);
                prio
            }
            stage => {
                let mut prio = if stage <= Stage::Assign && lis.in_one_block(li) {
                    let start = li.start().unwrap_or(0);
                    lis.last_slot().saturating_sub(start).min(GLOBAL_BIT - 1)
                } else {
                    GLOBAL_BIT + size
                };
                prio |= PRIMARY_BIT;
                if !li.hints.is_empty() {
                    prio |= HINT_BIT;
                }
                prio
            }
        }
    }
}

impl AllocQueue for GreedyQueue {
    fn enqueue(&mut self, lis: &LiveIntervals, registry: &LiveRangeRegistry, vreg: VirtReg) {
        let prio = self.priority(lis, registry, vreg);
        trace!("enqueue {} with priority {:#x}", vreg, prio);
        self.heap.push((prio, Reverse(vreg)));
    }

    fn dequeue(&mut self) -> Option<VirtReg> {
        self.heap.pop().map(|(_, Reverse(vreg))| vreg)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Spill weight with a total order
#[derive(Debug, Clone, Copy, PartialEq)]
struct Weight(f32);

impl Eq for Weight {}

impl PartialOrd for Weight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Weight {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Heaviest ranges first; used by the basic variant
#[derive(Debug, Default)]
pub struct SpillWeightQueue {
    heap: BinaryHeap<(Weight, Reverse<VirtReg>)>,
}

impl SpillWeightQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AllocQueue for SpillWeightQueue {
    fn enqueue(&mut self, lis: &LiveIntervals, _registry: &LiveRangeRegistry, vreg: VirtReg) {
        let weight = lis.get(vreg).map_or(0.0, |li| li.weight);
        trace!("enqueue {} with weight {}", vreg, weight);
        self.heap.push((Weight(weight), Reverse(vreg)));
    }

    fn dequeue(&mut self) -> Option<VirtReg> {
        self.heap.pop().map(|(_, Reverse(vreg))| vreg)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}
