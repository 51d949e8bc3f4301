//! Spiller
//!
//! Spilling moves a range to a stack slot. What remains in registers are tiny
//! unspillable ranges around each instruction touching the value: the
//! reload before a use and the store after a def.

use crate::function::UseSlot;
use crate::live::{LiveInterval, LiveIntervals};
use log::debug;
use ra_common::{Segment, SlotIndex, VirtReg};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpillSlot(pub u32);

impl fmt::Display for SpillSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ss{}", self.0)
    }
}

pub trait Spiller {
    /// Spill `vreg`, removing it from `lis`; returns the new ranges
    fn spill(&mut self, lis: &mut LiveIntervals, vreg: VirtReg) -> Vec<VirtReg>;

    /// Cleanup once allocation has finished
    fn post_optimization(&mut self, _lis: &LiveIntervals) {}

    /// Stack slot of each spilled input register
    fn slots(&self) -> BTreeMap<VirtReg, SpillSlot>;
}

#[derive(Debug, Default)]
pub struct InlineSpiller {
    slots: BTreeMap<VirtReg, SpillSlot>,
    /// Spill product -> input register it holds
    products: BTreeMap<VirtReg, VirtReg>,
    next_slot: u32,
}

impl InlineSpiller {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_for(&mut self, origin: VirtReg) -> SpillSlot {
        let next = &mut self.next_slot;
        *self.slots.entry(origin).or_insert_with(|| {
            let slot = SpillSlot(*next);
            *next += 1;
            slot
        })
    }
}

/// Uses grouped by instruction
fn group_uses(li: &LiveInterval) -> BTreeMap<SlotIndex, Vec<UseSlot>> {
    let mut groups: BTreeMap<SlotIndex, Vec<UseSlot>> = BTreeMap::new();
    for u in &li.uses {
        groups.entry(u.slot).or_default().push(*u);
    }
    groups
}

impl Spiller for InlineSpiller {
    fn spill(&mut self, lis: &mut LiveIntervals, vreg: VirtReg) -> Vec<VirtReg> {
        let Some(li) = lis.remove(vreg) else {
            return Vec::new();
        };
        let slot = self.slot_for(li.origin);
        lis.record_spill(li.weight);

        let mut products = Vec::new();
        for (at, uses) in group_uses(&li) {
            let new = lis.create_derived(&li, vec![Segment::new(at, at + 1)], uses, false);
            self.products.insert(new, li.origin);
            products.push(new);
        }
        debug!(
            "spilled {} (origin {}) to {}, {} reload/store ranges",
            vreg,
            li.origin,
            slot,
            products.len()
        );
        products
    }

    fn post_optimization(&mut self, lis: &LiveIntervals) {
        // Slots whose every product was dropped hold nothing anybody reads
        let live: Vec<VirtReg> = self
            .products
            .iter()
            .filter(|(product, _)| lis.contains(**product))
            .map(|(_, origin)| *origin)
            .collect();
        let before = self.slots.len();
        self.slots.retain(|origin, _| live.contains(origin));

        let mut ordered: Vec<(VirtReg, SpillSlot)> = self.slots.iter().map(|(v, s)| (*v, *s)).collect();
        ordered.sort_by_key(|(_, slot)| *slot);
        for (idx, (origin, _)) in ordered.into_iter().enumerate() {
            self.slots.insert(origin, SpillSlot(idx as u32));
        }
        self.next_slot = self.slots.len() as u32;
        if before != self.slots.len() {
            debug!("released {} unused spill slots", before - self.slots.len());
        }
    }

    fn slots(&self) -> BTreeMap<VirtReg, SpillSlot> {
        self.slots.clone()
    }
}
