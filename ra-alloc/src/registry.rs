//! Per-range allocation metadata: lifecycle stage and eviction cascade

use log::{debug, trace};
use ra_common::{Cascade, Stage, VirtReg};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegInfo {
    pub stage: Stage,
    /// Cascade of the last evictor, or of this range once it evicted something. 0 = none.
    pub cascade: Cascade,
    /// Length of the eviction chain that led to this range being evicted
    pub depth: u32,
}

/// One recorded stage transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageChange {
    pub vreg: VirtReg,
    pub from: Stage,
    pub to: Stage,
}

#[derive(Debug, Clone)]
pub struct LiveRangeRegistry {
    info: BTreeMap<VirtReg, RegInfo>,
    next_cascade: Cascade,
    history: Vec<StageChange>,
}

impl Default for LiveRangeRegistry {
    fn default() -> Self {
        Self {
            info: BTreeMap::new(),
            next_cascade: 1,
            history: Vec::new(),
        }
    }
}

impl LiveRangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, vreg: VirtReg) -> RegInfo {
        self.info.get(&vreg).copied().unwrap_or_default()
    }

    pub fn stage(&self, vreg: VirtReg) -> Stage {
        self.info(vreg).stage
    }

    pub fn cascade(&self, vreg: VirtReg) -> Cascade {
        self.info(vreg).cascade
    }

    pub fn depth(&self, vreg: VirtReg) -> u32 {
        self.info(vreg).depth
    }

    /// Move `vreg` to `stage`. Requests to move backwards are ignored.
    pub fn set_stage(&mut self, vreg: VirtReg, stage: Stage) {
        let entry = self.info.entry(vreg).or_default();
        if stage < entry.stage {
            debug!(
                "ignoring stage change of {} from {} back to {}",
                vreg, entry.stage, stage
            );
            return;
        }
        if stage != entry.stage {
            trace!("{}: {} -> {}", vreg, entry.stage, stage);
            self.history.push(StageChange {
                vreg,
                from: entry.stage,
                to: stage,
            });
            entry.stage = stage;
        }
    }

    /// Register ranges derived from `parent`, never earlier than its stage
    pub fn inherit(&mut self, parent: VirtReg, children: &[VirtReg], stage: Stage) {
        let stage = stage.max(self.stage(parent));
        for &child in children {
            self.set_stage(child, stage);
        }
    }

    /// The cascade `vreg` evicts with, allocating a fresh one on first use
    pub fn ensure_cascade(&mut self, vreg: VirtReg) -> Cascade {
        let next = self.next_cascade;
        let entry = self.info.entry(vreg).or_default();
        if entry.cascade == 0 {
            entry.cascade = next;
            self.next_cascade += 1;
        }
        entry.cascade
    }

    /// The cascade `vreg` would evict with, without allocating it
    pub fn peek_cascade(&self, vreg: VirtReg) -> Cascade {
        match self.cascade(vreg) {
            0 => self.next_cascade,
            c => c,
        }
    }

    /// Record that `vreg` was evicted by a range with `cascade` at chain `depth`
    pub fn set_evicted(&mut self, vreg: VirtReg, cascade: Cascade, depth: u32) {
        let entry = self.info.entry(vreg).or_default();
        entry.cascade = entry.cascade.max(cascade);
        entry.depth = depth;
    }

    /// Forget a retired range
    pub fn remove(&mut self, vreg: VirtReg) {
        self.info.remove(&vreg);
    }

    pub fn contains(&self, vreg: VirtReg) -> bool {
        self.info.contains_key(&vreg)
    }

    /// Every stage transition made so far, in order
    pub fn history(&self) -> &[StageChange] {
        &self.history
    }
}
