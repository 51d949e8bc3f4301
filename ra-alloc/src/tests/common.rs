//! Builders shared by the engine-level tests

use crate::function::{Block, Function, RegMaskPoint, UseSlot, VRegDesc};
use crate::verify::verify_assignment;
use crate::session::AllocSession;
use ra_common::{PhysReg, RegClassId, Segment, SlotIndex, VirtReg};

pub struct FuncBuilder {
    func: Function,
}

impl FuncBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            func: Function::new(name),
        }
    }

    /// Blocks of `len` slots each, with the given frequencies
    pub fn blocks(mut self, len: u32, freqs: &[f32]) -> Self {
        for (i, freq) in freqs.iter().enumerate() {
            let start = i as u32 * len;
            self.func.blocks.push(Block::new(start, start + len, *freq));
        }
        self
    }

    /// A range over `[start, end)`, defined at `start` and read at `reads`
    pub fn vreg(mut self, id: u32, start: SlotIndex, end: SlotIndex, reads: &[SlotIndex]) -> Self {
        let mut uses = vec![UseSlot::def(start)];
        uses.extend(reads.iter().map(|r| UseSlot::read(*r)));
        self.func.vregs.push(VRegDesc {
            id: VirtReg::new(id),
            class: RegClassId(0),
            segments: vec![Segment::new(start, end)],
            uses,
            hints: Vec::new(),
        });
        self
    }

    pub fn empty_vreg(mut self, id: u32) -> Self {
        self.func.vregs.push(VRegDesc {
            id: VirtReg::new(id),
            class: RegClassId(0),
            segments: Vec::new(),
            uses: Vec::new(),
            hints: Vec::new(),
        });
        self
    }

    pub fn hint(mut self, id: u32, preg: u16) -> Self {
        if let Some(v) = self.func.vregs.iter_mut().find(|v| v.id == VirtReg::new(id)) {
            v.hints.push(PhysReg::new(preg));
        }
        self
    }

    pub fn clobber(mut self, slot: SlotIndex, pregs: &[u16]) -> Self {
        self.func.regmasks.push(RegMaskPoint {
            slot,
            clobbers: pregs.iter().map(|p| PhysReg::new(*p)).collect(),
        });
        self
    }

    pub fn build(self) -> Function {
        self.func
    }
}

/// Deterministic pseudo-random functions for the property tests
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) % u64::from(n.max(1))) as u32
    }
}

/// `count` ranges over four blocks of 16 slots, one call clobbering `$p0`
pub fn generated(seed: u64, count: u32) -> Function {
    let mut rng = Lcg::new(seed);
    let mut b = FuncBuilder::new(&format!("gen{seed}"))
        .blocks(16, &[1.0, 8.0, 8.0, 1.0])
        .clobber(33, &[0]);
    for id in 0..count {
        let start = rng.below(60);
        let len = 2 + rng.below(63 - start);
        let end = (start + len).min(64);
        let mut reads: Vec<SlotIndex> = (0..rng.below(4)).map(|_| start + 1 + rng.below(end - start - 1)).collect();
        reads.push(end - 1);
        reads.sort_unstable();
        reads.dedup();
        b = b.vreg(id, start, end, &reads);
        if rng.below(5) == 0 {
            b = b.hint(id, rng.below(3) as u16);
        }
    }
    b.build()
}

/// Panics when two assigned ranges of the session share a register
pub fn assert_non_overlap(session: &AllocSession<'_>) {
    let conflicts = verify_assignment(session.func, session.target, &session.lis, &session.matrix.assignments());
    assert!(conflicts.is_empty(), "conflicts: {:?}", conflicts);
}
