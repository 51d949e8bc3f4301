//! End-to-end scenarios

use super::common::{assert_non_overlap, FuncBuilder};
use crate::coloring::{FileCover, MisColoring};
use crate::config::{AllocConfig, AllocatorKind};
use crate::cost::{CostModel, PendingWeightCost};
use crate::driver::{allocate_phys_regs, SelectOrSplit, Selection};
use crate::evict::WeightEviction;
use crate::greedy::GreedyAllocator;
use crate::interference::InterferenceLayer;
use crate::live::LiveIntervals;
use crate::oracle::FileOracle;
use crate::order::{AllocationOrder, ClassOrder, OrderProvider};
use crate::queue::{AllocQueue, GreedyQueue};
use crate::select::Allocator;
use crate::session::AllocSession;
use crate::spiller::{InlineSpiller, SpillSlot, Spiller};
use crate::split::{SplitEditor, SplitPipeline};
use crate::target::TargetInfo;
use crate::{allocate, run};
use pretty_assertions::assert_eq;
use ra_common::{AllocError, PhysReg, RegClassId, Segment, Stage, VirtReg};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::rc::Rc;

#[test]
fn test_chain_of_three_shares_a_register() {
    // A-B and B-C overlap, A and C do not
    let func = FuncBuilder::new("chain")
        .blocks(40, &[1.0])
        .vreg(0, 0, 10, &[9])
        .vreg(1, 5, 25, &[12, 24])
        .vreg(2, 20, 30, &[29])
        .build();
    let target = TargetInfo::uniform(2);
    for variant in AllocatorKind::ALL {
        let config = AllocConfig {
            verify: true,
            ..AllocConfig::default().with_variant(variant)
        };
        let result = allocate(&func, &target, &config).unwrap();
        let (a, b, c) = (
            result.phys(VirtReg::new(0)),
            result.phys(VirtReg::new(1)),
            result.phys(VirtReg::new(2)),
        );
        assert!(a.is_some() && b.is_some(), "{variant}: {result:?}");
        assert_eq!(a, c, "{variant}");
        assert_ne!(a, b, "{variant}");
        assert_eq!(result.stats.spills, 0);
        assert!(result.diagnostics.is_empty());
    }
}

#[test]
fn test_unused_split_product_is_dropped_with_its_history() {
    let func = FuncBuilder::new("drop")
        .blocks(20, &[1.0, 1.0])
        .vreg(0, 2, 38, &[5, 36])
        .vreg(1, 0, 40, &[1, 39])
        .build();
    let target = TargetInfo::uniform(1);
    let config = AllocConfig::default();
    let mut session = AllocSession::new(&func, &target, &config).unwrap();
    let (parent, other, r0) = (VirtReg::new(0), VirtReg::new(1), PhysReg::new(0));
    session.registry.set_stage(parent, Stage::Split);
    session.registry.set_evicted(parent, 3, 1);
    session.evictions.add_eviction(r0, other, parent);

    // Carve out the two use clusters, leaving a connecting piece without uses
    let mut editor = SplitEditor::new(parent);
    let head = editor.open_interval(None);
    editor.add(head, [Segment::new(2, 6)]);
    let tail = editor.open_interval(None);
    editor.add(tail, [Segment::new(36, 38)]);
    let created = editor.finish(&mut session, Stage::Split2);
    assert_eq!(created.len(), 3);
    let dead = created[2];
    assert!(session.lis.get(dead).unwrap().is_unused());
    assert!(!session.evictions.mentions(parent));

    // Pretend the dead piece had been evicted before it gets requeued
    session.registry.set_evicted(dead, 4, 2);
    session.evictions.add_eviction(r0, other, dead);

    let mut queue = GreedyQueue::new();
    session.enqueue_new(&mut queue, &created);
    assert_eq!(queue.len(), 2);
    assert!(!session.lis.contains(dead));
    assert!(!session.registry.contains(dead));
    assert!(!session.evictions.mentions(dead));
    assert_eq!(session.stats.dropped, 1);
    while let Some(vreg) = queue.dequeue() {
        assert_ne!(vreg, dead);
    }
}

#[test]
fn test_full_cover_leaves_everything_to_the_residual() {
    let dir = tempfile::tempdir().unwrap();
    let func = FuncBuilder::new("cov")
        .blocks(40, &[1.0])
        .vreg(0, 0, 10, &[9])
        .vreg(1, 5, 25, &[12, 24])
        .vreg(2, 20, 30, &[29])
        .vreg(3, 31, 35, &[34])
        .empty_vreg(4)
        .build();
    fs::write(dir.path().join("cov.cover.0"), "0 1 2 3\n").unwrap();
    let target = TargetInfo::uniform(2);
    let config = AllocConfig {
        export_graphs: Some(dir.path().to_path_buf()),
        verify: true,
        ..AllocConfig::default().with_variant(AllocatorKind::Mis)
    };
    let mut session = AllocSession::new(&func, &target, &config).unwrap();
    let before = session.pending();

    let mut mis = MisColoring::new(Box::new(FileCover::new(dir.path())));
    mis.extract(&mut session).unwrap();
    assert_eq!(session.stats.mis_colored, 0);
    assert_eq!(session.pending(), before);
    let exported = fs::read_to_string(dir.path().join("cov.graph.0")).unwrap();
    assert_eq!(exported, "0 1\n1 0 2\n2 1\n3\n");

    let mut greedy = GreedyAllocator::new(&config);
    allocate_phys_regs(&mut session, &mut GreedyQueue::new(), &mut greedy).unwrap();
    session.finish().unwrap();
    assert!(session.pending().is_empty());
    assert_non_overlap(&session);

    let result = session.into_result(AllocatorKind::Mis);
    assert_eq!(result.unallocated_empty, vec![VirtReg::new(4)]);
    for id in 0..4 {
        assert!(result.phys(VirtReg::new(id)).is_some());
    }
}

#[test]
fn test_cascade_bound_falls_through_to_splitting() {
    let func = FuncBuilder::new("bound")
        .blocks(40, &[1.0])
        .vreg(0, 0, 30, &[29])
        .vreg(1, 5, 10, &[7, 8, 9])
        .build();
    let target = TargetInfo::uniform(1);
    let config = AllocConfig {
        max_cascade_depth: 2,
        ..AllocConfig::default()
    };
    let mut session = AllocSession::new(&func, &target, &config).unwrap();
    let (light, heavy, r0) = (VirtReg::new(0), VirtReg::new(1), PhysReg::new(0));
    session.assign(light, r0);
    // heavy already sits at the end of a chain as long as the bound
    session.registry.set_evicted(heavy, 0, 2);

    let mut greedy = GreedyAllocator::with_parts(WeightEviction { max_depth: 2 }, SplitPipeline);
    let mut queue = GreedyQueue::new();
    assert_eq!(
        greedy.select_or_split(&mut session, &mut queue, heavy).unwrap(),
        Selection::Replaced(vec![heavy])
    );
    assert_eq!(session.registry.stage(heavy), Stage::Split);
    assert_eq!(session.matrix.phys(light), Some(r0));

    let Selection::Replaced(pieces) = greedy.select_or_split(&mut session, &mut queue, heavy).unwrap() else {
        panic!("expected a split");
    };
    assert!(pieces.len() >= 2);
    assert_eq!(session.stats.evictions, 0);
    assert_eq!(session.stats.splits, 1);
    assert_eq!(session.matrix.phys(light), Some(r0));
    assert!(queue.is_empty());
}

#[test]
fn test_missing_oracle_file_means_unbounded() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = FuncBuilder::new("unbounded").blocks(16, &[1.0, 4.0, 1.0]);
    for id in 0..12 {
        b = b.vreg(id, id * 3, id * 3 + 10, &[id * 3 + 9]);
    }
    let func = b.build();
    let target = TargetInfo::uniform(2);
    let config = AllocConfig {
        enable_oracle: true,
        check_round_limit: true,
        ..AllocConfig::default()
    };
    let session = AllocSession::new(&func, &target, &config)
        .unwrap()
        .with_oracle(Box::new(FileOracle::new(dir.path())));
    let result = run(&mut Allocator::from_config(&config), session).unwrap();
    assert!(result.stats.rounds > 12);
    assert!(result.marked.is_empty());
}

#[test]
fn test_oracle_limit_aborts_outside_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = FuncBuilder::new("bounded").blocks(16, &[1.0, 4.0, 1.0]);
    for id in 0..12 {
        b = b.vreg(id, id * 3, id * 3 + 10, &[id * 3 + 9]);
    }
    let func = b.build();
    fs::write(dir.path().join("bounded.txt"), "5\n").unwrap();
    let target = TargetInfo::uniform(2);
    let config = AllocConfig {
        enable_oracle: true,
        ..AllocConfig::default()
    };
    let session = AllocSession::new(&func, &target, &config)
        .unwrap()
        .with_oracle(Box::new(FileOracle::new(dir.path())));
    let err = run(&mut Allocator::from_config(&config), session).unwrap_err();
    assert_eq!(err, AllocError::RoundLimitExceeded { round: 6, limit: 5 });
}

#[test]
fn test_empty_class_is_fatal_after_the_run() {
    let func = FuncBuilder::new("noregs").blocks(20, &[1.0]).vreg(0, 0, 5, &[4]).vreg(1, 6, 9, &[8]).build();
    let mut target = TargetInfo::uniform(2);
    target.reserved = vec![PhysReg::new(0), PhysReg::new(1)];
    let config = AllocConfig::default();
    let mut session = AllocSession::new(&func, &target, &config).unwrap();
    let mut greedy = GreedyAllocator::new(&config);
    allocate_phys_regs(&mut session, &mut GreedyQueue::new(), &mut greedy).unwrap();

    // Reported once for the class, returned when the run is wrapped up
    assert_eq!(session.reporter.error_count(), 1);
    assert!(matches!(session.finish(), Err(AllocError::ClassExhausted { .. })));
}

#[test]
fn test_fixed_use_overflow_is_diagnosed() {
    let mut func = FuncBuilder::new("asm")
        .blocks(20, &[1.0])
        .vreg(0, 0, 10, &[5])
        .vreg(1, 2, 8, &[5])
        .build();
    for v in &mut func.vregs {
        for u in &mut v.uses {
            *u = u.pinned();
        }
    }
    let target = TargetInfo::uniform(1);
    let result = allocate(&func, &target, &AllocConfig::default()).unwrap();

    // The pinned pieces of the second range cannot be placed
    assert!(!result.forced.is_empty());
    assert_eq!(result.diagnostics.len(), result.forced.len());
    for diag in &result.diagnostics {
        assert_eq!(diag.message, "inline constraint requires more registers than available");
        assert_eq!(diag.notes, vec!["continuing with $p0".to_string()]);
        assert!(diag.location.slot.is_some());
    }
}

/// Candidates of the target's class order, last register first
struct ReversedOrder(ClassOrder);

impl OrderProvider for ReversedOrder {
    fn order(&self, class: RegClassId, hints: &[PhysReg]) -> AllocationOrder {
        let regs = self.0.order(class, hints).as_slice().iter().rev().copied().collect();
        AllocationOrder::new(regs, 0)
    }
}

/// Counts spills and hands the work to the inline spiller
struct CountingSpiller {
    inner: InlineSpiller,
    calls: Rc<Cell<u64>>,
}

impl Spiller for CountingSpiller {
    fn spill(&mut self, lis: &mut LiveIntervals, vreg: VirtReg) -> Vec<VirtReg> {
        self.calls.set(self.calls.get() + 1);
        self.inner.spill(lis, vreg)
    }

    fn post_optimization(&mut self, lis: &LiveIntervals) {
        self.inner.post_optimization(lis);
    }

    fn slots(&self) -> BTreeMap<VirtReg, SpillSlot> {
        self.inner.slots()
    }
}

/// Counts cost queries
struct CountingCost(Rc<Cell<u64>>);

impl CostModel for CountingCost {
    fn potential_spill_cost(&self, lis: &LiveIntervals, matrix: &dyn InterferenceLayer) -> f32 {
        self.0.set(self.0.get() + 1);
        PendingWeightCost.potential_spill_cost(lis, matrix)
    }
}

#[test]
fn test_injected_order_is_followed() {
    let func = FuncBuilder::new("order").blocks(20, &[1.0]).vreg(0, 0, 10, &[9]).build();
    let target = TargetInfo::uniform(3);
    let config = AllocConfig::default();
    let session = AllocSession::new(&func, &target, &config)
        .unwrap()
        .with_order(Box::new(ReversedOrder(ClassOrder::new(&target))));
    let result = run(&mut Allocator::from_config(&config), session).unwrap();
    assert_eq!(result.phys(VirtReg::new(0)), Some(PhysReg::new(2)));
}

#[test]
fn test_injected_spiller_and_cost_model_are_used() {
    // Three ranges live together over [4, 17) with two registers
    let func = FuncBuilder::new("inject")
        .blocks(20, &[1.0])
        .vreg(0, 0, 20, &[19])
        .vreg(1, 2, 20, &[18])
        .vreg(2, 4, 20, &[17])
        .build();
    let target = TargetInfo::uniform(2);
    let config = AllocConfig::default().with_variant(AllocatorKind::Basic);
    let spills = Rc::new(Cell::new(0));
    let costs = Rc::new(Cell::new(0));
    let session = AllocSession::new(&func, &target, &config)
        .unwrap()
        .with_spiller(Box::new(CountingSpiller {
            inner: InlineSpiller::new(),
            calls: Rc::clone(&spills),
        }))
        .with_cost_model(Box::new(CountingCost(Rc::clone(&costs))));
    let result = run(&mut Allocator::from_config(&config), session).unwrap();

    assert!(spills.get() > 0);
    assert_eq!(spills.get(), result.stats.spills);
    assert!(!result.spill_slots.is_empty());
    // Once before the first round and once after every round
    assert!(costs.get() > result.stats.rounds);
}
