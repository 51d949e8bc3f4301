//! Per-run allocation context
//!
//! Everything one allocation run mutates lives here: the live intervals, the
//! range registry, the interference layer, the injected collaborators, the
//! round counter and cost minimum, the eviction history and the diagnostics.
//! Nothing is shared between runs.

use crate::config::{AllocConfig, AllocatorKind};
use crate::cost::{CostModel, PendingWeightCost};
use crate::evict::EvictionTrack;
use crate::function::Function;
use crate::interference::{InterferenceLayer, LiveRegMatrix};
use crate::live::{LiveInterval, LiveIntervals};
use crate::monitor::SpillCostMonitor;
use crate::oracle::{NoOracle, RoundOracle};
use crate::order::{ClassOrder, OrderProvider};
use crate::queue::AllocQueue;
use crate::registry::LiveRangeRegistry;
use crate::report::{AllocStats, AllocationResult};
use crate::spiller::{InlineSpiller, Spiller};
use crate::target::TargetInfo;
use crate::verify::verify_assignment;
use log::{debug, info, warn};
use ra_common::{
    AllocError, ErrorReporter, PhysReg, ProgramLocation, RegClassId, Stage, VirtReg,
};
use std::collections::{BTreeMap, BTreeSet};

pub struct AllocSession<'a> {
    pub func: &'a Function,
    pub target: &'a TargetInfo,
    pub config: &'a AllocConfig,
    pub lis: LiveIntervals,
    pub registry: LiveRangeRegistry,
    pub matrix: Box<dyn InterferenceLayer>,
    pub order: Box<dyn OrderProvider>,
    pub spiller: Box<dyn Spiller>,
    pub cost_model: Box<dyn CostModel>,
    pub oracle: Box<dyn RoundOracle>,
    pub monitor: SpillCostMonitor,
    pub evictions: EvictionTrack,
    pub reporter: ErrorReporter,
    pub stats: AllocStats,
    forced: BTreeMap<VirtReg, PhysReg>,
    set_aside: BTreeSet<VirtReg>,
    marked: Vec<VirtReg>,
    exhausted: BTreeSet<RegClassId>,
    fatal: Option<AllocError>,
}

impl<'a> AllocSession<'a> {
    /// Validate the inputs and set up a run with the default collaborators
    pub fn new(func: &'a Function, target: &'a TargetInfo, config: &'a AllocConfig) -> Result<Self, AllocError> {
        target.validate()?;
        func.validate(target)?;
        let monitor = if config.fallback {
            SpillCostMonitor::frozen()
        } else {
            SpillCostMonitor::new()
        };
        Ok(Self {
            func,
            target,
            config,
            lis: LiveIntervals::new(func),
            registry: LiveRangeRegistry::new(),
            matrix: Box::new(LiveRegMatrix::new(target, func)),
            order: Box::new(ClassOrder::new(target)),
            spiller: Box::new(InlineSpiller::new()),
            cost_model: Box::new(PendingWeightCost),
            oracle: Box::new(NoOracle),
            monitor,
            evictions: EvictionTrack::default(),
            reporter: ErrorReporter::new(),
            stats: AllocStats::default(),
            forced: BTreeMap::new(),
            set_aside: BTreeSet::new(),
            marked: Vec::new(),
            exhausted: BTreeSet::new(),
            fatal: None,
        })
    }

    pub fn with_order(mut self, order: Box<dyn OrderProvider>) -> Self {
        self.order = order;
        self
    }

    pub fn with_spiller(mut self, spiller: Box<dyn Spiller>) -> Self {
        self.spiller = spiller;
        self
    }

    pub fn with_cost_model(mut self, cost_model: Box<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_oracle(mut self, oracle: Box<dyn RoundOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn unit(&self) -> &str {
        &self.func.name
    }

    pub fn location(&self, vreg: VirtReg) -> ProgramLocation {
        ProgramLocation::unit(&self.func.name).with_vreg(vreg)
    }

    pub fn interval(&self, vreg: VirtReg) -> Result<&LiveInterval, AllocError> {
        self.lis
            .get(vreg)
            .ok_or_else(|| AllocError::invalid_input(format!("{vreg} has no live interval")))
    }

    /// Ranges with a live interval that hold no register yet
    pub fn pending(&self) -> Vec<VirtReg> {
        self.lis
            .iter()
            .filter(|li| !li.is_empty())
            .map(|li| li.reg)
            .filter(|v| self.matrix.phys(*v).is_none() && !self.forced.contains_key(v))
            .collect()
    }

    pub fn assign(&mut self, vreg: VirtReg, preg: PhysReg) {
        debug!("assigning {} to {}", vreg, self.target.reg_name(preg));
        self.matrix.assign(&self.lis, vreg, preg);
        self.evictions.clear_evictee(vreg);
    }

    /// Record that `vreg` needs no register at all
    pub fn set_aside(&mut self, vreg: VirtReg) {
        self.set_aside.insert(vreg);
    }

    /// Drop a range nothing uses any more, with all of its bookkeeping
    pub fn drop_range(&mut self, vreg: VirtReg) {
        debug!("dropping unused range {}", vreg);
        self.matrix.unassign(vreg);
        self.lis.remove(vreg);
        self.registry.remove(vreg);
        self.evictions.forget(vreg);
        self.stats.dropped += 1;
    }

    /// Retire `parent` in favor of ranges carved out of it
    pub fn retire_split(&mut self, parent: VirtReg, children: &[VirtReg], stage: Stage) {
        self.registry.inherit(parent, children, stage);
        self.lis.remove(parent);
        self.registry.remove(parent);
        self.evictions.forget(parent);
        self.stats.splits += 1;
    }

    /// Spill `vreg`; the products start out in memory
    pub fn spill_range(&mut self, vreg: VirtReg) -> Vec<VirtReg> {
        self.matrix.unassign(vreg);
        let products = self.spiller.spill(&mut self.lis, vreg);
        self.registry.inherit(vreg, &products, Stage::Memory);
        self.registry.remove(vreg);
        self.evictions.forget(vreg);
        self.stats.spills += 1;
        products
    }

    /// Put freshly created ranges on the work-list, dropping the unused ones
    pub fn enqueue_new(&mut self, queue: &mut dyn AllocQueue, vregs: &[VirtReg]) {
        for &vreg in vregs {
            let Some(li) = self.lis.get(vreg) else {
                continue;
            };
            if li.is_unused() {
                self.drop_range(vreg);
            } else {
                queue.enqueue(&self.lis, &self.registry, vreg);
            }
        }
    }

    pub fn observe_cost(&mut self) -> f32 {
        let cost = self.cost_model.potential_spill_cost(&self.lis, self.matrix.as_ref());
        self.monitor.observe(cost);
        cost
    }

    pub fn mark(&mut self, vreg: VirtReg) {
        info!("marking {} in round {} as sub-optimal", vreg, self.monitor.round());
        self.marked.push(vreg);
    }

    /// Nothing could be found for `vreg`; give it a best-effort register
    /// and report why
    pub fn handle_exhausted(&mut self, vreg: VirtReg) -> Result<(), AllocError> {
        let li = self.interval(vreg)?;
        let class = li.class;
        let fixed_use = li.uses.iter().find(|u| u.fixed).copied();
        let order = self.order.order(class, &li.hints);
        self.registry.set_stage(vreg, Stage::Done);

        let Some(preg) = order.first() else {
            if self.exhausted.insert(class) {
                warn!("register class {} has no allocatable registers", class);
                let loc = self.location(vreg);
                self.reporter
                    .error(format!("no registers from class {class} available to allocate"), loc);
            }
            if self.fatal.is_none() {
                self.fatal = Some(AllocError::ClassExhausted { class });
            }
            return Ok(());
        };

        let name = self.target.reg_name(preg);
        match fixed_use {
            Some(u) => {
                let loc = self.location(vreg).with_slot(u.slot);
                self.reporter
                    .error("inline constraint requires more registers than available".to_string(), loc)
                    .notes
                    .push(format!("continuing with {name}"));
            }
            None => {
                let loc = self.location(vreg);
                self.reporter
                    .error("ran out of registers during register allocation".to_string(), loc)
                    .notes
                    .push(format!("continuing with {name}"));
            }
        }
        warn!("forcing {} into {}", vreg, name);
        self.forced.insert(vreg, preg);
        Ok(())
    }

    pub fn forced(&self) -> &BTreeMap<VirtReg, PhysReg> {
        &self.forced
    }

    pub fn marked(&self) -> &[VirtReg] {
        &self.marked
    }

    /// Wrap up the run: spiller cleanup, delayed fatal conditions and the
    /// optional verification
    pub fn finish(&mut self) -> Result<(), AllocError> {
        self.spiller.post_optimization(&self.lis);
        if let Some(err) = self.fatal.clone() {
            return Err(err);
        }
        if self.config.verify {
            let conflicts = verify_assignment(self.func, self.target, &self.lis, &self.matrix.assignments());
            if let Some(first) = conflicts.first() {
                return Err(AllocError::Verification {
                    message: format!("{} conflicts, first: {}", conflicts.len(), first),
                });
            }
        }
        info!("{}: {}", self.func.name, self.reporter.summary());
        Ok(())
    }

    pub fn into_result(mut self, variant: AllocatorKind) -> AllocationResult {
        let assignment = self.matrix.assignments();
        let unassigned = self.pending();
        let origins = self
            .lis
            .iter()
            .filter(|li| li.origin != li.reg)
            .map(|li| (li.reg, li.origin))
            .collect();

        let mut stats = std::mem::take(&mut self.stats);
        stats.rounds = self.monitor.round();
        stats.min_round = self.monitor.min_round();
        stats.final_spill_cost = self.monitor.last_cost();
        stats.min_spill_cost = if self.monitor.min_cost().is_finite() {
            self.monitor.min_cost()
        } else {
            stats.final_spill_cost
        };

        AllocationResult {
            unit: self.func.name.clone(),
            variant,
            assignment,
            forced: self.forced,
            spill_slots: self.spiller.slots(),
            unallocated_empty: self.set_aside.into_iter().collect(),
            unassigned,
            origins,
            marked: self.marked,
            stats,
            diagnostics: self.reporter.take(),
        }
    }
}
