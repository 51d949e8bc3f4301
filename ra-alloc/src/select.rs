//! Variant dispatch and per-unit variant selection

use crate::basic::BasicAllocator;
use crate::coloring::{GreedyCover, MisColoring, VertexCoverSource};
use crate::config::{AllocConfig, AllocatorKind};
use crate::driver::allocate_phys_regs;
use crate::greedy::GreedyAllocator;
use crate::monitor::HYSTERESIS;
use crate::queue::{GreedyQueue, SpillWeightQueue};
use crate::report::RunReport;
use crate::session::AllocSession;
use log::{debug, info, warn};
use ra_common::AllocError;
use std::fs;
use std::io;
use std::path::PathBuf;

/// One allocator per variant, chosen once per run
pub enum Allocator {
    Basic(BasicAllocator),
    Greedy(GreedyAllocator),
    Mis(MisColoring),
}

impl Allocator {
    /// The configured variant; the coloring variant gets the built-in cover
    pub fn from_config(config: &AllocConfig) -> Self {
        match config.variant {
            AllocatorKind::Basic => Allocator::Basic(BasicAllocator),
            AllocatorKind::Greedy => Allocator::Greedy(GreedyAllocator::new(config)),
            AllocatorKind::Mis => Allocator::Mis(MisColoring::new(Box::new(GreedyCover))),
        }
    }

    pub fn mis_with(source: Box<dyn VertexCoverSource>) -> Self {
        Allocator::Mis(MisColoring::new(source))
    }

    pub fn kind(&self) -> AllocatorKind {
        match self {
            Allocator::Basic(_) => AllocatorKind::Basic,
            Allocator::Greedy(_) => AllocatorKind::Greedy,
            Allocator::Mis(_) => AllocatorKind::Mis,
        }
    }

    /// Allocate everything in `session` and wrap the run up
    pub fn run(&mut self, session: &mut AllocSession<'_>) -> Result<(), AllocError> {
        info!("allocating {} with the {} allocator", session.unit(), self.kind());
        match self {
            Allocator::Basic(basic) => allocate_phys_regs(session, &mut SpillWeightQueue::new(), basic)?,
            Allocator::Greedy(greedy) => allocate_phys_regs(session, &mut GreedyQueue::new(), greedy)?,
            Allocator::Mis(mis) => mis.run(session)?,
        }
        session.finish()
    }
}

/// Run reports of earlier runs, by unit and variant
pub trait CostReportSource {
    fn report(&self, unit: &str, variant: AllocatorKind) -> Option<RunReport>;
}

/// Reports stored as `<dir>/<unit>.<variant>.txt`
#[derive(Debug, Clone)]
pub struct FileReports {
    dir: PathBuf,
}

impl FileReports {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, unit: &str, variant: AllocatorKind) -> PathBuf {
        self.dir.join(format!("{unit}.{variant}.txt"))
    }

    pub fn write(&self, unit: &str, report: &RunReport) -> Result<(), AllocError> {
        fs::write(self.path_for(unit, report.variant), report.to_text())?;
        Ok(())
    }
}

impl CostReportSource for FileReports {
    fn report(&self, unit: &str, variant: AllocatorKind) -> Option<RunReport> {
        let path = self.path_for(unit, variant);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        match RunReport::parse(&text) {
            Ok(report) if report.variant == variant => Some(report),
            Ok(report) => {
                warn!("{} holds a {} report", path.display(), report.variant);
                None
            }
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// The variant to use for `unit`: greedy unless another variant's final
/// cost beats it by more than the hysteresis margin
pub fn select_variant(source: &dyn CostReportSource, unit: &str) -> AllocatorKind {
    let Some(baseline) = source.report(unit, AllocatorKind::Greedy) else {
        debug!("no greedy report for {}, keeping greedy", unit);
        return AllocatorKind::Greedy;
    };
    let mut best = (AllocatorKind::Greedy, baseline.final_spill_cost);
    for kind in AllocatorKind::ALL {
        if kind == AllocatorKind::Greedy {
            continue;
        }
        if let Some(report) = source.report(unit, kind) {
            if report.final_spill_cost < best.1 * HYSTERESIS {
                best = (kind, report.final_spill_cost);
            }
        }
    }
    debug!("selected {} for {} (cost {})", best.0, unit, best.1);
    best.0
}
