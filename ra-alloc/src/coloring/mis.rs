//! Independent-set extraction followed by a residual allocator

use super::cover::VertexCoverSource;
use super::graph::InterferenceGraph;
use crate::basic::BasicAllocator;
use crate::config::ResidualKind;
use crate::driver::allocate_phys_regs;
use crate::greedy::GreedyAllocator;
use crate::interference::InterferenceKind;
use crate::queue::{GreedyQueue, SpillWeightQueue};
use crate::session::AllocSession;
use log::{debug, info, warn};
use ra_common::{AllocError, VirtReg};

pub struct MisColoring {
    source: Box<dyn VertexCoverSource>,
}

impl MisColoring {
    pub fn new(source: Box<dyn VertexCoverSource>) -> Self {
        Self { source }
    }

    /// Color independent sets, then hand the rest to the residual allocator
    pub fn run(&mut self, session: &mut AllocSession<'_>) -> Result<(), AllocError> {
        if session.config.skip_mis {
            debug!("independent-set extraction disabled for {}", session.unit());
        } else {
            self.extract(session)?;
        }
        match session.config.residual {
            ResidualKind::Greedy => {
                let mut greedy = GreedyAllocator::new(session.config);
                allocate_phys_regs(session, &mut GreedyQueue::new(), &mut greedy)
            }
            ResidualKind::Basic => allocate_phys_regs(session, &mut SpillWeightQueue::new(), &mut BasicAllocator),
        }
    }

    /// The extraction rounds alone
    pub fn extract(&mut self, session: &mut AllocSession<'_>) -> Result<(), AllocError> {
        let empty: Vec<VirtReg> = session.lis.iter().filter(|li| li.is_empty()).map(|li| li.reg).collect();
        for vreg in empty {
            session.set_aside(vreg);
        }
        let unit = session.unit().to_string();
        let mut graph = InterferenceGraph::build(&session.lis, &session.pending());

        for iteration in 0..session.config.independent_set_extractions {
            if graph.is_empty() {
                break;
            }
            if let Some(dir) = &session.config.export_graphs {
                graph.write_to(&dir.join(format!("{unit}.graph.{iteration}")))?;
            }
            let cover = self.source.cover(&unit, &graph, iteration)?;
            for &id in cover.iter().filter(|id| !graph.contains(**id)) {
                warn!("vertex cover of {} names unknown node {}", unit, id);
                let loc = session.location(VirtReg::new(id));
                session
                    .reporter
                    .warning(format!("vertex cover names node {id} which is not in the graph"), loc);
            }

            let independent: Vec<u32> = graph.nodes().filter(|n| !cover.contains(n)).collect();
            let mut colored = 0;
            for node in independent {
                let vreg = VirtReg::new(node);
                let li = session.interval(vreg)?;
                let order = session.order.order(li.class, &li.hints);
                let mut found = None;
                // The cover may be wrong; freedom is checked regardless
                for preg in order {
                    if session.matrix.check_interference(&session.lis, vreg, preg) == InterferenceKind::Free {
                        found = Some(preg);
                        break;
                    }
                }
                match found {
                    Some(preg) => {
                        session.assign(vreg, preg);
                        session.stats.mis_colored += 1;
                        graph.remove(node);
                        colored += 1;
                    }
                    None => {
                        warn!("no free register for independent node {}", vreg);
                        let loc = session.location(vreg);
                        session
                            .reporter
                            .warning("no free register for independent-set node".to_string(), loc);
                        // Left for the residual allocator
                        graph.remove(node);
                    }
                }
            }
            session.observe_cost();
            info!(
                "{}: extraction {} colored {} ranges, {} left",
                unit,
                iteration,
                colored,
                graph.len()
            );
        }
        Ok(())
    }
}
