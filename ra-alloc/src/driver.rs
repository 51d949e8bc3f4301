//! Work-list driver
//!
//! The driver owns the main allocation loop shared by every variant. A
//! variant only decides what to do with one dequeued range through
//! [`SelectOrSplit`]; the driver seeds the queue, drops ranges nobody uses,
//! keeps the interference cache honest, counts rounds, feeds the cost
//! monitor and applies the outcome.

use crate::queue::AllocQueue;
use crate::session::AllocSession;
use log::{debug, error, trace};
use ra_common::{AllocError, PhysReg, VirtReg};

/// What a variant decided for one dequeued range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The register is free (possibly after evictions) and should be assigned
    Assigned(PhysReg),
    /// Nothing can be done; the driver falls back to a best-effort register
    Exhausted,
    /// The range was retired or requeued; these ranges take its place
    Replaced(Vec<VirtReg>),
}

pub trait SelectOrSplit {
    fn select_or_split(
        &mut self,
        session: &mut AllocSession<'_>,
        queue: &mut dyn AllocQueue,
        vreg: VirtReg,
    ) -> Result<Selection, AllocError>;
}

/// Enqueue every pending range with a non-empty live range. Empty ones are
/// set aside.
pub fn seed_live_regs(session: &mut AllocSession<'_>, queue: &mut dyn AllocQueue) {
    let empty: Vec<VirtReg> = session.lis.iter().filter(|li| li.is_empty()).map(|li| li.reg).collect();
    for vreg in empty {
        trace!("setting aside empty range {}", vreg);
        session.set_aside(vreg);
    }
    for vreg in session.pending() {
        queue.enqueue(&session.lis, &session.registry, vreg);
    }
    debug!("seeded {} ranges for {}", queue.len(), session.func.name);
}

/// Run the allocation loop until the queue is empty
pub fn allocate_phys_regs<Q, S>(
    session: &mut AllocSession<'_>,
    queue: &mut Q,
    strategy: &mut S,
) -> Result<(), AllocError>
where
    Q: AllocQueue,
    S: SelectOrSplit + ?Sized,
{
    seed_live_regs(session, queue);

    let unit = session.func.name.clone();
    let limit = if session.config.enable_oracle {
        session.oracle.round_limit(&unit)
    } else {
        None
    };
    let suboptimal = limit.is_some() && session.oracle.is_suboptimal(&unit);
    session.observe_cost();

    while let Some(vreg) = queue.dequeue() {
        if let Some(preg) = session.matrix.phys(vreg) {
            error!("{} dequeued while assigned to {}", vreg, preg);
            return Err(AllocError::RegisterAlreadyAssigned { vreg, preg });
        }
        let Some(li) = session.lis.get(vreg) else {
            trace!("skipping retired range {}", vreg);
            continue;
        };
        let unused = li.is_unused();

        let round = session.monitor.next_round();
        if let Some(limit) = limit {
            if round == limit && suboptimal {
                session.mark(vreg);
            }
            if round > limit && session.config.check_round_limit && !session.config.fallback {
                error!("round {} of {} passed the limit {}", round, unit, limit);
                return Err(AllocError::RoundLimitExceeded { round, limit });
            }
        }

        if unused {
            session.drop_range(vreg);
            session.observe_cost();
            continue;
        }

        // Anything assigned or evicted since the last round makes cached answers stale
        session.matrix.invalidate();
        debug!(
            "round {}: selectOrSplit {} stage={} cascade={} weight={}",
            round,
            vreg,
            session.registry.stage(vreg),
            session.registry.cascade(vreg),
            session.lis.get(vreg).map_or(0.0, |li| li.weight)
        );

        match strategy.select_or_split(session, queue, vreg)? {
            Selection::Assigned(preg) => session.assign(vreg, preg),
            Selection::Exhausted => session.handle_exhausted(vreg)?,
            Selection::Replaced(new) => {
                trace!("{} replaced by {:?}", vreg, new);
                session.enqueue_new(queue, &new);
            }
        }
        session.observe_cost();
    }

    let final_cost = session
        .cost_model
        .potential_spill_cost(&session.lis, session.matrix.as_ref());
    session
        .monitor
        .finish(final_cost, session.config.check_cost_regression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocConfig;
    use crate::function::{Block, Function, UseSlot, VRegDesc};
    use crate::interference::InterferenceKind;
    use crate::oracle::FixedOracle;
    use crate::queue::GreedyQueue;
    use crate::target::TargetInfo;
    use pretty_assertions::assert_eq;
    use ra_common::{RegClassId, Segment};

    /// Takes the first free register or gives up
    struct FirstFree;

    impl SelectOrSplit for FirstFree {
        fn select_or_split(
            &mut self,
            session: &mut AllocSession<'_>,
            _queue: &mut dyn AllocQueue,
            vreg: VirtReg,
        ) -> Result<Selection, AllocError> {
            let li = session.interval(vreg)?;
            let order = session.order.order(li.class, &li.hints);
            for preg in order {
                if session.matrix.check_interference(&session.lis, vreg, preg) == InterferenceKind::Free {
                    return Ok(Selection::Assigned(preg));
                }
            }
            Ok(Selection::Exhausted)
        }
    }

    /// Assigns behind the driver's back and asks for a requeue
    struct DoubleBooking;

    impl SelectOrSplit for DoubleBooking {
        fn select_or_split(
            &mut self,
            session: &mut AllocSession<'_>,
            _queue: &mut dyn AllocQueue,
            vreg: VirtReg,
        ) -> Result<Selection, AllocError> {
            session.assign(vreg, PhysReg::new(0));
            Ok(Selection::Replaced(vec![vreg]))
        }
    }

    fn function(ranges: &[(u32, u32, u32)]) -> Function {
        let mut func = Function::new("drv");
        func.blocks = vec![Block::new(0, 100, 1.0)];
        for &(id, start, end) in ranges {
            let uses = if end > start + 1 {
                vec![UseSlot::def(start), UseSlot::read(end - 1)]
            } else {
                Vec::new()
            };
            func.vregs.push(VRegDesc {
                id: VirtReg::new(id),
                class: RegClassId(0),
                segments: vec![Segment::new(start, end)],
                uses,
                hints: Vec::new(),
            });
        }
        func
    }

    #[test]
    fn test_loop_assigns_and_forces() {
        let func = function(&[(0, 0, 10), (1, 5, 15), (2, 12, 20)]);
        let target = TargetInfo::uniform(1);
        let config = AllocConfig::default();
        let mut session = AllocSession::new(&func, &target, &config).unwrap();
        allocate_phys_regs(&mut session, &mut GreedyQueue::new(), &mut FirstFree).unwrap();

        assert_eq!(session.stats.dropped, 0);
        assert_eq!(session.forced().len(), 1);
        assert!(session.reporter.has_errors());
        assert_eq!(session.monitor.round(), 3);
    }

    #[test]
    fn test_unused_ranges_are_dropped() {
        // A single-slot range without uses
        let func = function(&[(0, 0, 10), (1, 3, 4)]);
        let target = TargetInfo::uniform(1);
        let config = AllocConfig::default();
        let mut session = AllocSession::new(&func, &target, &config).unwrap();
        allocate_phys_regs(&mut session, &mut GreedyQueue::new(), &mut FirstFree).unwrap();

        assert_eq!(session.stats.dropped, 1);
        assert!(!session.lis.contains(VirtReg::new(1)));
        assert_eq!(session.matrix.phys(VirtReg::new(0)), Some(PhysReg::new(0)));
    }

    #[test]
    fn test_dequeuing_assigned_range_aborts() {
        let func = function(&[(0, 0, 10)]);
        let target = TargetInfo::uniform(1);
        let config = AllocConfig::default();
        let mut session = AllocSession::new(&func, &target, &config).unwrap();
        let err = allocate_phys_regs(&mut session, &mut GreedyQueue::new(), &mut DoubleBooking).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_round_limit() {
        let func = function(&[(0, 0, 10), (1, 20, 30), (2, 40, 50)]);
        let target = TargetInfo::uniform(1);
        let config = AllocConfig {
            enable_oracle: true,
            ..AllocConfig::default()
        };
        let oracle = FixedOracle {
            limit: Some(2),
            suboptimal: true,
        };
        let mut session = AllocSession::new(&func, &target, &config)
            .unwrap()
            .with_oracle(Box::new(oracle));
        let err = allocate_phys_regs(&mut session, &mut GreedyQueue::new(), &mut FirstFree).unwrap_err();
        assert_eq!(err, AllocError::RoundLimitExceeded { round: 3, limit: 2 });
        assert_eq!(session.marked().len(), 1);

        // Comparison mode never enforces the limit
        let config = AllocConfig {
            enable_oracle: true,
            fallback: true,
            ..AllocConfig::default()
        };
        let mut session = AllocSession::new(&func, &target, &config)
            .unwrap()
            .with_oracle(Box::new(oracle));
        allocate_phys_regs(&mut session, &mut GreedyQueue::new(), &mut FirstFree).unwrap();
        assert_eq!(session.monitor.round(), 3);
    }
}
