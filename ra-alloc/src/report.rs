//! Run results and per-variant cost reports

use crate::config::AllocatorKind;
use crate::spiller::SpillSlot;
use ra_common::{AllocError, Diagnostic, PhysReg, VirtReg};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocStats {
    pub rounds: u64,
    pub min_round: u64,
    pub min_spill_cost: f32,
    pub final_spill_cost: f32,
    pub evictions: u64,
    pub splits: u64,
    pub spills: u64,
    /// Ranges dropped from the work-list because nothing used them any more
    pub dropped: u64,
    /// Ranges colored by independent-set extraction
    pub mis_colored: u64,
}

/// Everything an allocation run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub unit: String,
    pub variant: AllocatorKind,
    pub assignment: BTreeMap<VirtReg, PhysReg>,
    /// Best-effort registers given to ranges that could not be allocated
    pub forced: BTreeMap<VirtReg, PhysReg>,
    pub spill_slots: BTreeMap<VirtReg, SpillSlot>,
    /// Registers with an empty live range; they need no register
    pub unallocated_empty: Vec<VirtReg>,
    /// Ranges left without any register (only after a fatal class exhaustion)
    pub unassigned: Vec<VirtReg>,
    /// Input register each split or spill product came from
    pub origins: BTreeMap<VirtReg, VirtReg>,
    /// Ranges dequeued in the oracle's round while the unit was sub-optimal
    pub marked: Vec<VirtReg>,
    pub stats: AllocStats,
    pub diagnostics: Vec<Diagnostic>,
}

impl AllocationResult {
    /// Register holding `vreg`, forced or not
    pub fn phys(&self, vreg: VirtReg) -> Option<PhysReg> {
        self.assignment.get(&vreg).or_else(|| self.forced.get(&vreg)).copied()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            variant: self.variant,
            rounds: self.stats.rounds,
            min_round: self.stats.min_round,
            min_spill_cost: self.stats.min_spill_cost,
            final_spill_cost: self.stats.final_spill_cost,
        }
    }
}

/// The five-line text report of one variant's run on one unit
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub variant: AllocatorKind,
    pub rounds: u64,
    pub min_round: u64,
    pub min_spill_cost: f32,
    pub final_spill_cost: f32,
}

impl RunReport {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.variant);
        let _ = writeln!(out, "{}", self.rounds);
        let _ = writeln!(out, "{}", self.min_round);
        let _ = writeln!(out, "{}", self.min_spill_cost);
        let _ = writeln!(out, "{}", self.final_spill_cost);
        out
    }

    pub fn parse(text: &str) -> Result<Self, AllocError> {
        let mut lines = text.lines().map(str::trim);
        let mut field = |name: &str| {
            lines
                .next()
                .filter(|l| !l.is_empty())
                .ok_or_else(|| AllocError::invalid_input(format!("run report is missing the {name} line")))
        };
        let bad = |name: &str, value: &str| AllocError::invalid_input(format!("run report has bad {name} '{value}'"));

        let variant = field("variant")?;
        let variant: AllocatorKind = variant.parse().map_err(|_| bad("variant", variant))?;
        let rounds = field("rounds")?;
        let rounds: u64 = rounds.parse().map_err(|_| bad("rounds", rounds))?;
        let min_round = field("min round")?;
        let min_round: u64 = min_round.parse().map_err(|_| bad("min round", min_round))?;
        let min_cost = field("min spill cost")?;
        let min_spill_cost: f32 = min_cost.parse().map_err(|_| bad("min spill cost", min_cost))?;
        let final_cost = field("final spill cost")?;
        let final_spill_cost: f32 = final_cost.parse().map_err(|_| bad("final spill cost", final_cost))?;

        Ok(Self {
            variant,
            rounds,
            min_round,
            min_spill_cost,
            final_spill_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_text() {
        let report = RunReport {
            variant: AllocatorKind::Mis,
            rounds: 120,
            min_round: 17,
            min_spill_cost: 3.5,
            final_spill_cost: 4.25,
        };
        assert_eq!(report.to_text(), "mis\n120\n17\n3.5\n4.25\n");
        assert_eq!(RunReport::parse(&report.to_text()).unwrap(), report);
    }

    #[test]
    fn test_report_parse_errors() {
        assert!(RunReport::parse("greedy\n10\n").is_err());
        assert!(RunReport::parse("fast\n1\n1\n1\n1\n").is_err());
        assert!(RunReport::parse("greedy\nten\n1\n1\n1\n").is_err());
    }
}
