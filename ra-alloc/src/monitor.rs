//! Spill-cost monitor
//!
//! Keeps the best potential spill cost observed during a run and the round
//! in which it was reached. Float noise is tolerated through a hysteresis
//! ratio just under one: a new value replaces the minimum only when it is
//! lower than `min * HYSTERESIS`.

use log::{debug, error};
use ra_common::AllocError;

/// Ratio a cost must fall under, relative to the current best, to count as better
pub const HYSTERESIS: f32 = 2007.0 / 2048.0;

#[derive(Debug, Clone)]
pub struct SpillCostMonitor {
    min_cost: f32,
    min_round: u64,
    round: u64,
    last_cost: f32,
    /// The minimum is pinned in comparison mode
    frozen: bool,
}

impl Default for SpillCostMonitor {
    fn default() -> Self {
        Self {
            min_cost: f32::INFINITY,
            min_round: 0,
            round: 0,
            last_cost: f32::INFINITY,
            frozen: false,
        }
    }
}

impl SpillCostMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frozen() -> Self {
        Self {
            frozen: true,
            ..Self::default()
        }
    }

    /// Advance to the next driver round and return its number
    pub fn next_round(&mut self) -> u64 {
        self.round += 1;
        self.round
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn min_cost(&self) -> f32 {
        self.min_cost
    }

    pub fn min_round(&self) -> u64 {
        self.min_round
    }

    pub fn last_cost(&self) -> f32 {
        self.last_cost
    }

    /// Record a freshly computed cost; returns whether it became the new minimum
    pub fn observe(&mut self, cost: f32) -> bool {
        self.last_cost = cost;
        if self.frozen && self.min_cost.is_finite() {
            return false;
        }
        if cost < self.min_cost * HYSTERESIS {
            self.min_cost = cost;
            self.min_round = self.round;
            true
        } else {
            false
        }
    }

    /// Final check once the work-list is empty. Every mutation has been
    /// observed by now, so a final cost under the tracked minimum means the
    /// bookkeeping missed a change.
    pub fn finish(&mut self, final_cost: f32, check: bool) -> Result<(), AllocError> {
        debug!(
            "final spill cost {} (minimum {} in round {})",
            final_cost, self.min_cost, self.min_round
        );
        if check && !self.frozen && self.min_cost.is_finite() && self.min_cost * HYSTERESIS > final_cost {
            error!(
                "spill cost regressed: minimum {} in round {}, final {}",
                self.min_cost, self.min_round, final_cost
            );
            return Err(AllocError::CostRegression {
                min_cost: self.min_cost,
                min_round: self.min_round,
                final_cost,
            });
        }
        self.observe(final_cost);
        Ok(())
    }
}
