//! Allocation run configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The allocator variants a run can be dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    /// Spill-weight ordered assign-or-spill baseline
    Basic,
    /// Eviction, staged splitting and spilling
    #[default]
    Greedy,
    /// Independent-set extraction over the interference graph
    Mis,
}

impl AllocatorKind {
    pub const ALL: [AllocatorKind; 3] = [AllocatorKind::Basic, AllocatorKind::Greedy, AllocatorKind::Mis];

    pub fn name(&self) -> &'static str {
        match self {
            AllocatorKind::Basic => "basic",
            AllocatorKind::Greedy => "greedy",
            AllocatorKind::Mis => "mis",
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AllocatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "basic" => Ok(AllocatorKind::Basic),
            "greedy" => Ok(AllocatorKind::Greedy),
            "mis" | "pp2" => Ok(AllocatorKind::Mis),
            other => Err(format!("unknown allocator variant '{other}'")),
        }
    }
}

/// Allocator that finishes whatever the independent-set passes left over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResidualKind {
    Basic,
    #[default]
    Greedy,
}

/// Options for one allocation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocConfig {
    pub variant: AllocatorKind,
    pub residual: ResidualKind,

    /// Number of independent-set extraction passes before the residual run
    pub independent_set_extractions: usize,
    pub skip_mis: bool,

    /// Longest eviction chain a range may start
    pub max_cascade_depth: u32,
    /// Physical registers scored per region split attempt
    pub region_split_candidates: usize,
    /// Cost of the first use of a callee-saved register
    pub csr_cost: f32,

    pub enable_oracle: bool,
    /// Comparison mode: the cost minimum is frozen and round limits are not enforced
    pub fallback: bool,
    pub check_round_limit: bool,
    pub check_cost_regression: bool,
    /// Run the non-overlap verifier once allocation finishes
    pub verify: bool,

    /// Directory receiving one graph export per extraction pass
    pub export_graphs: Option<PathBuf>,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            variant: AllocatorKind::Greedy,
            residual: ResidualKind::Greedy,
            independent_set_extractions: 1,
            skip_mis: false,
            max_cascade_depth: 8,
            region_split_candidates: 8,
            csr_cost: 0.0,
            enable_oracle: false,
            fallback: false,
            check_round_limit: true,
            check_cost_regression: cfg!(debug_assertions),
            verify: false,
            export_graphs: None,
        }
    }
}

impl AllocConfig {
    pub fn with_variant(mut self, variant: AllocatorKind) -> Self {
        self.variant = variant;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AllocConfig =
            serde_json::from_str(r#"{ "variant": "mis", "max_cascade_depth": 2 }"#).unwrap();
        assert_eq!(config.variant, AllocatorKind::Mis);
        assert_eq!(config.max_cascade_depth, 2);
        assert_eq!(config.independent_set_extractions, 1);
        assert_eq!(config.residual, ResidualKind::Greedy);
        assert!(config.check_round_limit);
    }

    #[test]
    fn test_variant_names_round_trip() {
        for kind in AllocatorKind::ALL {
            assert_eq!(kind.name().parse::<AllocatorKind>(), Ok(kind));
        }
        assert!("fast".parse::<AllocatorKind>().is_err());
    }
}
