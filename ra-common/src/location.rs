//! Program location tracking for diagnostics
//!
//! Allocation diagnostics are tied to the unit being allocated and, where
//! known, to the virtual register and the instruction slot involved.

use crate::types::{SlotIndex, VirtReg};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where in the allocated unit a diagnostic applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramLocation {
    pub unit: String,
    pub vreg: Option<VirtReg>,
    pub slot: Option<SlotIndex>,
}

impl ProgramLocation {
    /// Location covering the whole unit
    pub fn unit(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            vreg: None,
            slot: None,
        }
    }

    pub fn with_vreg(mut self, vreg: VirtReg) -> Self {
        self.vreg = Some(vreg);
        self
    }

    pub fn with_slot(mut self, slot: SlotIndex) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Create a dummy location for testing
    pub fn dummy() -> Self {
        Self::unit("<unknown>")
    }
}

impl fmt::Display for ProgramLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unit)?;
        if let Some(vreg) = self.vreg {
            write!(f, ":{vreg}")?;
        }
        if let Some(slot) = self.slot {
            write!(f, "@{slot}")?;
        }
        Ok(())
    }
}
