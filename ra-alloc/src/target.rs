//! Target register file description

use ra_common::{AllocError, PhysReg, RegClassId, RegUnit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysRegDesc {
    pub id: PhysReg,
    pub name: String,
    /// Register units covered by this register. Empty means a single unit
    /// numbered after the register itself.
    #[serde(default)]
    pub units: Vec<RegUnit>,
    #[serde(default)]
    pub callee_saved: bool,
}

/// A register class and its preferred allocation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegClassDesc {
    pub id: RegClassId,
    pub name: String,
    pub members: Vec<PhysReg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub name: String,
    pub regs: Vec<PhysRegDesc>,
    pub classes: Vec<RegClassDesc>,
    /// Registers that are never handed out
    #[serde(default)]
    pub reserved: Vec<PhysReg>,
}

impl TargetInfo {
    /// `n` independent registers `r0..rn` forming the single class `rc0`
    pub fn uniform(n: u16) -> Self {
        let regs: Vec<PhysRegDesc> = (0..n)
            .map(|i| PhysRegDesc {
                id: PhysReg::new(i),
                name: format!("r{i}"),
                units: vec![i],
                callee_saved: false,
            })
            .collect();
        let members = regs.iter().map(|r| r.id).collect();
        Self {
            name: format!("uniform{n}"),
            regs,
            classes: vec![RegClassDesc {
                id: RegClassId(0),
                name: "gpr".to_string(),
                members,
            }],
            reserved: Vec::new(),
        }
    }

    /// Parse and validate a JSON target description
    pub fn from_json(text: &str) -> Result<Self, AllocError> {
        let target: TargetInfo = serde_json::from_str(text)
            .map_err(|e| AllocError::invalid_input(format!("target description: {e}")))?;
        target.validate()?;
        Ok(target)
    }

    pub fn reg(&self, preg: PhysReg) -> Option<&PhysRegDesc> {
        self.regs.iter().find(|r| r.id == preg)
    }

    pub fn class(&self, id: RegClassId) -> Option<&RegClassDesc> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn reg_name(&self, preg: PhysReg) -> String {
        self.reg(preg).map_or_else(|| preg.to_string(), |r| r.name.clone())
    }

    pub fn units(&self, preg: PhysReg) -> Vec<RegUnit> {
        match self.reg(preg) {
            Some(desc) if !desc.units.is_empty() => desc.units.clone(),
            _ => vec![preg.id()],
        }
    }

    /// Two registers alias when they share a register unit
    pub fn aliases(&self, a: PhysReg, b: PhysReg) -> bool {
        if a == b {
            return true;
        }
        let units: BTreeSet<RegUnit> = self.units(a).into_iter().collect();
        self.units(b).iter().any(|u| units.contains(u))
    }

    pub fn is_callee_saved(&self, preg: PhysReg) -> bool {
        self.reg(preg).is_some_and(|r| r.callee_saved)
    }

    pub fn is_reserved(&self, preg: PhysReg) -> bool {
        self.reserved.contains(&preg)
    }

    pub fn with_callee_saved(mut self, pregs: &[PhysReg]) -> Self {
        for reg in &mut self.regs {
            if pregs.contains(&reg.id) {
                reg.callee_saved = true;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), AllocError> {
        let mut ids = BTreeSet::new();
        for reg in &self.regs {
            if !ids.insert(reg.id) {
                return Err(AllocError::invalid_input(format!(
                    "register {} is described twice",
                    reg.id
                )));
            }
        }
        let mut class_ids = BTreeSet::new();
        for class in &self.classes {
            if !class_ids.insert(class.id) {
                return Err(AllocError::invalid_input(format!(
                    "register class {} is described twice",
                    class.id
                )));
            }
            if let Some(missing) = class.members.iter().find(|p| !ids.contains(*p)) {
                return Err(AllocError::invalid_input(format!(
                    "register class {} lists unknown register {missing}",
                    class.name
                )));
            }
        }
        if let Some(missing) = self.reserved.iter().find(|p| !ids.contains(*p)) {
            return Err(AllocError::invalid_input(format!(
                "reserved register {missing} is not described"
            )));
        }
        Ok(())
    }
}
