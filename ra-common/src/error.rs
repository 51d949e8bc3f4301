//! Error handling for the register allocator
//!
//! This module defines the fatal error taxonomy of an allocation run and the
//! diagnostic reporter that collects the non-fatal conditions a run reports
//! while it keeps going in degraded form.

use crate::location::ProgramLocation;
use crate::types::{PhysReg, RegClassId, VirtReg};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal conditions that end an allocation run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocError {
    #[error("no registers from class {class} available to allocate")]
    ClassExhausted { class: RegClassId },

    #[error("register already assigned: {vreg} is bound to {preg}")]
    RegisterAlreadyAssigned { vreg: VirtReg, preg: PhysReg },

    #[error("spill cost regressed at the end of allocation: minimum {min_cost} (round {min_round}), final {final_cost}")]
    CostRegression {
        min_cost: f32,
        min_round: u64,
        final_cost: f32,
    },

    #[error("round {round} has passed the round limit {limit}")]
    RoundLimitExceeded { round: u64, limit: u64 },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("graph format error at line {line}: {message}")]
    GraphFormat { line: usize, message: String },

    #[error("assignment verification failed: {message}")]
    Verification { message: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl AllocError {
    /// Create an input validation error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AllocError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a graph/cover text format error
    pub fn graph_format(line: usize, message: impl Into<String>) -> Self {
        AllocError::GraphFormat {
            line,
            message: message.into(),
        }
    }

    /// Invariant violations abort without any attempt to continue
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, AllocError::RegisterAlreadyAssigned { .. })
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for AllocError {
    fn from(err: std::io::Error) -> Self {
        AllocError::Io {
            message: err.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with location and severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: ProgramLocation,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: String, location: ProgramLocation) -> Self {
        Self {
            severity: Severity::Error,
            message,
            location,
            notes: Vec::new(),
        }
    }

    pub fn warning(message: String, location: ProgramLocation) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            location,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity, self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        Ok(())
    }
}

/// Collects the diagnostics of one allocation run
#[derive(Debug, Default)]
pub struct ErrorReporter {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an error diagnostic
    pub fn error(&mut self, message: String, location: ProgramLocation) -> &mut Diagnostic {
        self.error_count += 1;
        self.push(Diagnostic::error(message, location))
    }

    /// Report a warning diagnostic
    pub fn warning(&mut self, message: String, location: ProgramLocation) -> &mut Diagnostic {
        self.warning_count += 1;
        self.push(Diagnostic::warning(message, location))
    }

    fn push(&mut self, diagnostic: Diagnostic) -> &mut Diagnostic {
        self.diagnostics.push(diagnostic);
        let last = self.diagnostics.len() - 1;
        &mut self.diagnostics[last]
    }

    /// Check if any errors have been reported
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Hand the collected diagnostics over, leaving the reporter empty
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        self.warning_count = 0;
        std::mem::take(&mut self.diagnostics)
    }

    /// Create a summary string
    pub fn summary(&self) -> String {
        match (self.error_count, self.warning_count) {
            (0, 0) => "No errors or warnings".to_string(),
            (0, w) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (e, 0) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (e, w) => format!(
                "{} error{} and {} warning{}",
                e,
                if e == 1 { "" } else { "s" },
                w,
                if w == 1 { "" } else { "s" }
            ),
        }
    }
}
