//! Register Allocator - Common Types and Utilities
//! 
//! This crate contains the identifiers, the fatal error taxonomy and the
//! diagnostic reporter shared by the allocation engine and its driver.

pub mod error;
pub mod types;
pub mod location;

pub use error::{AllocError, Diagnostic, ErrorReporter, Severity};
pub use types::*;
pub use location::ProgramLocation;
