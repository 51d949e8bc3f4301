//! Register Allocator - Allocation Engine
//!
//! This crate assigns physical registers to the virtual registers of one
//! function at a time. Three variants share one work-list driver:
//!
//! - `greedy`: eviction with cascades, staged splitting and spilling
//! - `basic`: spill-weight order, assign or spill
//! - `mis`: independent-set coloring over the interference graph, followed by
//!   one of the other two for whatever is left
//!
//! All mutable run state (intervals, stages, cascades, rounds, the cost
//! minimum) lives in an [`AllocSession`]; nothing is shared between runs.

pub mod basic;
pub mod coloring;
pub mod config;
pub mod cost;
pub mod driver;
pub mod evict;
pub mod function;
pub mod greedy;
pub mod interference;
pub mod live;
pub mod monitor;
pub mod oracle;
pub mod order;
pub mod queue;
pub mod registry;
pub mod report;
pub mod select;
pub mod session;
pub mod spiller;
pub mod split;
pub mod target;
pub mod verify;

#[cfg(test)]
mod tests;

pub use config::{AllocConfig, AllocatorKind, ResidualKind};
pub use function::Function;
pub use report::{AllocationResult, RunReport};
pub use select::{select_variant, Allocator};
pub use session::AllocSession;
pub use target::TargetInfo;

use ra_common::AllocError;

/// Allocate `func` with the configured variant and default collaborators
pub fn allocate(func: &Function, target: &TargetInfo, config: &AllocConfig) -> Result<AllocationResult, AllocError> {
    let session = AllocSession::new(func, target, config)?;
    run(&mut Allocator::from_config(config), session)
}

/// Run `allocator` over a prepared session
pub fn run(allocator: &mut Allocator, mut session: AllocSession<'_>) -> Result<AllocationResult, AllocError> {
    allocator.run(&mut session)?;
    Ok(session.into_result(allocator.kind()))
}
