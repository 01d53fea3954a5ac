//! Inter-procedural fact deduction over `fxir` modules.
//!
//! The engine runs a guided fixpoint iteration: properties ("props") are
//! optimistic guesses attached to program positions, repeatedly asked to
//! re-justify themselves until nothing changes or an iteration budget runs
//! out. Props exchange information exclusively through the [`solver::Solver`],
//! which records who-queried-whom so that a change in one prop re-triggers
//! exactly the props that relied on it.
//!
//! Most consumers call [`solver::deduce_module`] with the functions to
//! analyze; custom props implement [`prop::Prop`] and are registered on a
//! [`solver::Solver`] directly.

pub mod cache;
pub mod position;
pub mod prop;
pub mod props;
pub mod solver;
pub mod state;

pub use solver::{Solver, SolverConfig, SolverCtx, SolverStats, deduce_module};
pub use state::ChangeStatus;
