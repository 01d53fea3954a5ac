//! The unit of deduction.
//!
//! A prop couples exactly one [`Position`] with one lattice state and an
//! update procedure. Props are owned by the solver for its entire lifetime
//! and refer to each other only indirectly, via position plus kind, through
//! the solver's query interface.
use downcast_rs::{Downcast, impl_downcast};
use fxir::{attrs::Attr, modules::Module};
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::{
    position::Position,
    solver::SolverCtx,
    state::{AbstractState, ChangeStatus},
};

new_key_type! {
    /// Handle to a prop owned by the solver.
    pub struct PropKey;
}

/// Identifies one deduction family ("never traps", "is never null", ...).
///
/// Together with a [`Position`], the kind forms the compound identity a
/// prop is registered and looked up under.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PropKind(pub &'static str);

impl std::fmt::Display for PropKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base trait for all concrete deductions.
///
/// The life of a prop: it is built for a position, initialized once against
/// the program (seeding proven bits from persisted attributes), then
/// updated zero or more times by the solver until its state reaches a
/// fixpoint, and finally asked to manifest its result if that state is
/// valid.
///
/// `update` must re-derive the tightest justifiable state from the program
/// and the current state of every prop it queries. It has to be monotone:
/// assumed information may only move toward known information, and known
/// information is never given up.
pub trait Prop: Downcast {
    /// The deduction family this prop belongs to.
    fn kind(&self) -> PropKind;

    /// The position this prop is anchored at.
    fn position(&self) -> Position;

    /// The lattice state, for solver-driven fixpoint control.
    fn state(&self) -> &dyn AbstractState;
    fn state_mut(&mut self) -> &mut dyn AbstractState;

    /// One-time setup: seed known bits from ground truth already present in
    /// the program. Default no-op.
    fn initialize(&mut self, _cx: &mut SolverCtx<'_>) {}

    /// Re-derive the state. Returns whether the state changed.
    fn update(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus;

    /// The attributes this prop wants persisted once it converged with a
    /// valid state. Default none.
    fn deduced_attrs(&self) -> SmallVec<[Attr; 2]> {
        SmallVec::new()
    }

    /// Write the converged result back into the program. Only invoked once,
    /// after the fixpoint loop, and only for valid states.
    fn manifest(&self, module: &mut Module) -> ChangeStatus {
        let mut changed = ChangeStatus::Unchanged;
        for attr in self.deduced_attrs() {
            if self.position().manifest_attr(module, attr) {
                changed = ChangeStatus::Changed;
            }
        }
        changed
    }

    /// Debug rendering summarizing the assumed state.
    fn as_str(&self) -> String;
}

impl_downcast!(Prop);

/// Implemented by prop types the solver can construct on demand during a
/// query.
pub trait PropFamily: Prop + Sized {
    /// The family tag, shared by every instance of this type.
    const KIND: PropKind;

    /// Build a fresh, fully optimistic prop for `position`.
    fn build(position: Position) -> Self;
}
