//! Concrete deductions shipped with the engine.
//!
//! Each prop follows the same discipline: evidence that fails retracts the
//! state to its pessimistic fixpoint immediately; evidence that holds but
//! rests on other props' optimistic assumptions leaves the state assumed
//! and waits for those assumptions to settle; evidence that rests entirely
//! on proven facts promotes the state to its optimistic fixpoint on the
//! spot. Optimism that never settles is swept to the pessimistic fixpoint
//! when the solver stops.

use crate::state::{AbstractState, BooleanState, ChangeStatus};

pub mod liveness;
pub mod no_recurse;
pub mod no_trap;
pub mod non_null;

pub use liveness::Liveness;
pub use no_recurse::NoRecurse;
pub use no_trap::NoTrap;
pub use non_null::NonNull;

/// Settle a boolean state after all evidence held: promote to the
/// optimistic fixpoint when the evidence was entirely proven, otherwise
/// stay assumed and wait. Reports a change when a promotion newly proved
/// the fact, so props reasoning over known bits are revisited.
pub(crate) fn settle_boolean(state: &mut BooleanState, all_known: bool) -> ChangeStatus {
    if !all_known {
        return ChangeStatus::Unchanged;
    }
    let newly_known = !state.is_known();
    state.indicate_optimistic_fixpoint();
    if newly_known {
        ChangeStatus::Changed
    } else {
        ChangeStatus::Unchanged
    }
}
