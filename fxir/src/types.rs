//! Value types.
//!
//! The IR distinguishes just enough type structure for attribute deduction:
//! fixed-width integers, booleans produced by comparisons, and opaque
//! pointers. Aggregates are out of scope.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type of an SSA value, parameter, or return slot.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Ty {
    /// Fixed-width integer with the given bit width.
    Int(u16),

    /// Boolean value (result of comparisons, branch conditions).
    Bool,

    /// Opaque pointer. Pointee types are not tracked.
    Ptr,
}

impl Ty {
    /// Returns true if the type is a pointer.
    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr)
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Int(bits) => write!(f, "i{}", bits),
            Ty::Bool => write!(f, "i1"),
            Ty::Ptr => write!(f, "ptr"),
        }
    }
}
