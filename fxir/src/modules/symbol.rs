//! External symbols and function references.
//!
//! This module provides structures to represent functions declared outside
//! the current module and the typed references instructions use to name call
//! targets, internal or external.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumDiscriminants;
use uuid::Uuid;

use crate::{attrs::AttrList, types::Ty};

/// Defines an externally linked function.
///
/// This struct represents a function that is defined outside the current
/// module. Its body is unavailable, but its attribute list may still carry
/// ground truth established elsewhere (e.g. a runtime function known not to
/// trap).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExternalFunction {
    /// Unique identifier used to reference the function within the module.
    pub uuid: Uuid,

    /// The name of the function as it appears in the linking context.
    pub name: String,

    /// The parameter types of the external function.
    pub param_types: Vec<Ty>,

    /// The return type. `None` indicates a `void` return type.
    pub return_type: Option<Ty>,

    /// Attributes established for this declaration.
    pub attrs: AttrList,
}

/// A reference to a function symbol, internal or external.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumDiscriminants)]
#[strum_discriminants(name(FunctionPointerType))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FunctionPointer {
    /// Reference to a function defined within the current module.
    Internal(Uuid),

    /// Reference to an external function declaration.
    External(Uuid),
}

impl FunctionPointer {
    /// Get the UUID of the function pointer, regardless of its type.
    pub fn uuid(&self) -> Uuid {
        match self {
            FunctionPointer::Internal(uuid) => *uuid,
            FunctionPointer::External(uuid) => *uuid,
        }
    }

    /// Returns true if the reference names a function defined in-module.
    pub fn is_internal(&self) -> bool {
        matches!(self, FunctionPointer::Internal(_))
    }
}

impl std::fmt::Display for FunctionPointerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionPointerType::Internal => write!(f, "internal"),
            FunctionPointerType::External => write!(f, "external"),
        }
    }
}
