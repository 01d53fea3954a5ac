//! Shared operand types for instructions.
//!
//! An instruction operand can be a reference to another SSA value (`Reg`),
//! an immediate constant (`Imm`), or a direct reference to a function
//! (`Fun`), the latter being what makes a call target statically known.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

use crate::modules::symbol::FunctionPointer;

/// SSA value identifier used to name the destination or reference another
/// instruction's result.
pub type Name = u32;

/// Represents a code label identifying a basic block within a function.
///
/// Labels never cross function boundaries; they are only valid within the
/// function they are defined in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Label(pub u32);

impl Label {
    pub const NIL: Label = Label(0);

    /// Returns true if this is the "nil" label (i.e., label 0).
    ///
    /// This label is reserved as the function entry label and should always
    /// be present.
    pub fn is_nil(&self) -> bool {
        self == &Label::NIL
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "label %block_{}", self.0)
        } else {
            write!(f, "%block_{}", self.0)
        }
    }
}

/// Immediate constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Const {
    /// Integer literal.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// The null pointer.
    Null,
}

impl std::fmt::Display for Const {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{}", v),
            Const::Bool(v) => write!(f, "{}", v),
            Const::Null => write!(f, "null"),
        }
    }
}

/// Instruction operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operand {
    /// Reference to a previously defined SSA value.
    Reg(Name),
    /// Immediate literal.
    Imm(Const),
    /// Direct reference to a function, internal or external.
    Fun(FunctionPointer),
}

impl Operand {
    /// Return the referenced SSA name if this operand is a register.
    pub fn reg(&self) -> Option<Name> {
        match self {
            Operand::Reg(name) => Some(*name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(name) => write!(f, "%{}", name),
            Operand::Imm(constant) => write!(f, "{}", constant),
            Operand::Fun(fun) => write!(f, "@{}", fun.uuid()),
        }
    }
}
