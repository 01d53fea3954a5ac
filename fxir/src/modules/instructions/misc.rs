//! Calls and value-selection instructions.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    attrs::AttrList,
    modules::{
        instructions::{Instruction, InstructionFlags},
        operand::{Label, Name, Operand},
        symbol::FunctionPointer,
    },
    types::Ty,
};

/// Function call instruction.
///
/// The callee is an `Operand` to allow dynamic calls through function
/// pointer values; a direct call uses `Operand::Fun`, which is the only
/// form for which the callee is statically known. Each call site carries
/// its own attribute list, independent of the callee's.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Invoke {
    /// The called function, direct or through a value.
    pub function: Operand,

    /// The argument operands to pass to the function.
    pub args: Vec<Operand>,

    /// The destination SSA name for the return value, if any.
    pub dest: Option<Name>,

    /// The return type of the function being called. `None` for `void`.
    pub ty: Option<Ty>,

    /// Attributes established for this call site.
    pub attrs: AttrList,
}

impl Invoke {
    /// Return the statically known callee, if the call is direct.
    pub fn callee(&self) -> Option<FunctionPointer> {
        match &self.function {
            Operand::Fun(fun) => Some(*fun),
            _ => None,
        }
    }
}

impl Instruction for Invoke {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::CALL | InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.function).chain(self.args.iter())
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.function).chain(self.args.iter_mut())
    }

    fn destination(&self) -> Option<Name> {
        self.dest
    }

    fn set_destination(&mut self, name: Name) {
        // Cannot change a void return to a non-void return
        if self.dest.is_some() {
            self.dest = Some(name);
        }
    }
}

/// Phi instruction
///
/// Selects a value based on control flow, merging values coming from
/// different predecessor blocks. Must be placed at the beginning of a basic
/// block.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Phi {
    /// The destination SSA name for the result of the phi instruction.
    pub dest: Name,

    /// The incoming values and their corresponding predecessor blocks.
    pub values: Vec<(Label, Operand)>,
}

impl Instruction for Phi {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        self.values.iter().map(|(_, op)| op)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        self.values.iter_mut().map(|(_, op)| op)
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn set_destination(&mut self, name: Name) {
        self.dest = name;
    }
}

/// Select instruction
///
/// Selects one of two values based on a condition.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Select {
    pub dest: Name,
    /// The condition operand. Should evaluate to a boolean value.
    pub condition: Operand,
    /// The operand to select if the condition is true.
    pub true_value: Operand,
    /// The operand to select if the condition is false.
    pub false_value: Operand,
}

impl Instruction for Select {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.condition)
            .chain(std::iter::once(&self.true_value))
            .chain(std::iter::once(&self.false_value))
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.condition)
            .chain(std::iter::once(&mut self.true_value))
            .chain(std::iter::once(&mut self.false_value))
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn set_destination(&mut self, name: Name) {
        self.dest = name;
    }
}
