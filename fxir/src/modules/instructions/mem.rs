//! Memory operations
//!
//! Load, store, and stack allocation instructions. Loads and stores are the
//! instructions the read/write index of the information cache is built
//! from; allocation produces a pointer that is never null.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        instructions::{Instruction, InstructionFlags},
        operand::{Name, Operand},
    },
    types::Ty,
};

/// Load from memory into a destination SSA name.
///
/// When `volatile` is true, the operation is prevented from being removed
/// or merged by typical optimizations.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MLoad {
    pub dest: Name,
    pub ty: Ty,
    pub addr: Operand,
    pub volatile: bool,
}

impl Instruction for MLoad {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.addr)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.addr)
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn set_destination(&mut self, name: Name) {
        self.dest = name;
    }
}

/// Store a value to memory.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MStore {
    pub addr: Operand,
    pub value: Operand,
    pub volatile: bool,
}

impl Instruction for MStore {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::MEMORY
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.addr, &self.value].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.addr, &mut self.value].into_iter()
    }
}

/// Allocate stack memory and yield a pointer to it.
///
/// The produced pointer is valid for the lifetime of the enclosing function
/// invocation and is never null.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MAlloca {
    pub dest: Name,
    /// Allocation size in bytes.
    pub size: Operand,
}

impl Instruction for MAlloca {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::empty()
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        std::iter::once(&self.size)
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        std::iter::once(&mut self.size)
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn set_destination(&mut self, name: Name) {
        self.dest = name;
    }
}
