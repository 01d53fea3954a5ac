//! Instruction definitions.
//!
//! Each instruction is a small data structure with public fields, grouped
//! into families by submodule:
//!
//! - `int`: integer arithmetic and comparisons
//! - `mem`: memory loads, stores, and allocation
//! - `misc`: calls, phi nodes, and selects
//!
//! Heterogeneous instruction streams store the `Instr` tagged union; the
//! generated `Opcode` discriminant is the key used by the per-function
//! opcode index of the deduction engine's information cache.
use auto_enums::auto_enum;
use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumDiscriminants, EnumIs, EnumIter, EnumTryAs, IntoEnumIterator};

use crate::modules::operand::{Name, Operand};

pub mod int;
pub mod mem;
pub mod misc;

bitflags! {
    /// Flags classifying instructions for analysis purposes.
    #[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
    pub struct InstructionFlags: u32 {
        /// Instruction has no side effects and cannot trap. It could be
        /// freely duplicated without changing program semantics.
        const SIMPLE = 1 << 0;

        /// Instruction may trap (e.g., division by zero). Trapping behavior
        /// must be preserved by transformations.
        const MAY_TRAP = 1 << 1;

        /// Instruction potentially reads or writes memory state. This
        /// regroups loads, stores, and function calls.
        const MEMORY = 1 << 2;

        /// Instruction transfers control to another function.
        const CALL = 1 << 3;
    }
}

/// Common interface implemented by every instruction node.
///
/// This trait provides lightweight, zero-allocation iteration over an
/// instruction's input operands and exposes its optional destination SSA
/// name when present.
pub trait Instruction {
    fn flags(&self) -> InstructionFlags;

    /// Returns true if this instruction may read or write memory.
    #[inline]
    fn touches_memory(&self) -> bool {
        self.flags().contains(InstructionFlags::MEMORY)
    }

    /// Returns true if this instruction may trap, see [`InstructionFlags::MAY_TRAP`].
    #[inline]
    fn may_trap(&self) -> bool {
        self.flags().contains(InstructionFlags::MAY_TRAP)
    }

    /// Iterate over all input operands for this instruction.
    fn operands(&self) -> impl Iterator<Item = &Operand>;

    /// Mutably iterate over all input operands for this instruction.
    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand>;

    /// Return the destination SSA name if the instruction produces a result.
    fn destination(&self) -> Option<Name> {
        None
    }

    /// Update the destination SSA name for this instruction. No-op if the
    /// instruction does not produce a result.
    fn set_destination(&mut self, _name: Name) {}

    /// Convenience iterator over referenced SSA names (i.e., register
    /// operands). Immediates and function references are ignored.
    fn dependencies(&self) -> impl Iterator<Item = Name> {
        self.operands().filter_map(|op| match op {
            Operand::Reg(reg) => Some(*reg),
            _ => None,
        })
    }
}

/// Discriminated union covering all public instruction kinds.
///
/// Use this enum to store heterogeneous instruction streams and to
/// pattern-match on specific operations. The generated `Opcode`
/// discriminant (via `strum`) can be helpful for fast classification.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(Opcode), derive(EnumIter, Hash, enum_map::Enum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Instr {
    // Integer instructions
    IAdd(int::IAdd),
    ISub(int::ISub),
    IMul(int::IMul),
    IDiv(int::IDiv),
    IRem(int::IRem),
    ICmp(int::ICmp),

    // Memory instructions
    MLoad(mem::MLoad),
    MStore(mem::MStore),
    MAlloca(mem::MAlloca),

    // Misc instructions
    Invoke(misc::Invoke),
    Phi(misc::Phi),
    Select(misc::Select),
}

impl Opcode {
    /// Return the canonical mnemonic used when printing this instruction.
    pub fn opname(&self) -> &'static str {
        match self {
            Opcode::IAdd => "iadd",
            Opcode::ISub => "isub",
            Opcode::IMul => "imul",
            Opcode::IDiv => "idiv",
            Opcode::IRem => "irem",
            Opcode::ICmp => "icmp",

            Opcode::MLoad => "load",
            Opcode::MStore => "store",
            Opcode::MAlloca => "alloca",

            Opcode::Invoke => "invoke",
            Opcode::Phi => "phi",
            Opcode::Select => "select",
        }
    }

    /// Parse a mnemonic into its corresponding discriminator.
    pub fn from_str(s: &str) -> Option<Self> {
        Opcode::iter().find(|op| op.opname() == s)
    }
}

impl Instr {
    /// Return the discriminant for this instruction value.
    pub fn op(&self) -> Opcode {
        self.into()
    }
}

macro_rules! define_instr_dispatch {
    (
        $($variant:ident),* $(,)?
    ) => {
        impl Instruction for Instr {
            fn flags(&self) -> InstructionFlags {
                match self {
                    $(
                        Instr::$variant(instr) => instr.flags(),
                    )*
                }
            }

            #[auto_enum(Iterator)]
            fn operands(&self) -> impl Iterator<Item = &Operand> {
                match self {
                    $(
                        Instr::$variant(instr) => instr.operands(),
                    )*
                }
            }

            #[auto_enum(Iterator)]
            fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
                match self {
                    $(
                        Instr::$variant(instr) => instr.operands_mut(),
                    )*
                }
            }

            fn destination(&self) -> Option<Name> {
                match self {
                    $(
                        Instr::$variant(instr) => instr.destination(),
                    )*
                }
            }

            fn set_destination(&mut self, name: Name) {
                match self {
                    $(
                        Instr::$variant(instr) => instr.set_destination(name),
                    )*
                }
            }
        }
    };
}

define_instr_dispatch! {
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    ICmp,
    MLoad,
    MStore,
    MAlloca,
    Invoke,
    Phi,
    Select,
}

macro_rules! define_instr_from {
    ($typ:ty, $variant:ident) => {
        impl From<$typ> for Instr {
            fn from(inst: $typ) -> Self {
                Instr::$variant(inst)
            }
        }
    };
}

define_instr_from!(int::IAdd, IAdd);
define_instr_from!(int::ISub, ISub);
define_instr_from!(int::IMul, IMul);
define_instr_from!(int::IDiv, IDiv);
define_instr_from!(int::IRem, IRem);
define_instr_from!(int::ICmp, ICmp);

define_instr_from!(mem::MLoad, MLoad);
define_instr_from!(mem::MStore, MStore);
define_instr_from!(mem::MAlloca, MAlloca);

define_instr_from!(misc::Invoke, Invoke);
define_instr_from!(misc::Phi, Phi);
define_instr_from!(misc::Select, Select);
