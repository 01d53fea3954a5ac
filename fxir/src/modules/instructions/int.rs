//! Integer instructions
//!
//! Arithmetic and comparison operations over integer values. Each
//! instruction carries its destination `Name` and its input operands.
//! Division and remainder may trap on a zero divisor; every other operation
//! here is side-effect free.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use crate::modules::{
    instructions::{Instruction, InstructionFlags},
    operand::{Name, Operand},
};

/// Integer comparison operations
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EnumIter)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ICmpVariant {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Slt,
    /// Signed less than or equal
    Sle,
    /// Unsigned less than
    Ult,
    /// Unsigned less than or equal
    Ule,
}

impl ICmpVariant {
    /// Creates an [`ICmpVariant`] from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        ICmpVariant::iter().find(|op| op.to_str() == s)
    }

    /// Returns the string representation of the [`ICmpVariant`].
    pub fn to_str(&self) -> &'static str {
        match self {
            ICmpVariant::Eq => "eq",
            ICmpVariant::Ne => "ne",
            ICmpVariant::Slt => "slt",
            ICmpVariant::Sle => "sle",
            ICmpVariant::Ult => "ult",
            ICmpVariant::Ule => "ule",
        }
    }
}

macro_rules! define_int_binop {
    ($(#[$doc:meta])* $name:ident, $flags:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Hash, PartialEq, Eq)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name {
            pub dest: Name,
            pub lhs: Operand,
            pub rhs: Operand,
        }

        impl Instruction for $name {
            fn flags(&self) -> InstructionFlags {
                $flags
            }

            fn operands(&self) -> impl Iterator<Item = &Operand> {
                [&self.lhs, &self.rhs].into_iter()
            }

            fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
                [&mut self.lhs, &mut self.rhs].into_iter()
            }

            fn destination(&self) -> Option<Name> {
                Some(self.dest)
            }

            fn set_destination(&mut self, name: Name) {
                self.dest = name;
            }
        }
    };
}

define_int_binop!(
    /// Integer addition instruction (wrapping).
    IAdd,
    InstructionFlags::SIMPLE
);
define_int_binop!(
    /// Integer subtraction instruction (wrapping).
    ISub,
    InstructionFlags::SIMPLE
);
define_int_binop!(
    /// Integer multiplication instruction (wrapping).
    IMul,
    InstructionFlags::SIMPLE
);
define_int_binop!(
    /// Integer division instruction. Traps on a zero divisor.
    IDiv,
    InstructionFlags::MAY_TRAP
);
define_int_binop!(
    /// Integer remainder instruction. Traps on a zero divisor.
    IRem,
    InstructionFlags::MAY_TRAP
);

/// Integer comparison instruction producing a boolean.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ICmp {
    pub dest: Name,
    pub variant: ICmpVariant,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Instruction for ICmp {
    fn flags(&self) -> InstructionFlags {
        InstructionFlags::SIMPLE
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        [&self.lhs, &self.rhs].into_iter()
    }

    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        [&mut self.lhs, &mut self.rhs].into_iter()
    }

    fn destination(&self) -> Option<Name> {
        Some(self.dest)
    }

    fn set_destination(&mut self, name: Name) {
        self.dest = name;
    }
}
