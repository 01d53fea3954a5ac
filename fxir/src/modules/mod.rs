//! Module, function, and basic block containers.
//!
//! A [`Module`] is the compilation unit boundary: it owns function
//! definitions and references to externally defined functions. Functions
//! own their control flow graph as a map from [`Label`]s to basic blocks;
//! by convention the entry point is the block with [`Label::NIL`].
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    attrs::AttrList,
    modules::{
        control_flow::Terminator,
        instructions::{Instr, Instruction},
        operand::{Label, Name, Operand},
        symbol::ExternalFunction,
    },
    types::Ty,
    utils::Error,
};

pub mod control_flow;
pub mod instructions;
pub mod operand;
pub mod symbol;

/// Linkage of a function, deciding its visibility outside the module.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Linkage {
    /// Only directly accessible by objects in the current module; does not
    /// appear in any symbol table.
    #[default]
    Private,

    /// Appears as a local symbol in the object file but is not reachable
    /// from other modules. Corresponds to the `static` keyword in C.
    Internal,

    /// May be referenced (and overridden) by other modules.
    External,
}

impl Linkage {
    /// Returns true if every reference to the function is contained in the
    /// current module. Only then can all of its call sites be enumerated.
    pub fn is_local(&self) -> bool {
        matches!(self, Linkage::Private | Linkage::Internal)
    }
}

/// A stable handle naming one instruction inside a module.
///
/// Handles are used wherever an instruction has to be referenced across
/// ownership boundaries; they stay valid as long as the module is not
/// structurally modified.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InstrRef {
    /// The function containing the instruction.
    pub function: Uuid,
    /// The block containing the instruction.
    pub block: Label,
    /// Index of the instruction within the block.
    pub index: u32,
}

/// A basic block within a function, containing a sequence of instructions
/// and ending with a control flow terminator.
#[derive(Debug, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasicBlock {
    pub instructions: Vec<Instr>,
    pub terminator: Terminator,
}

/// A function made of basic blocks and parameter metadata.
///
/// A `Function` owns its control flow graph (`body`) and carries an
/// optional display `name`, its [`Linkage`], and its persisted attribute
/// list. Parameters are represented as a list of `(Name, Ty)` pairs.
///
/// By convention the entrypoint is the basic block with the [`Label::NIL`]
/// label.
#[derive(Debug, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Function {
    pub uuid: Uuid,
    pub name: Option<String>,
    pub params: Vec<(Name, Ty)>,
    pub return_type: Option<Ty>,
    pub linkage: Linkage,
    pub attrs: AttrList,
    pub body: BTreeMap<Label, BasicBlock>,
}

impl Function {
    /// Return the entry block, if present.
    pub fn entry(&self) -> Option<&BasicBlock> {
        self.body.get(&Label::NIL)
    }

    /// Return the index of the parameter defining `name`, if any.
    pub fn param_index(&self, name: Name) -> Option<u32> {
        self.params
            .iter()
            .position(|(p, _)| *p == name)
            .map(|i| i as u32)
    }

    /// Find the instruction defining `name`, if it is defined by one.
    pub fn defining_instr(&self, name: Name) -> Option<InstrRef> {
        for (label, bb) in &self.body {
            for (index, instr) in bb.instructions.iter().enumerate() {
                if instr.destination() == Some(name) {
                    return Some(InstrRef {
                        function: self.uuid,
                        block: *label,
                        index: index as u32,
                    });
                }
            }
        }
        None
    }

    /// Find next available [`Name`] for a parameter or destination.
    pub fn next_available_name(&self) -> Name {
        let mut max_index = 0;
        for (name, _) in &self.params {
            max_index = max_index.max(*name);
        }

        for bb in self.body.values() {
            for instr in &bb.instructions {
                if let Some(dest) = instr.destination() {
                    max_index = max_index.max(dest);
                }
                for op in instr.operands() {
                    if let Operand::Reg(name) = op {
                        max_index = max_index.max(*name);
                    }
                }
            }
        }

        max_index + 1
    }

    /// Verify SSA form:
    /// 1) The entry block exists.
    /// 2) Each name is defined exactly once.
    /// 3) Each operand refers to a defined name.
    /// 4) Each terminator target refers to an existing block.
    pub fn check_ssa(&self) -> Result<(), Error> {
        let mut defined_names = BTreeSet::new();

        // Ensure existence of entry block
        if !self.body.contains_key(&Label::NIL) {
            return Err(Error::MissingEntryBlock);
        }

        // Construct a set of defined names from parameters
        for (name, _) in self.params.iter() {
            if !defined_names.insert(*name) {
                return Err(Error::DuplicateSsaName { duplicate: *name });
            }
        }

        // Same for each instruction destination of each basic block
        for bb in self.body.values() {
            for instr in &bb.instructions {
                if let Some(dest) = instr.destination() {
                    if !defined_names.insert(dest) {
                        return Err(Error::DuplicateSsaName { duplicate: dest });
                    }
                }
            }
        }

        // Now ensure all operands refer to defined names
        for bb in self.body.values() {
            for instr in &bb.instructions {
                for name in instr.dependencies() {
                    if !defined_names.contains(&name) {
                        return Err(Error::UndefinedSsaName { undefined: name });
                    }
                }
            }
            for name in bb.terminator.dependencies() {
                if !defined_names.contains(&name) {
                    return Err(Error::UndefinedSsaName { undefined: name });
                }
            }
            for (target, _) in bb.terminator.iter_targets() {
                if !self.body.contains_key(&target) {
                    return Err(Error::UnknownJumpTarget { target });
                }
            }
        }

        Ok(())
    }
}

/// A module containing defined functions and references to external ones.
///
/// `Module` acts as the compilation unit boundary for symbol visibility.
/// Functions defined here appear in `functions`; references to symbols not
/// defined locally are listed in `external_functions`.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Module {
    pub functions: BTreeMap<Uuid, Function>,
    pub external_functions: BTreeMap<Uuid, ExternalFunction>,
}

impl Module {
    /// Look up a function defined in this module.
    pub fn function(&self, uuid: Uuid) -> Option<&Function> {
        self.functions.get(&uuid)
    }

    /// Look up an external function declaration.
    pub fn external(&self, uuid: Uuid) -> Option<&ExternalFunction> {
        self.external_functions.get(&uuid)
    }

    /// Return the attribute list of a definition or declaration, whichever
    /// the uuid names.
    pub fn attrs_of(&self, uuid: Uuid) -> Option<&AttrList> {
        self.functions
            .get(&uuid)
            .map(|f| &f.attrs)
            .or_else(|| self.external_functions.get(&uuid).map(|f| &f.attrs))
    }

    /// Mutable access to the attribute list of a definition or declaration.
    pub fn attrs_of_mut(&mut self, uuid: Uuid) -> Option<&mut AttrList> {
        if let Some(f) = self.functions.get_mut(&uuid) {
            return Some(&mut f.attrs);
        }
        self.external_functions.get_mut(&uuid).map(|f| &mut f.attrs)
    }

    /// Resolve an instruction handle.
    pub fn instr(&self, r: InstrRef) -> Option<&Instr> {
        self.functions
            .get(&r.function)?
            .body
            .get(&r.block)?
            .instructions
            .get(r.index as usize)
    }

    /// Mutable access to an instruction through its handle.
    pub fn instr_mut(&mut self, r: InstrRef) -> Option<&mut Instr> {
        self.functions
            .get_mut(&r.function)?
            .body
            .get_mut(&r.block)?
            .instructions
            .get_mut(r.index as usize)
    }

    /// Resolve an instruction handle expected to name a call.
    pub fn invoke(&self, r: InstrRef) -> Option<&instructions::misc::Invoke> {
        self.instr(r).and_then(|i| i.try_as_invoke_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{
        control_flow::{Jump, Ret},
        instructions::int::IAdd,
        operand::Const,
    };

    fn sample_function() -> Function {
        let mut body = BTreeMap::new();
        body.insert(
            Label::NIL,
            BasicBlock {
                instructions: vec![
                    IAdd {
                        dest: 1,
                        lhs: Operand::Reg(0),
                        rhs: Operand::Imm(Const::Int(1)),
                    }
                    .into(),
                ],
                terminator: Ret {
                    value: Some(Operand::Reg(1)),
                }
                .into(),
            },
        );
        Function {
            uuid: Uuid::new_v4(),
            name: Some("inc".into()),
            params: vec![(0, Ty::Int(32))],
            return_type: Some(Ty::Int(32)),
            linkage: Linkage::default(),
            attrs: AttrList::default(),
            body,
        }
    }

    #[test]
    fn check_ssa_accepts_well_formed_function() {
        assert_eq!(sample_function().check_ssa(), Ok(()));
    }

    #[test]
    fn check_ssa_rejects_undefined_name() {
        let mut function = sample_function();
        function
            .body
            .get_mut(&Label::NIL)
            .unwrap()
            .instructions
            .push(
                IAdd {
                    dest: 2,
                    lhs: Operand::Reg(7),
                    rhs: Operand::Reg(1),
                }
                .into(),
            );
        assert_eq!(
            function.check_ssa(),
            Err(Error::UndefinedSsaName { undefined: 7 })
        );
    }

    #[test]
    fn check_ssa_rejects_unknown_jump_target() {
        let mut function = sample_function();
        function.body.get_mut(&Label::NIL).unwrap().terminator =
            Jump { target: Label(9) }.into();
        assert_eq!(
            function.check_ssa(),
            Err(Error::UnknownJumpTarget { target: Label(9) })
        );
    }

    #[test]
    fn defining_instr_and_param_index() {
        let function = sample_function();
        assert_eq!(function.param_index(0), Some(0));
        assert_eq!(function.param_index(1), None);
        let def = function.defining_instr(1).unwrap();
        assert_eq!(def.block, Label::NIL);
        assert_eq!(def.index, 0);
        assert_eq!(function.defining_instr(0), None);
    }
}
