//! Precomputed structural indices over the program.
//!
//! Every prop that needs "all calls in this function" or "all memory
//! touching instructions" goes through this cache instead of rescanning the
//! IR. Buckets are built lazily on first access per function and memoized
//! for the lifetime of the cache; the underlying module is assumed immutable
//! for that lifetime, so there is no invalidation path.
use std::collections::BTreeMap;

use enum_map::EnumMap;
use fxir::modules::{
    InstrRef, Module,
    instructions::{Instruction, Opcode},
};
use uuid::Uuid;

#[derive(Default)]
struct FunctionIndices {
    by_opcode: EnumMap<Opcode, Vec<InstrRef>>,
    read_write: Vec<InstrRef>,
}

/// Per-function memoized instruction indices.
#[derive(Default)]
pub struct InfoCache {
    functions: BTreeMap<Uuid, FunctionIndices>,
}

impl InfoCache {
    pub fn new() -> Self {
        InfoCache::default()
    }

    /// All instructions of `function` with the given opcode. Empty for
    /// functions not defined in the module.
    pub fn instructions_with_opcode(
        &mut self,
        module: &Module,
        function: Uuid,
        opcode: Opcode,
    ) -> &[InstrRef] {
        &self.indices(module, function).by_opcode[opcode]
    }

    /// All instructions of `function` that may read or write memory.
    pub fn read_or_write_instructions(&mut self, module: &Module, function: Uuid) -> &[InstrRef] {
        &self.indices(module, function).read_write
    }

    fn indices(&mut self, module: &Module, function: Uuid) -> &FunctionIndices {
        self.functions.entry(function).or_insert_with(|| {
            let mut indices = FunctionIndices::default();
            let Some(f) = module.function(function) else {
                return indices;
            };
            for (label, bb) in &f.body {
                for (index, instr) in bb.instructions.iter().enumerate() {
                    let r = InstrRef {
                        function,
                        block: *label,
                        index: index as u32,
                    };
                    indices.by_opcode[instr.op()].push(r);
                    if instr.touches_memory() {
                        indices.read_write.push(r);
                    }
                }
            }
            indices
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxir::{
        attrs::AttrList,
        modules::{
            BasicBlock, Function, Linkage,
            control_flow::Ret,
            instructions::{
                int::IAdd,
                mem::{MLoad, MStore},
            },
            operand::{Const, Label, Operand},
        },
        types::Ty,
    };

    fn sample_module() -> (Module, Uuid) {
        let uuid = Uuid::new_v4();
        let mut body = BTreeMap::new();
        body.insert(
            Label::NIL,
            BasicBlock {
                instructions: vec![
                    MLoad {
                        dest: 1,
                        ty: Ty::Int(32),
                        addr: Operand::Reg(0),
                        volatile: false,
                    }
                    .into(),
                    IAdd {
                        dest: 2,
                        lhs: Operand::Reg(1),
                        rhs: Operand::Imm(Const::Int(1)),
                    }
                    .into(),
                    MStore {
                        addr: Operand::Reg(0),
                        value: Operand::Reg(2),
                        volatile: false,
                    }
                    .into(),
                ],
                terminator: Ret { value: None }.into(),
            },
        );
        let function = Function {
            uuid,
            name: None,
            params: vec![(0, Ty::Ptr)],
            return_type: None,
            linkage: Linkage::Private,
            attrs: AttrList::default(),
            body,
        };
        let mut module = Module::default();
        module.functions.insert(uuid, function);
        (module, uuid)
    }

    #[test]
    fn opcode_buckets_are_memoized() {
        let (module, uuid) = sample_module();
        let mut cache = InfoCache::new();

        let loads = cache.instructions_with_opcode(&module, uuid, Opcode::MLoad);
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].index, 0);

        let adds = cache.instructions_with_opcode(&module, uuid, Opcode::IAdd);
        assert_eq!(adds.len(), 1);
        assert!(
            cache
                .instructions_with_opcode(&module, uuid, Opcode::Invoke)
                .is_empty()
        );
    }

    #[test]
    fn read_write_index_covers_loads_and_stores() {
        let (module, uuid) = sample_module();
        let mut cache = InfoCache::new();

        let rw = cache.read_or_write_instructions(&module, uuid);
        assert_eq!(rw.len(), 2);
        assert_eq!(rw[0].index, 0);
        assert_eq!(rw[1].index, 2);
    }

    #[test]
    fn unknown_functions_index_empty() {
        let (module, _) = sample_module();
        let mut cache = InfoCache::new();
        assert!(
            cache
                .instructions_with_opcode(&module, Uuid::new_v4(), Opcode::IAdd)
                .is_empty()
        );
    }
}
