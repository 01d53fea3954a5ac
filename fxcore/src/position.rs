//! Deduction positions.
//!
//! A [`Position`] names the spot a fact attaches to: a function, its return
//! value, one of its arguments, a call site, a call site's return value or
//! argument, or a floating SSA value with no dedicated attribute slot.
//! Positions are plain value objects: they carry no deduction state, are
//! cheap to copy, and serve as map keys through their derived equality and
//! ordering.
use fxir::{
    attrs::{Attr, AttrKind, AttrList, AttrSlot},
    modules::{InstrRef, Module, operand::Name, symbol::FunctionPointer},
};
use smallvec::SmallVec;
use strum::EnumIs;
use uuid::Uuid;

/// The program entity a position is rooted at.
///
/// Anchors are handles, never references: they stay meaningful for as long
/// as the module is not structurally modified, and they keep the ownership
/// graph between the solver and the program representation acyclic.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIs)]
pub enum Anchor {
    /// A function definition or declaration.
    Function(Uuid),
    /// A parameter slot of a function definition.
    Argument { function: Uuid, index: u32 },
    /// An instruction, in practice always a call.
    Instruction(InstrRef),
    /// An arbitrary SSA value within a function.
    Value { function: Uuid, name: Name },
}

/// The position kinds we distinguish.
///
/// The declaration order is meaningful: a kind compares `>=` to
/// `Argument(0)` exactly when it denotes an indexed argument slot.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIs)]
pub enum PositionKind {
    /// An invalid position, created by [`Position::invalid`] only.
    Invalid,
    /// A value without a dedicated attribute slot.
    Floating,
    /// The return value of a function.
    Returned,
    /// The return value of a call site.
    CallSiteReturned,
    /// A function (scope).
    Function,
    /// A call site (function scope).
    CallSite,
    /// A function argument.
    Argument(u32),
    /// A call site argument.
    CallSiteArgument(u32),
}

impl PositionKind {
    /// Return the argument index if this kind denotes an argument slot.
    pub fn arg_no(&self) -> Option<u32> {
        match self {
            PositionKind::Argument(index) | PositionKind::CallSiteArgument(index) => Some(*index),
            _ => None,
        }
    }
}

/// A deduction target: an anchor plus a position kind.
///
/// Two positions are equal iff anchor and kind match exactly; equality,
/// hashing, and ordering all derive from that pair.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    anchor: Option<Anchor>,
    kind: PositionKind,
}

impl Position {
    /// The invalid position. The only position without an anchor.
    pub fn invalid() -> Position {
        Position {
            anchor: None,
            kind: PositionKind::Invalid,
        }
    }

    /// Position describing the scope of the function `f`.
    pub fn function(f: Uuid) -> Position {
        Position {
            anchor: Some(Anchor::Function(f)),
            kind: PositionKind::Function,
        }
    }

    /// Position describing the returned value of the function `f`.
    pub fn returned(f: Uuid) -> Position {
        Position {
            anchor: Some(Anchor::Function(f)),
            kind: PositionKind::Returned,
        }
    }

    /// Position describing the argument `index` of the function `f`.
    pub fn argument(f: Uuid, index: u32) -> Position {
        Position {
            anchor: Some(Anchor::Argument { function: f, index }),
            kind: PositionKind::Argument(index),
        }
    }

    /// Position describing the function scope of the call `call`.
    pub fn callsite(call: InstrRef) -> Position {
        Position {
            anchor: Some(Anchor::Instruction(call)),
            kind: PositionKind::CallSite,
        }
    }

    /// Position describing the returned value of the call `call`.
    pub fn callsite_returned(call: InstrRef) -> Position {
        Position {
            anchor: Some(Anchor::Instruction(call)),
            kind: PositionKind::CallSiteReturned,
        }
    }

    /// Position describing the argument `index` of the call `call`.
    pub fn callsite_argument(call: InstrRef, index: u32) -> Position {
        Position {
            anchor: Some(Anchor::Instruction(call)),
            kind: PositionKind::CallSiteArgument(index),
        }
    }

    /// Position describing a bare SSA value.
    pub fn floating(function: Uuid, name: Name) -> Position {
        Position {
            anchor: Some(Anchor::Value { function, name }),
            kind: PositionKind::Floating,
        }
    }

    /// Position describing the SSA value `name` of `function`, resolved to
    /// the most specific kind: a parameter resolves to its argument
    /// position, a call result to the call's returned position, anything
    /// else floats.
    pub fn value(module: &Module, function: Uuid, name: Name) -> Position {
        if let Some(f) = module.function(function) {
            if let Some(index) = f.param_index(name) {
                return Position::argument(function, index);
            }
            if let Some(def) = f.defining_instr(name) {
                if module.invoke(def).is_some() {
                    return Position::callsite_returned(def);
                }
            }
        }
        Position::floating(function, name)
    }

    /// Return the position kind.
    pub fn kind(&self) -> PositionKind {
        self.kind
    }

    /// Return the argument index if this position denotes an argument slot.
    pub fn arg_no(&self) -> Option<u32> {
        self.kind.arg_no()
    }

    /// Return the anchor this position is rooted at.
    ///
    /// Panics on the invalid position; callers must check [`Self::kind`]
    /// before using anchor-dependent operations.
    pub fn anchor(&self) -> Anchor {
        self.anchor
            .expect("invalid position does not have an anchor")
    }

    /// Returns true for call site, call site return, and call site argument
    /// positions.
    pub fn is_any_call_site_position(&self) -> bool {
        matches!(
            self.kind,
            PositionKind::CallSite
                | PositionKind::CallSiteReturned
                | PositionKind::CallSiteArgument(_)
        )
    }

    /// Return the function textually containing the anchor.
    pub fn anchor_scope(&self) -> Option<Uuid> {
        match self.anchor? {
            Anchor::Function(f) => Some(f),
            Anchor::Argument { function, .. } => Some(function),
            Anchor::Instruction(r) => Some(r.function),
            Anchor::Value { function, .. } => Some(function),
        }
    }

    /// Return the statically known callee for call site positions.
    pub fn callee(&self, module: &Module) -> Option<FunctionPointer> {
        match self.anchor? {
            Anchor::Instruction(r) => module.invoke(r)?.callee(),
            _ => None,
        }
    }

    /// Return the function a fact at this position ultimately talks about:
    /// the callee for call site positions (when statically known), the
    /// enclosing function otherwise.
    pub fn associated_function(&self, module: &Module) -> Option<FunctionPointer> {
        if self.is_any_call_site_position() {
            return self.callee(module);
        }
        self.anchor_scope().map(FunctionPointer::Internal)
    }

    /// Return the nearest instruction usable for local reasoning: the
    /// anchor itself for instruction anchors, the entry instruction of the
    /// function for argument positions, the defining instruction for value
    /// anchors.
    pub fn context_instruction(&self, module: &Module) -> Option<InstrRef> {
        match self.anchor? {
            Anchor::Instruction(r) => Some(r),
            Anchor::Argument { function, .. } => {
                let f = module.function(function)?;
                let entry = f.entry()?;
                if entry.instructions.is_empty() {
                    None
                } else {
                    Some(InstrRef {
                        function,
                        block: fxir::modules::operand::Label::NIL,
                        index: 0,
                    })
                }
            }
            Anchor::Value { function, name } => module.function(function)?.defining_instr(name),
            Anchor::Function(_) => None,
        }
    }

    /// Return the attribute slot this position maps onto, if it has one.
    ///
    /// Floating and invalid positions have no slot; asking for slot
    /// dependent operations on them is a caller bug.
    pub fn attr_slot(&self) -> Option<AttrSlot> {
        match self.kind {
            PositionKind::Function | PositionKind::CallSite => Some(AttrSlot::Function),
            PositionKind::Returned | PositionKind::CallSiteReturned => Some(AttrSlot::Return),
            PositionKind::Argument(index) | PositionKind::CallSiteArgument(index) => {
                Some(AttrSlot::Arg(index))
            }
            PositionKind::Floating | PositionKind::Invalid => None,
        }
    }

    /// The set of positions whose proven facts automatically apply to this
    /// one, most specific first. The position itself always comes first.
    pub fn subsuming_positions(&self, module: &Module) -> SmallVec<[Position; 4]> {
        let mut positions: SmallVec<[Position; 4]> = SmallVec::new();
        positions.push(*self);

        match self.kind {
            PositionKind::Returned | PositionKind::Argument(_) => {
                if let Some(f) = self.anchor_scope() {
                    positions.push(Position::function(f));
                }
            }
            PositionKind::CallSite => {
                if let Some(callee) = self.callee(module) {
                    positions.push(Position::function(callee.uuid()));
                }
            }
            PositionKind::CallSiteReturned => {
                let callee = self.callee(module);
                if let Some(callee) = callee {
                    positions.push(Position::returned(callee.uuid()));
                }
                if let Some(Anchor::Instruction(call)) = self.anchor {
                    positions.push(Position::callsite(call));
                }
                if let Some(callee) = callee {
                    positions.push(Position::function(callee.uuid()));
                }
            }
            PositionKind::CallSiteArgument(index) => {
                if let Some(callee) = self.callee(module) {
                    positions.push(Position::argument(callee.uuid(), index));
                    positions.push(Position::function(callee.uuid()));
                }
                // The position the passed value is otherwise associated
                // with, e.g. its argument position if the value is itself a
                // function argument.
                if let Some(Anchor::Instruction(call)) = self.anchor {
                    if let Some(invoke) = module.invoke(call) {
                        if let Some(name) = invoke.args.get(index as usize).and_then(|op| op.reg())
                        {
                            let associated = Position::value(module, call.function, name);
                            if matches!(associated.kind(), PositionKind::Argument(_)) {
                                positions.push(associated);
                            }
                        }
                    }
                }
            }
            _ => {}
        }

        positions
    }

    /// Return the persisted attribute list this position reads from and
    /// manifests into: the call instruction's list for call site positions,
    /// the function's list otherwise.
    pub fn attr_list<'m>(&self, module: &'m Module) -> Option<&'m AttrList> {
        match self.anchor? {
            Anchor::Instruction(r) => module.invoke(r).map(|i| &i.attrs),
            Anchor::Function(f) => module.attrs_of(f),
            Anchor::Argument { function, .. } => module.attrs_of(function),
            Anchor::Value { .. } => None,
        }
    }

    /// Returns true if an attribute of any of the given kinds exists at
    /// this position or at one of its subsuming positions.
    pub fn has_attr(&self, module: &Module, kinds: &[AttrKind]) -> bool {
        kinds.iter().any(|k| self.find_attr(module, *k).is_some())
    }

    /// Return the attribute of the given kind found at this position or at
    /// the most specific subsuming position carrying one.
    pub fn find_attr(&self, module: &Module, kind: AttrKind) -> Option<Attr> {
        for position in self.subsuming_positions(module) {
            let Some(slot) = position.attr_slot() else {
                continue;
            };
            if let Some(attr) = position.attr_list(module).and_then(|l| l.get(slot, kind)) {
                return Some(attr);
            }
        }
        None
    }

    /// Persist `attr` at this position's attribute slot. Returns true if
    /// the module changed.
    pub fn manifest_attr(&self, module: &mut Module, attr: Attr) -> bool {
        let Some(slot) = self.attr_slot() else {
            debug_assert!(false, "no attribute slot at {self}");
            return false;
        };
        match self.anchor() {
            Anchor::Instruction(r) => match module.instr_mut(r).and_then(|i| i.try_as_invoke_mut())
            {
                Some(invoke) => invoke.attrs.add(slot, attr),
                None => false,
            },
            Anchor::Function(f) | Anchor::Argument { function: f, .. } => {
                match module.attrs_of_mut(f) {
                    Some(attrs) => attrs.add(slot, attr),
                    None => false,
                }
            }
            Anchor::Value { .. } => false,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            PositionKind::Invalid => return write!(f, "invalid"),
            PositionKind::Floating => "flt",
            PositionKind::Returned => "ret",
            PositionKind::CallSiteReturned => "cs_ret",
            PositionKind::Function => "fn",
            PositionKind::CallSite => "cs",
            PositionKind::Argument(_) => "arg",
            PositionKind::CallSiteArgument(_) => "cs_arg",
        };
        match self.anchor() {
            Anchor::Function(uuid) => write!(f, "{}@{}", kind, uuid)?,
            Anchor::Argument { function, index } => write!(f, "{}#{}@{}", kind, index, function)?,
            Anchor::Instruction(r) => write!(
                f,
                "{}@{}:{}:{}",
                kind, r.function, r.block, r.index
            )?,
            Anchor::Value { function, name } => write!(f, "{}%{}@{}", kind, name, function)?,
        }
        if let Some(index) = self.kind.arg_no() {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(position: &Position) -> u64 {
        let mut hasher = DefaultHasher::new();
        position.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_follows_anchor_and_kind() {
        let f = Uuid::new_v4();
        let g = Uuid::new_v4();

        assert_eq!(Position::function(f), Position::function(f));
        assert_eq!(hash_of(&Position::function(f)), hash_of(&Position::function(f)));

        assert_ne!(Position::function(f), Position::function(g));
        assert_ne!(Position::function(f), Position::returned(f));
        assert_ne!(Position::argument(f, 0), Position::argument(f, 1));
    }

    #[test]
    fn argument_kinds_order_last() {
        // A kind is >= Argument(0) exactly when it denotes an argument slot.
        let threshold = PositionKind::Argument(0);
        assert!(PositionKind::Function < threshold);
        assert!(PositionKind::CallSite < threshold);
        assert!(PositionKind::Returned < threshold);
        assert!(PositionKind::Argument(3) >= threshold);
        assert!(PositionKind::CallSiteArgument(0) >= threshold);
    }

    #[test]
    fn invalid_position_has_no_scope() {
        let invalid = Position::invalid();
        assert_eq!(invalid.kind(), PositionKind::Invalid);
        assert_eq!(invalid.anchor_scope(), None);
        assert_eq!(invalid.attr_slot(), None);
    }
}
