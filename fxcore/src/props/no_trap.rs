//! Trap freedom.
//!
//! A function is trap free if no reachable trap terminator exists, every
//! trapping arithmetic instruction has a provably safe divisor, and every
//! callee is trap free in turn. The call site flavor forwards to the
//! callee's function prop, which lets ground truth on external declarations
//! flow in through the persisted attribute lists.
use fxir::{
    attrs::{Attr, AttrKind},
    modules::{
        instructions::{Instr, Opcode},
        operand::{Const, Label, Operand},
    },
};
use smallvec::{SmallVec, smallvec};

use crate::{
    position::{Position, PositionKind},
    prop::{Prop, PropFamily, PropKind},
    props::settle_boolean,
    solver::SolverCtx,
    state::{AbstractState, BooleanState, ChangeStatus},
};

/// Trap freedom of a function or call site.
#[derive(Debug)]
pub struct NoTrap {
    position: Position,
    state: BooleanState,
}

impl NoTrap {
    /// Returns true if trap freedom is assumed.
    pub fn is_assumed_no_trap(&self) -> bool {
        self.state.is_assumed()
    }

    /// Returns true if trap freedom is proven.
    pub fn is_known_no_trap(&self) -> bool {
        self.state.is_known()
    }

    fn update_function(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let Some(function) = self.position.anchor_scope() else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        let Some(f) = cx.module.function(function) else {
            // Declarations without ground truth cannot be proven.
            return self.state.indicate_pessimistic_fixpoint();
        };

        let mut all_known = true;

        // Trapping arithmetic needs a divisor that is a non-zero constant.
        let divisors_ok = cx.check_for_all_instructions(
            function,
            &[Opcode::IDiv, Opcode::IRem],
            |cx, r| match cx.module.instr(r) {
                Some(Instr::IDiv(div)) => divisor_nonzero(&div.rhs),
                Some(Instr::IRem(rem)) => divisor_nonzero(&rem.rhs),
                _ => false,
            },
        );
        if !divisors_ok {
            return self.state.indicate_pessimistic_fixpoint();
        }

        // A reachable trap terminator defeats the fact outright.
        let trap_blocks: SmallVec<[Label; 4]> = f
            .body
            .iter()
            .filter(|(_, bb)| bb.terminator.is_trap())
            .map(|(label, _)| *label)
            .collect();
        for block in trap_blocks {
            let (assumed_dead, known_dead) = cx.block_deadness(function, block);
            if !assumed_dead {
                return self.state.indicate_pessimistic_fixpoint();
            }
            all_known &= known_dead;
        }

        // Every call must target a trap free function.
        let own_assumed = self.state.is_assumed();
        let own_known = self.state.is_known();
        let calls_ok = cx.check_for_all_instructions(function, &[Opcode::Invoke], |cx, r| {
            let callsite = Position::callsite(r);
            match cx.query::<NoTrap, _>(&callsite, |p| {
                (p.is_assumed_no_trap(), p.is_known_no_trap())
            }) {
                Some((assumed, known)) => {
                    all_known &= known;
                    assumed
                }
                // The lookup resolved to this very prop: a direct recursive
                // call, which supports itself for as long as it stays
                // assumed.
                None => {
                    all_known &= own_known;
                    own_assumed
                }
            }
        });
        if !calls_ok {
            return self.state.indicate_pessimistic_fixpoint();
        }

        settle_boolean(&mut self.state, all_known)
    }

    fn update_call_site(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let Some(callee) = self.position.callee(cx.module) else {
            // Indirect call: nothing to forward to.
            return self.state.indicate_pessimistic_fixpoint();
        };
        let fpos = Position::function(callee.uuid());
        match cx.query::<NoTrap, _>(&fpos, |p| (p.is_assumed_no_trap(), p.is_known_no_trap())) {
            Some((true, known)) => settle_boolean(&mut self.state, known),
            _ => self.state.indicate_pessimistic_fixpoint(),
        }
    }
}

fn divisor_nonzero(op: &Operand) -> bool {
    matches!(op, Operand::Imm(Const::Int(value)) if *value != 0)
}

impl PropFamily for NoTrap {
    const KIND: PropKind = PropKind("notrap");

    fn build(position: Position) -> Self {
        NoTrap {
            position,
            state: BooleanState::new(),
        }
    }
}

impl Prop for NoTrap {
    fn kind(&self) -> PropKind {
        Self::KIND
    }

    fn position(&self) -> Position {
        self.position
    }

    fn state(&self) -> &dyn AbstractState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut dyn AbstractState {
        &mut self.state
    }

    fn initialize(&mut self, cx: &mut SolverCtx<'_>) {
        if self.position.has_attr(cx.module, &[AttrKind::NoTrap]) {
            self.state.set_known();
            self.state.indicate_optimistic_fixpoint();
        }
    }

    fn update(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        match self.position.kind() {
            PositionKind::Function => self.update_function(cx),
            PositionKind::CallSite => self.update_call_site(cx),
            _ => self.state.indicate_pessimistic_fixpoint(),
        }
    }

    fn deduced_attrs(&self) -> SmallVec<[Attr; 2]> {
        if self.state.is_assumed() {
            smallvec![Attr::NoTrap]
        } else {
            SmallVec::new()
        }
    }

    fn as_str(&self) -> String {
        format!(
            "notrap[{}]: {}",
            self.position,
            if self.is_assumed_no_trap() {
                "notrap"
            } else {
                "may-trap"
            }
        )
    }
}
