//! Pointer nullness.
//!
//! Attaches to every position kind a value can occupy: returned values
//! check all return sites, arguments check all call sites, call site
//! returns forward to the callee's returned position, call site arguments
//! check the passed operand, and floating values fall back to their
//! defining instruction (a stack allocation is never null). Evidence about
//! SSA operands is obtained by resolving the operand to its most specific
//! position and querying the prop there, which is what lets one proven
//! argument fact serve every call site passing that value.
use fxir::{
    attrs::{Attr, AttrKind},
    modules::operand::{Const, Operand},
};
use smallvec::{SmallVec, smallvec};
use uuid::Uuid;

use crate::{
    position::{Anchor, Position, PositionKind},
    prop::{Prop, PropFamily, PropKind},
    props::settle_boolean,
    solver::SolverCtx,
    state::{AbstractState, BooleanState, ChangeStatus},
};

/// Nullness of a pointer value.
#[derive(Debug)]
pub struct NonNull {
    position: Position,
    state: BooleanState,
}

impl NonNull {
    /// Returns true if the value is assumed to never be null.
    pub fn is_assumed_non_null(&self) -> bool {
        self.state.is_assumed()
    }

    /// Returns true if the value is proven to never be null.
    pub fn is_known_non_null(&self) -> bool {
        self.state.is_known()
    }

    fn update_returned(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let Some(function) = self.position.anchor_scope() else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        if cx.module.function(function).is_none() {
            return self.state.indicate_pessimistic_fixpoint();
        }

        let mut all_known = true;
        let returns_ok = cx.check_for_all_returned_values(function, |cx, value, _block| {
            let (assumed, known) = operand_non_null(cx, function, value);
            all_known &= known;
            assumed
        });
        if !returns_ok {
            return self.state.indicate_pessimistic_fixpoint();
        }
        settle_boolean(&mut self.state, all_known)
    }

    fn update_call_site_returned(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let Some(callee) = self.position.callee(cx.module) else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        let returned = Position::returned(callee.uuid());
        match cx.query::<NonNull, _>(&returned, |p| {
            (p.is_assumed_non_null(), p.is_known_non_null())
        }) {
            Some((true, known)) => settle_boolean(&mut self.state, known),
            _ => self.state.indicate_pessimistic_fixpoint(),
        }
    }

    fn update_argument(&mut self, cx: &mut SolverCtx<'_>, index: u32) -> ChangeStatus {
        let Some(function) = self.position.anchor_scope() else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        if cx.module.function(function).is_none() {
            return self.state.indicate_pessimistic_fixpoint();
        }

        let mut all_known = true;
        let sites_ok = cx.check_for_all_call_sites(function, true, |cx, site| {
            let passed = Position::callsite_argument(site, index);
            // Exact lookup: the subsuming search would resolve straight
            // back to this argument position.
            match cx.query_exact::<NonNull, _>(&passed, |p| {
                (p.is_assumed_non_null(), p.is_known_non_null())
            }) {
                Some((assumed, known)) => {
                    all_known &= known;
                    assumed
                }
                None => false,
            }
        });
        if !sites_ok {
            return self.state.indicate_pessimistic_fixpoint();
        }
        settle_boolean(&mut self.state, all_known)
    }

    fn update_call_site_argument(&mut self, cx: &mut SolverCtx<'_>, index: u32) -> ChangeStatus {
        let Anchor::Instruction(call) = self.position.anchor() else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        let module = cx.module;
        let operand = module
            .invoke(call)
            .and_then(|invoke| invoke.args.get(index as usize));
        let Some(operand) = operand else {
            return self.state.indicate_pessimistic_fixpoint();
        };

        let (assumed, known) = operand_non_null(cx, call.function, operand);
        if !assumed {
            return self.state.indicate_pessimistic_fixpoint();
        }
        settle_boolean(&mut self.state, known)
    }

    fn update_floating(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let Anchor::Value { function, name } = self.position.anchor() else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        let defining = cx
            .module
            .function(function)
            .and_then(|f| f.defining_instr(name))
            .and_then(|r| cx.module.instr(r));
        match defining {
            Some(fxir::modules::instructions::Instr::MAlloca(_)) => {
                let newly_known = !self.state.is_known();
                self.state.set_known();
                self.state.indicate_optimistic_fixpoint();
                if newly_known {
                    ChangeStatus::Changed
                } else {
                    ChangeStatus::Unchanged
                }
            }
            _ => self.state.indicate_pessimistic_fixpoint(),
        }
    }
}

/// Nullness evidence for one operand: (assumed, known).
fn operand_non_null(cx: &mut SolverCtx<'_>, function: Uuid, operand: &Operand) -> (bool, bool) {
    match operand {
        Operand::Imm(Const::Null) => (false, false),
        Operand::Imm(_) => (true, true),
        Operand::Fun(_) => (true, true),
        Operand::Reg(name) => {
            let position = Position::value(cx.module, function, *name);
            cx.query::<NonNull, _>(&position, |p| {
                (p.is_assumed_non_null(), p.is_known_non_null())
            })
            .unwrap_or((false, false))
        }
    }
}

impl PropFamily for NonNull {
    const KIND: PropKind = PropKind("nonnull");

    fn build(position: Position) -> Self {
        NonNull {
            position,
            state: BooleanState::new(),
        }
    }
}

impl Prop for NonNull {
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
        if self.position.has_attr(cx.module, &[AttrKind::NonNull]) {
            self.state.set_known();
            self.state.indicate_optimistic_fixpoint();
            return;
        }
        // Dereferenceable bytes imply a valid, non-null pointer.
        if let Some(Attr::Dereferenceable(bytes)) =
            self.position.find_attr(cx.module, AttrKind::Dereferenceable)
        {
            if bytes > 0 {
                self.state.set_known();
                self.state.indicate_optimistic_fixpoint();
            }
        }
    }

    fn update(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        match self.position.kind() {
            PositionKind::Returned => self.update_returned(cx),
            PositionKind::CallSiteReturned => self.update_call_site_returned(cx),
            PositionKind::Argument(index) => self.update_argument(cx, index),
            PositionKind::CallSiteArgument(index) => self.update_call_site_argument(cx, index),
            PositionKind::Floating => self.update_floating(cx),
            _ => self.state.indicate_pessimistic_fixpoint(),
        }
    }

    fn deduced_attrs(&self) -> SmallVec<[Attr; 2]> {
        if self.state.is_assumed() {
            smallvec![Attr::NonNull]
        } else {
            SmallVec::new()
        }
    }

    fn as_str(&self) -> String {
        format!(
            "nonnull[{}]: {}",
            self.position,
            if self.is_assumed_non_null() {
                "nonnull"
            } else {
                "may-null"
            }
        )
    }
}
