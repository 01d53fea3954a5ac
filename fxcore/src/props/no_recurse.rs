//! Recursion freedom.
//!
//! A function cannot be re-entered if every one of its call sites sits in a
//! caller that is itself proven recursion free and none of the call sites
//! is in its own body. The proof chains strictly over proven (known) bits:
//! mutually recursive functions keep supporting each other's assumption
//! only, never settle, and are swept to the pessimistic fixpoint when the
//! solver stops.
use fxir::attrs::{Attr, AttrKind};
use smallvec::{SmallVec, smallvec};

use crate::{
    position::{Position, PositionKind},
    prop::{Prop, PropFamily, PropKind},
    props::settle_boolean,
    solver::SolverCtx,
    state::{AbstractState, BooleanState, ChangeStatus},
};

/// Recursion freedom of a function or call site.
#[derive(Debug)]
pub struct NoRecurse {
    position: Position,
    state: BooleanState,
}

impl NoRecurse {
    /// Returns true if recursion freedom is assumed.
    pub fn is_assumed_no_recurse(&self) -> bool {
        self.state.is_assumed()
    }

    /// Returns true if recursion freedom is proven.
    pub fn is_known_no_recurse(&self) -> bool {
        self.state.is_known()
    }

    fn update_function(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let Some(function) = self.position.anchor_scope() else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        if cx.module.function(function).is_none() {
            return self.state.indicate_pessimistic_fixpoint();
        }

        let mut all_known = true;
        let sites_ok = cx.check_for_all_call_sites(function, true, |cx, site| {
            if site.function == function {
                // A call site in the own body is direct recursion.
                return false;
            }
            let caller = Position::function(site.function);
            match cx.query::<NoRecurse, _>(&caller, |p| {
                (p.is_assumed_no_recurse(), p.is_known_no_recurse())
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

    fn update_call_site(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let Some(callee) = self.position.callee(cx.module) else {
            return self.state.indicate_pessimistic_fixpoint();
        };
        let fpos = Position::function(callee.uuid());
        match cx.query::<NoRecurse, _>(&fpos, |p| {
            (p.is_assumed_no_recurse(), p.is_known_no_recurse())
        }) {
            Some((true, known)) => settle_boolean(&mut self.state, known),
            _ => self.state.indicate_pessimistic_fixpoint(),
        }
    }
}

impl PropFamily for NoRecurse {
    const KIND: PropKind = PropKind("norecurse");

    fn build(position: Position) -> Self {
        NoRecurse {
            position,
            state: BooleanState::new(),
        }
    }
}

impl Prop for NoRecurse {
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
        if self.position.has_attr(cx.module, &[AttrKind::NoRecurse]) {
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
            smallvec![Attr::NoRecurse]
        } else {
            SmallVec::new()
        }
    }

    fn as_str(&self) -> String {
        format!(
            "norecurse[{}]: {}",
            self.position,
            if self.is_assumed_no_recurse() {
                "norecurse"
            } else {
                "may-recurse"
            }
        )
    }
}
