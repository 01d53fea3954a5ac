//! Block reachability.
//!
//! Starts from the optimistic guess that only the entry block is live and
//! grows the live set along branch targets, folding branches on constant
//! conditions. Blocks outside the live set are assumed dead; other props
//! use this through the solver's deadness helpers to ignore facts that can
//! never be observed at runtime. The pessimistic fixpoint considers every
//! block live, i.e. carries no information, which is why this state is
//! never invalid.
use bit_set::BitSet;
use fxir::modules::{
    control_flow::Terminator,
    operand::{Const, Label, Operand},
};
use smallvec::SmallVec;

use crate::{
    position::Position,
    prop::{Prop, PropFamily, PropKind},
    solver::SolverCtx,
    state::{AbstractState, ChangeStatus},
};

/// Set of assumed-live blocks with the usual fixpoint controls.
#[derive(Debug, Clone, Default)]
pub struct LivenessState {
    live: BitSet,
    all_live: bool,
    fixed: bool,
}

impl LivenessState {
    fn mark_live(&mut self, block: Label) -> bool {
        self.live.insert(block.0 as usize)
    }

    fn is_live(&self, block: Label) -> bool {
        self.all_live || self.live.contains(block.0 as usize)
    }
}

impl AbstractState for LivenessState {
    fn is_valid_state(&self) -> bool {
        true
    }

    fn is_at_fixpoint(&self) -> bool {
        self.fixed
    }

    fn indicate_optimistic_fixpoint(&mut self) -> ChangeStatus {
        self.fixed = true;
        ChangeStatus::Unchanged
    }

    fn indicate_pessimistic_fixpoint(&mut self) -> ChangeStatus {
        self.all_live = true;
        self.fixed = true;
        ChangeStatus::Changed
    }
}

/// Reachability prop for one function.
#[derive(Debug)]
pub struct Liveness {
    position: Position,
    state: LivenessState,
}

impl Liveness {
    /// Returns true if `block` is assumed unreachable.
    pub fn is_assumed_dead_block(&self, block: Label) -> bool {
        !self.state.is_live(block)
    }

    /// Returns true if `block` is proven unreachable.
    pub fn is_known_dead_block(&self, block: Label) -> bool {
        self.state.fixed && self.is_assumed_dead_block(block)
    }

    /// Successors of a terminator, folding constant branch conditions.
    fn successors(terminator: &Terminator) -> SmallVec<[Label; 2]> {
        match terminator {
            Terminator::CBranch(cbranch) => {
                if let Operand::Imm(Const::Bool(taken)) = cbranch.cond {
                    let target = if taken {
                        cbranch.target_true
                    } else {
                        cbranch.target_false
                    };
                    SmallVec::from_slice(&[target])
                } else {
                    SmallVec::from_slice(&[cbranch.target_true, cbranch.target_false])
                }
            }
            Terminator::Jump(jump) => SmallVec::from_slice(&[jump.target]),
            Terminator::Ret(_) | Terminator::Trap(_) => SmallVec::new(),
        }
    }
}

impl PropFamily for Liveness {
    const KIND: PropKind = PropKind("liveness");

    fn build(position: Position) -> Self {
        Liveness {
            position,
            state: LivenessState::default(),
        }
    }
}

impl Prop for Liveness {
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
        let defined = self
            .position
            .anchor_scope()
            .and_then(|f| cx.module.function(f))
            .is_some();
        if defined {
            self.state.mark_live(Label::NIL);
        } else {
            // No body to reason about: everything is live.
            self.state.indicate_pessimistic_fixpoint();
        }
    }

    fn update(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        let function = self
            .position
            .anchor_scope()
            .and_then(|f| cx.module.function(f));
        let Some(function) = function else {
            return self.state.indicate_pessimistic_fixpoint();
        };

        let mut changed = false;
        loop {
            let mut grew = false;
            for (label, bb) in &function.body {
                if !self.state.is_live(*label) {
                    continue;
                }
                for target in Self::successors(&bb.terminator) {
                    if self.state.mark_live(target) {
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
            changed = true;
        }

        // Exploration is exhaustive and depends on nothing else, so the
        // result is final.
        self.state.indicate_optimistic_fixpoint();
        if changed {
            ChangeStatus::Changed
        } else {
            ChangeStatus::Unchanged
        }
    }

    fn as_str(&self) -> String {
        if self.state.all_live {
            format!("liveness[{}]: all blocks live", self.position)
        } else {
            format!(
                "liveness[{}]: {} blocks live",
                self.position,
                self.state.live.len()
            )
        }
    }
}
