//! End-to-end deduction scenarios.
use std::collections::BTreeMap;

use fxcore::{
    ChangeStatus, Solver, SolverConfig, SolverCtx, deduce_module,
    position::Position,
    prop::{Prop, PropFamily, PropKind},
    props::{NoRecurse, NoTrap, NonNull},
    state::{AbstractState, BooleanState},
};
use fxir::{
    attrs::{Attr, AttrKind, AttrList, AttrSlot},
    modules::{
        BasicBlock, Function, InstrRef, Linkage, Module,
        control_flow::{CBranch, Ret, Terminator, Trap},
        instructions::{Instr, int::IAdd, mem::MAlloca, misc::Invoke},
        operand::{Const, Label, Operand},
        symbol::{ExternalFunction, FunctionPointer},
    },
    types::Ty,
};
use uuid::Uuid;

fn block(instructions: Vec<Instr>, terminator: impl Into<Terminator>) -> BasicBlock {
    BasicBlock {
        instructions,
        terminator: terminator.into(),
    }
}

fn function(uuid: Uuid, name: &str, params: Vec<(u32, Ty)>, return_type: Option<Ty>) -> Function {
    Function {
        uuid,
        name: Some(name.into()),
        params,
        return_type,
        linkage: Linkage::Private,
        attrs: AttrList::default(),
        body: BTreeMap::new(),
    }
}

fn call(callee: FunctionPointer, args: Vec<Operand>, dest: Option<u32>, ty: Option<Ty>) -> Instr {
    Invoke {
        function: Operand::Fun(callee),
        args,
        dest,
        ty,
        attrs: AttrList::default(),
    }
    .into()
}

fn seed_and_run(module: &mut Module, config: SolverConfig) -> (Solver, ChangeStatus) {
    let functions: Vec<Uuid> = module.functions.keys().copied().collect();
    let mut solver = Solver::new(config);
    for f in &functions {
        solver.seed_default_props(module, *f);
    }
    let changed = solver.run(module);
    (solver, changed)
}

#[test_log::test]
fn leaf_function_is_proven_trap_free() {
    let f_uuid = Uuid::new_v4();
    let mut f = function(f_uuid, "leaf", vec![(0, Ty::Int(32))], Some(Ty::Int(32)));
    f.body.insert(
        Label::NIL,
        block(
            vec![
                IAdd {
                    dest: 1,
                    lhs: Operand::Reg(0),
                    rhs: Operand::Imm(Const::Int(1)),
                }
                .into(),
            ],
            Ret {
                value: Some(Operand::Reg(1)),
            },
        ),
    );
    let mut module = Module::default();
    module.functions.insert(f_uuid, f);

    let (solver, changed) = seed_and_run(&mut module, SolverConfig::default());
    assert_eq!(changed, ChangeStatus::Changed);

    let no_trap = solver
        .lookup::<NoTrap>(&Position::function(f_uuid))
        .expect("seeded prop");
    assert!(no_trap.is_known_no_trap());

    // Proven facts are persisted in the function's attribute list.
    let attrs = module.attrs_of(f_uuid).unwrap();
    assert!(attrs.has(AttrSlot::Function, AttrKind::NoTrap));
    assert!(attrs.has(AttrSlot::Function, AttrKind::NoRecurse));
    assert_eq!(solver.stats().forced_pessimistic, 0);
}

#[test_log::test]
fn call_to_unknown_external_stays_unproven() {
    let ext_uuid = Uuid::new_v4();
    let f_uuid = Uuid::new_v4();

    let mut f = function(f_uuid, "wrapper", vec![], None);
    f.body.insert(
        Label::NIL,
        block(
            vec![call(FunctionPointer::External(ext_uuid), vec![], None, None)],
            Ret { value: None },
        ),
    );

    let mut module = Module::default();
    module.functions.insert(f_uuid, f);
    module.external_functions.insert(
        ext_uuid,
        ExternalFunction {
            uuid: ext_uuid,
            name: "opaque".into(),
            param_types: vec![],
            return_type: None,
            attrs: AttrList::default(),
        },
    );

    let (solver, _) = seed_and_run(&mut module, SolverConfig::default());
    let no_trap = solver
        .lookup::<NoTrap>(&Position::function(f_uuid))
        .expect("seeded prop");
    assert!(!no_trap.is_assumed_no_trap());
    assert!(!no_trap.is_known_no_trap());
    assert!(!module
        .attrs_of(f_uuid)
        .unwrap()
        .has(AttrSlot::Function, AttrKind::NoTrap));
}

#[test_log::test]
fn external_ground_truth_feeds_the_caller() {
    let ext_uuid = Uuid::new_v4();
    let f_uuid = Uuid::new_v4();

    let mut f = function(f_uuid, "wrapper", vec![], None);
    f.body.insert(
        Label::NIL,
        block(
            vec![call(FunctionPointer::External(ext_uuid), vec![], None, None)],
            Ret { value: None },
        ),
    );

    let mut ext = ExternalFunction {
        uuid: ext_uuid,
        name: "runtime_helper".into(),
        param_types: vec![],
        return_type: None,
        attrs: AttrList::default(),
    };
    ext.attrs.add(AttrSlot::Function, Attr::NoTrap);

    let mut module = Module::default();
    module.functions.insert(f_uuid, f);
    module.external_functions.insert(ext_uuid, ext);

    let (solver, _) = seed_and_run(&mut module, SolverConfig::default());
    let no_trap = solver
        .lookup::<NoTrap>(&Position::function(f_uuid))
        .expect("seeded prop");
    assert!(no_trap.is_known_no_trap());
}

#[test_log::test]
fn nonnull_flows_across_the_call_boundary() {
    let g_uuid = Uuid::new_v4();
    let f_uuid = Uuid::new_v4();

    // g allocates and returns the pointer.
    let mut g = function(g_uuid, "source", vec![], Some(Ty::Ptr));
    g.body.insert(
        Label::NIL,
        block(
            vec![
                MAlloca {
                    dest: 1,
                    size: Operand::Imm(Const::Int(8)),
                }
                .into(),
            ],
            Ret {
                value: Some(Operand::Reg(1)),
            },
        ),
    );

    // f forwards g's result.
    let mut f = function(f_uuid, "forward", vec![], Some(Ty::Ptr));
    f.body.insert(
        Label::NIL,
        block(
            vec![call(FunctionPointer::Internal(g_uuid), vec![], Some(0), Some(Ty::Ptr))],
            Ret {
                value: Some(Operand::Reg(0)),
            },
        ),
    );

    let mut module = Module::default();
    module.functions.insert(g_uuid, g);
    module.functions.insert(f_uuid, f);

    let (solver, changed) = seed_and_run(&mut module, SolverConfig::default());
    assert_eq!(changed, ChangeStatus::Changed);

    let g_ret = solver
        .lookup::<NonNull>(&Position::returned(g_uuid))
        .expect("seeded prop");
    assert!(g_ret.is_known_non_null());

    // The caller-side fact is only provable after g's promotion made the
    // call-site return prop revisit; dependency tracking got it there.
    let f_ret = solver
        .lookup::<NonNull>(&Position::returned(f_uuid))
        .expect("seeded prop");
    assert!(f_ret.is_known_non_null());

    assert!(module
        .attrs_of(f_uuid)
        .unwrap()
        .has(AttrSlot::Return, AttrKind::NonNull));
    assert_eq!(solver.stats().forced_pessimistic, 0);
    assert!(solver.stats().rounds >= 2);
}

#[test_log::test]
fn argument_fact_is_shared_across_call_sites() {
    let h_uuid = Uuid::new_v4();
    let caller_uuid = Uuid::new_v4();

    let mut h = function(h_uuid, "sink", vec![(0, Ty::Ptr)], None);
    h.body
        .insert(Label::NIL, block(vec![], Ret { value: None }));

    let mut caller = function(caller_uuid, "caller", vec![], None);
    caller.body.insert(
        Label::NIL,
        block(
            vec![
                MAlloca {
                    dest: 1,
                    size: Operand::Imm(Const::Int(16)),
                }
                .into(),
                call(FunctionPointer::Internal(h_uuid), vec![Operand::Reg(1)], None, None),
                call(FunctionPointer::Internal(h_uuid), vec![Operand::Reg(1)], None, None),
            ],
            Ret { value: None },
        ),
    );

    let mut module = Module::default();
    module.functions.insert(h_uuid, h);
    module.functions.insert(caller_uuid, caller);

    let (solver, _) = seed_and_run(&mut module, SolverConfig::default());

    let h_arg = solver
        .lookup::<NonNull>(&Position::argument(h_uuid, 0))
        .expect("seeded prop");
    assert!(h_arg.is_known_non_null());
    assert!(module
        .attrs_of(h_uuid)
        .unwrap()
        .has(AttrSlot::Arg(0), AttrKind::NonNull));

    // One argument prop, two call-site argument props, one shared prop for
    // the allocated value; nothing recomputed per call site.
    assert_eq!(solver.count_props(NonNull::KIND), 4);

    // Trap facts need no call-site props at all: the subsuming lookup lands
    // on the callee's function prop directly.
    assert_eq!(solver.count_props(NoTrap::KIND), 2);
}

#[test_log::test]
fn norecurse_chains_over_proven_callers() {
    let main_uuid = Uuid::new_v4();
    let f_uuid = Uuid::new_v4();
    let g_uuid = Uuid::new_v4();

    let mut main = function(main_uuid, "main", vec![], None);
    main.linkage = Linkage::External;
    main.attrs.add(AttrSlot::Function, Attr::NoRecurse);
    main.body.insert(
        Label::NIL,
        block(vec![call(FunctionPointer::Internal(f_uuid), vec![], None, None)], Ret { value: None }),
    );

    let mut f = function(f_uuid, "middle", vec![], None);
    f.body.insert(
        Label::NIL,
        block(vec![call(FunctionPointer::Internal(g_uuid), vec![], None, None)], Ret { value: None }),
    );

    let mut g = function(g_uuid, "leaf", vec![], None);
    g.body.insert(Label::NIL, block(vec![], Ret { value: None }));

    let mut module = Module::default();
    module.functions.insert(main_uuid, main);
    module.functions.insert(f_uuid, f);
    module.functions.insert(g_uuid, g);

    let (solver, _) = seed_and_run(&mut module, SolverConfig::default());

    let f_prop = solver
        .lookup::<NoRecurse>(&Position::function(f_uuid))
        .unwrap();
    let g_prop = solver
        .lookup::<NoRecurse>(&Position::function(g_uuid))
        .unwrap();
    assert!(f_prop.is_known_no_recurse());
    assert!(g_prop.is_known_no_recurse());
}

#[test_log::test]
fn mutual_recursion_is_never_proven() {
    let a_uuid = Uuid::new_v4();
    let b_uuid = Uuid::new_v4();

    let mut a = function(a_uuid, "ping", vec![], None);
    a.body.insert(
        Label::NIL,
        block(vec![call(FunctionPointer::Internal(b_uuid), vec![], None, None)], Ret { value: None }),
    );
    let mut b = function(b_uuid, "pong", vec![], None);
    b.body.insert(
        Label::NIL,
        block(vec![call(FunctionPointer::Internal(a_uuid), vec![], None, None)], Ret { value: None }),
    );

    let mut module = Module::default();
    module.functions.insert(a_uuid, a);
    module.functions.insert(b_uuid, b);

    let (solver, _) = seed_and_run(&mut module, SolverConfig::default());

    for uuid in [a_uuid, b_uuid] {
        let prop = solver
            .lookup::<NoRecurse>(&Position::function(uuid))
            .unwrap();
        // The two assumptions supported each other but never settled; the
        // sweep at loop exit retracted both.
        assert!(!prop.is_known_no_recurse());
        assert!(!prop.is_assumed_no_recurse());
    }
    assert!(solver.stats().forced_pessimistic >= 2);
}

#[test_log::test]
fn trap_in_unreachable_block_is_ignored() {
    let f_uuid = Uuid::new_v4();
    let live = Label(1);
    let dead = Label(2);

    let mut f = function(f_uuid, "guarded", vec![], None);
    f.body.insert(
        Label::NIL,
        block(
            vec![],
            CBranch {
                cond: Operand::Imm(Const::Bool(true)),
                target_true: live,
                target_false: dead,
            },
        ),
    );
    f.body.insert(live, block(vec![], Ret { value: None }));
    f.body.insert(dead, block(vec![], Trap));

    let mut module = Module::default();
    module.functions.insert(f_uuid, f);

    let (solver, _) = seed_and_run(&mut module, SolverConfig::default());
    let no_trap = solver
        .lookup::<NoTrap>(&Position::function(f_uuid))
        .unwrap();
    assert!(no_trap.is_known_no_trap());
}

#[test_log::test]
fn reachable_trap_defeats_the_fact() {
    let f_uuid = Uuid::new_v4();
    let live = Label(1);
    let trapping = Label(2);

    let mut f = function(f_uuid, "maybe_trap", vec![(0, Ty::Bool)], None);
    f.body.insert(
        Label::NIL,
        block(
            vec![],
            CBranch {
                cond: Operand::Reg(0),
                target_true: live,
                target_false: trapping,
            },
        ),
    );
    f.body.insert(live, block(vec![], Ret { value: None }));
    f.body.insert(trapping, block(vec![], Trap));

    let mut module = Module::default();
    module.functions.insert(f_uuid, f);

    let (solver, _) = seed_and_run(&mut module, SolverConfig::default());
    let no_trap = solver
        .lookup::<NoTrap>(&Position::function(f_uuid))
        .unwrap();
    assert!(!no_trap.is_assumed_no_trap());
}

#[test_log::test]
fn subsumption_prefers_the_callee_argument_position() {
    let h_uuid = Uuid::new_v4();
    let caller_uuid = Uuid::new_v4();

    let mut h = function(h_uuid, "sink", vec![(0, Ty::Ptr)], None);
    h.body
        .insert(Label::NIL, block(vec![], Ret { value: None }));

    let mut caller = function(caller_uuid, "caller", vec![(0, Ty::Ptr)], None);
    caller.body.insert(
        Label::NIL,
        block(
            vec![call(FunctionPointer::Internal(h_uuid), vec![Operand::Reg(0)], None, None)],
            Ret { value: None },
        ),
    );

    let mut module = Module::default();
    module.functions.insert(h_uuid, h);
    module.functions.insert(caller_uuid, caller);

    let site = InstrRef {
        function: caller_uuid,
        block: Label::NIL,
        index: 0,
    };
    let position = Position::callsite_argument(site, 0);
    let subsuming = position.subsuming_positions(&module);

    // Most specific evidence first: the position itself, the callee's
    // matching argument, the callee function, then the position the passed
    // value is associated with (here: the caller's own argument).
    assert_eq!(subsuming[0], position);
    assert_eq!(subsuming[1], Position::argument(h_uuid, 0));
    assert_eq!(subsuming[2], Position::function(h_uuid));
    assert_eq!(subsuming[3], Position::argument(caller_uuid, 0));
}

/// A prop whose only dependency is itself; exercises the self-query path.
#[derive(Debug)]
struct SelfLoop {
    position: Position,
    state: BooleanState,
}

impl SelfLoop {
    fn assumed(&self) -> bool {
        self.state.is_assumed()
    }
}

impl PropFamily for SelfLoop {
    const KIND: PropKind = PropKind("selfloop");

    fn build(position: Position) -> Self {
        SelfLoop {
            position,
            state: BooleanState::new(),
        }
    }
}

impl Prop for SelfLoop {
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

    fn update(&mut self, cx: &mut SolverCtx<'_>) -> ChangeStatus {
        // The lookup resolves to this prop itself, which records a self
        // dependency and yields no usable information.
        let position = self.position;
        let seen = cx.query::<SelfLoop, _>(&position, |p| p.assumed());
        assert_eq!(seen, None);
        ChangeStatus::Unchanged
    }

    fn as_str(&self) -> String {
        format!("selfloop[{}]", self.position)
    }
}

#[test_log::test]
fn self_referential_prop_runs_to_the_iteration_bound() {
    let f_uuid = Uuid::new_v4();
    let mut f = function(f_uuid, "looped", vec![], None);
    f.body.insert(Label::NIL, block(vec![], Ret { value: None }));
    let mut module = Module::default();
    module.functions.insert(f_uuid, f);

    let config = SolverConfig { max_iterations: 5 };
    let mut solver = Solver::new(config);
    let position = Position::function(f_uuid);
    solver.register(&module, SelfLoop::build(position));

    let changed = solver.run(&mut module);
    assert_eq!(changed, ChangeStatus::Unchanged);

    // Re-queried itself every round, so the work-list never drained and the
    // loop ran to its bound; the sweep then forced the pessimistic state.
    assert_eq!(solver.stats().rounds, 5);
    assert!(solver.stats().forced_pessimistic >= 1);

    let prop = solver.lookup::<SelfLoop>(&position).unwrap();
    assert!(!prop.assumed());
    assert!(prop.state().is_at_fixpoint());
}

#[test_log::test]
fn deduce_module_reports_mutation() {
    let f_uuid = Uuid::new_v4();
    let mut f = function(f_uuid, "leaf", vec![], None);
    f.body.insert(Label::NIL, block(vec![], Ret { value: None }));
    let mut module = Module::default();
    module.functions.insert(f_uuid, f);

    let changed = deduce_module(&mut module, &[f_uuid], SolverConfig::default());
    assert_eq!(changed, ChangeStatus::Changed);

    // A second run deduces the same facts, which are already persisted.
    let changed = deduce_module(&mut module, &[f_uuid], SolverConfig::default());
    assert_eq!(changed, ChangeStatus::Unchanged);
}
