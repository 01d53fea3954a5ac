//! The fixpoint solver.
//!
//! The solver owns every prop, maintains the (kind, position) registry used
//! for lookups, records the query dependency graph, and runs the iteration
//! loop. Execution is strictly single-threaded: a round's membership is
//! fixed at round start, so changes discovered mid-round only influence the
//! next round, which keeps the final fixpoint independent of intra-round
//! visitation order.
use std::collections::{BTreeMap, BTreeSet};

use fxir::modules::{
    InstrRef, Module,
    control_flow::Terminator,
    instructions::{Instr, Instruction, Opcode},
    operand::{Label, Operand},
    symbol::FunctionPointer,
};
use log::{debug, trace};
use petgraph::graphmap::DiGraphMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::{
    cache::InfoCache,
    position::Position,
    prop::{Prop, PropFamily, PropKey, PropKind},
    props::{liveness::Liveness, no_recurse::NoRecurse, no_trap::NoTrap, non_null::NonNull},
    state::ChangeStatus,
};

/// Tuning knobs for one solver run.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Upper bound on fixpoint rounds. When the bound is hit, every prop
    /// still in flux is forced to its pessimistic fixpoint, so the run
    /// always terminates with a sound, if less precise, result.
    pub max_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig { max_iterations: 32 }
    }
}

/// Counters collected during a run, readable afterwards.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Fixpoint rounds executed.
    pub rounds: u32,
    /// Individual prop updates executed.
    pub updates: u64,
    /// Updates that reported a state change.
    pub changes: u64,
    /// Props forced to their pessimistic fixpoint at loop exit.
    pub forced_pessimistic: u32,
    /// Props whose manifestation mutated the module.
    pub manifested: u32,
}

struct PropEntry {
    /// State validity as of the last commit; consulted for dependency
    /// recording while the prop itself is checked out for an update.
    valid: bool,
    /// Absent exactly while the prop is checked out for its own update or
    /// initialization.
    prop: Option<Box<dyn Prop>>,
}

/// The deduction driver. Owns all props; see the module documentation.
pub struct Solver {
    config: SolverConfig,
    props: SlotMap<PropKey, PropEntry>,
    registry: BTreeMap<(PropKind, Position), PropKey>,
    /// Edge queried -> querier. An edge exists iff the querier observed the
    /// queried prop's state while it was valid; set semantics collapse
    /// repeated queries.
    deps: DiGraphMap<PropKey, ()>,
    cache: InfoCache,
    /// Work-list membership for the upcoming round.
    pending: BTreeSet<PropKey>,
    /// Props that queried themselves during their current update; they are
    /// revisited every round until stable.
    self_queried: BTreeSet<PropKey>,
    stats: SolverStats,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Solver {
            config,
            props: SlotMap::with_key(),
            registry: BTreeMap::new(),
            deps: DiGraphMap::new(),
            cache: InfoCache::new(),
            pending: BTreeSet::new(),
            self_queried: BTreeSet::new(),
            stats: SolverStats::default(),
        }
    }

    /// Counters of the last run.
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Hand a prop over to the solver. It is initialized immediately and
    /// scheduled for the next round. Registering a second prop under an
    /// already taken (kind, position) identity returns the existing one.
    pub fn register<P: Prop + 'static>(&mut self, module: &Module, prop: P) -> PropKey {
        self.register_boxed(module, Box::new(prop))
    }

    fn register_boxed(&mut self, module: &Module, mut prop: Box<dyn Prop>) -> PropKey {
        let kind = prop.kind();
        let position = prop.position();
        if let Some(&existing) = self.registry.get(&(kind, position)) {
            return existing;
        }

        let key = self.props.insert(PropEntry {
            valid: true,
            prop: None,
        });
        self.registry.insert((kind, position), key);
        self.deps.add_node(key);

        // One-time setup runs with the prop outside the arena so that it
        // can already issue queries of its own.
        {
            let mut cx = SolverCtx {
                solver: self,
                module,
                key,
            };
            prop.initialize(&mut cx);
        }
        trace!("registered {} at {}", kind, position);

        let valid = prop.state().is_valid_state();
        let entry = &mut self.props[key];
        entry.valid = valid;
        entry.prop = Some(prop);
        self.pending.insert(key);
        key
    }

    /// Register the default prop set for `function`: reachability, trap and
    /// recursion behavior, and nullness of pointer-typed returns and
    /// arguments.
    pub fn seed_default_props(&mut self, module: &Module, function: Uuid) {
        let Some(f) = module.function(function) else {
            return;
        };
        let fpos = Position::function(function);
        self.register(module, Liveness::build(fpos));
        self.register(module, NoTrap::build(fpos));
        self.register(module, NoRecurse::build(fpos));

        if f.return_type.is_some_and(|ty| ty.is_ptr()) {
            self.register(module, NonNull::build(Position::returned(function)));
        }
        for (index, (_, ty)) in f.params.iter().enumerate() {
            if ty.is_ptr() {
                self.register(module, NonNull::build(Position::argument(function, index as u32)));
            }
        }
    }

    /// Exact-position lookup of a finished (or in-flight) prop. Unlike the
    /// query interface this does not search subsuming positions and does
    /// not create anything.
    pub fn lookup<P: PropFamily + 'static>(&self, position: &Position) -> Option<&P> {
        let key = *self.registry.get(&(P::KIND, *position))?;
        self.props.get(key)?.prop.as_deref()?.downcast_ref::<P>()
    }

    /// Number of registered props of the given family.
    pub fn count_props(&self, kind: PropKind) -> usize {
        self.registry.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Find a prop of family `P` at `position` or one of its subsuming
    /// positions, most specific first; create one at `position` if none
    /// exists yet.
    fn lookup_or_create<P: PropFamily + 'static>(
        &mut self,
        module: &Module,
        position: &Position,
    ) -> PropKey {
        for subsuming in position.subsuming_positions(module) {
            if let Some(&key) = self.registry.get(&(P::KIND, subsuming)) {
                return key;
            }
        }
        self.register(module, P::build(*position))
    }

    /// Run the analysis until a fixpoint is reached or enforced, then
    /// manifest. Returns whether manifestation changed the module.
    pub fn run(&mut self, module: &mut Module) -> ChangeStatus {
        let max_iterations = self.config.max_iterations;
        let mut worklist: Vec<PropKey> = std::mem::take(&mut self.pending).into_iter().collect();
        let mut iterations = 0u32;

        while !worklist.is_empty() && iterations < max_iterations {
            iterations += 1;
            trace!("round {} updates {} props", iterations, worklist.len());
            for key in worklist {
                self.update_one(key, module);
            }
            // Membership discovered this round (dependents of changes,
            // self-queriers, freshly created props) forms the next round.
            worklist = std::mem::take(&mut self.pending).into_iter().collect();
        }
        self.stats.rounds = iterations;
        debug!(
            "fixpoint loop ended after {} rounds, {} props, {} left in flux",
            iterations,
            self.props.len(),
            worklist.len()
        );

        self.force_pessimistic(worklist);
        self.manifest(module)
    }

    /// Force every prop that has not settled into its pessimistic fixpoint,
    /// and propagate the forcing transitively through recorded dependents.
    fn force_pessimistic(&mut self, leftover: Vec<PropKey>) {
        let mut force: Vec<PropKey> = leftover;
        for (key, entry) in self.props.iter() {
            let unfixed = entry
                .prop
                .as_ref()
                .is_some_and(|p| !p.state().is_at_fixpoint());
            if unfixed {
                force.push(key);
            }
        }

        let mut visited = BTreeSet::new();
        while let Some(key) = force.pop() {
            if !visited.insert(key) {
                continue;
            }
            let Some(entry) = self.props.get_mut(key) else {
                continue;
            };
            let Some(prop) = entry.prop.as_mut() else {
                continue;
            };
            if prop.state().is_at_fixpoint() {
                continue;
            }
            prop.state_mut().indicate_pessimistic_fixpoint();
            entry.valid = prop.state().is_valid_state();
            self.stats.forced_pessimistic += 1;
            trace!("forced pessimistic: {}", prop.as_str());
            let dependents: SmallVec<[PropKey; 8]> = self.deps.neighbors(key).collect();
            force.extend(dependents);
        }
    }

    fn manifest(&mut self, module: &mut Module) -> ChangeStatus {
        let mut changed = ChangeStatus::Unchanged;
        let keys: Vec<PropKey> = self.props.keys().collect();
        for key in keys {
            let entry = &self.props[key];
            let prop = entry
                .prop
                .as_ref()
                .expect("all props are checked in after the fixpoint loop");
            // Invalid information must never be written back.
            if !prop.state().is_valid_state() {
                continue;
            }
            if prop.manifest(module) == ChangeStatus::Changed {
                self.stats.manifested += 1;
                changed = ChangeStatus::Changed;
            }
        }
        debug!(
            "manifested {} props ({} forced pessimistic)",
            self.stats.manifested, self.stats.forced_pessimistic
        );
        changed
    }

    fn update_one(&mut self, key: PropKey, module: &Module) {
        let Some(entry) = self.props.get_mut(key) else {
            return;
        };
        let Some(mut prop) = entry.prop.take() else {
            return;
        };
        // Fixed props cannot change themselves anymore; updating them is a
        // no-op by contract.
        if prop.state().is_at_fixpoint() {
            self.props[key].prop = Some(prop);
            return;
        }

        self.stats.updates += 1;
        let status = {
            let mut cx = SolverCtx {
                solver: self,
                module,
                key,
            };
            prop.update(&mut cx)
        };
        trace!("update {} -> {:?}", prop.as_str(), status);

        let entry = &mut self.props[key];
        entry.valid = prop.state().is_valid_state();
        entry.prop = Some(prop);

        if status == ChangeStatus::Changed {
            self.stats.changes += 1;
            let dependents: SmallVec<[PropKey; 8]> = self.deps.neighbors(key).collect();
            for dependent in dependents {
                self.pending.insert(dependent);
            }
        }
        if self.self_queried.remove(&key) {
            self.pending.insert(key);
        }
    }
}

/// Handle passed to a prop while it is initialized or updated.
///
/// Carries the solver, the module under analysis, and the identity of the
/// prop being driven, so that queries can be attributed to it in the
/// dependency graph.
pub struct SolverCtx<'a> {
    pub(crate) solver: &'a mut Solver,
    pub module: &'a Module,
    pub(crate) key: PropKey,
}

impl<'a> SolverCtx<'a> {
    /// The key of the prop currently being driven.
    pub fn key(&self) -> PropKey {
        self.key
    }

    /// Query a prop of family `P` at `position` or a subsuming position,
    /// creating it on demand, and read its state through `read`.
    ///
    /// A dependency edge from the queried prop to the querying one is
    /// recorded iff the queried state is valid at query time; invalid facts
    /// cannot change, so depending on them is pointless. Returns `None`
    /// when no usable information is available, notably when the lookup
    /// resolves to the querying prop itself.
    pub fn query<P: PropFamily + 'static, R>(
        &mut self,
        position: &Position,
        read: impl FnOnce(&P) -> R,
    ) -> Option<R> {
        let key = self.solver.lookup_or_create::<P>(self.module, position);
        self.read_prop(key, read)
    }

    /// Like [`Self::query`], but only considers the exact position, never a
    /// subsuming one. Used when forwarding to a more specific position that
    /// would otherwise resolve back to the querying prop.
    pub fn query_exact<P: PropFamily + 'static, R>(
        &mut self,
        position: &Position,
        read: impl FnOnce(&P) -> R,
    ) -> Option<R> {
        let key = match self.solver.registry.get(&(P::KIND, *position)) {
            Some(&key) => key,
            None => self.solver.register(self.module, P::build(*position)),
        };
        self.read_prop(key, read)
    }

    fn read_prop<P: PropFamily + 'static, R>(
        &mut self,
        key: PropKey,
        read: impl FnOnce(&P) -> R,
    ) -> Option<R> {
        if key == self.key {
            // Self-dependency: legal, resolved by revisiting the prop every
            // round rather than by recursing into it.
            self.solver.deps.add_edge(key, key, ());
            self.solver.self_queried.insert(key);
            return None;
        }
        let solver = &mut *self.solver;
        let entry = solver.props.get(key)?;
        if entry.valid {
            solver.deps.add_edge(key, self.key, ());
        }
        let prop = entry.prop.as_deref()?.downcast_ref::<P>()?;
        Some(read(prop))
    }

    /// Returns true if the context instruction is assumed unreachable.
    ///
    /// A dependency on the liveness prop is recorded only when the answer
    /// is "dead": that is the optimistic piece of information that may
    /// later be retracted.
    pub fn is_assumed_dead(&mut self, instr: InstrRef) -> bool {
        self.block_deadness(instr.function, instr.block).0
    }

    /// Returns true if `block` of `function` is assumed unreachable.
    pub fn is_block_assumed_dead(&mut self, function: Uuid, block: Label) -> bool {
        self.block_deadness(function, block).0
    }

    /// Returns true if `block` of `function` is proven unreachable.
    pub fn is_block_known_dead(&mut self, function: Uuid, block: Label) -> bool {
        self.block_deadness(function, block).1
    }

    /// (assumed dead, known dead) of a block, consulting (and creating on
    /// demand) the function's liveness prop.
    pub(crate) fn block_deadness(&mut self, function: Uuid, block: Label) -> (bool, bool) {
        let fpos = Position::function(function);
        let key = self.solver.lookup_or_create::<Liveness>(self.module, &fpos);
        if key == self.key {
            self.solver.deps.add_edge(key, key, ());
            self.solver.self_queried.insert(key);
            return (false, false);
        }
        let solver = &mut *self.solver;
        let Some(entry) = solver.props.get(key) else {
            return (false, false);
        };
        let Some(liveness) = entry.prop.as_deref().and_then(|p| p.downcast_ref::<Liveness>())
        else {
            return (false, false);
        };
        let assumed = liveness.is_assumed_dead_block(block);
        let known = liveness.is_known_dead_block(block);
        if assumed && entry.valid {
            solver.deps.add_edge(key, self.key, ());
        }
        (assumed, known)
    }

    /// Evaluate `pred` on every call site of `callee`.
    ///
    /// Conclusive only if every call site is statically enumerable: the
    /// callee must be defined in-module, must not be visible to other
    /// modules (when `require_all_call_sites` is set), and its address must
    /// not escape as a value. Returns false as soon as one call site fails
    /// `pred` or enumeration is incomplete. Call sites proven unreachable
    /// are skipped.
    pub fn check_for_all_call_sites(
        &mut self,
        callee: Uuid,
        require_all_call_sites: bool,
        mut pred: impl FnMut(&mut Self, InstrRef) -> bool,
    ) -> bool {
        let module = self.module;
        let Some(function) = module.function(callee) else {
            return false;
        };
        if require_all_call_sites && !function.linkage.is_local() {
            debug!(
                "call sites of externally visible function {} are not enumerable",
                callee
            );
            return false;
        }

        let target = FunctionPointer::Internal(callee);
        let escapes = |op: &Operand| matches!(op, Operand::Fun(fun) if *fun == target);

        let mut sites: Vec<InstrRef> = Vec::new();
        for (fid, f) in &module.functions {
            for (label, bb) in &f.body {
                for (index, instr) in bb.instructions.iter().enumerate() {
                    match instr {
                        Instr::Invoke(invoke) => {
                            if invoke.callee() == Some(target) {
                                sites.push(InstrRef {
                                    function: *fid,
                                    block: *label,
                                    index: index as u32,
                                });
                            }
                            // The address escaping as an argument defeats
                            // enumeration just like external visibility.
                            if invoke.args.iter().any(escapes) {
                                return false;
                            }
                        }
                        other => {
                            if other.operands().any(escapes) {
                                return false;
                            }
                        }
                    }
                }
                if bb.terminator.operands().any(escapes) {
                    return false;
                }
            }
        }

        for site in sites {
            if self.is_block_known_dead(site.function, site.block) {
                continue;
            }
            if !pred(self, site) {
                return false;
            }
        }
        true
    }

    /// Evaluate `pred` on every instruction of `function` whose opcode is
    /// in `opcodes`, skipping instructions in blocks proven unreachable.
    /// Returns false as soon as one instruction fails `pred`.
    pub fn check_for_all_instructions(
        &mut self,
        function: Uuid,
        opcodes: &[Opcode],
        mut pred: impl FnMut(&mut Self, InstrRef) -> bool,
    ) -> bool {
        for &opcode in opcodes {
            let refs: SmallVec<[InstrRef; 16]> = self
                .solver
                .cache
                .instructions_with_opcode(self.module, function, opcode)
                .iter()
                .copied()
                .collect();
            for r in refs {
                if self.is_block_known_dead(r.function, r.block) {
                    continue;
                }
                if !pred(self, r) {
                    return false;
                }
            }
        }
        true
    }

    /// Evaluate `pred` on every instruction of `function` that may read or
    /// write memory. Returns false as soon as one fails.
    pub fn check_for_all_read_write_instructions(
        &mut self,
        function: Uuid,
        mut pred: impl FnMut(&mut Self, InstrRef) -> bool,
    ) -> bool {
        let refs: SmallVec<[InstrRef; 16]> = self
            .solver
            .cache
            .read_or_write_instructions(self.module, function)
            .iter()
            .copied()
            .collect();
        for r in refs {
            if self.is_block_known_dead(r.function, r.block) {
                continue;
            }
            if !pred(self, r) {
                return false;
            }
        }
        true
    }

    /// Evaluate `pred` on every value potentially returned by `function`,
    /// paired with the block of the respective return. Blocks proven
    /// unreachable are skipped; returns false as soon as one value fails.
    pub fn check_for_all_returned_values(
        &mut self,
        function: Uuid,
        mut pred: impl FnMut(&mut Self, &Operand, Label) -> bool,
    ) -> bool {
        let Some(f) = self.module.function(function) else {
            return false;
        };
        let returns: Vec<(Operand, Label)> = f
            .body
            .iter()
            .filter_map(|(label, bb)| match &bb.terminator {
                Terminator::Ret(ret) => ret.value.clone().map(|value| (value, *label)),
                _ => None,
            })
            .collect();
        for (value, label) in returns {
            if self.is_block_known_dead(function, label) {
                continue;
            }
            if !pred(self, &value, label) {
                return false;
            }
        }
        true
    }
}

/// Analyze `functions` of `module`: build the information cache, seed the
/// default props, run the fixpoint, and manifest. Returns whether the
/// module was mutated.
pub fn deduce_module(
    module: &mut Module,
    functions: &[Uuid],
    config: SolverConfig,
) -> ChangeStatus {
    let mut solver = Solver::new(config);
    for function in functions {
        solver.seed_default_props(module, *function);
    }
    solver.run(module)
}
