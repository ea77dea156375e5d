//! Instruction emission for one clause.
//!
//! Head arguments compile through the get/unify families, goal arguments
//! through the put/set families; VARIABLE vs VALUE flavor is decided by
//! the first occurrence of each register. Variables spanning more than
//! one body chunk (the head and first goal form one chunk) are permanent
//! and live in the environment; everything else stays in temporaries.

use std::collections::{HashMap, HashSet};

use super::flatten::{flatten, Operand, Prim, Rhs, Side, VarKey};
use super::{goal_functor, remap_x_registers, term_vars};
use crate::isa::{Instr, Reg, RegId};
use crate::term::{Cell, Heap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    X(RegId),
    Y(RegId),
}

struct Emitter<'h> {
    #[allow(dead_code)]
    heap: &'h Heap,
    perm: HashMap<usize, RegId>,
    xmap: HashMap<VarKey, RegId>,
    next_x: RegId,
    initialized: HashSet<Slot>,
    instrs: Vec<Instr>,
}

impl<'h> Emitter<'h> {
    fn new(heap: &'h Heap, perm: HashMap<usize, RegId>) -> Self {
        Emitter {
            heap,
            perm,
            xmap: HashMap::new(),
            next_x: 0,
            initialized: HashSet::new(),
            instrs: Vec::new(),
        }
    }

    /// Register for `key`, plus whether this is its defining occurrence.
    fn reg_for(&mut self, key: VarKey) -> (Slot, bool) {
        let slot = match key {
            VarKey::Term(v) if self.perm.contains_key(&v) => Slot::Y(self.perm[&v]),
            _ => {
                let next = &mut self.next_x;
                let x = *self.xmap.entry(key).or_insert_with(|| {
                    let x = *next;
                    *next += 1;
                    x
                });
                Slot::X(x)
            }
        };
        let first = self.initialized.insert(slot);
        (slot, first)
    }

    fn x_for(&mut self, key: VarKey) -> (RegId, bool) {
        match self.reg_for(key) {
            (Slot::X(x), first) => (x, first),
            (Slot::Y(_), _) => unreachable!("structure temporaries are never permanent"),
        }
    }

    /// Temporaries of argument-position structures that other operands
    /// reference; they must be materialized into an X register.
    fn shared_argument_temps(prims: &[Prim]) -> HashSet<VarKey> {
        let mut referenced = HashSet::new();
        for prim in prims {
            match &prim.rhs {
                Rhs::Simple(Operand::Var(k @ VarKey::Temp(_))) => {
                    referenced.insert(*k);
                }
                Rhs::Struct { slots, .. } => {
                    for op in slots {
                        if let Operand::Var(k @ VarKey::Temp(_)) = op {
                            referenced.insert(*k);
                        }
                    }
                }
                _ => {}
            }
        }
        prims
            .iter()
            .filter(|p| p.apos.is_some() && matches!(p.rhs, Rhs::Struct { .. }))
            .map(|p| p.key)
            .filter(|k| referenced.contains(k))
            .collect()
    }

    fn emit_program(&mut self, prims: &[Prim]) {
        let shared = Self::shared_argument_temps(prims);
        for prim in prims {
            match (&prim.rhs, prim.apos) {
                (Rhs::Simple(Operand::Const(c)), Some(a)) => {
                    self.instrs.push(Instr::GetConstant { constant: *c, a });
                }
                (Rhs::Simple(Operand::Var(k)), Some(a)) => {
                    let instr = match self.reg_for(*k) {
                        (Slot::X(x), true) => Instr::GetVariableX { x, a },
                        (Slot::X(x), false) => Instr::GetValueX { x, a },
                        (Slot::Y(y), true) => Instr::GetVariableY { y, a },
                        (Slot::Y(y), false) => Instr::GetValueY { y, a },
                    };
                    self.instrs.push(instr);
                }
                (Rhs::Simple(_), None) => unreachable!("nested simples are inlined"),
                (Rhs::Struct { functor, slots }, apos) => {
                    let reg = match apos {
                        Some(a) => {
                            if shared.contains(&prim.key) {
                                let (x, first) = self.x_for(prim.key);
                                self.instrs.push(if first {
                                    Instr::GetVariableX { x, a }
                                } else {
                                    Instr::GetValueX { x, a }
                                });
                            }
                            Reg::A(a)
                        }
                        None => Reg::X(self.x_for(prim.key).0),
                    };
                    self.instrs.push(Instr::GetStructure {
                        functor: *functor,
                        reg,
                    });
                    self.emit_read_slots(slots);
                }
            }
        }
    }

    fn emit_read_slots(&mut self, slots: &[Operand]) {
        for op in slots {
            let instr = match op {
                Operand::Const(c) => Instr::UnifyConstant { constant: *c },
                Operand::Var(k) => match self.reg_for(*k) {
                    (Slot::X(x), true) => Instr::UnifyVariableX { x },
                    (Slot::X(x), false) => Instr::UnifyValueX { x },
                    (Slot::Y(y), true) => Instr::UnifyVariableY { y },
                    (Slot::Y(y), false) => Instr::UnifyValueY { y },
                },
            };
            self.instrs.push(instr);
        }
    }

    fn emit_query(&mut self, prims: &[Prim]) {
        let shared = Self::shared_argument_temps(prims);
        for prim in prims {
            match (&prim.rhs, prim.apos) {
                (Rhs::Simple(Operand::Const(c)), Some(a)) => {
                    self.instrs.push(Instr::PutConstant { constant: *c, a });
                }
                (Rhs::Simple(Operand::Var(k)), Some(a)) => {
                    let instr = match self.reg_for(*k) {
                        (Slot::X(x), true) => Instr::PutVariableX { x, a },
                        (Slot::X(x), false) => Instr::PutValueX { x, a },
                        (Slot::Y(y), true) => Instr::PutVariableY { y, a },
                        (Slot::Y(y), false) => Instr::PutValueY { y, a },
                    };
                    self.instrs.push(instr);
                }
                (Rhs::Simple(_), None) => unreachable!("nested simples are inlined"),
                (Rhs::Struct { functor, slots }, apos) => {
                    let (reg, move_to) = match apos {
                        Some(a) if shared.contains(&prim.key) => {
                            (Reg::X(self.x_for(prim.key).0), Some(a))
                        }
                        Some(a) => (Reg::A(a), None),
                        None => (Reg::X(self.x_for(prim.key).0), None),
                    };
                    self.instrs.push(Instr::PutStructure {
                        functor: *functor,
                        reg,
                    });
                    self.emit_write_slots(slots);
                    if let (Some(a), Reg::X(x)) = (move_to, reg) {
                        self.instrs.push(Instr::PutValueX { x, a });
                    }
                }
            }
        }
    }

    fn emit_write_slots(&mut self, slots: &[Operand]) {
        for op in slots {
            let instr = match op {
                Operand::Const(c) => Instr::SetConstant { constant: *c },
                Operand::Var(k) => match self.reg_for(*k) {
                    (Slot::X(x), true) => Instr::SetVariableX { x },
                    (Slot::X(x), false) => Instr::SetValueX { x },
                    (Slot::Y(y), true) => Instr::SetVariableY { y },
                    (Slot::Y(y), false) => Instr::SetValueY { y },
                },
            };
            self.instrs.push(instr);
        }
    }
}

/// Permanent-variable analysis: a variable occurring in more than one
/// chunk (head plus first goal, then one chunk per following goal) gets
/// a Y slot, numbered by first occurrence.
fn permanent_vars(heap: &Heap, head: Cell, goals: &[Cell]) -> (HashMap<usize, RegId>, Vec<Vec<usize>>) {
    let mut chunks: Vec<Vec<usize>> = Vec::new();
    let mut chunk0 = term_vars(heap, head);
    if let Some(&first) = goals.first() {
        for v in term_vars(heap, first) {
            if !chunk0.contains(&v) {
                chunk0.push(v);
            }
        }
    }
    chunks.push(chunk0);
    for &goal in goals.iter().skip(1) {
        chunks.push(term_vars(heap, goal));
    }

    let mut counts: HashMap<usize, usize> = HashMap::new();
    for chunk in &chunks {
        for &v in chunk {
            *counts.entry(v).or_insert(0) += 1;
        }
    }

    let mut perm = HashMap::new();
    let scan = term_vars(heap, head)
        .into_iter()
        .chain(goals.iter().flat_map(|&g| term_vars(heap, g)));
    for v in scan {
        if counts[&v] > 1 && !perm.contains_key(&v) {
            let y = perm.len();
            perm.insert(v, y);
        }
    }
    (perm, chunks)
}

/// Compile one clause to an instruction sequence, without the
/// inter-clause chaining.
pub(crate) fn compile_clause(heap: &Heap, head: Cell, goals: &[Cell]) -> Vec<Instr> {
    let (perm, chunks) = permanent_vars(heap, head, goals);

    // Last goal whose chunk mentions each permanent variable, for the
    // live count carried by `call`.
    let mut last_goal: HashMap<usize, usize> = HashMap::new();
    for (i, chunk) in chunks.iter().enumerate() {
        for &v in chunk {
            if perm.contains_key(&v) {
                last_goal.insert(v, i);
            }
        }
    }

    let needs_env = goals.len() > 1;
    let mut em = Emitter::new(heap, perm.clone());
    if needs_env {
        em.instrs.push(Instr::Allocate { n: perm.len() });
    }

    let head_prims = flatten(heap, head, Side::Program);
    em.emit_program(&head_prims);

    for (g, &goal) in goals.iter().enumerate() {
        let prims = flatten(heap, goal, Side::Query);
        em.emit_query(&prims);
        let functor = goal_functor(heap, goal).expect("goal callability checked at load");
        if g + 1 < goals.len() {
            let nvars = last_goal.values().filter(|&&last| last > g).count();
            em.instrs.push(Instr::Call { functor, nvars });
        } else {
            if needs_env {
                em.instrs.push(Instr::Deallocate);
            }
            em.instrs.push(Instr::Execute { functor });
        }
    }
    if goals.is_empty() {
        em.instrs.push(Instr::Proceed);
    }

    let mut instrs = em.instrs;
    remap_x_registers(&mut instrs);
    instrs
}

/// Compile a query as an anonymous predicate whose permanent variables
/// are the query's free variables.
///
/// The caller pre-builds the environment with the variables' REF cells,
/// so every variable compiles in VALUE flavor and the bindings can be
/// read back after the halt. All goals use `call`; the final `halt`
/// keeps the environment alive.
pub(crate) fn compile_query_goals(heap: &Heap, goals: &[Cell], vars: &[usize]) -> Vec<Instr> {
    let perm: HashMap<usize, RegId> = vars.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let mut em = Emitter::new(heap, perm);
    for i in 0..vars.len() {
        em.initialized.insert(Slot::Y(i));
    }
    for &goal in goals {
        let prims = flatten(heap, goal, Side::Query);
        em.emit_query(&prims);
        let functor = goal_functor(heap, goal).expect("goal callability checked before compile");
        em.instrs.push(Instr::Call {
            functor,
            nvars: vars.len(),
        });
    }
    em.instrs.push(Instr::Halt);
    let mut instrs = em.instrs;
    remap_x_registers(&mut instrs);
    instrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{clause_body, clause_head, conjunction_goals};
    use crate::term::{DOTTED_PAIR, EMPTY_LIST};

    fn clause_parts(heap: &Heap, clause: Cell) -> (Cell, Vec<Cell>) {
        let head = clause_head(heap, clause);
        let goals = conjunction_goals(heap, clause_body(heap, clause));
        (head, goals)
    }

    #[test]
    fn chain_rule_compiles_to_value_put_and_execute() {
        // p(X) :- q(X).
        let mut heap = Heap::new();
        let x = heap.new_ref();
        let p = heap.functor_cell("p", 1);
        let q = heap.functor_cell("q", 1);
        let head = heap.new_str(p, &[x]);
        let goal = heap.new_str(q, &[x]);
        let imp = heap.functor_cell(":-", 2);
        let clause = heap.new_str(imp, &[head, goal]);

        let (head, goals) = clause_parts(&heap, clause);
        let instrs = compile_clause(&heap, head, &goals);
        assert_eq!(
            instrs,
            vec![
                Instr::GetVariableX { x: 0, a: 0 },
                Instr::PutValueX { x: 0, a: 0 },
                Instr::Execute { functor: q },
            ]
        );
    }

    #[test]
    fn facts_compile_to_gets_and_proceed() {
        // p(a, Y).
        let mut heap = Heap::new();
        let a = heap.atom("a");
        let y = heap.new_ref();
        let p = heap.functor_cell("p", 2);
        let fact = heap.new_str(p, &[a, y]);

        let (head, goals) = clause_parts(&heap, fact);
        let instrs = compile_clause(&heap, head, &goals);
        assert_eq!(
            instrs,
            vec![
                Instr::GetConstant { constant: a, a: 0 },
                Instr::GetVariableX { x: 0, a: 1 },
                Instr::Proceed,
            ]
        );
    }

    #[test]
    fn multi_goal_clauses_allocate_permanent_variables() {
        // nrev([X|Xs], Ys) :- nrev(Xs, Rs), append(Rs, [X], Ys).
        let mut heap = Heap::new();
        let x = heap.new_ref();
        let xs = heap.new_ref();
        let ys = heap.new_ref();
        let rs = heap.new_ref();
        let nrev = heap.functor_cell("nrev", 2);
        let append = heap.functor_cell("append", 3);

        let cons = heap.new_str(DOTTED_PAIR, &[x, xs]);
        let head = heap.new_str(nrev, &[cons, ys]);
        let goal0 = heap.new_str(nrev, &[xs, rs]);
        let xlist = heap.new_str(DOTTED_PAIR, &[x, EMPTY_LIST]);
        let goal1 = heap.new_str(append, &[rs, xlist, ys]);

        let instrs = compile_clause(&heap, head, &[goal0, goal1]);

        // X, Ys and Rs span two chunks and are permanent; Xs is not.
        assert_eq!(instrs[0], Instr::Allocate { n: 3 });
        assert!(instrs.contains(&Instr::Call {
            functor: nrev,
            nvars: 3
        }));
        let tail = &instrs[instrs.len() - 2..];
        assert_eq!(tail, &[Instr::Deallocate, Instr::Execute { functor: append }]);
        // Head list cell decodes X into its environment slot.
        assert!(instrs.contains(&Instr::GetStructure {
            functor: DOTTED_PAIR,
            reg: Reg::A(0)
        }));
        assert!(instrs.iter().any(|i| matches!(i, Instr::UnifyVariableY { .. })));
    }

    #[test]
    fn shared_argument_structures_materialize_once() {
        // p(f(X), f(X)) with a shared subterm cell.
        let mut heap = Heap::new();
        let x = heap.new_ref();
        let f = heap.functor_cell("f", 1);
        let fx = heap.new_str(f, &[x]);
        let p = heap.functor_cell("p", 2);
        let head = heap.new_str(p, &[fx, fx]);

        let instrs = compile_clause(&heap, head, &[]);
        assert_eq!(
            instrs,
            vec![
                Instr::GetVariableX { x: 0, a: 1 },
                Instr::GetValueX { x: 0, a: 0 },
                Instr::GetStructure {
                    functor: f,
                    reg: Reg::A(0)
                },
                Instr::UnifyVariableX { x: 1 },
                Instr::Proceed,
            ]
        );
    }

    #[test]
    fn query_goals_use_value_flavor_for_query_variables() {
        // ?- q(X, f(X)). with X pre-seeded in the environment.
        let mut heap = Heap::new();
        let x = heap.new_ref();
        let f = heap.functor_cell("f", 1);
        let fx = heap.new_str(f, &[x]);
        let q = heap.functor_cell("q", 2);
        let goal = heap.new_str(q, &[x, fx]);

        let instrs = compile_query_goals(&heap, &[goal], &[0]);
        assert_eq!(
            instrs,
            vec![
                Instr::PutStructure {
                    functor: f,
                    reg: Reg::A(1)
                },
                Instr::SetValueY { y: 0 },
                Instr::PutValueY { y: 0, a: 0 },
                Instr::Call { functor: q, nvars: 1 },
                Instr::Halt,
            ]
        );
    }

    #[test]
    fn x_registers_are_densified_in_first_seen_order() {
        // p(f(g(h(Z)))): temporaries appear nested; after the remap the
        // first-seen temporary is X0.
        let mut heap = Heap::new();
        let z = heap.new_ref();
        let h = heap.functor_cell("h", 1);
        let g = heap.functor_cell("g", 1);
        let f = heap.functor_cell("f", 1);
        let hz = heap.new_str(h, &[z]);
        let gh = heap.new_str(g, &[hz]);
        let p = heap.functor_cell("p", 1);
        let head = {
            let fg = heap.new_str(f, &[gh]);
            heap.new_str(p, &[fg])
        };

        let instrs = compile_clause(&heap, head, &[]);
        let first_x: Vec<_> = instrs.iter().filter_map(|i| i.x_reg()).collect();
        let mut seen = std::collections::HashSet::new();
        let mut expected = 0;
        for x in first_x {
            if seen.insert(x) {
                assert_eq!(x, expected, "X registers must be dense in first-seen order");
                expected += 1;
            }
        }
    }
}
