//! Clause-to-instruction compiler.
//!
//! Clauses are flattened to primitive unifications, emitted as get/put
//! and unify/set instructions with a densified temporary-register
//! numbering, and chained per predicate under first-argument indexing
//! dispatch.

use crate::isa::Instr;
use crate::term::{Cell, CellView, Heap, COMMA, IMPLIED_BY, TRUE};

mod emit;
mod flatten;
mod index;

pub(crate) use emit::{compile_clause, compile_query_goals};
pub(crate) use index::compile_predicate;

/// Clause head, treating a fact as its own head.
pub(crate) fn clause_head(heap: &Heap, clause: Cell) -> Cell {
    let c = heap.deref(clause);
    if heap.check_functor(c) && heap.functor_of(c) == IMPLIED_BY {
        heap.deref(heap.arg(c, 0))
    } else {
        c
    }
}

/// Clause body, `true` for a fact.
pub(crate) fn clause_body(heap: &Heap, clause: Cell) -> Cell {
    let c = heap.deref(clause);
    if heap.check_functor(c) && heap.functor_of(c) == IMPLIED_BY {
        heap.deref(heap.arg(c, 1))
    } else {
        TRUE
    }
}

/// Goals of a (possibly nested) `,/2` conjunction, left to right, with
/// `true` goals dropped.
pub(crate) fn conjunction_goals(heap: &Heap, body: Cell) -> Vec<Cell> {
    let mut goals = Vec::new();
    let mut stack = vec![body];
    while let Some(t) = stack.pop() {
        let t = heap.deref(t);
        if heap.check_functor(t) && heap.functor_of(t) == COMMA {
            stack.push(heap.arg(t, 1));
            stack.push(heap.arg(t, 0));
        } else if t != TRUE {
            goals.push(t);
        }
    }
    goals
}

/// Free variables of `term`: unbound REF heap indices in
/// first-occurrence order, left to right.
pub(crate) fn term_vars(heap: &Heap, term: Cell) -> Vec<usize> {
    let mut vars = Vec::new();
    let mut stack = vec![term];
    while let Some(t) = stack.pop() {
        let t = heap.deref(t);
        match t.view() {
            CellView::Ref(index) => {
                if !vars.contains(&index) {
                    vars.push(index);
                }
            }
            CellView::Str(_) if heap.check_functor(t) => {
                let arity = heap.functor_of(t).arity();
                for i in (0..arity).rev() {
                    stack.push(heap.arg(t, i));
                }
            }
            _ => {}
        }
    }
    vars
}

/// Functor CON cell of a goal term, `None` when the goal is not
/// callable.
pub(crate) fn goal_functor(heap: &Heap, goal: Cell) -> Option<Cell> {
    let g = heap.deref(goal);
    match g.view() {
        CellView::Con(c) => Some(c),
        CellView::Str(_) if heap.check_functor(g) => Some(heap.functor_of(g)),
        _ => None,
    }
}

/// Densify the X registers of a freshly emitted clause: scan the
/// instructions in order and renumber each distinct temporary with
/// ascending indices as first seen.
pub(crate) fn remap_x_registers(instrs: &mut [Instr]) {
    let mut map = std::collections::HashMap::new();
    let mut next = 0usize;
    for instr in instrs.iter() {
        if let Some(x) = instr.x_reg() {
            map.entry(x).or_insert_with(|| {
                let n = next;
                next += 1;
                n
            });
        }
    }
    for instr in instrs.iter_mut() {
        if let Some(x) = instr.x_reg() {
            instr.set_x_reg(map[&x]);
        }
    }
}
