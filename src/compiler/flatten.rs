//! Term flattening into primitive unifications.
//!
//! A head or goal term is rewritten as a list of primitives `Ti = rhs`
//! where every nested structure is named by a fresh temporary. Repeated
//! subterms are shared through a map keyed on dereferenced term identity,
//! so a variable or structure cell occurring twice flattens to one
//! temporary. Query-side flattening reverses the order so inner
//! structures are built before the structures that mention them;
//! program-side keeps the natural order.

use std::collections::{HashMap, VecDeque};

use crate::term::{Cell, CellView, Heap};

/// Which side of a clause is being flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// Head matching; emits the get/unify families.
    Program,
    /// Goal construction; emits the put/set families.
    Query,
}

/// Register-allocatable entity named by a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum VarKey {
    /// A source variable, identified by its heap index.
    Term(usize),
    /// A synthetic temporary naming a nested structure.
    Temp(usize),
}

/// One argument slot of a flattened structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand {
    /// Inline atomic constant.
    Const(Cell),
    /// Variable or temporary.
    Var(VarKey),
}

/// Right-hand side of a primitive unification.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rhs {
    /// The target is a variable or constant.
    Simple(Operand),
    /// The target is a structure with flattened argument slots.
    Struct { functor: Cell, slots: Vec<Operand> },
}

/// Primitive unification `key = rhs`, optionally pinned to an argument
/// register by the head position it came from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Prim {
    pub(crate) apos: Option<usize>,
    pub(crate) key: VarKey,
    pub(crate) rhs: Rhs,
}

/// Flatten a head or goal term. Atoms flatten to nothing; the top-level
/// arguments of a compound term are pinned to their argument positions.
pub(crate) fn flatten(heap: &Heap, term: Cell, side: Side) -> Vec<Prim> {
    let mut prims = Vec::new();
    let mut map: HashMap<Cell, VarKey> = HashMap::new();
    let mut next_temp = 0usize;
    let mut work: VecDeque<(VarKey, Cell, Option<usize>)> = VecDeque::new();

    let fresh = |next_temp: &mut usize| {
        let t = VarKey::Temp(*next_temp);
        *next_temp += 1;
        t
    };

    let t = heap.deref(term);
    if let CellView::Str(_) = t.view() {
        let n = heap.functor_of(t).arity();
        for i in 0..n {
            let pos = if side == Side::Query { n - 1 - i } else { i };
            let arg = heap.deref(heap.arg(t, pos));
            match arg.view() {
                CellView::Con(_) | CellView::Int(_) => prims.push(Prim {
                    apos: Some(pos),
                    key: fresh(&mut next_temp),
                    rhs: Rhs::Simple(Operand::Const(arg)),
                }),
                CellView::Ref(v) => prims.push(Prim {
                    apos: Some(pos),
                    key: VarKey::Term(v),
                    rhs: Rhs::Simple(Operand::Var(VarKey::Term(v))),
                }),
                CellView::Str(_) => {
                    if let Some(&k) = map.get(&arg) {
                        prims.push(Prim {
                            apos: Some(pos),
                            key: k,
                            rhs: Rhs::Simple(Operand::Var(k)),
                        });
                    } else {
                        let k = fresh(&mut next_temp);
                        map.insert(arg, k);
                        work.push_back((k, arg, Some(pos)));
                    }
                }
            }
        }
    }

    while let Some((key, str_cell, apos)) = work.pop_front() {
        let functor = heap.functor_of(str_cell);
        let n = functor.arity();
        let mut slots = vec![Operand::Const(Cell::int(0)); n];
        for i in 0..n {
            let pos = if side == Side::Query { n - 1 - i } else { i };
            let arg = heap.deref(heap.arg(str_cell, pos));
            slots[pos] = match arg.view() {
                CellView::Con(_) | CellView::Int(_) => Operand::Const(arg),
                CellView::Ref(v) => Operand::Var(VarKey::Term(v)),
                CellView::Str(_) => {
                    if let Some(&k) = map.get(&arg) {
                        Operand::Var(k)
                    } else {
                        let k = fresh(&mut next_temp);
                        map.insert(arg, k);
                        work.push_back((k, arg, None));
                        Operand::Var(k)
                    }
                }
            };
        }
        prims.push(Prim {
            apos,
            key,
            rhs: Rhs::Struct { functor, slots },
        });
    }

    if side == Side::Query {
        prims.reverse();
    }
    prims
}
