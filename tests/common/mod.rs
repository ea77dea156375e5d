//! Shared term-building helpers for the integration suites.
#![allow(dead_code)]

use wam_vm::prelude::*;

/// Proper list of the given cells.
pub fn list(vm: &mut Interpreter, items: &[Cell]) -> Cell {
    let mut l = EMPTY_LIST;
    for &item in items.iter().rev() {
        l = vm.heap_mut().new_dotted_pair(item, l);
    }
    l
}

/// Proper list of integers.
pub fn int_list(vm: &mut Interpreter, items: &[i64]) -> Cell {
    let cells: Vec<Cell> = items.iter().map(|&n| Cell::int(n)).collect();
    list(vm, &cells)
}

/// `Head :- Body` clause term.
pub fn rule(vm: &mut Interpreter, head: Cell, body: Cell) -> Cell {
    let imp = vm.functor_cell(":-", 2);
    vm.new_str(imp, &[head, body])
}

/// `(A, B)` conjunction.
pub fn conj(vm: &mut Interpreter, a: Cell, b: Cell) -> Cell {
    vm.new_str(COMMA, &[a, b])
}

/// Load the two standard `append/3` clauses.
pub fn load_append(vm: &mut Interpreter) -> Cell {
    let append = vm.functor_cell("append", 3);

    // append([], Zs, Zs).
    let zs = vm.new_ref();
    let c1 = vm.new_str(append, &[EMPTY_LIST, zs, zs]);
    vm.load_clause(c1).expect("append/3 base clause");

    // append([X|Xs], Ys, [X|Zs]) :- append(Xs, Ys, Zs).
    let x = vm.new_ref();
    let xs = vm.new_ref();
    let ys = vm.new_ref();
    let zs = vm.new_ref();
    let cons1 = vm.heap_mut().new_dotted_pair(x, xs);
    let cons2 = vm.heap_mut().new_dotted_pair(x, zs);
    let head = vm.new_str(append, &[cons1, ys, cons2]);
    let goal = vm.new_str(append, &[xs, ys, zs]);
    let c2 = rule(vm, head, goal);
    vm.load_clause(c2).expect("append/3 recursive clause");

    append
}

/// Load `member/2`.
pub fn load_member(vm: &mut Interpreter) -> Cell {
    let member = vm.functor_cell("member", 2);

    // member(X, [X|_]).
    let x = vm.new_ref();
    let tail = vm.new_ref();
    let cons = vm.heap_mut().new_dotted_pair(x, tail);
    let c1 = vm.new_str(member, &[x, cons]);
    vm.load_clause(c1).expect("member/2 base clause");

    // member(X, [_|Xs]) :- member(X, Xs).
    let x = vm.new_ref();
    let skip = vm.new_ref();
    let xs = vm.new_ref();
    let cons = vm.heap_mut().new_dotted_pair(skip, xs);
    let head = vm.new_str(member, &[x, cons]);
    let goal = vm.new_str(member, &[x, xs]);
    let c2 = rule(vm, head, goal);
    vm.load_clause(c2).expect("member/2 recursive clause");

    member
}
