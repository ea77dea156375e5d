//! Dereference-and-bind unification with the trail discipline.

use super::Interpreter;
use crate::term::{Cell, CellView};

impl Interpreter {
    /// Unify two terms, binding variables as needed. Returns `false` and
    /// leaves partial bindings in place on mismatch; the caller
    /// backtracks, which is what undoes them.
    ///
    /// No occurs check. When both sides are unbound the higher heap
    /// index is bound into the lower, so backtracking's heap trim
    /// reclaims the younger cell.
    pub fn unify(&mut self, a: Cell, b: Cell) -> bool {
        let mut work = vec![(a, b)];
        while let Some((a, b)) = work.pop() {
            let a = self.heap.deref(a);
            let b = self.heap.deref(b);
            if a == b {
                continue;
            }
            match (a.view(), b.view()) {
                (CellView::Ref(i), CellView::Ref(j)) => {
                    if i < j {
                        self.bind(j, a);
                    } else {
                        self.bind(i, b);
                    }
                }
                (CellView::Ref(i), _) => self.bind(i, b),
                (_, CellView::Ref(j)) => self.bind(j, a),
                (CellView::Con(_), CellView::Con(_)) | (CellView::Int(_), CellView::Int(_)) => {
                    // Value inequality; equal constants were caught above.
                    return false;
                }
                (CellView::Str(i), CellView::Str(j)) => {
                    let f = self.heap.get(i);
                    let g = self.heap.get(j);
                    if f != g {
                        return false;
                    }
                    for k in 0..f.arity() {
                        work.push((self.heap.get(i + 1 + k), self.heap.get(j + 1 + k)));
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Current trail height.
    pub(crate) fn trail_mark(&self) -> usize {
        self.trail.len()
    }

    /// Pop trail entries down to `mark`, restoring each recorded index
    /// to a self-REF.
    pub(crate) fn trail_unwind(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let index = self.trail.pop().expect("trail underflow");
            self.heap.set(index, Cell::ref_to(index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ChoicePoint;
    use crate::isa::CodePtr;

    fn vm() -> Interpreter {
        Interpreter::new()
    }

    // A barrier choice point so bindings below the current heap top are
    // trailed, as they are during query execution.
    fn push_barrier(vm: &mut Interpreter) {
        let cp = ChoicePoint {
            args: Vec::new(),
            e: None,
            cp: CodePtr::HALT,
            env_top: 0,
            tr: vm.trail.len(),
            h: vm.heap.size(),
            bp: CodePtr::FAIL,
        };
        vm.choices.push(cp);
    }

    #[test]
    fn unify_binds_variable_to_constant() {
        let mut vm = vm();
        let v = vm.new_ref();
        let c = vm.atom("hello");
        assert!(vm.unify(v, c));
        assert_eq!(vm.deref(v), c);
    }

    #[test]
    fn unify_prefers_binding_younger_to_older() {
        let mut vm = vm();
        let old = vm.new_ref();
        let young = vm.new_ref();
        assert!(vm.unify(young, old));
        // The younger cell now points at the older one.
        assert_eq!(vm.heap().get(1), old);
        assert_eq!(vm.heap().get(0), old);
    }

    #[test]
    fn unify_matches_structures_recursively() {
        let mut vm = vm();
        let f = vm.functor_cell("f", 2);
        let v = vm.new_ref();
        let lhs = {
            let a = vm.atom("a");
            vm.new_str(f, &[a, v])
        };
        let rhs = {
            let a = vm.atom("a");
            let b = vm.atom("b");
            vm.new_str(f, &[a, b])
        };
        assert!(vm.unify(lhs, rhs));
        let b = vm.atom("b");
        assert_eq!(vm.deref(v), b);
    }

    #[test]
    fn unify_rejects_functor_mismatch() {
        let mut vm = vm();
        let f = vm.functor_cell("f", 1);
        let g = vm.functor_cell("g", 1);
        let a = vm.atom("a");
        let lhs = vm.new_str(f, &[a]);
        let rhs = vm.new_str(g, &[a]);
        assert!(!vm.unify(lhs, rhs));
    }

    #[test]
    fn both_sides_deref_to_the_same_term_after_success() {
        let mut vm = vm();
        let x = vm.new_ref();
        let y = vm.new_ref();
        let forty_two = vm.new_int(42);
        assert!(vm.unify(x, y));
        assert!(vm.unify(y, forty_two));
        assert_eq!(vm.deref(x), vm.deref(y));
    }

    #[test]
    fn trail_unwind_restores_self_refs_below_the_mark() {
        let mut vm = vm();
        let v = vm.new_ref();
        push_barrier(&mut vm);
        let mark = vm.trail_mark();
        let c = vm.atom("bound");
        assert!(vm.unify(v, c));
        assert_eq!(vm.trail.len(), mark + 1);
        vm.trail_unwind(mark);
        assert_eq!(vm.deref(v), v);
        assert_eq!(vm.heap().get(0), Cell::ref_to(0));
    }

    #[test]
    fn bindings_above_the_heap_mark_are_not_trailed() {
        let mut vm = vm();
        push_barrier(&mut vm);
        // Allocated after the barrier: undone by the heap trim instead.
        let v = vm.new_ref();
        let c = vm.atom("c");
        assert!(vm.unify(v, c));
        assert!(vm.trail.is_empty());
    }

    fn int_list(vm: &mut Interpreter, items: &[i8]) -> Cell {
        let mut l = crate::term::EMPTY_LIST;
        for &n in items.iter().rev() {
            let cell = Cell::int(n as i64);
            l = vm.heap_mut().new_dotted_pair(cell, l);
        }
        l
    }

    #[quickcheck_macros::quickcheck]
    fn ground_unification_is_symmetric(xs: Vec<i8>, ys: Vec<i8>) -> bool {
        let mut vm = vm();
        let a = int_list(&mut vm, &xs);
        let b = int_list(&mut vm, &ys);
        let forward = vm.unify(a, b);

        let mut vm = self::vm();
        let a = int_list(&mut vm, &xs);
        let b = int_list(&mut vm, &ys);
        let backward = vm.unify(b, a);

        forward == backward && forward == (xs == ys)
    }
}
