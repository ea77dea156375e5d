//! Fetch/decode/execute loop and the top-level query entry point.

use tracing::{debug, trace};

use super::{ChoicePoint, Frame, Interpreter, QueryContext, UnifyMode};
use crate::compiler;
use crate::error::{CompileError, InterpreterError, RuntimeError};
use crate::isa::{CodePtr, Instr};
use crate::state::ExecuteState;
use crate::term::{Cell, CellView, DOTTED_PAIR};

impl Interpreter {
    /// Entry point of `functor`'s code, generating it first if the
    /// clause set changed since the last call.
    pub(crate) fn ensure_compiled(&mut self, functor: Cell) -> CodePtr {
        let pred = self
            .predicates
            .get(&functor)
            .expect("caller checked the predicate table");
        if let Some(entry) = pred.entry {
            return entry;
        }
        let clauses = pred.clauses.clone();
        let base = self.code.len();
        debug!(
            predicate = %self.heap.atom_name(functor),
            arity = functor.arity(),
            base,
            "generating code"
        );
        let instrs = compiler::compile_predicate(&self.heap, &clauses, base);
        self.code.extend(instrs);
        let entry = CodePtr(base);
        self.predicates
            .get_mut(&functor)
            .expect("still present")
            .entry = Some(entry);
        entry
    }

    /// Run `query` to its first solution.
    ///
    /// The query compiles as an anonymous predicate whose permanent
    /// variables are its free variables; on success the bindings are
    /// readable through [`Interpreter::query_bindings`] and
    /// [`Interpreter::get_result`]. On failure, and likewise after the
    /// last solution is retried away, the heap and trail are back at
    /// their pre-query marks.
    pub fn execute(&mut self, query: Cell) -> Result<bool, InterpreterError> {
        let query = self.strip_query_wrapper(query);
        let goals = self.flatten_conjunction(query);
        for &goal in &goals {
            if self.goal_functor(goal).is_none() {
                return Err(CompileError::NonCallableGoal(self.term_string(goal)).into());
            }
        }
        let vars = self.term_vars(query);
        let base = self.code.len();
        let instrs = compiler::compile_query_goals(&self.heap, &goals, &vars);
        self.code.extend(instrs);

        // Reset the transient machine state and seed the query
        // environment with the variables' own cells, so unification
        // binds the caller's term.
        self.trail.clear();
        self.frames.clear();
        self.choices.clear();
        self.e = None;
        self.mode = UnifyMode::Read;
        self.s = 0;
        self.num_of_args = 0;
        self.frames.push(Frame {
            prev: None,
            cp: CodePtr::HALT,
            ys: vars.iter().map(|&v| Cell::ref_to(v)).collect(),
        });
        self.e = Some(0);
        self.choices.push(ChoicePoint {
            args: Vec::new(),
            e: Some(0),
            cp: CodePtr::HALT,
            env_top: 1,
            tr: 0,
            h: self.heap.size(),
            bp: CodePtr::FAIL,
        });
        self.pc = CodePtr(base);
        self.cp = CodePtr::HALT;
        self.query = Some(QueryContext { term: query, vars });

        self.run()
    }

    /// Backtrack into the remaining alternatives of the current query.
    ///
    /// Returns the next solution, or `false` once the alternatives are
    /// exhausted, at which point the pre-query heap and trail marks are
    /// restored.
    pub fn retry(&mut self) -> Result<bool, InterpreterError> {
        if self.query.is_none() {
            return Ok(false);
        }
        if !self.backtrack() {
            return Ok(false);
        }
        self.run()
    }

    fn strip_query_wrapper(&self, query: Cell) -> Cell {
        let q = self.heap.deref(query);
        if self.heap.check_functor(q) {
            let functor = self.heap.functor_of(q);
            if functor.arity() == 1 && self.heap.is_name(functor, "?-") {
                return self.heap.deref(self.heap.arg(q, 0));
            }
        }
        q
    }

    fn run(&mut self) -> Result<bool, InterpreterError> {
        loop {
            if self.is_aborted() {
                self.clear_abort();
                self.unwind_all();
                return Ok(false);
            }
            let instr = self.code[self.pc.0].clone();
            trace!(pc = self.pc.0, op = %instr.opcode(), "step");
            self.pc = CodePtr(self.pc.0 + instr.size());
            match self.step(instr) {
                Ok(ExecuteState::Proceed) => {}
                Ok(ExecuteState::Halt) => return Ok(true),
                Ok(ExecuteState::Fail) => {
                    if !self.backtrack() {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    self.unwind_all();
                    return Err(e.into());
                }
            }
        }
    }

    fn step(&mut self, instr: Instr) -> Result<ExecuteState, RuntimeError> {
        match instr {
            Instr::GetVariableX { x, a } => {
                let v = self.a_reg(a);
                self.set_x_reg(x, v);
            }
            Instr::GetVariableY { y, a } => {
                let v = self.a_reg(a);
                self.set_y_reg(y, v);
            }
            Instr::GetValueX { x, a } => {
                if !self.unify(self.x_reg(x), self.a_reg(a)) {
                    return Ok(ExecuteState::Fail);
                }
            }
            Instr::GetValueY { y, a } => {
                if !self.unify(self.y_reg(y), self.a_reg(a)) {
                    return Ok(ExecuteState::Fail);
                }
            }
            Instr::GetStructure { functor, reg } => {
                let c = self.heap.deref(self.reg(reg));
                match c.view() {
                    CellView::Ref(i) => {
                        let j = self.heap.push(functor);
                        self.bind(i, Cell::str_at(j));
                        self.set_write_mode();
                    }
                    CellView::Str(j) => {
                        if self.heap.get(j) != functor {
                            return Ok(ExecuteState::Fail);
                        }
                        self.set_read_mode(j + 1);
                    }
                    _ => return Ok(ExecuteState::Fail),
                }
            }
            Instr::GetConstant { constant, a } => {
                let c = self.heap.deref(self.a_reg(a));
                match c.view() {
                    CellView::Ref(i) => self.bind(i, constant),
                    _ if c == constant => {}
                    _ => return Ok(ExecuteState::Fail),
                }
            }
            Instr::PutVariableX { x, a } => {
                let r = self.heap.new_ref();
                self.set_x_reg(x, r);
                self.set_a_reg(a, r);
            }
            Instr::PutVariableY { y, a } => {
                let r = self.heap.new_ref();
                self.set_y_reg(y, r);
                self.set_a_reg(a, r);
            }
            Instr::PutValueX { x, a } => {
                let v = self.x_reg(x);
                self.set_a_reg(a, v);
            }
            Instr::PutValueY { y, a } => {
                let v = self.y_reg(y);
                self.set_a_reg(a, v);
            }
            Instr::PutStructure { functor, reg } => {
                let j = self.heap.push(functor);
                self.set_reg(reg, Cell::str_at(j));
                self.set_write_mode();
            }
            Instr::PutConstant { constant, a } => self.set_a_reg(a, constant),
            Instr::UnifyVariableX { x } => {
                let c = self.read_or_fresh();
                self.set_x_reg(x, c);
            }
            Instr::UnifyVariableY { y } => {
                let c = self.read_or_fresh();
                self.set_y_reg(y, c);
            }
            Instr::UnifyValueX { x } => {
                if !self.unify_next(self.x_reg(x)) {
                    return Ok(ExecuteState::Fail);
                }
            }
            Instr::UnifyValueY { y } => {
                if !self.unify_next(self.y_reg(y)) {
                    return Ok(ExecuteState::Fail);
                }
            }
            Instr::UnifyConstant { constant } => match self.mode {
                UnifyMode::Read => {
                    let c = self.next_structure_arg();
                    let c = self.heap.deref(c);
                    match c.view() {
                        CellView::Ref(i) => self.bind(i, constant),
                        _ if c == constant => {}
                        _ => return Ok(ExecuteState::Fail),
                    }
                }
                UnifyMode::Write => {
                    self.heap.push(constant);
                }
            },
            Instr::UnifyVoid { n } => match self.mode {
                UnifyMode::Read => self.s += n,
                UnifyMode::Write => {
                    for _ in 0..n {
                        self.heap.new_ref();
                    }
                }
            },
            Instr::SetVariableX { x } => {
                let r = self.heap.new_ref();
                self.set_x_reg(x, r);
            }
            Instr::SetVariableY { y } => {
                let r = self.heap.new_ref();
                self.set_y_reg(y, r);
            }
            Instr::SetValueX { x } => {
                let v = self.x_reg(x);
                self.heap.push(v);
            }
            Instr::SetValueY { y } => {
                let v = self.y_reg(y);
                self.heap.push(v);
            }
            Instr::SetLocalValueX { x } => {
                let v = self.x_reg(x);
                self.set_local_value(v);
            }
            Instr::SetLocalValueY { y } => {
                let v = self.y_reg(y);
                self.set_local_value(v);
            }
            Instr::SetConstant { constant } => {
                self.heap.push(constant);
            }
            Instr::Allocate { n } => self.allocate(n),
            Instr::Deallocate => self.deallocate(),
            Instr::Call { functor, nvars } => {
                trace!(goal = %self.heap.atom_name(functor), nvars, "call");
                self.cp = self.pc;
                return self.dispatch_goal(functor, false);
            }
            Instr::Execute { functor } => {
                trace!(goal = %self.heap.atom_name(functor), "execute");
                return self.dispatch_goal(functor, true);
            }
            Instr::Proceed => self.pc = self.cp,
            Instr::TryMeElse { alt } => self.try_me_else(alt),
            Instr::RetryMeElse { alt } => self.retry_me_else(alt),
            Instr::TrustMe => self.trust_me(),
            Instr::Try { clause } => {
                let alt = self.pc;
                self.try_me_else(alt);
                self.pc = clause;
            }
            Instr::Retry { clause } => {
                let alt = self.pc;
                self.retry_me_else(alt);
                self.pc = clause;
            }
            Instr::Trust { clause } => {
                self.trust_me();
                self.pc = clause;
            }
            Instr::SwitchOnTerm {
                on_var,
                on_con,
                on_list,
                on_str,
            } => {
                let c = self.heap.deref(self.a_reg(0));
                let target = match c.view() {
                    CellView::Ref(_) => Some(on_var),
                    CellView::Con(_) | CellView::Int(_) => on_con,
                    CellView::Str(j) => {
                        if self.heap.get(j) == DOTTED_PAIR {
                            on_list
                        } else {
                            on_str
                        }
                    }
                };
                match target {
                    Some(t) => self.pc = t,
                    None => return Ok(ExecuteState::Fail),
                }
            }
            Instr::SwitchOnConstant { table } => {
                let c = self.heap.deref(self.a_reg(0));
                match table.lookup(c) {
                    Some(t) => self.pc = t,
                    None => return Ok(ExecuteState::Fail),
                }
            }
            Instr::SwitchOnStructure { table } => {
                let c = self.heap.deref(self.a_reg(0));
                let key = self.heap.functor_of(c);
                match table.lookup(key) {
                    Some(t) => self.pc = t,
                    None => return Ok(ExecuteState::Fail),
                }
            }
            Instr::Halt => return Ok(ExecuteState::Halt),
        }
        Ok(ExecuteState::Proceed)
    }

    /// READ mode: next structure argument. WRITE mode: a fresh variable
    /// appended to the structure being built.
    fn read_or_fresh(&mut self) -> Cell {
        match self.mode {
            UnifyMode::Read => self.next_structure_arg(),
            UnifyMode::Write => self.heap.new_ref(),
        }
    }

    /// READ mode: unify with the next structure argument. WRITE mode:
    /// append the value.
    fn unify_next(&mut self, value: Cell) -> bool {
        match self.mode {
            UnifyMode::Read => {
                let arg = self.next_structure_arg();
                self.unify(value, arg)
            }
            UnifyMode::Write => {
                self.heap.push(value);
                true
            }
        }
    }

    /// Append `value`, globalizing an unbound variable to a heap
    /// reference first.
    fn set_local_value(&mut self, value: Cell) {
        let c = self.heap.deref(value);
        match c.view() {
            CellView::Ref(i) => {
                self.heap.push(Cell::ref_to(i));
            }
            _ => {
                self.heap.push(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Tag;

    // The compiler does not emit every instruction the set defines;
    // the stragglers are exercised here against a hand-set machine.

    #[test]
    fn unify_void_skips_in_read_mode_and_fills_in_write_mode() {
        let mut vm = Interpreter::new();
        let f = vm.functor_cell("f", 3);
        let a = vm.atom("a");
        let s = vm.new_str(f, &[a, a, a]);
        let start = match s.view() {
            CellView::Str(j) => j + 1,
            _ => unreachable!(),
        };

        vm.set_read_mode(start);
        assert_eq!(vm.step(Instr::UnifyVoid { n: 2 }), Ok(ExecuteState::Proceed));
        assert_eq!(vm.s, start + 2);

        let h = vm.heap().size();
        vm.set_write_mode();
        assert_eq!(vm.step(Instr::UnifyVoid { n: 2 }), Ok(ExecuteState::Proceed));
        assert_eq!(vm.heap().size(), h + 2);
        assert_eq!(vm.heap().get(h), Cell::ref_to(h));
        assert_eq!(vm.heap().get(h + 1), Cell::ref_to(h + 1));
    }

    #[test]
    fn set_local_value_globalizes_unbound_variables() {
        let mut vm = Interpreter::new();
        let v = vm.new_ref();
        vm.set_x_reg(0, v);
        vm.set_write_mode();

        let h = vm.heap().size();
        assert_eq!(
            vm.step(Instr::SetLocalValueX { x: 0 }),
            Ok(ExecuteState::Proceed)
        );
        assert_eq!(vm.heap().size(), h + 1);
        // The written cell references the variable rather than copying a
        // stale register snapshot.
        assert_eq!(vm.heap().get(h), v);

        // Bound values are written through the dereference.
        let c = vm.atom("done");
        assert!(vm.unify(v, c));
        vm.set_x_reg(1, v);
        assert_eq!(
            vm.step(Instr::SetLocalValueX { x: 1 }),
            Ok(ExecuteState::Proceed)
        );
        assert_eq!(vm.heap().get(vm.heap().size() - 1), c);
    }

    #[test]
    fn get_structure_builds_against_unbound_and_matches_against_bound() {
        let mut vm = Interpreter::new();
        let f = vm.functor_cell("f", 1);
        let g = vm.functor_cell("g", 1);

        // Unbound: WRITE mode, the variable is bound to a fresh frame.
        let v = vm.new_ref();
        vm.set_a_reg(0, v);
        assert_eq!(
            vm.step(Instr::GetStructure {
                functor: f,
                reg: crate::isa::Reg::A(0)
            }),
            Ok(ExecuteState::Proceed)
        );
        assert_eq!(vm.mode, UnifyMode::Write);
        assert_eq!(vm.deref(v).tag(), Tag::Str);

        // Matching functor: READ mode over the existing arguments.
        let a = vm.atom("a");
        let s = vm.new_str(f, &[a]);
        vm.set_a_reg(1, s);
        assert_eq!(
            vm.step(Instr::GetStructure {
                functor: f,
                reg: crate::isa::Reg::A(1)
            }),
            Ok(ExecuteState::Proceed)
        );
        assert_eq!(vm.mode, UnifyMode::Read);

        // Functor mismatch fails.
        assert_eq!(
            vm.step(Instr::GetStructure {
                functor: g,
                reg: crate::isa::Reg::A(1)
            }),
            Ok(ExecuteState::Fail)
        );
    }
}
