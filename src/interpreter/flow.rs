//! Control flow: environments, choice points and backtracking.

use tracing::trace;

use super::{ChoicePoint, Frame, Interpreter};
use crate::error::RuntimeError;
use crate::isa::CodePtr;
use crate::state::ExecuteState;
use crate::term::Cell;

impl Interpreter {
    /// Push an environment frame with `n` permanent slots.
    ///
    /// Frames live in an arena; the newest choice point's watermark is a
    /// floor below which storage is protected, so deallocate/allocate
    /// pairs reuse space and tail recursion runs in constant stack.
    pub(crate) fn allocate(&mut self, n: usize) {
        let ceiling = self.choices.last().map(|cp| cp.env_top).unwrap_or(0);
        let base = self.e.map(|e| e + 1).unwrap_or(0);
        let top = base.max(ceiling);
        self.frames.truncate(top);
        self.frames.push(Frame {
            prev: self.e,
            cp: self.cp,
            ys: vec![Cell::ref_to(0); n],
        });
        self.e = Some(top);
    }

    /// Restore the continuation from the current environment and drop
    /// it. The storage is reclaimed by the next `allocate`.
    pub(crate) fn deallocate(&mut self) {
        let e = self.e.expect("deallocate without environment");
        self.cp = self.frames[e].cp;
        self.e = self.frames[e].prev;
    }

    /// Logical environment-stack depth: the length of the chain from the
    /// current frame down.
    pub fn environment_depth(&self) -> usize {
        let mut depth = 0;
        let mut e = self.e;
        while let Some(i) = e {
            depth += 1;
            e = self.frames[i].prev;
        }
        depth
    }

    /// Number of live choice points, the base barrier included.
    pub fn choice_point_depth(&self) -> usize {
        self.choices.len()
    }

    /// Create a choice point whose next alternative is `alt`.
    pub(crate) fn try_me_else(&mut self, alt: CodePtr) {
        let args = (0..self.num_of_args).map(|i| self.a_reg(i)).collect();
        self.choices.push(ChoicePoint {
            args,
            e: self.e,
            cp: self.cp,
            env_top: self.frames.len(),
            tr: self.trail_mark(),
            h: self.heap.size(),
            bp: alt,
        });
    }

    /// Restore machine state from the newest choice point: argument
    /// registers, environment, continuation, trail and heap marks.
    pub(crate) fn restore_choice(&mut self) {
        let cp = self.choices.last().expect("restore without choice point").clone();
        for (i, &cell) in cp.args.iter().enumerate() {
            self.set_a_reg(i, cell);
        }
        self.num_of_args = cp.args.len();
        self.e = cp.e;
        self.cp = cp.cp;
        self.trail_unwind(cp.tr);
        self.heap.trim(cp.h);
        self.frames.truncate(cp.env_top);
    }

    /// Re-enter the newest choice point and move its alternative.
    pub(crate) fn retry_me_else(&mut self, alt: CodePtr) {
        self.restore_choice();
        self.choices.last_mut().expect("retry without choice point").bp = alt;
    }

    /// Re-enter the newest choice point and discard it.
    pub(crate) fn trust_me(&mut self) {
        self.restore_choice();
        self.choices.pop();
    }

    /// Jump to the next alternative after a failure. Returns `false`
    /// when the alternatives are exhausted: the base barrier is popped
    /// and the machine is back at its pre-query marks.
    pub(crate) fn backtrack(&mut self) -> bool {
        trace!(choice_points = self.choices.len(), "backtrack");
        let bp = match self.choices.last() {
            Some(cp) => cp.bp,
            None => return false,
        };
        if bp != CodePtr::FAIL {
            self.pc = bp;
            return true;
        }
        self.restore_choice();
        self.choices.pop();
        false
    }

    /// Unwind every choice point, the base barrier included, restoring
    /// the pre-query trail and heap marks. Used by typed errors and
    /// aborts.
    pub(crate) fn unwind_all(&mut self) {
        while let Some(cp) = self.choices.last() {
            let base = cp.bp == CodePtr::FAIL;
            self.restore_choice();
            self.choices.pop();
            if base {
                break;
            }
        }
        self.choices.clear();
    }

    /// Transfer control to `functor`'s predicate or built-in.
    ///
    /// `tail` distinguishes `execute` (last call) from `call`: a
    /// built-in succeeding in tail position proceeds to the saved
    /// continuation.
    pub(crate) fn dispatch_goal(
        &mut self,
        functor: Cell,
        tail: bool,
    ) -> Result<ExecuteState, RuntimeError> {
        self.num_of_args = functor.arity();
        if self.predicates.contains_key(&functor) {
            let entry = self.ensure_compiled(functor);
            self.pc = entry;
            return Ok(ExecuteState::Proceed);
        }
        if let Some(builtin) = self.lookup_builtin(functor) {
            let args: Vec<Cell> = (0..self.num_of_args).map(|i| self.a_reg(i)).collect();
            let ok = builtin(self, &args)?;
            if !ok {
                return Ok(ExecuteState::Fail);
            }
            if tail {
                self.pc = self.cp;
            }
            return Ok(ExecuteState::Proceed);
        }
        Err(RuntimeError::UndefinedPredicate {
            name: self.heap.atom_name(functor),
            arity: functor.arity(),
        })
    }
}
