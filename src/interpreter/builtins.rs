//! Built-in registry and the standard library seed.
//!
//! Built-ins register under a `(module, name/arity)` key and receive the
//! interpreter plus the call's argument cells. Returning `Ok(false)`
//! behaves like a failing instruction; a typed error aborts the query
//! and surfaces from `execute`. Domain modules (networking, peer book,
//! mailboxes, ...) plug in through the same hook.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::term::Cell;

/// A built-in predicate implementation.
///
/// The arguments are the call's dereferenceable argument cells; the
/// built-in may allocate on the heap and unify through the interpreter.
/// Re-entering the run loop from inside a built-in is forbidden.
pub type Builtin = fn(&mut Interpreter, &[Cell]) -> Result<bool, RuntimeError>;

/// Module the core's own predicates live in, and the one unqualified
/// goals resolve against.
pub(crate) const SYSTEM: Cell = Cell::con_compact(b"system", 0);

impl Interpreter {
    /// Register a built-in under `(module, functor)`.
    pub fn load_builtin(&mut self, module: Cell, functor: Cell, builtin: Builtin) {
        self.builtins.insert((module, functor), builtin);
    }

    /// Built-in an unqualified goal resolves to, if any. User clauses
    /// shadow built-ins; the caller checks the predicate table first.
    pub(crate) fn lookup_builtin(&self, functor: Cell) -> Option<Builtin> {
        self.builtins.get(&(SYSTEM, functor)).copied()
    }
}

/// Seed the standard library.
pub(crate) fn register_standard(vm: &mut Interpreter) {
    let true_0 = vm.functor_cell("true", 0);
    let fail_0 = vm.functor_cell("fail", 0);
    let unify_2 = vm.functor_cell("=", 2);
    vm.load_builtin(SYSTEM, true_0, true_0_builtin);
    vm.load_builtin(SYSTEM, fail_0, fail_0_builtin);
    vm.load_builtin(SYSTEM, unify_2, unify_2_builtin);
}

fn true_0_builtin(_vm: &mut Interpreter, _args: &[Cell]) -> Result<bool, RuntimeError> {
    Ok(true)
}

fn fail_0_builtin(_vm: &mut Interpreter, _args: &[Cell]) -> Result<bool, RuntimeError> {
    Ok(false)
}

fn unify_2_builtin(vm: &mut Interpreter, args: &[Cell]) -> Result<bool, RuntimeError> {
    Ok(vm.unify(args[0], args[1]))
}
