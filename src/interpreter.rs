//! [`Interpreter`] implementation

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CompileError;
use crate::isa::{CodePtr, Instr};
use crate::term::{Cell, CellView, Heap, TermWriter, DOTTED_PAIR};

mod builtins;
mod constructors;
mod executors;
mod flow;
mod internal;
mod unify;

pub use builtins::Builtin;

/// Read/write mode of the structure pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnifyMode {
    Read,
    Write,
}

/// Environment frame holding a clause's permanent variables and
/// continuation.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) prev: Option<usize>,
    pub(crate) cp: CodePtr,
    pub(crate) ys: Vec<Cell>,
}

/// Saved machine state permitting resumption at an alternative clause.
#[derive(Debug, Clone)]
pub(crate) struct ChoicePoint {
    pub(crate) args: Vec<Cell>,
    pub(crate) e: Option<usize>,
    pub(crate) cp: CodePtr,
    pub(crate) env_top: usize,
    pub(crate) tr: usize,
    pub(crate) h: usize,
    pub(crate) bp: CodePtr,
}

/// Predicate table entry: the source clauses and, once a call compiled
/// them, the entry point of the generated code.
#[derive(Debug, Clone, Default)]
pub(crate) struct Predicate {
    pub(crate) clauses: Vec<Cell>,
    pub(crate) entry: Option<CodePtr>,
}

/// Bookkeeping for the query currently loaded in the machine.
pub(crate) struct QueryContext {
    pub(crate) term: Cell,
    pub(crate) vars: Vec<usize>,
}

/// WAM interpreter.
///
/// One instance owns its heap, trail, stacks and register file; nothing
/// is shared between instances and no operation is safe under concurrent
/// mutation. An external caller may request an abort between
/// instructions through [`Interpreter::abort_handle`].
pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) trail: Vec<usize>,
    pub(crate) a: Vec<Cell>,
    pub(crate) x: Vec<Cell>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) e: Option<usize>,
    pub(crate) choices: Vec<ChoicePoint>,
    pub(crate) pc: CodePtr,
    pub(crate) cp: CodePtr,
    pub(crate) s: usize,
    pub(crate) mode: UnifyMode,
    pub(crate) num_of_args: usize,
    pub(crate) code: Vec<Instr>,
    pub(crate) predicates: HashMap<Cell, Predicate>,
    pub(crate) builtins: HashMap<(Cell, Cell), Builtin>,
    pub(crate) abort: Arc<AtomicBool>,
    pub(crate) names: HashMap<usize, String>,
    pub(crate) query: Option<QueryContext>,
}

/// Clone-able handle for requesting an abort of the running query.
///
/// The run loop polls the flag at every fetch; on abort it unwinds all
/// choice points and the query fails. Timeouts are external abort
/// triggers built on this handle.
#[derive(Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Request an abort.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Interpreter {
    /// The heap owned by this instance.
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable access to the heap, for term construction by embedders.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Handle for requesting an abort from outside the run loop.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.abort))
    }

    /// Current trail height.
    pub fn trail_size(&self) -> usize {
        self.trail.len()
    }

    /// Number of environment frames currently held in the arena,
    /// protected frames included.
    pub fn environment_stack_size(&self) -> usize {
        self.frames.len()
    }

    /// Allocate a fresh unbound variable.
    pub fn new_ref(&mut self) -> Cell {
        self.heap.new_ref()
    }

    /// Integer cell.
    pub fn new_int(&self, value: i64) -> Cell {
        self.heap.new_int(value)
    }

    /// Atom cell for `name`.
    pub fn atom(&mut self, name: &str) -> Cell {
        self.heap.atom(name)
    }

    /// Functor cell for `name/arity`.
    pub fn functor_cell(&mut self, name: &str, arity: usize) -> Cell {
        self.heap.functor_cell(name, arity)
    }

    /// Build a structure on the heap.
    pub fn new_str(&mut self, functor: Cell, args: &[Cell]) -> Cell {
        self.heap.new_str(functor, args)
    }

    /// Follow REF chains to the end.
    pub fn deref(&self, cell: Cell) -> Cell {
        self.heap.deref(cell)
    }

    /// Functor of a structure cell.
    pub fn functor_of(&self, cell: Cell) -> Cell {
        self.heap.functor_of(cell)
    }

    /// `i`-th argument of a structure cell.
    pub fn arg(&self, cell: Cell, i: usize) -> Cell {
        self.heap.arg(cell, i)
    }

    /// Register a surface name for a variable, used when rendering
    /// results. The cell must be a REF.
    pub fn name_var(&mut self, var: Cell, name: &str) {
        if let CellView::Ref(index) = var.view() {
            self.names.insert(index, name.to_owned());
        }
    }

    /// Load one clause into the predicate table.
    ///
    /// The clause is validated immediately; malformed clauses are
    /// rejected here and never reach execution. Code generation is
    /// deferred to the first call of the predicate.
    pub fn load_clause(&mut self, clause: Cell) -> Result<(), CompileError> {
        let head = self.clause_head(clause);
        let key = match self.heap.deref(head).view() {
            CellView::Con(c) => c,
            CellView::Str(_) if self.heap.check_functor(head) => self.heap.functor_of(head),
            _ => return Err(CompileError::NonCallableHead(self.term_string(head))),
        };
        let body = self.clause_body(clause);
        for goal in self.flatten_conjunction(body) {
            match self.heap.deref(goal).view() {
                CellView::Con(_) => {}
                CellView::Str(_) if self.heap.check_functor(goal) => {}
                _ => return Err(CompileError::NonCallableGoal(self.term_string(goal))),
            }
        }
        let entry = self.predicates.entry(key).or_default();
        entry.clauses.push(clause);
        entry.entry = None;
        Ok(())
    }

    /// Load a list of clauses, as produced by the surface parser for a
    /// whole program term `[C1, C2, ...]`.
    pub fn load_program(&mut self, program: Cell) -> Result<(), CompileError> {
        let mut l = self.heap.deref(program);
        while self.heap.check_functor(l) && self.heap.functor_of(l) == DOTTED_PAIR {
            let clause = self.heap.arg(l, 0);
            self.load_clause(clause)?;
            l = self.heap.deref(self.heap.arg(l, 1));
        }
        Ok(())
    }

    /// Clause head, treating a fact as its own head.
    pub(crate) fn clause_head(&self, clause: Cell) -> Cell {
        crate::compiler::clause_head(&self.heap, clause)
    }

    /// Clause body, `true` for a fact.
    pub(crate) fn clause_body(&self, clause: Cell) -> Cell {
        crate::compiler::clause_body(&self.heap, clause)
    }

    /// Goals of a (possibly nested) `,/2` conjunction, left to right,
    /// with `true` goals dropped.
    pub(crate) fn flatten_conjunction(&self, body: Cell) -> Vec<Cell> {
        crate::compiler::conjunction_goals(&self.heap, body)
    }

    /// Render a term with the registered variable names.
    pub fn term_string(&self, cell: Cell) -> String {
        TermWriter::new(&self.heap, &self.names).write(cell)
    }

    /// Render the resolved query term after a successful `execute`.
    pub fn get_result(&self) -> String {
        match &self.query {
            Some(q) => self.term_string(q.term),
            None => String::new(),
        }
    }

    /// Free variables of the current query, in first-occurrence order,
    /// with their current bindings.
    pub fn query_bindings(&self) -> impl Iterator<Item = (Cell, Cell)> + '_ {
        self.query.iter().flat_map(|q| {
            q.vars.iter().map(|&index| {
                let var = Cell::ref_to(index);
                (var, self.heap.deref(var))
            })
        })
    }

    /// Print the loaded database.
    pub fn print_db(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let mut keys: Vec<(String, usize, Cell)> = self
            .predicates
            .keys()
            .map(|&k| (self.heap.atom_name(k), k.arity(), k))
            .collect();
        keys.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        for (_, _, key) in keys {
            for &clause in &self.predicates[&key].clauses {
                writeln!(out, "{}.", self.term_string(clause))?;
            }
        }
        Ok(())
    }

    /// Print the result of the last query.
    pub fn print_result(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "{}", self.get_result())
    }

    /// Disassemble the code area.
    pub fn print_code(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for (i, instr) in self.code.iter().enumerate() {
            writeln!(out, "[{i:5}]: {} {instr:?}", instr.opcode())?;
        }
        Ok(())
    }

    /// Free variables of `term`: unbound REF heap indices in
    /// first-occurrence order, left to right.
    pub(crate) fn term_vars(&self, term: Cell) -> Vec<usize> {
        crate::compiler::term_vars(&self.heap, term)
    }

    /// Predicate functor key of a goal term.
    pub(crate) fn goal_functor(&self, goal: Cell) -> Option<Cell> {
        crate::compiler::goal_functor(&self.heap, goal)
    }
}

impl Interpreter {
    pub(crate) fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub(crate) fn clear_abort(&self) {
        self.abort.store(false, Ordering::Relaxed);
    }
}
