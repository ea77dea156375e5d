use super::{Interpreter, UnifyMode};
use crate::isa::{Reg, RegId};
use crate::term::Cell;

// Register-file and binding plumbing shared by the instruction
// implementations. Registers are dead until their first write; reads of
// unwritten slots return a null cell and indicate a compiler bug.

impl Interpreter {
    pub(crate) fn a_reg(&self, index: RegId) -> Cell {
        self.a.get(index).copied().unwrap_or(Cell::ref_to(0))
    }

    pub(crate) fn set_a_reg(&mut self, index: RegId, cell: Cell) {
        debug_assert!(index < crate::consts::MAX_ARG_REGISTERS);
        if self.a.len() <= index {
            self.a.resize(index + 1, Cell::ref_to(0));
        }
        self.a[index] = cell;
    }

    pub(crate) fn x_reg(&self, index: RegId) -> Cell {
        self.x.get(index).copied().unwrap_or(Cell::ref_to(0))
    }

    pub(crate) fn set_x_reg(&mut self, index: RegId, cell: Cell) {
        debug_assert!(index < crate::consts::MAX_TEMP_REGISTERS);
        if self.x.len() <= index {
            self.x.resize(index + 1, Cell::ref_to(0));
        }
        self.x[index] = cell;
    }

    pub(crate) fn reg(&self, reg: Reg) -> Cell {
        match reg {
            Reg::A(i) => self.a_reg(i),
            Reg::X(i) => self.x_reg(i),
        }
    }

    pub(crate) fn set_reg(&mut self, reg: Reg, cell: Cell) {
        match reg {
            Reg::A(i) => self.set_a_reg(i, cell),
            Reg::X(i) => self.set_x_reg(i, cell),
        }
    }

    pub(crate) fn y_reg(&self, index: RegId) -> Cell {
        let e = self.e.expect("no environment for Y access");
        self.frames[e].ys[index]
    }

    pub(crate) fn set_y_reg(&mut self, index: RegId, cell: Cell) {
        let e = self.e.expect("no environment for Y access");
        self.frames[e].ys[index] = cell;
    }

    /// Heap mark of the newest choice point. Bindings at or above it are
    /// undone by the heap trim on backtracking and need no trail entry.
    pub(crate) fn hb(&self) -> usize {
        self.choices.last().map(|cp| cp.h).unwrap_or(0)
    }

    /// Bind the REF cell at `index` and trail it when required.
    pub(crate) fn bind(&mut self, index: usize, cell: Cell) {
        debug_assert_eq!(self.heap.get(index), Cell::ref_to(index), "binding a bound cell");
        self.heap.set(index, cell);
        if index < self.hb() {
            self.trail.push(index);
        }
    }

    /// Read the next structure argument in READ mode.
    pub(crate) fn next_structure_arg(&mut self) -> Cell {
        let cell = self.heap.get(self.s);
        self.s += 1;
        cell
    }

    pub(crate) fn set_read_mode(&mut self, s: usize) {
        self.mode = UnifyMode::Read;
        self.s = s;
    }

    pub(crate) fn set_write_mode(&mut self) {
        self.mode = UnifyMode::Write;
    }
}
