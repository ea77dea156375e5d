//! Block-organized cell heap with atom interning.

use std::collections::HashMap;
use std::io;

use crate::consts::HEAP_BLOCK_SIZE;

use super::cell::{Cell, CellView, Tag, DOTTED_PAIR, EMPTY_LIST};

/// Append-growing array of cells.
///
/// Storage is a sequence of fixed-size blocks so growth never moves
/// existing cells and [`trim`](Heap::trim) can release whole tail blocks;
/// the external index space stays contiguous. Cells are written once and
/// then mutated only through binding (REF to anything) and unbinding
/// (back to a self-REF).
pub struct Heap {
    blocks: Vec<Vec<Cell>>,
    size: usize,
    atom_index: HashMap<String, usize>,
    atom_names: Vec<String>,
    #[cfg(debug_assertions)]
    external: HashMap<usize, usize>,
}

impl Heap {
    /// Create an empty heap with its first block in place.
    pub fn new() -> Self {
        Heap {
            blocks: vec![Vec::with_capacity(HEAP_BLOCK_SIZE)],
            size: 0,
            atom_index: HashMap::new(),
            atom_names: Vec::new(),
            #[cfg(debug_assertions)]
            external: HashMap::new(),
        }
    }

    /// Number of live cells.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Random access read.
    pub fn get(&self, index: usize) -> Cell {
        debug_assert!(index < self.size, "heap read past live size");
        self.blocks[index / HEAP_BLOCK_SIZE][index % HEAP_BLOCK_SIZE]
    }

    /// Random access write. Only legal during binding and construction.
    pub fn set(&mut self, index: usize, cell: Cell) {
        debug_assert!(index < self.size, "heap write past live size");
        self.blocks[index / HEAP_BLOCK_SIZE][index % HEAP_BLOCK_SIZE] = cell;
    }

    /// Append one cell, returning its index.
    pub fn push(&mut self, cell: Cell) -> usize {
        if self.size == self.blocks.len() * HEAP_BLOCK_SIZE {
            self.blocks.push(Vec::with_capacity(HEAP_BLOCK_SIZE));
        }
        self.blocks.last_mut().expect("at least one block").push(cell);
        let index = self.size;
        self.size += 1;
        index
    }

    /// Allocate a fresh unbound variable and return its REF cell.
    pub fn new_ref(&mut self) -> Cell {
        let index = self.size;
        self.push(Cell::ref_to(index));
        Cell::ref_to(index)
    }

    /// Build an integer cell. Never allocates.
    pub fn new_int(&self, value: i64) -> Cell {
        Cell::int(value)
    }

    /// CON cell for `name/arity`, interning the name when it does not fit
    /// the compact encoding.
    pub fn functor_cell(&mut self, name: &str, arity: usize) -> Cell {
        if Cell::fits_compact(name, arity) {
            Cell::con_compact(name.as_bytes(), arity)
        } else {
            let index = self.resolve_atom_index(name);
            Cell::con_indexed(index, arity)
        }
    }

    /// CON cell for an arity-0 atom.
    pub fn atom(&mut self, name: &str) -> Cell {
        self.functor_cell(name, 0)
    }

    /// Write a functor cell and its argument cells contiguously and
    /// return a STR cell referencing the functor.
    ///
    /// Constants may be passed inline; REF arguments must already exist.
    /// Arity-0 functors collapse to the bare CON cell.
    pub fn new_str(&mut self, functor: Cell, args: &[Cell]) -> Cell {
        debug_assert_eq!(functor.tag(), Tag::Con);
        debug_assert_eq!(functor.arity(), args.len());
        if args.is_empty() {
            return functor;
        }
        let index = self.push(functor);
        for &arg in args {
            self.push(arg);
        }
        Cell::str_at(index)
    }

    /// `[Head|Tail]` constructor.
    pub fn new_dotted_pair(&mut self, head: Cell, tail: Cell) -> Cell {
        self.new_str(DOTTED_PAIR, &[head, tail])
    }

    /// Follow REF chains until a non-REF or a self-REF is reached.
    /// Pure; never allocates.
    pub fn deref(&self, cell: Cell) -> Cell {
        let mut c = cell;
        while let CellView::Ref(index) = c.view() {
            let referred = self.get(index);
            if referred == c {
                return c;
            }
            c = referred;
        }
        c
    }

    /// Functor CON cell of a structure. The argument must be a STR cell.
    pub fn functor_of(&self, cell: Cell) -> Cell {
        debug_assert!(self.check_functor(cell));
        match cell.view() {
            CellView::Str(index) => self.get(index),
            _ => cell,
        }
    }

    /// `i`-th argument (0-based) of a structure cell.
    pub fn arg(&self, cell: Cell, i: usize) -> Cell {
        debug_assert!(self.check_functor(cell));
        match cell.view() {
            CellView::Str(index) => {
                debug_assert!(i < self.get(index).arity());
                self.get(index + 1 + i)
            }
            _ => cell,
        }
    }

    /// Whether `cell` is a STR cell honoring the structure invariants.
    pub fn check_functor(&self, cell: Cell) -> bool {
        match cell.view() {
            CellView::Str(index) => {
                index < self.size && self.get(index).tag() == Tag::Con
            }
            _ => false,
        }
    }

    /// Whether `cell` dereferences to a proper list: a `./2` spine
    /// terminated by `[]`.
    pub fn is_list(&self, cell: Cell) -> bool {
        let mut l = self.deref(cell);
        while l != EMPTY_LIST {
            if !self.check_functor(l) || self.functor_of(l) != DOTTED_PAIR {
                return false;
            }
            l = self.deref(self.arg(l, 1));
        }
        true
    }

    /// Number of elements on the `./2` spine of `cell`, counting a
    /// non-`[]` tail as one element.
    pub fn list_length(&self, cell: Cell) -> usize {
        let mut n = 0;
        let mut l = self.deref(cell);
        while l != EMPTY_LIST {
            n += 1;
            if !self.check_functor(l) || self.functor_of(l) != DOTTED_PAIR {
                break;
            }
            l = self.deref(self.arg(l, 1));
        }
        n
    }

    /// Truncate the heap to exactly `new_size` cells, releasing whole
    /// tail blocks. The caller must guarantee no live external reference
    /// points past `new_size`; in debug builds registered references are
    /// checked.
    pub fn trim(&mut self, new_size: usize) {
        debug_assert!(new_size <= self.size);
        #[cfg(debug_assertions)]
        {
            debug_assert!(
                self.external.keys().all(|&i| i < new_size),
                "trim would invalidate a registered external reference"
            );
        }
        let keep_blocks = if new_size == 0 {
            1
        } else {
            (new_size - 1) / HEAP_BLOCK_SIZE + 1
        };
        self.blocks.truncate(keep_blocks);
        let last_len = new_size - (keep_blocks - 1) * HEAP_BLOCK_SIZE;
        self.blocks
            .last_mut()
            .expect("at least one block")
            .truncate(last_len);
        self.size = new_size;
    }

    /// Intern `name` and return its index. Monotone: a name keeps its
    /// index for the lifetime of the heap.
    pub fn resolve_atom_index(&mut self, name: &str) -> usize {
        if let Some(&index) = self.atom_index.get(name) {
            return index;
        }
        let index = self.atom_names.len();
        self.atom_names.push(name.to_owned());
        self.atom_index.insert(name.to_owned(), index);
        index
    }

    /// Name of a CON cell, compact or interned.
    pub fn atom_name(&self, con: Cell) -> String {
        debug_assert_eq!(con.tag(), Tag::Con);
        if con.is_compact() {
            con.compact_name()
        } else {
            self.atom_names[con.atom_index()].clone()
        }
    }

    /// Whether the CON cell carries the given name.
    pub fn is_name(&self, con: Cell, name: &str) -> bool {
        if con.is_compact() {
            con.compact_name_len() == name.len() && con.compact_name() == name
        } else {
            self.atom_names[con.atom_index()] == name
        }
    }

    /// Register an external reference for debug `trim` checking. In
    /// release builds this is a no-op and the reference collapses to a
    /// bare index.
    pub fn register_external(&mut self, index: usize) {
        #[cfg(debug_assertions)]
        {
            *self.external.entry(index).or_insert(0) += 1;
        }
        #[cfg(not(debug_assertions))]
        let _ = index;
    }

    /// Drop one registration of an external reference.
    pub fn unregister_external(&mut self, index: usize) {
        #[cfg(debug_assertions)]
        {
            if let Some(count) = self.external.get_mut(&index) {
                *count -= 1;
                if *count == 0 {
                    self.external.remove(&index);
                }
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = index;
    }

    /// Dump the whole heap.
    pub fn print(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.print_range(out, 0, self.size)
    }

    /// Dump the cells in `[from, to)`.
    pub fn print_range(&self, out: &mut dyn io::Write, from: usize, to: usize) -> io::Result<()> {
        for i in from..to {
            writeln!(out, "{i:8}: {:?}", self.get(i))?;
        }
        Ok(())
    }

    /// One-line heap summary.
    pub fn print_status(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "Heap status: size: {} atoms: {}", self.size, self.atom_names.len())
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
