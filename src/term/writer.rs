//! Term rendering in Prolog surface syntax.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use super::cell::{Cell, CellView, COMMA, DOTTED_PAIR, EMPTY_LIST, IMPLIED_BY};
use super::heap::Heap;

/// Renders heap terms as Prolog text.
///
/// Unbound variables print a registered name when one exists, otherwise a
/// generated `_G<index>` name. Traversal detects revisited structure
/// cells by heap index, so rational (cyclic) bindings render as `...`
/// instead of hanging.
pub struct TermWriter<'a> {
    heap: &'a Heap,
    names: &'a HashMap<usize, String>,
}

// Argument positions accept operators below 1000 (the priority of `,`),
// clause level accepts everything.
const PREC_TOP: u32 = 1200;
const PREC_ARG: u32 = 999;

impl<'a> TermWriter<'a> {
    /// Writer over `heap` with `names` mapping heap indices of variables
    /// to their surface names.
    pub fn new(heap: &'a Heap, names: &'a HashMap<usize, String>) -> Self {
        TermWriter { heap, names }
    }

    /// Render `cell` to a string.
    pub fn write(&self, cell: Cell) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        self.write_prec(&mut out, cell, PREC_TOP, &mut seen);
        out
    }

    fn infix_op(&self, functor: Cell) -> Option<(&'static str, u32)> {
        if functor == COMMA {
            Some((", ", 1000))
        } else if functor == IMPLIED_BY {
            Some((" :- ", 1200))
        } else if functor.arity() == 2 && self.heap.is_name(functor, "=") {
            Some((" = ", 700))
        } else {
            None
        }
    }

    fn write_prec(&self, out: &mut String, cell: Cell, max_prec: u32, seen: &mut HashSet<usize>) {
        let c = self.heap.deref(cell);
        match c.view() {
            CellView::Ref(index) => match self.names.get(&index) {
                Some(name) => out.push_str(name),
                None => {
                    let _ = write!(out, "_G{index}");
                }
            },
            CellView::Int(n) => {
                let _ = write!(out, "{n}");
            }
            CellView::Con(con) => self.write_atom(out, con),
            CellView::Str(index) => {
                if !seen.insert(index) {
                    out.push_str("...");
                    return;
                }
                let functor = self.heap.functor_of(c);
                if functor == DOTTED_PAIR {
                    self.write_list(out, c, seen);
                } else if let Some((op, prec)) = self.infix_op(functor) {
                    let parens = prec > max_prec;
                    if parens {
                        out.push('(');
                    }
                    self.write_prec(out, self.heap.arg(c, 0), prec - 1, seen);
                    out.push_str(op);
                    self.write_prec(out, self.heap.arg(c, 1), prec, seen);
                    if parens {
                        out.push(')');
                    }
                } else {
                    self.write_atom(out, functor);
                    out.push('(');
                    for i in 0..functor.arity() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.write_prec(out, self.heap.arg(c, i), PREC_ARG, seen);
                    }
                    out.push(')');
                }
                seen.remove(&index);
            }
        }
    }

    fn write_list(&self, out: &mut String, cell: Cell, seen: &mut HashSet<usize>) {
        out.push('[');
        let mut l = cell;
        let mut first = true;
        let mut spine = Vec::new();
        loop {
            if !first {
                out.push(',');
            }
            first = false;
            self.write_prec(out, self.heap.arg(l, 0), PREC_ARG, seen);
            let tail = self.heap.deref(self.heap.arg(l, 1));
            if tail == EMPTY_LIST {
                break;
            }
            if self.heap.check_functor(tail) && self.heap.functor_of(tail) == DOTTED_PAIR {
                if let CellView::Str(index) = tail.view() {
                    if !seen.insert(index) {
                        out.push_str("|...");
                        break;
                    }
                    spine.push(index);
                }
                l = tail;
                continue;
            }
            out.push('|');
            self.write_prec(out, tail, PREC_ARG, seen);
            break;
        }
        for index in spine {
            seen.remove(&index);
        }
        out.push(']');
    }

    fn write_atom(&self, out: &mut String, con: Cell) {
        let name = self.heap.atom_name(con);
        if needs_quotes(&name) {
            let _ = write!(out, "'{}'", name.replace('\'', "\\'"));
        } else {
            out.push_str(&name);
        }
    }
}

fn needs_quotes(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let identifier = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let symbolic = name.chars().all(|c| "+-*/\\^<>=~:.?@#&$".contains(c));
    let solo = matches!(name, "[]" | "!" | ";" | "{}" | ",");
    !(identifier || symbolic || solo)
}
