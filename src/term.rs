//! Term representation: tagged cells, the block heap, and rendering.

mod cell;
mod heap;
mod writer;

pub use cell::{
    Cell, CellView, Tag, COMMA, DOTTED_PAIR, EMPTY_LIST, IMPLIED_BY, MAX_INT, MIN_INT, TRUE,
};
pub use heap::Heap;
pub use writer::TermWriter;
