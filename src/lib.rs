//! Warren Abstract Machine interpreter.
//!
//! Horn-clause programs compile to a byte-coded instruction set executed
//! against a tagged-cell heap with unification, backtracking and
//! first-argument indexing. The surface parser and printer are external
//! collaborators: the engine accepts already-constructed heap terms and
//! renders results back through [`term::TermWriter`].

pub mod consts;
pub mod error;
pub mod interpreter;
pub mod isa;
pub mod state;
pub mod term;

mod compiler;

pub mod prelude {
    //! Convenience re-exports of the embedded API.

    pub use crate::error::{CompileError, InterpreterError, RuntimeError};
    pub use crate::interpreter::{AbortHandle, Builtin, Interpreter};
    pub use crate::isa::{CodePtr, Instr, Opcode, Reg, SwitchTable};
    pub use crate::state::ExecuteState;
    pub use crate::term::{
        Cell, CellView, Heap, Tag, TermWriter, COMMA, DOTTED_PAIR, EMPTY_LIST, IMPLIED_BY, TRUE,
    };
}
