//! Exposed constructors API for the [`Interpreter`]

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::{builtins, Interpreter, UnifyMode};
use crate::isa::{CodePtr, Instr};
use crate::term::Heap;

impl Interpreter {
    /// Create a new interpreter instance with an empty database and the
    /// standard built-ins registered.
    ///
    /// Slot 0 of the code area holds the halt sentinel every query uses
    /// as its final continuation.
    pub fn new() -> Self {
        let mut vm = Interpreter {
            heap: Heap::new(),
            trail: Vec::new(),
            a: Vec::new(),
            x: Vec::new(),
            frames: Vec::new(),
            e: None,
            choices: Vec::new(),
            pc: CodePtr::HALT,
            cp: CodePtr::HALT,
            s: 0,
            mode: UnifyMode::Read,
            num_of_args: 0,
            code: vec![Instr::Halt],
            predicates: HashMap::new(),
            builtins: HashMap::new(),
            abort: Arc::new(AtomicBool::new(false)),
            names: HashMap::new(),
            query: None,
        };
        builtins::register_standard(&mut vm);
        vm
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
