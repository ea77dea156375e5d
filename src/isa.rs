//! WAM instruction set.
//!
//! Instructions are fixed-category records: a type discriminant
//! ([`Opcode`]) plus a small argument payload ([`Instr`]). Code lives in
//! one contiguous code area per machine and instructions are addressed
//! by slot index ([`CodePtr`]); every instruction occupies exactly one
//! slot, with the variable-size switch tables held out of line behind an
//! [`Arc`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::term::Cell;

/// Register index within its file.
pub type RegId = usize;

/// A register operand that may address either file.
///
/// Argument positions are pinned to the A file by the head of the clause
/// being compiled; everything else lives in the X file. A cell may
/// belong to both when its argument position also serves as a temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    /// Argument register.
    A(RegId),
    /// Temporary register.
    X(RegId),
}

/// Position inside the code area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodePtr(pub usize);

impl CodePtr {
    /// The halt sentinel; slot 0 of every code area holds [`Instr::Halt`].
    pub const HALT: CodePtr = CodePtr(0);

    /// Pseudo-address used as the next-alternative pointer of the base
    /// choice point: backtracking into it fails the query.
    pub const FAIL: CodePtr = CodePtr(usize::MAX);

    /// The following slot.
    pub const fn next(self) -> CodePtr {
        CodePtr(self.0 + 1)
    }
}

/// Dispatch table for `switch_on_constant` / `switch_on_structure`.
///
/// Keys are constant cells (CON or INT) or functor CON cells. A miss
/// falls through to failure. Lookup strategy is an implementation detail
/// the emitted code must not depend on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SwitchTable {
    entries: HashMap<Cell, CodePtr>,
}

impl SwitchTable {
    /// Table from `(key, target)` pairs. Later duplicates are ignored so
    /// the first matching clause group wins, as source order requires.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Cell, CodePtr)>) -> Self {
        let mut entries = HashMap::new();
        for (key, target) in pairs {
            entries.entry(key).or_insert(target);
        }
        SwitchTable { entries }
    }

    /// Target label for `key`, if any.
    pub fn lookup(&self, key: Cell) -> Option<CodePtr> {
        self.entries.get(&key).copied()
    }

    /// Number of keyed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Instruction type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[allow(missing_docs)]
pub enum Opcode {
    GetVariableX,
    GetVariableY,
    GetValueX,
    GetValueY,
    GetStructure,
    GetConstant,
    PutVariableX,
    PutVariableY,
    PutValueX,
    PutValueY,
    PutStructure,
    PutConstant,
    UnifyVariableX,
    UnifyVariableY,
    UnifyValueX,
    UnifyValueY,
    UnifyConstant,
    UnifyVoid,
    SetVariableX,
    SetVariableY,
    SetValueX,
    SetValueY,
    SetLocalValueX,
    SetLocalValueY,
    SetConstant,
    Allocate,
    Deallocate,
    Call,
    Execute,
    Proceed,
    TryMeElse,
    RetryMeElse,
    TrustMe,
    Try,
    Retry,
    Trust,
    SwitchOnTerm,
    SwitchOnConstant,
    SwitchOnStructure,
    Halt,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// `Xn <- Ai`.
    GetVariableX { x: RegId, a: RegId },
    /// `Yn <- Ai`.
    GetVariableY { y: RegId, a: RegId },
    /// `unify(Xn, Ai)`.
    GetValueX { x: RegId, a: RegId },
    /// `unify(Yn, Ai)`.
    GetValueY { y: RegId, a: RegId },
    /// Match or build a structure at the register.
    GetStructure { functor: Cell, reg: Reg },
    /// Match an atomic constant at Ai.
    GetConstant { constant: Cell, a: RegId },
    /// Fresh unbound variable into Xn and Ai.
    PutVariableX { x: RegId, a: RegId },
    /// Fresh heap variable into Yn and Ai.
    PutVariableY { y: RegId, a: RegId },
    /// `Ai <- Xn`.
    PutValueX { x: RegId, a: RegId },
    /// `Ai <- Yn`.
    PutValueY { y: RegId, a: RegId },
    /// Begin building a structure in the register.
    PutStructure { functor: Cell, reg: Reg },
    /// `Ai <- c`.
    PutConstant { constant: Cell, a: RegId },
    /// Read the next structure argument into Xn, or write a fresh one.
    UnifyVariableX { x: RegId },
    /// Read the next structure argument into Yn, or write a fresh one.
    UnifyVariableY { y: RegId },
    /// Unify Xn with the next structure argument.
    UnifyValueX { x: RegId },
    /// Unify Yn with the next structure argument.
    UnifyValueY { y: RegId },
    /// Match or write an atomic constant argument.
    UnifyConstant { constant: Cell },
    /// Skip (read) or fill (write) `n` anonymous arguments.
    UnifyVoid { n: usize },
    /// Write a fresh unbound variable into Xn and the structure.
    SetVariableX { x: RegId },
    /// Write a fresh unbound variable into Yn and the structure.
    SetVariableY { y: RegId },
    /// Write Xn's contents into the structure.
    SetValueX { x: RegId },
    /// Write Yn's contents into the structure.
    SetValueY { y: RegId },
    /// Write Xn, globalizing an unbound variable first.
    SetLocalValueX { x: RegId },
    /// Write Yn, globalizing an unbound variable first.
    SetLocalValueY { y: RegId },
    /// Write an atomic constant into the structure.
    SetConstant { constant: Cell },
    /// Push an environment frame with `n` permanent slots.
    Allocate { n: usize },
    /// Restore the continuation and drop the current environment.
    Deallocate,
    /// Call `functor`; `nvars` permanent variables remain live after.
    Call { functor: Cell, nvars: usize },
    /// Tail call `functor`; the continuation is not saved.
    Execute { functor: Cell },
    /// Return to the continuation.
    Proceed,
    /// Create a choice point with `alt` as the next alternative.
    TryMeElse { alt: CodePtr },
    /// Re-enter the choice point, moving its alternative to `alt`.
    RetryMeElse { alt: CodePtr },
    /// Re-enter and discard the choice point.
    TrustMe,
    /// Create a choice point and jump to `clause`; the alternative is
    /// the following slot.
    Try { clause: CodePtr },
    /// Re-enter the choice point and jump to `clause`; the alternative
    /// is the following slot.
    Retry { clause: CodePtr },
    /// Re-enter, discard the choice point and jump to `clause`.
    Trust { clause: CodePtr },
    /// Dispatch on the dereferenced tag of A0. Missing labels fail.
    SwitchOnTerm {
        on_var: CodePtr,
        on_con: Option<CodePtr>,
        on_list: Option<CodePtr>,
        on_str: Option<CodePtr>,
    },
    /// Dispatch on the constant value of A0.
    SwitchOnConstant { table: Arc<SwitchTable> },
    /// Dispatch on the functor of A0.
    SwitchOnStructure { table: Arc<SwitchTable> },
    /// Stop the run loop; the sentinel continuation of a query.
    Halt,
}

impl Instr {
    /// Instruction type discriminant.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instr::GetVariableX { .. } => Opcode::GetVariableX,
            Instr::GetVariableY { .. } => Opcode::GetVariableY,
            Instr::GetValueX { .. } => Opcode::GetValueX,
            Instr::GetValueY { .. } => Opcode::GetValueY,
            Instr::GetStructure { .. } => Opcode::GetStructure,
            Instr::GetConstant { .. } => Opcode::GetConstant,
            Instr::PutVariableX { .. } => Opcode::PutVariableX,
            Instr::PutVariableY { .. } => Opcode::PutVariableY,
            Instr::PutValueX { .. } => Opcode::PutValueX,
            Instr::PutValueY { .. } => Opcode::PutValueY,
            Instr::PutStructure { .. } => Opcode::PutStructure,
            Instr::PutConstant { .. } => Opcode::PutConstant,
            Instr::UnifyVariableX { .. } => Opcode::UnifyVariableX,
            Instr::UnifyVariableY { .. } => Opcode::UnifyVariableY,
            Instr::UnifyValueX { .. } => Opcode::UnifyValueX,
            Instr::UnifyValueY { .. } => Opcode::UnifyValueY,
            Instr::UnifyConstant { .. } => Opcode::UnifyConstant,
            Instr::UnifyVoid { .. } => Opcode::UnifyVoid,
            Instr::SetVariableX { .. } => Opcode::SetVariableX,
            Instr::SetVariableY { .. } => Opcode::SetVariableY,
            Instr::SetValueX { .. } => Opcode::SetValueX,
            Instr::SetValueY { .. } => Opcode::SetValueY,
            Instr::SetLocalValueX { .. } => Opcode::SetLocalValueX,
            Instr::SetLocalValueY { .. } => Opcode::SetLocalValueY,
            Instr::SetConstant { .. } => Opcode::SetConstant,
            Instr::Allocate { .. } => Opcode::Allocate,
            Instr::Deallocate => Opcode::Deallocate,
            Instr::Call { .. } => Opcode::Call,
            Instr::Execute { .. } => Opcode::Execute,
            Instr::Proceed => Opcode::Proceed,
            Instr::TryMeElse { .. } => Opcode::TryMeElse,
            Instr::RetryMeElse { .. } => Opcode::RetryMeElse,
            Instr::TrustMe => Opcode::TrustMe,
            Instr::Try { .. } => Opcode::Try,
            Instr::Retry { .. } => Opcode::Retry,
            Instr::Trust { .. } => Opcode::Trust,
            Instr::SwitchOnTerm { .. } => Opcode::SwitchOnTerm,
            Instr::SwitchOnConstant { .. } => Opcode::SwitchOnConstant,
            Instr::SwitchOnStructure { .. } => Opcode::SwitchOnStructure,
            Instr::Halt => Opcode::Halt,
        }
    }

    /// Code-area slots this instruction occupies. Uniform by
    /// construction; the run loop advances the program counter by this
    /// amount unless a control instruction overrides it.
    pub const fn size(&self) -> usize {
        1
    }

    /// The X-file register this instruction addresses, if any. Used by
    /// the compiler's densification remap.
    pub fn x_reg(&self) -> Option<RegId> {
        match *self {
            Instr::GetVariableX { x, .. }
            | Instr::GetValueX { x, .. }
            | Instr::PutVariableX { x, .. }
            | Instr::PutValueX { x, .. }
            | Instr::UnifyVariableX { x }
            | Instr::UnifyValueX { x }
            | Instr::SetVariableX { x }
            | Instr::SetValueX { x }
            | Instr::SetLocalValueX { x } => Some(x),
            Instr::GetStructure { reg: Reg::X(x), .. }
            | Instr::PutStructure { reg: Reg::X(x), .. } => Some(x),
            _ => None,
        }
    }

    /// Rewrite the X-file register this instruction addresses.
    pub fn set_x_reg(&mut self, new: RegId) {
        match self {
            Instr::GetVariableX { x, .. }
            | Instr::GetValueX { x, .. }
            | Instr::PutVariableX { x, .. }
            | Instr::PutValueX { x, .. }
            | Instr::UnifyVariableX { x }
            | Instr::UnifyValueX { x }
            | Instr::SetVariableX { x }
            | Instr::SetValueX { x }
            | Instr::SetLocalValueX { x } => *x = new,
            Instr::GetStructure { reg: Reg::X(x), .. }
            | Instr::PutStructure { reg: Reg::X(x), .. } => *x = new,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn opcodes_display_as_snake_case() {
        assert_eq!(Opcode::GetStructure.to_string(), "get_structure");
        assert_eq!(Opcode::TryMeElse.to_string(), "try_me_else");
        assert_eq!(Opcode::SwitchOnTerm.to_string(), "switch_on_term");
    }

    #[test]
    fn every_opcode_has_a_distinct_mnemonic() {
        let mut seen = std::collections::HashSet::new();
        for op in Opcode::iter() {
            assert!(seen.insert(op.to_string()), "duplicate mnemonic for {op:?}");
        }
    }

    #[test]
    fn x_register_accessors_cover_structure_operands() {
        let mut i = Instr::GetStructure {
            functor: Cell::con_compact(b"f", 2),
            reg: Reg::X(3),
        };
        assert_eq!(i.x_reg(), Some(3));
        i.set_x_reg(0);
        assert_eq!(i.x_reg(), Some(0));

        let a_side = Instr::GetStructure {
            functor: Cell::con_compact(b"f", 2),
            reg: Reg::A(3),
        };
        assert_eq!(a_side.x_reg(), None);
    }

    #[test]
    fn switch_table_keeps_first_binding_per_key() {
        let k = Cell::int(1);
        let table = SwitchTable::from_pairs([(k, CodePtr(10)), (k, CodePtr(20))]);
        assert_eq!(table.lookup(k), Some(CodePtr(10)));
        assert_eq!(table.lookup(Cell::int(2)), None);
        assert_eq!(table.len(), 1);
    }
}
