//! Runtime state representation for the VM

/// Resulting state of a single instruction execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecuteState {
    /// The machine should proceed normally with the execution.
    Proceed,
    /// The instruction failed to unify; the machine must backtrack.
    Fail,
    /// The halt sentinel was reached; the query succeeded.
    Halt,
}

impl ExecuteState {
    /// Return true if the run loop should fetch the next instruction.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

impl Default for ExecuteState {
    fn default() -> Self {
        Self::Proceed
    }
}
