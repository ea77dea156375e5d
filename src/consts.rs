//! VM parameters

/// Number of cells per heap block.
///
/// The heap grows one block at a time and `trim` releases whole tail
/// blocks, so the block size bounds both the growth granularity and the
/// worst-case memory retained past a trim point.
pub const HEAP_BLOCK_SIZE: usize = 4096;

/// Upper bound for argument registers a predicate call may use.
pub const MAX_ARG_REGISTERS: usize = 256;

/// Upper bound for temporary registers a single clause may use after the
/// densification remap.
pub const MAX_TEMP_REGISTERS: usize = 1024;

/// Arity limit for the compact constant encoding; larger arities fall
/// back to the interned representation.
pub const MAX_COMPACT_ARITY: usize = 31;

/// Longest atom name (in bytes) the compact constant encoding can hold.
pub const MAX_COMPACT_NAME: usize = 7;
