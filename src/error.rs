use crate::state::Address;

/// Fatal conditions raised by the interpreter core. None of these are
/// recoverable: the frame loop stops on the first one it sees.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Chip8Error {
    #[error("Unknown opcode {opcode:#06X} at {pc:#05X}")]
    UnknownOpcode { opcode: u16, pc: Address },

    #[error("Stack underflow: return at {pc:#05X} with an empty call stack")]
    StackUnderflow { pc: Address },

    #[error("Stack overflow: call at {pc:#05X} exceeds the limit of {limit} frames")]
    StackOverflow { pc: Address, limit: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },
}
