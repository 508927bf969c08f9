use std::fmt;
use std::io;

use crate::var::VarHandle;

/// Where a failed host request was aimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallSite {
    Opcode(u16),
    Variable(VarHandle),
    Text,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallSite::Opcode(op) => write!(f, "opcode 0x{op:04X}"),
            CallSite::Variable(var) => write!(f, "variable {var}"),
            CallSite::Text => write!(f, "text table"),
        }
    }
}

#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum Reason {
    #[error("unknown opcode")]
    UnknownOpcode,

    #[error("bad argument #{position}: {message}")]
    BadArgument { position: usize, message: String },

    #[error("variable index out of range (table len={len})")]
    BadIndex { len: usize },

    #[error("host is not ready")]
    NotReady,

    #[error("control thread disconnected")]
    Disconnected,

    #[error("no response within {ms}ms")]
    Timeout { ms: u64 },

    #[error("script is exiting")]
    Exiting,

    #[error("{0}")]
    Failed(String),
}

/// Failure reported by the call gate.
///
/// Never retried or swallowed by this crate; it travels back to the script
/// exactly as the host produced it.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("{site} failed: {reason}")]
pub struct HostCallError {
    pub site: CallSite,
    pub reason: Reason,
}

impl HostCallError {
    pub fn new(site: CallSite, reason: Reason) -> Self {
        Self { site, reason }
    }

    pub fn opcode(opcode: u16, reason: Reason) -> Self {
        Self::new(CallSite::Opcode(opcode), reason)
    }

    pub fn variable(var: VarHandle, reason: Reason) -> Self {
        Self::new(CallSite::Variable(var), reason)
    }

    pub fn bad_argument(opcode: u16, position: usize, message: impl Into<String>) -> Self {
        Self::opcode(
            opcode,
            Reason::BadArgument {
                position,
                message: message.into(),
            },
        )
    }
}

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("variable index must be non-negative, got {0}")]
    Negative(i64),

    #[error("variable index {0} exceeds the slot range")]
    TooLarge(i64),
}

#[derive(thiserror::Error, Debug)]
pub enum AsmError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown opcode 0x{opcode:04X} at offset 0x{offset:X}")]
    UnknownOpcode { opcode: u16, offset: u64 },

    #[error("unknown type id 0x{0:02X}")]
    UnknownType(u8),

    #[error("unsupported argument type 0x{0:02X}")]
    Unsupported(u8),

    #[error("text is {len} bytes, at most 255 fit in a length-prefixed string")]
    TextTooLong { len: usize },

    #[error("text {0:?} has characters without a single-byte encoding")]
    Unmappable(String),

    #[error("{0} does not fit in a 16-bit operand")]
    IndexTooLarge(VarHandle),
}
