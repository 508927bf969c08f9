//! cleo-script
//!
//! Typed handles for SCM script-machine variables and the call gate they marshal through.
//! The game's script machine is never touched directly: everything goes through a
//! [`CallGate`], which may be the in-process [`MemoryGate`] or a [`ScriptConn`] talking
//! to a control thread.

pub mod asm;
pub mod bridge;
pub mod config;
pub mod error;
pub mod gate;
pub mod memory;
pub mod opcode;
pub mod script;
pub mod text;
pub mod value;
pub mod var;

pub use bridge::{Focus, Request, Response, ScriptConn, ScriptUnit, UnitError};
pub use config::{BridgeConfig, ConfigError};
pub use error::{AsmError, CallSite, ConstructionError, HostCallError, Reason};
pub use gate::{Arg, CallGate, Completion, ScriptArgument, ScriptId};
pub use memory::{HostState, MemoryGate, ShownText};
pub use text::TextTable;
pub use value::Value;
pub use var::{Scope, VarHandle};
