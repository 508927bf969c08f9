//! The call gate: the one way scripts reach the host's script machine.

use std::fmt;

use crate::error::HostCallError;
use crate::value::Value;
use crate::var::VarHandle;

/// One marshalled opcode argument.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    /// Copied into the instruction.
    Value(Value),
    /// Bound to the variable slot; the opcode may write its result there.
    Var(VarHandle),
}

impl Arg {
    pub fn is_output(&self) -> bool {
        matches!(self, Arg::Var(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            Arg::Var(_) => None,
        }
    }

    pub fn as_var(&self) -> Option<VarHandle> {
        match self {
            Arg::Var(var) => Some(*var),
            Arg::Value(_) => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => v.fmt(f),
            Arg::Var(var) => var.fmt(f),
        }
    }
}

/// What the host reports after running an instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    /// The instruction's condition result.
    pub flag: bool,
    /// How long the calling script has to stay suspended afterwards.
    pub wait_ms: u32,
}

impl Completion {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn flag(flag: bool) -> Self {
        Self { flag, wait_ms: 0 }
    }

    pub fn wait(wait_ms: u32) -> Self {
        Self {
            flag: false,
            wait_ms,
        }
    }
}

/// Identifies the script instance a request is made for.
///
/// Local variable slots belong to one instance. [`ScriptId::MAIN`] is the
/// instance used when a gate is driven directly, without a bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScriptId(pub u64);

impl ScriptId {
    pub const MAIN: ScriptId = ScriptId(0);
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The host's script machine, as seen from a script.
///
/// Implementations decide what an opcode does; callers only marshal. Every
/// failure comes back as a [`HostCallError`] and is expected to be propagated.
pub trait CallGate {
    /// Run one instruction. [`Arg::Var`] arguments are output parameters.
    fn call(&mut self, opcode: u16, args: &[Arg]) -> Result<Completion, HostCallError>;

    /// Read (`value == None`) or write a variable slot. Returns the slot's value.
    fn var_value(
        &mut self,
        index: u32,
        global: bool,
        value: Option<Value>,
    ) -> Result<Value, HostCallError>;

    /// Register or replace a display string. Returns `true` if `key` was already present.
    fn set_text(&mut self, key: &str, value: &str) -> Result<bool, HostCallError>;

    /// Make `script` the owner of subsequent requests: local slots read, written
    /// or passed as arguments are that instance's own.
    fn select_script(&mut self, _script: ScriptId) {}

    /// `script` has ended; its local slots can be dropped.
    fn release_script(&mut self, _script: ScriptId) {}
}

/// Anything that can be passed to [`CallGate::call`].
pub trait ScriptArgument {
    /// `true` if this argument names a variable slot and must be bound by
    /// reference instead of copied.
    fn can_act_as_script_value(&self) -> bool {
        false
    }

    fn to_arg(&self) -> Arg;
}

impl ScriptArgument for VarHandle {
    fn can_act_as_script_value(&self) -> bool {
        VarHandle::can_act_as_script_value(self)
    }

    fn to_arg(&self) -> Arg {
        Arg::Var(*self)
    }
}

impl ScriptArgument for Value {
    fn to_arg(&self) -> Arg {
        Arg::Value(self.clone())
    }
}

impl ScriptArgument for Arg {
    fn can_act_as_script_value(&self) -> bool {
        self.is_output()
    }

    fn to_arg(&self) -> Arg {
        self.clone()
    }
}

impl ScriptArgument for i32 {
    fn to_arg(&self) -> Arg {
        Arg::Value(Value::Int(*self))
    }
}

impl ScriptArgument for f32 {
    fn to_arg(&self) -> Arg {
        Arg::Value(Value::Real(*self))
    }
}

impl ScriptArgument for bool {
    fn to_arg(&self) -> Arg {
        Arg::Value(Value::from(*self))
    }
}

impl ScriptArgument for &str {
    fn to_arg(&self) -> Arg {
        Arg::Value(Value::from(*self))
    }
}

impl ScriptArgument for String {
    fn to_arg(&self) -> Arg {
        Arg::Value(Value::Text(self.clone()))
    }
}

/// Marshal a mixed argument list.
pub fn marshal(args: &[&dyn ScriptArgument]) -> Vec<Arg> {
    args.iter().map(|a| a.to_arg()).collect()
}

/// `scm_call!(gate, opcode, args...)` marshals each argument with
/// [`ScriptArgument::to_arg`] and calls the gate.
#[macro_export]
macro_rules! scm_call {
    ($gate:expr, $opcode:expr $(, $arg:expr)* $(,)?) => {
        $crate::CallGate::call(
            $gate,
            $opcode,
            &[$($crate::ScriptArgument::to_arg(&$arg)),*],
        )
    };
}
