//! Handles for script-machine variables.
//!
//! A [`VarHandle`] is only a pair of table coordinates. It never holds the value
//! and never checks the index against a table; the host does that when the
//! handle is used.

use std::fmt;

use crate::error::{ConstructionError, HostCallError};
use crate::gate::CallGate;
use crate::value::Value;

/// Which variable table a slot lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Shared by every script running on the machine.
    Global,
    /// Private to the owning script instance.
    Local,
}

impl Scope {
    pub fn is_global(self) -> bool {
        matches!(self, Scope::Global)
    }

    pub fn from_global_flag(global: bool) -> Self {
        if global {
            Scope::Global
        } else {
            Scope::Local
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarHandle {
    scope: Scope,
    index: u32,
}

impl VarHandle {
    pub const fn new(scope: Scope, index: u32) -> Self {
        Self { scope, index }
    }

    pub fn local(index: i64) -> Result<Self, ConstructionError> {
        Ok(Self::new(Scope::Local, checked_index(index)?))
    }

    pub fn global(index: i64) -> Result<Self, ConstructionError> {
        Ok(Self::new(Scope::Global, checked_index(index)?))
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_global()
    }

    /// Read the slot's current value through the gate.
    pub fn get<G: CallGate + ?Sized>(&self, gate: &mut G) -> Result<Value, HostCallError> {
        gate.var_value(self.index, self.is_global(), None)
    }

    /// Ask the host to overwrite the slot. Returns whatever the gate reports
    /// back for the slot.
    pub fn set<G: CallGate + ?Sized>(
        &self,
        gate: &mut G,
        value: impl Into<Value>,
    ) -> Result<Value, HostCallError> {
        gate.var_value(self.index, self.is_global(), Some(value.into()))
    }

    /// Handles are always bound by reference when passed to an opcode.
    pub fn can_act_as_script_value(&self) -> bool {
        true
    }
}

fn checked_index(index: i64) -> Result<u32, ConstructionError> {
    if index < 0 {
        return Err(ConstructionError::Negative(index));
    }
    u32::try_from(index).map_err(|_| ConstructionError::TooLarge(index))
}

impl fmt::Display for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.scope {
            Scope::Global => "global",
            Scope::Local => "local",
        };
        write!(f, "{}_{:#x}", prefix, self.index)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::gate::{Arg, Completion};

    /// Records the raw variable requests without modelling any memory.
    #[derive(Default)]
    struct RecordingGate {
        requests: Vec<(u32, bool, Option<Value>)>,
    }

    impl CallGate for RecordingGate {
        fn call(&mut self, opcode: u16, _args: &[Arg]) -> Result<Completion, HostCallError> {
            Err(HostCallError::opcode(opcode, crate::error::Reason::UnknownOpcode))
        }

        fn var_value(
            &mut self,
            index: u32,
            global: bool,
            value: Option<Value>,
        ) -> Result<Value, HostCallError> {
            self.requests.push((index, global, value.clone()));
            Ok(value.unwrap_or(Value::Int(7)))
        }

        fn set_text(&mut self, _key: &str, _value: &str) -> Result<bool, HostCallError> {
            Ok(false)
        }
    }

    #[test]
    fn constructors_fix_scope_and_index() {
        let l = VarHandle::local(10).unwrap();
        assert_eq!(l.scope(), Scope::Local);
        assert_eq!(l.index(), 10);

        let g = VarHandle::global(0x3f0).unwrap();
        assert_eq!(g.scope(), Scope::Global);
        assert_eq!(g.index(), 0x3f0);
    }

    #[test]
    fn index_zero_is_valid() {
        assert!(VarHandle::local(0).is_ok());
        assert!(VarHandle::global(0).is_ok());
    }

    #[test]
    fn negative_index_is_rejected() {
        assert_eq!(VarHandle::local(-1), Err(ConstructionError::Negative(-1)));
        assert_eq!(VarHandle::global(-42), Err(ConstructionError::Negative(-42)));
    }

    #[test]
    fn oversized_index_is_rejected() {
        let too_big = i64::from(u32::MAX) + 1;
        assert_eq!(VarHandle::local(too_big), Err(ConstructionError::TooLarge(too_big)));
    }

    #[test]
    fn marker_is_always_true() {
        for h in [
            VarHandle::local(0).unwrap(),
            VarHandle::global(0).unwrap(),
            VarHandle::local(999).unwrap(),
            VarHandle::new(Scope::Global, u32::MAX),
        ] {
            assert!(h.can_act_as_script_value());
        }
    }

    #[test]
    fn get_sends_index_and_scope_flag_without_payload() {
        let mut gate = RecordingGate::default();
        let v = VarHandle::global(5).unwrap().get(&mut gate).unwrap();
        assert_eq!(v, Value::Int(7));
        assert_eq!(gate.requests, vec![(5, true, None)]);
    }

    #[test]
    fn set_sends_payload() {
        let mut gate = RecordingGate::default();
        VarHandle::local(3).unwrap().set(&mut gate, 1.25f32).unwrap();
        assert_eq!(gate.requests, vec![(3, false, Some(Value::Real(1.25)))]);
    }

    #[test]
    fn display_matches_disassembly_style() {
        assert_eq!(VarHandle::global(16).unwrap().to_string(), "global_0x10");
        assert_eq!(VarHandle::local(10).unwrap().to_string(), "local_0xa");
    }
}
