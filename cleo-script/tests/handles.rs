use std::collections::HashMap;

use pretty_assertions::assert_eq;

use cleo_script::script::{add_gxt_string, show_bottom_text};
use cleo_script::{
    opcode, scm_call, Arg, BridgeConfig, CallGate, CallSite, Completion, ConstructionError,
    HostCallError, MemoryGate, Reason, Scope, Value, VarHandle,
};

/// Unbounded last-writer-wins memory; no opcodes at all.
#[derive(Default)]
struct SlotGate {
    slots: HashMap<(bool, u32), Value>,
}

impl CallGate for SlotGate {
    fn call(&mut self, opcode: u16, _args: &[Arg]) -> Result<Completion, HostCallError> {
        Err(HostCallError::opcode(opcode, Reason::UnknownOpcode))
    }

    fn var_value(
        &mut self,
        index: u32,
        global: bool,
        value: Option<Value>,
    ) -> Result<Value, HostCallError> {
        match value {
            Some(v) => {
                self.slots.insert((global, index), v.clone());
                Ok(v)
            }
            None => Ok(self.slots.get(&(global, index)).cloned().unwrap_or_default()),
        }
    }

    fn set_text(&mut self, _key: &str, _value: &str) -> Result<bool, HostCallError> {
        Ok(false)
    }
}

#[test]
fn constructors_keep_scope_and_index() {
    for index in [0, 1, 10, 0x3fff, i64::from(u32::MAX)] {
        let l = VarHandle::local(index).unwrap();
        let g = VarHandle::global(index).unwrap();
        assert_eq!(l.scope(), Scope::Local);
        assert_eq!(g.scope(), Scope::Global);
        assert_eq!(i64::from(l.index()), index);
        assert_eq!(i64::from(g.index()), index);
        assert!(l.can_act_as_script_value());
        assert!(g.can_act_as_script_value());
    }
}

#[test]
fn negative_index_is_rejected() {
    assert_eq!(VarHandle::local(-1), Err(ConstructionError::Negative(-1)));
    assert_eq!(VarHandle::global(-5), Err(ConstructionError::Negative(-5)));
    assert!(VarHandle::global(i64::from(u32::MAX) + 1).is_err());
}

#[test]
fn set_then_get_round_trips() {
    let mut gate = SlotGate::default();
    let h = VarHandle::local(3).unwrap();

    for v in [Value::Int(-7), Value::Real(2.5), Value::from("text")] {
        h.set(&mut gate, v.clone()).unwrap();
        assert_eq!(h.get(&mut gate).unwrap(), v);
    }
}

#[test]
fn equal_coordinates_share_a_slot() {
    let mut gate = SlotGate::default();
    let a = VarHandle::global(42).unwrap();
    let b = VarHandle::global(42).unwrap();
    let other_scope = VarHandle::local(42).unwrap();

    a.set(&mut gate, 9).unwrap();
    assert_eq!(b.get(&mut gate).unwrap(), Value::Int(9));
    assert_eq!(other_scope.get(&mut gate).unwrap(), Value::Int(0));

    b.set(&mut gate, 10).unwrap();
    assert_eq!(a.get(&mut gate).unwrap(), Value::Int(10));
}

#[test]
fn opcode_writes_into_handle_argument() {
    let mut gate = MemoryGate::default();
    gate.register(opcode::STORE_SCORE, |state, call| {
        call.store(state, 1, 12345)?;
        Ok(Completion::done())
    });

    let money = VarHandle::local(10).unwrap();
    scm_call!(&mut gate, opcode::STORE_SCORE, 0, money).unwrap();

    assert_eq!(
        gate.calls(),
        &[(opcode::STORE_SCORE, vec![Arg::Value(Value::Int(0)), Arg::Var(money)])]
    );
    assert_eq!(money.get(&mut gate).unwrap(), Value::Int(12345));
}

#[test]
fn failing_print_is_propagated() {
    let mut gate = MemoryGate::with_builtins(&BridgeConfig::default());
    gate.fail_on(opcode::PRINT_NOW, Reason::NotReady);

    add_gxt_string(&mut gate, "JS_MSG", "Hello").unwrap();
    let err = show_bottom_text(&mut gate, "JS_MSG", 3000).unwrap_err();

    assert_eq!(err.site, CallSite::Opcode(0x00bb));
    assert_eq!(err.reason, Reason::NotReady);
    assert!(gate.state().shown().is_empty());
}

#[test]
fn out_of_range_set_is_not_swallowed() {
    let config = BridgeConfig {
        local_slots: 40,
        ..BridgeConfig::default()
    };
    let mut gate = MemoryGate::new(&config);
    let h = VarHandle::local(40).unwrap();

    let err = h.set(&mut gate, 1).unwrap_err();
    assert_eq!(err, HostCallError::variable(h, Reason::BadIndex { len: 40 }));
    assert_eq!(
        err.to_string(),
        "variable local_0x28 failed: variable index out of range (table len=40)"
    );
}
