use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded};
use pretty_assertions::assert_eq;

use cleo_script::script::{add_gxt_string, show_bottom_text, wait, Console};
use cleo_script::{
    opcode, scm_call, Arg, BridgeConfig, CallGate, Completion, Focus, HostCallError, MemoryGate,
    Reason, ScriptId, ScriptUnit, ShownText, UnitError, Value, VarHandle,
};

fn config() -> BridgeConfig {
    BridgeConfig {
        response_timeout_ms: 5000,
        ..BridgeConfig::default()
    }
}

fn host() -> MemoryGate {
    let mut gate = MemoryGate::with_builtins(&config());
    gate.register(opcode::STORE_SCORE, |state, call| {
        call.store(state, 1, 12345)?;
        Ok(Completion::done())
    });
    gate
}

#[test]
fn message_script_runs_to_completion() {
    let mut gate = host();
    let (money_tx, money_rx) = unbounded();

    let mut unit = ScriptUnit::spawn("cleo_js", &config(), move |conn| {
        let console = Console::new("cleo_js");
        let key = "JS_MSG";

        add_gxt_string(conn, key, "Hello from a script!")?;
        wait(conn, 10)?;
        show_bottom_text(conn, key, 30)?;
        wait(conn, 30)?;
        add_gxt_string(conn, key, "This is the second message.")?;
        show_bottom_text(conn, key, 30)?;

        let money = VarHandle::local(10).unwrap();
        scm_call!(conn, opcode::STORE_SCORE, 0, money)?;
        let value = money.get(conn)?;
        console.print(&[Value::from("money:"), value.clone()]);
        money_tx.send(value).unwrap();
        Ok(())
    })
    .unwrap();

    unit.run_until_finished(&mut gate, Duration::from_millis(1))
        .unwrap();

    assert_eq!(money_rx.recv().unwrap(), Value::Int(12345));
    assert_eq!(
        gate.state().shown(),
        &[
            ShownText {
                key: "JS_MSG".into(),
                text: "Hello from a script!".into(),
                duration_ms: 30,
                at_ms: 10,
            },
            ShownText {
                key: "JS_MSG".into(),
                text: "This is the second message.".into(),
                duration_ms: 30,
                at_ms: 40,
            },
        ]
    );
    assert_eq!(
        gate.calls().iter().map(|(op, _)| *op).collect::<Vec<_>>(),
        vec![
            opcode::WAIT,
            opcode::PRINT_NOW,
            opcode::WAIT,
            opcode::PRINT_NOW,
            opcode::STORE_SCORE,
        ]
    );
}

#[test]
fn host_not_ready_aborts_the_script() {
    let mut gate = host();
    gate.set_ready(false);

    let mut unit = ScriptUnit::spawn("early", &config(), |conn| {
        wait(conn, 10)?;
        panic!("wait should have failed");
    })
    .unwrap();

    let err = unit
        .run_until_finished(&mut gate, Duration::from_millis(1))
        .unwrap_err();
    match err {
        UnitError::Script { name, message } => {
            assert_eq!(name, "early");
            assert!(message.contains(&Reason::NotReady.to_string()), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn two_scripts_share_globals() {
    let mut gate = host();
    let flag = VarHandle::global(0x20).unwrap();

    let mut writer = ScriptUnit::spawn("writer", &config(), move |conn| {
        flag.set(conn, 1)?;
        Ok(())
    })
    .unwrap();
    writer
        .run_until_finished(&mut gate, Duration::from_millis(1))
        .unwrap();

    let (tx, rx) = unbounded();
    let mut reader = ScriptUnit::spawn("reader", &config(), move |conn| {
        tx.send(flag.get(conn)?).unwrap();
        Ok(())
    })
    .unwrap();
    reader
        .run_until_finished(&mut gate, Duration::from_millis(1))
        .unwrap();

    assert_eq!(rx.recv().unwrap(), Value::Int(1));
    assert_eq!(reader.exec_single(&mut gate).unwrap(), Focus::Finished);
}

#[test]
fn locals_are_private_to_each_script() {
    let mut gate = host();
    let counter = VarHandle::local(10).unwrap();

    let (set_tx, set_rx) = bounded::<()>(1);
    let (read_tx, read_rx) = bounded::<()>(1);
    let (seen_tx, seen_rx) = unbounded();
    let writer_seen = seen_tx.clone();

    let mut writer = ScriptUnit::spawn("writer", &config(), move |conn| {
        counter.set(conn, 999)?;
        set_tx.send(()).unwrap();
        read_rx.recv().unwrap();
        writer_seen.send(("writer", counter.get(conn)?)).unwrap();
        Ok(())
    })
    .unwrap();
    let mut reader = ScriptUnit::spawn("reader", &config(), move |conn| {
        set_rx.recv().unwrap();
        seen_tx.send(("reader", counter.get(conn)?)).unwrap();
        read_tx.send(()).unwrap();
        Ok(())
    })
    .unwrap();
    assert_ne!(writer.id(), reader.id());

    while !(writer.is_finished() && reader.is_finished()) {
        writer.exec_block(&mut gate).unwrap();
        reader.exec_block(&mut gate).unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    let mut seen = seen_rx.try_iter().collect::<Vec<_>>();
    seen.sort_by_key(|(who, _)| *who);
    assert_eq!(
        seen,
        vec![("reader", Value::Int(0)), ("writer", Value::Int(999))]
    );
}

/// Holds up the first variable request past the script's response timeout.
struct SlowFirstRead {
    inner: MemoryGate,
    delay: Option<Duration>,
}

impl CallGate for SlowFirstRead {
    fn call(&mut self, opcode: u16, args: &[Arg]) -> Result<Completion, HostCallError> {
        self.inner.call(opcode, args)
    }

    fn var_value(
        &mut self,
        index: u32,
        global: bool,
        value: Option<Value>,
    ) -> Result<Value, HostCallError> {
        if let Some(delay) = self.delay.take() {
            thread::sleep(delay);
        }
        self.inner.var_value(index, global, value)
    }

    fn set_text(&mut self, key: &str, value: &str) -> Result<bool, HostCallError> {
        self.inner.set_text(key, value)
    }

    fn select_script(&mut self, script: ScriptId) {
        self.inner.select_script(script);
    }

    fn release_script(&mut self, script: ScriptId) {
        self.inner.release_script(script);
    }
}

#[test]
fn late_reply_is_not_taken_for_the_next_answer() {
    let cfg = BridgeConfig {
        response_timeout_ms: 50,
        ..BridgeConfig::default()
    };
    let a = VarHandle::global(1).unwrap();
    let b = VarHandle::global(2).unwrap();

    let mut inner = MemoryGate::new(&cfg);
    a.set(&mut inner, 111).unwrap();
    b.set(&mut inner, 222).unwrap();
    let mut gate = SlowFirstRead {
        inner,
        delay: Some(Duration::from_millis(150)),
    };

    let (tx, rx) = unbounded();
    let mut unit = ScriptUnit::spawn("impatient", &cfg, move |conn| {
        let first = a.get(conn);
        // Long enough for the late answer to land in the response channel.
        thread::sleep(Duration::from_millis(200));
        let second = b.get(conn);
        tx.send((first, second)).unwrap();
        Ok(())
    })
    .unwrap();

    unit.run_until_finished(&mut gate, Duration::from_millis(1))
        .unwrap();

    let (first, second) = rx.recv().unwrap();
    assert_eq!(first.unwrap_err().reason, Reason::Timeout { ms: 50 });
    assert_eq!(second.unwrap(), Value::Int(222));
}

#[test]
fn requests_are_answered_in_order() {
    let mut gate = host();
    let (tx, rx) = unbounded();

    let mut unit = ScriptUnit::spawn("ordered", &config(), move |conn| {
        for i in 0..8 {
            VarHandle::global(i).unwrap().set(conn, i as i32 * 10)?;
        }
        for i in (0..8).rev() {
            tx.send(VarHandle::global(i).unwrap().get(conn)?).unwrap();
        }
        Ok(())
    })
    .unwrap();

    unit.run_until_finished(&mut gate, Duration::from_millis(1))
        .unwrap();

    assert_eq!(
        rx.try_iter().collect::<Vec<_>>(),
        (0..8).rev().map(|i| Value::Int(i * 10)).collect::<Vec<_>>()
    );
}
