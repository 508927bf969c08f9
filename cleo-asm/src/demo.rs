use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cleo_script::script::{add_gxt_string, show_bottom_text, wait, Console};
use cleo_script::{
    opcode, scm_call, BridgeConfig, Completion, MemoryGate, Scope, ScriptUnit, Value, VarHandle,
};

const GXT_KEY: &str = "JS_MSG";

/// Money reported by the fake host's `STORE_SCORE`.
const PLAYER_MONEY: i32 = 12345;

fn host(config: &BridgeConfig) -> MemoryGate {
    let mut gate = MemoryGate::with_builtins(config);
    gate.register(opcode::STORE_SCORE, |state, call| {
        call.store(state, 1, PLAYER_MONEY)?;
        Ok(Completion::done())
    });
    gate
}

/// Run the message demo on its own thread against an in-memory host.
///
/// Every wait is multiplied by `time_scale`.
pub fn run(config: &BridgeConfig, time_scale: f32, fxt: Option<&Path>) -> Result<()> {
    if !(time_scale.is_finite() && time_scale > 0.0) {
        bail!("time scale must be a positive number, got {time_scale}");
    }
    let scaled = move |ms: i32| (ms as f32 * time_scale).round() as i32;
    let mut gate = host(config);

    if let Some(path) = fxt {
        let text = &mut gate.state_mut().text;
        text.load_fxt(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        log::info!("{}: {} display strings", path.display(), text.len());
    }

    let mut unit = ScriptUnit::spawn("cleo_js", config, move |conn| {
        let console = Console::new("cleo_js");
        console.print(&[Value::from("loaded successfully!")]);

        add_gxt_string(conn, GXT_KEY, "Hello from a Rust script!")?;
        wait(conn, scaled(10_000))?;

        show_bottom_text(conn, GXT_KEY, scaled(3_000))?;
        wait(conn, scaled(3_000))?;

        add_gxt_string(conn, GXT_KEY, "This is the second message.")?;
        show_bottom_text(conn, GXT_KEY, scaled(3_000))?;

        let money = VarHandle::new(Scope::Local, 10);
        scm_call!(conn, opcode::STORE_SCORE, 0, money)?;
        console.print(&[Value::from("money:"), money.get(conn)?]);
        Ok(())
    })?;

    unit.run_until_finished(&mut gate, Duration::from_millis(5))
        .context("demo script failed")?;

    for shown in gate.state().shown() {
        println!("{:>6}ms  {} ({}ms): {}", shown.at_ms, shown.key, shown.duration_ms, shown.text);
    }
    Ok(())
}
