//! The handful of host primitives scripts use directly.

use crate::error::HostCallError;
use crate::gate::{CallGate, Completion};
use crate::opcode;
use crate::scm_call;
use crate::value::Value;

/// Suspend the calling script for `ms` milliseconds.
pub fn wait<G: CallGate + ?Sized>(gate: &mut G, ms: i32) -> Result<Completion, HostCallError> {
    scm_call!(gate, opcode::WAIT, ms)
}

/// Show the text registered under `key` at the bottom of the screen.
pub fn show_bottom_text<G: CallGate + ?Sized>(
    gate: &mut G,
    key: &str,
    ms: i32,
) -> Result<Completion, HostCallError> {
    scm_call!(gate, opcode::PRINT_NOW, key, ms, 0)
}

/// Register or replace a display string. Returns `true` if `key` already existed.
pub fn add_gxt_string<G: CallGate + ?Sized>(
    gate: &mut G,
    key: &str,
    value: &str,
) -> Result<bool, HostCallError> {
    gate.set_text(key, value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Log,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn name(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Log => "log",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

/// Debug output for one script.
///
/// Everything goes to the host log at info level: a script's "error" is not a
/// host error. The script's own level is kept in the message.
#[derive(Debug, Clone)]
pub struct Console {
    name: String,
}

impl Console {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn format(&self, level: Level, values: &[Value]) -> String {
        let message = values
            .iter()
            .map(|v| match v {
                Value::Text(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("script {} ({}): {}", self.name, level.name(), message)
    }

    pub fn log(&self, level: Level, values: &[Value]) {
        log::info!("{}", self.format(level, values));
    }

    pub fn print(&self, values: &[Value]) {
        self.log(Level::Log, values);
    }
}
