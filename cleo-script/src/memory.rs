//! An in-process script machine host.
//!
//! `MemoryGate` keeps the variable tables and the text table in plain memory
//! and dispatches opcodes to registered handlers. It is what the tests run
//! against, and what the control thread uses when no game is attached.

use std::collections::HashMap;

use crate::config::{BridgeConfig, MAX_SLOTS};
use crate::error::{CallSite, HostCallError, Reason};
use crate::gate::{Arg, CallGate, Completion, ScriptId};
use crate::opcode;
use crate::text::TextTable;
use crate::value::Value;
use crate::var::{Scope, VarHandle};

/// A `PRINT_NOW` that reached the screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownText {
    pub key: String,
    pub text: String,
    pub duration_ms: u32,
    /// Virtual clock time at which it was shown.
    pub at_ms: u64,
}

/// Everything an opcode handler may touch.
///
/// Globals are one shared table. Each script instance gets its own local
/// table, created zeroed the first time it writes one of its locals.
#[derive(Debug)]
pub struct HostState {
    globals: Vec<Value>,
    locals: HashMap<ScriptId, Vec<Value>>,
    local_slots: usize,
    script: ScriptId,
    pub text: TextTable,
    shown: Vec<ShownText>,
    clock_ms: u64,
}

impl HostState {
    pub fn new(global_slots: u32, local_slots: u32) -> Self {
        Self {
            globals: vec![Value::default(); table_len(global_slots)],
            locals: HashMap::new(),
            local_slots: table_len(local_slots),
            script: ScriptId::MAIN,
            text: TextTable::new(),
            shown: Vec::new(),
            clock_ms: 0,
        }
    }

    /// The script whose locals are currently addressed.
    pub fn script(&self) -> ScriptId {
        self.script
    }

    pub fn select(&mut self, script: ScriptId) {
        self.script = script;
    }

    pub fn release(&mut self, script: ScriptId) {
        self.locals.remove(&script);
    }

    pub fn load(&self, var: VarHandle) -> Result<Value, HostCallError> {
        let index = var.index() as usize;
        let slot = match var.scope() {
            Scope::Global => self
                .globals
                .get(index)
                .cloned()
                .ok_or(self.globals.len()),
            Scope::Local => match self.locals.get(&self.script) {
                Some(table) => table.get(index).cloned().ok_or(table.len()),
                None if index < self.local_slots => Ok(Value::default()),
                None => Err(self.local_slots),
            },
        };
        slot.map_err(|len| HostCallError::variable(var, Reason::BadIndex { len }))
    }

    pub fn store(&mut self, var: VarHandle, value: Value) -> Result<(), HostCallError> {
        let table = match var.scope() {
            Scope::Global => &mut self.globals,
            Scope::Local => {
                let len = self.local_slots;
                self.locals
                    .entry(self.script)
                    .or_insert_with(|| vec![Value::default(); len])
            }
        };
        let len = table.len();
        let slot = table
            .get_mut(var.index() as usize)
            .ok_or_else(|| HostCallError::variable(var, Reason::BadIndex { len }))?;
        *slot = value;
        Ok(())
    }

    /// Input arguments that name a variable are read from it.
    pub fn resolve(&self, arg: &Arg) -> Result<Value, HostCallError> {
        match arg {
            Arg::Value(v) => Ok(v.clone()),
            Arg::Var(var) => self.load(*var),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn advance(&mut self, ms: u64) {
        self.clock_ms = self.clock_ms.saturating_add(ms);
    }

    pub fn shown(&self) -> &[ShownText] {
        &self.shown
    }

    pub fn show(&mut self, key: &str, duration_ms: u32) -> Option<&ShownText> {
        let text = self.text.get(key)?.to_string();
        self.shown.push(ShownText {
            key: key.to_string(),
            text,
            duration_ms,
            at_ms: self.clock_ms,
        });
        self.shown.last()
    }
}

fn table_len(slots: u32) -> usize {
    if slots > MAX_SLOTS {
        log::warn!("{} variable slots requested, capping at {}", slots, MAX_SLOTS);
    }
    slots.min(MAX_SLOTS) as usize
}

/// The opcode and arguments a handler was invoked with.
///
/// Argument positions in errors are 1-based.
pub struct Call<'a> {
    pub opcode: u16,
    pub args: &'a [Arg],
}

impl Call<'_> {
    fn arg(&self, pos: usize) -> Result<&Arg, HostCallError> {
        self.args
            .get(pos)
            .ok_or_else(|| HostCallError::bad_argument(self.opcode, pos + 1, "missing"))
    }

    fn mismatch(&self, pos: usize, expected: &str, got: &Value) -> HostCallError {
        HostCallError::bad_argument(
            self.opcode,
            pos + 1,
            format!("expected {expected}, got {}", got.kind()),
        )
    }

    pub fn int(&self, state: &HostState, pos: usize) -> Result<i32, HostCallError> {
        let v = state.resolve(self.arg(pos)?)?;
        v.as_int().ok_or_else(|| self.mismatch(pos, "int", &v))
    }

    pub fn real(&self, state: &HostState, pos: usize) -> Result<f32, HostCallError> {
        let v = state.resolve(self.arg(pos)?)?;
        v.as_real().ok_or_else(|| self.mismatch(pos, "real", &v))
    }

    pub fn text(&self, state: &HostState, pos: usize) -> Result<String, HostCallError> {
        let v = state.resolve(self.arg(pos)?)?;
        match v {
            Value::Text(s) => Ok(s),
            other => Err(self.mismatch(pos, "text", &other)),
        }
    }

    /// An output parameter: must be a variable, never a literal.
    pub fn out(&self, pos: usize) -> Result<VarHandle, HostCallError> {
        match self.arg(pos)? {
            Arg::Var(var) => Ok(*var),
            Arg::Value(v) => Err(self.mismatch(pos, "variable", v)),
        }
    }

    /// Write `value` into the output parameter at `pos`.
    pub fn store(
        &self,
        state: &mut HostState,
        pos: usize,
        value: impl Into<Value>,
    ) -> Result<(), HostCallError> {
        let var = self.out(pos)?;
        state
            .store(var, value.into())
            .map_err(|e| HostCallError::opcode(self.opcode, e.reason))
    }
}

pub type Handler =
    Box<dyn Fn(&mut HostState, &Call<'_>) -> Result<Completion, HostCallError> + Send>;

pub struct MemoryGate {
    state: HostState,
    handlers: HashMap<u16, Handler>,
    failures: HashMap<u16, Reason>,
    calls: Vec<(u16, Vec<Arg>)>,
    ready: bool,
}

impl Default for MemoryGate {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl MemoryGate {
    /// Empty tables, no handlers.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            state: HostState::new(config.global_slots, config.local_slots),
            handlers: HashMap::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            ready: true,
        }
    }

    /// With `WAIT` and `PRINT_NOW` registered.
    pub fn with_builtins(config: &BridgeConfig) -> Self {
        let mut gate = Self::new(config);
        gate.register(opcode::WAIT, wait);
        gate.register(opcode::PRINT_NOW, print_now);
        gate
    }

    pub fn register<F>(&mut self, opcode: u16, f: F)
    where
        F: Fn(&mut HostState, &Call<'_>) -> Result<Completion, HostCallError> + Send + 'static,
    {
        self.handlers.insert(opcode, Box::new(f));
    }

    pub fn fail_on(&mut self, opcode: u16, reason: Reason) {
        self.failures.insert(opcode, reason);
    }

    pub fn clear_failure(&mut self, opcode: u16) {
        self.failures.remove(&opcode);
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Every instruction request seen so far, in order, including failed ones.
    pub fn calls(&self) -> &[(u16, Vec<Arg>)] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<(u16, Vec<Arg>)> {
        std::mem::take(&mut self.calls)
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut HostState {
        &mut self.state
    }

    fn check_ready(&self, site: CallSite) -> Result<(), HostCallError> {
        if self.ready {
            Ok(())
        } else {
            Err(HostCallError::new(site, Reason::NotReady))
        }
    }
}

impl CallGate for MemoryGate {
    fn call(&mut self, opcode: u16, args: &[Arg]) -> Result<Completion, HostCallError> {
        self.check_ready(CallSite::Opcode(opcode))?;
        self.calls.push((opcode, args.to_vec()));

        if let Some(reason) = self.failures.get(&opcode) {
            return Err(HostCallError::opcode(opcode, reason.clone()));
        }

        let handler = self
            .handlers
            .get(&opcode)
            .ok_or_else(|| HostCallError::opcode(opcode, Reason::UnknownOpcode))?;
        handler(&mut self.state, &Call { opcode, args })
    }

    fn var_value(
        &mut self,
        index: u32,
        global: bool,
        value: Option<Value>,
    ) -> Result<Value, HostCallError> {
        let var = VarHandle::new(Scope::from_global_flag(global), index);
        self.check_ready(CallSite::Variable(var))?;

        match value {
            None => self.state.load(var),
            Some(v) => {
                self.state.store(var, v.clone())?;
                Ok(v)
            }
        }
    }

    fn set_text(&mut self, key: &str, value: &str) -> Result<bool, HostCallError> {
        self.check_ready(CallSite::Text)?;
        Ok(self.state.text.set(key, value))
    }

    fn select_script(&mut self, script: ScriptId) {
        self.state.select(script);
    }

    fn release_script(&mut self, script: ScriptId) {
        self.state.release(script);
    }
}

fn wait(state: &mut HostState, call: &Call<'_>) -> Result<Completion, HostCallError> {
    let ms = call.int(state, 0)?;
    let ms = u32::try_from(ms)
        .map_err(|_| HostCallError::bad_argument(call.opcode, 1, "negative wait time"))?;
    state.advance(u64::from(ms));
    Ok(Completion::wait(ms))
}

fn print_now(state: &mut HostState, call: &Call<'_>) -> Result<Completion, HostCallError> {
    let key = call.text(state, 0)?;
    let duration = call.int(state, 1)?;
    call.int(state, 2)?;

    let duration = u32::try_from(duration)
        .map_err(|_| HostCallError::bad_argument(call.opcode, 2, "negative duration"))?;
    let shown = state.show(&key, duration).ok_or_else(|| {
        HostCallError::bad_argument(call.opcode, 1, format!("no text registered for key {key:?}"))
    })?;
    log::info!("print_now {} ({}ms): {}", shown.key, shown.duration_ms, shown.text);
    Ok(Completion::done())
}
