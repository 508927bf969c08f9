//! Scripts on their own threads, the script machine on the control thread.
//!
//! A script never touches the host directly. Each gate call becomes a
//! [`Request`] sent to the control thread, which services it against the real
//! gate during its own tick and sends a [`Response`] back. The request channel
//! has no buffer, so a script cannot carry on running while one of its
//! instructions is still being processed.
//!
//! Every request carries a sequence number that its response echoes. A reply
//! that arrives after the script gave up waiting is discarded instead of being
//! taken as the answer to a later request.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError,
};

use crate::asm::{self, Instr};
use crate::config::BridgeConfig;
use crate::error::{CallSite, HostCallError, Reason};
use crate::gate::{Arg, CallGate, Completion, ScriptId};
use crate::value::Value;
use crate::var::{Scope, VarHandle};

/// Script thread → control thread.
#[derive(Debug, Clone)]
pub enum Request {
    /// Run one instruction.
    ExecInstr(u16, Vec<Arg>),

    /// Read (`value == None`) or write a variable.
    VarValue { var: VarHandle, value: Option<Value> },

    SetText { key: String, value: String },

    /// The script body failed. Answered with [`Response::Exit`].
    ReportErr(String),
}

/// Control thread → script thread.
#[derive(Debug, Clone)]
pub enum Response {
    /// The instruction ran. The script has to sleep `wait_ms` before continuing.
    InstrDone { flag: bool, wait_ms: u32 },
    Var(Value),
    Text(bool),
    Failed(HostCallError),
    /// Stop running.
    Exit,
}

/// The script's end of the connection. Implements [`CallGate`], so script
/// bodies are written exactly as they would be against any other gate.
pub struct ScriptConn {
    name: String,
    sender: Sender<(u64, Request)>,
    receiver: Receiver<(u64, Response)>,
    timeout: Duration,
    last_seq: u64,
}

impl ScriptConn {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, msg: Request) -> Result<u64, SendTimeoutError<(u64, Request)>> {
        self.last_seq += 1;
        self.sender.send_timeout((self.last_seq, msg), self.timeout)?;
        Ok(self.last_seq)
    }

    fn recv(&self, deadline: Option<Instant>) -> Result<(u64, Response), RecvTimeoutError> {
        match deadline {
            Some(deadline) => self.receiver.recv_deadline(deadline),
            None => self
                .receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        }
    }

    fn request(&mut self, site: CallSite, msg: Request) -> Result<Response, HostCallError> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let timed_out = || HostCallError::new(site, Reason::Timeout { ms: timeout_ms });

        let seq = self.send(msg).map_err(|e| match e {
            SendTimeoutError::Timeout(_) => timed_out(),
            SendTimeoutError::Disconnected(_) => HostCallError::new(site, Reason::Disconnected),
        })?;

        // `None` when the timeout is too large to represent: wait forever.
        let deadline = Instant::now().checked_add(self.timeout);
        loop {
            match self.recv(deadline) {
                Ok((_, Response::Exit)) => return Err(HostCallError::new(site, Reason::Exiting)),
                Ok((got, resp)) if got != seq => {
                    log::debug!("script {}: dropping late reply #{}: {:?}", self.name, got, resp);
                }
                Ok((_, Response::Failed(e))) => return Err(e),
                Ok((_, resp)) => return Ok(resp),
                Err(RecvTimeoutError::Timeout) => return Err(timed_out()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(HostCallError::new(site, Reason::Disconnected))
                }
            }
        }
    }
}

fn unexpected(site: CallSite, resp: &Response) -> HostCallError {
    HostCallError::new(site, Reason::Failed(format!("unexpected response {resp:?}")))
}

impl CallGate for ScriptConn {
    fn call(&mut self, opcode: u16, args: &[Arg]) -> Result<Completion, HostCallError> {
        let site = CallSite::Opcode(opcode);
        match self.request(site, Request::ExecInstr(opcode, args.to_vec()))? {
            Response::InstrDone { flag, wait_ms } => {
                // Waiting happens here, on the script's own thread.
                if wait_ms > 0 {
                    thread::sleep(Duration::from_millis(u64::from(wait_ms)));
                }
                Ok(Completion { flag, wait_ms })
            }
            other => Err(unexpected(site, &other)),
        }
    }

    fn var_value(
        &mut self,
        index: u32,
        global: bool,
        value: Option<Value>,
    ) -> Result<Value, HostCallError> {
        let var = VarHandle::new(Scope::from_global_flag(global), index);
        let site = CallSite::Variable(var);
        match self.request(site, Request::VarValue { var, value })? {
            Response::Var(v) => Ok(v),
            other => Err(unexpected(site, &other)),
        }
    }

    fn set_text(&mut self, key: &str, value: &str) -> Result<bool, HostCallError> {
        let request = Request::SetText {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.request(CallSite::Text, request)? {
            Response::Text(overwritten) => Ok(overwritten),
            other => Err(unexpected(CallSite::Text, &other)),
        }
    }
}

/// What the control loop should do after servicing a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    /// Nothing pending; go on to the next script.
    MoveOn,
    /// A request was answered and more may follow.
    Stay,
    /// The script thread has exited.
    Finished,
}

#[derive(thiserror::Error, Debug)]
pub enum UnitError {
    #[error("script '{name}' failed: {message}")]
    Script { name: String, message: String },

    #[error("failed to spawn thread for script '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

static NEXT_SCRIPT_ID: AtomicU64 = AtomicU64::new(1);

/// The control thread's proxy for one script.
pub struct ScriptUnit {
    name: String,
    id: ScriptId,
    sender: Sender<(u64, Response)>,
    receiver: Receiver<(u64, Request)>,
    join_handle: Option<JoinHandle<()>>,
    trace_bytecode: bool,
    finished: bool,
}

impl ScriptUnit {
    /// Start `body` on a new thread. Returns immediately; nothing the body asks
    /// for happens until the control thread calls [`ScriptUnit::exec_single`].
    pub fn spawn<F>(
        name: impl Into<String>,
        config: &BridgeConfig,
        body: F,
    ) -> Result<ScriptUnit, UnitError>
    where
        F: FnOnce(&mut ScriptConn) -> Result<(), HostCallError> + Send + 'static,
    {
        let name = name.into();
        let (to_ctrl, from_script) = crossbeam_channel::bounded(0);
        let (to_script, from_ctrl) = crossbeam_channel::unbounded();

        let mut conn = ScriptConn {
            name: name.clone(),
            sender: to_ctrl,
            receiver: from_ctrl,
            timeout: config.response_timeout(),
            last_seq: 0,
        };

        let join_handle = thread::Builder::new()
            .name(format!("script-{name}"))
            .spawn(move || match body(&mut conn) {
                Ok(()) => log::info!("script {} finished", conn.name),
                Err(e) if e.reason == Reason::Exiting => {
                    log::info!("script {} told to exit", conn.name)
                }
                Err(e) => {
                    // Nobody may be listening any more; the timeout keeps this
                    // thread from hanging around forever.
                    let _ = conn.send(Request::ReportErr(e.to_string()));
                }
            })
            .map_err(|source| UnitError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(ScriptUnit {
            name,
            id: ScriptId(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed)),
            sender: to_script,
            receiver: from_script,
            join_handle: Some(join_handle),
            trace_bytecode: config.trace_bytecode,
            finished: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which locals the gate hands this script.
    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Service at most one pending request against `gate`.
    ///
    /// Gate failures are sent back to the script, not returned here. Only a
    /// script that reported its own failure produces an error.
    pub fn exec_single<G: CallGate + ?Sized>(&mut self, gate: &mut G) -> Result<Focus, UnitError> {
        if self.finished {
            return Ok(Focus::Finished);
        }

        let (seq, request) = match self.receiver.try_recv() {
            Ok(r) => r,
            Err(TryRecvError::Empty) => return Ok(Focus::MoveOn),
            Err(TryRecvError::Disconnected) => {
                gate.release_script(self.id);
                self.finish();
                return Ok(Focus::Finished);
            }
        };

        gate.select_script(self.id);

        let response = match request {
            Request::ExecInstr(opcode, args) => match self.exec_instr(gate, opcode, args) {
                Ok(done) => Response::InstrDone {
                    flag: done.flag,
                    wait_ms: done.wait_ms,
                },
                Err(e) => Response::Failed(e),
            },
            Request::VarValue { var, value } => {
                match gate.var_value(var.index(), var.is_global(), value) {
                    Ok(v) => Response::Var(v),
                    Err(e) => Response::Failed(e),
                }
            }
            Request::SetText { key, value } => match gate.set_text(&key, &value) {
                Ok(overwritten) => Response::Text(overwritten),
                Err(e) => Response::Failed(e),
            },
            Request::ReportErr(message) => {
                self.reply(seq, Response::Exit);
                return Err(UnitError::Script {
                    name: self.name.clone(),
                    message,
                });
            }
        };

        self.reply(seq, response);
        Ok(Focus::Stay)
    }

    /// Service requests until none are pending or the script is done.
    pub fn exec_block<G: CallGate + ?Sized>(&mut self, gate: &mut G) -> Result<Focus, UnitError> {
        loop {
            match self.exec_single(gate)? {
                Focus::Stay => continue,
                focus => return Ok(focus),
            }
        }
    }

    /// Keep servicing, polling every `poll`, until the script thread exits.
    pub fn run_until_finished<G: CallGate + ?Sized>(
        &mut self,
        gate: &mut G,
        poll: Duration,
    ) -> Result<(), UnitError> {
        loop {
            match self.exec_block(gate)? {
                Focus::Finished => return Ok(()),
                _ => thread::sleep(poll),
            }
        }
    }

    /// Tell the script to exit and wait for its thread.
    ///
    /// Blocks until the script thread is gone.
    pub fn reset(&mut self) {
        if self.finished {
            return;
        }

        // Consumed by whatever the script asks for next.
        self.reply(0, Response::Exit);

        while let Ok((seq, _)) = self.receiver.recv() {
            self.reply(seq, Response::Exit);
        }

        self.finish();
        log::info!("Successfully shut down script {}.", self.name);
    }

    fn exec_instr<G: CallGate + ?Sized>(
        &self,
        gate: &mut G,
        opcode: u16,
        args: Vec<Arg>,
    ) -> Result<Completion, HostCallError> {
        let instr = Instr::new(opcode, args);

        // Assembling proves every argument has an SCM encoding before the
        // host sees it.
        let mut bytes = Instr::new(opcode, Vec::new())
            .to_bytes()
            .map_err(|e| HostCallError::opcode(opcode, Reason::Failed(e.to_string())))?;
        for (i, arg) in instr.args.iter().enumerate() {
            asm::write_arg(arg, &mut bytes)
                .map_err(|e| HostCallError::bad_argument(opcode, i + 1, e.to_string()))?;
        }

        if self.trace_bytecode {
            log::trace!("instruction: {}", instr);
            log::trace!("bytes: {}", asm::hex(&bytes));
        }

        gate.call(opcode, &instr.args)
    }

    fn reply(&self, seq: u64, response: Response) {
        if self.sender.send((seq, response)).is_err() {
            log::warn!("script {} is gone; response dropped", self.name);
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(handle) = self.join_handle.take() {
            if let Err(err) = handle.join() {
                log::error!("Script thread panicked on `join()`: {:?}", err);
            }
        }
    }
}

impl Drop for ScriptUnit {
    fn drop(&mut self) {
        // Don't join here: the script may be asleep inside a long wait.
        if !self.finished {
            let _ = self.sender.send((0, Response::Exit));
        }
    }
}
