//! The conductor (§3, §4.2–§4.8): the single type that owns one nesting level's protocol state
//! machine, command queue, background-job registry and framer launch sequence, and ties them to
//! the external parser/delegate/file-RPC collaborators defined in [`crate::event`] and
//! [`crate::file_rpc`].
//!
//! A conductor tree is built bottom-up by its owner: construct the root with no parent, then for
//! each nested hop construct a child with `parent` set to a [`Weak`] reference to the (already
//! `Rc<RefCell<_>>`-wrapped) parent and `parent_pid` set to the PID by which that parent's framer
//! tracks the nested process. The back-reference is deliberately [`Weak`] (§9): nothing in this
//! crate owns the tree shape itself, so there is no cycle to break and no single node to call the
//! "owner" — whoever holds the `Rc`s is.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::rc::Weak;

use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use crate::background::BackgroundJobs;
use crate::chunk::chunk_for_wire;
use crate::command::{Command, FileSubcommand};
use crate::config::ConductorConfig;
use crate::error::Result;
use crate::event::{Delegate, ParserEvent};
use crate::file_rpc::FileRpcDispatch;
use crate::framer::{self, AutopollAccumulator};
use crate::handler::{Handler, HandlerOutcome};
use crate::payload::PayloadBuilder;
use crate::recovery::{classify, ConductorRecovery, RecoveryBuilder, RecoveryLine};
use crate::serialize::{ConductorSnapshot, PayloadSnapshot};
use crate::shell::is_shell_integration_eligible;
use crate::state::{ExecutionContext, RecoverySub, State};

/// The command-line arguments the framer login uses to start the nested shell/process, and the
/// identity string attached to the DCS wrapper for this conductor (§3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    /// The argv the remote process should be started with, e.g. `["-l"]` for a login shell.
    pub command_args: Vec<String>,
    /// A caller-chosen label for this conductor, carried through but never interpreted.
    pub identity: String,
}

/// One nesting level of a remote session: see the module documentation for how the tree is
/// assembled.
pub struct Conductor {
    config: ConductorConfig,

    sshargs: String,
    bool_args: String,
    parsed_args: ParsedArgs,
    dcs_id: String,
    client_unique_id: String,

    depth: u32,
    parent: Option<Weak<RefCell<Conductor>>>,
    /// The PID by which `parent`'s framer tracks this conductor's interactive process. `None`
    /// for the root, and for a not-yet-attached child.
    parent_pid: Option<u64>,

    vars_to_send: BTreeMap<String, String>,
    client_vars: BTreeMap<String, String>,
    modified_vars: BTreeMap<String, String>,
    modified_command_args: Vec<String>,
    initial_directory: Option<String>,
    should_inject_shell_integration: bool,

    payloads: PayloadBuilder,
    /// Packaged tar bytes for each of `payloads.build_jobs()`, in the same order. Packaging
    /// itself is an external collaborator's job (§1); this crate only carries the result.
    packaged_payloads: Vec<Vec<u8>>,
    /// Whether the last `getshell` probe judged the remote shell eligible for integration
    /// injection. Actually generating and writing that script is an external collaborator's job
    /// (§1); this field only records the decision for introspection/snapshotting.
    shell_integration_injected: bool,

    framed_pid: Option<u64>,
    state: State,
    queue: VecDeque<ExecutionContext>,
    background_jobs: BackgroundJobs,
    autopoll: AutopollAccumulator,
    pending_autopoll_batches: Vec<Vec<u8>>,

    delegate: Option<Box<dyn Delegate>>,
    /// Set by [`Conductor::from_snapshot`], cleared on the next [`Conductor::set_delegate`].
    restored: bool,
}

impl Conductor {
    /// Builds a fresh, unattached conductor at the root (`parent = None`) or as a nested hop.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sshargs: String,
        bool_args: String,
        parsed_args: ParsedArgs,
        dcs_id: String,
        client_unique_id: String,
        parent: Option<Weak<RefCell<Conductor>>>,
        parent_pid: Option<u64>,
        config: ConductorConfig,
    ) -> Self {
        let depth = parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|p| p.borrow().depth + 1)
            .unwrap_or(0);
        Conductor {
            config,
            sshargs,
            bool_args,
            parsed_args,
            dcs_id,
            client_unique_id,
            depth,
            parent,
            parent_pid,
            vars_to_send: BTreeMap::new(),
            client_vars: BTreeMap::new(),
            modified_vars: BTreeMap::new(),
            modified_command_args: Vec::new(),
            initial_directory: None,
            should_inject_shell_integration: true,
            payloads: PayloadBuilder::new(),
            packaged_payloads: Vec::new(),
            shell_integration_injected: false,
            framed_pid: None,
            state: State::Ground,
            queue: VecDeque::new(),
            background_jobs: BackgroundJobs::new(),
            autopoll: AutopollAccumulator::new(),
            pending_autopoll_batches: Vec::new(),
            delegate: None,
            restored: false,
        }
    }

    // --- accessors ---

    /// This conductor's nesting depth; `0` for the root.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether this conductor's framer login has completed (§3, invariant 2).
    pub fn framing(&self) -> bool {
        self.framed_pid.is_some()
    }

    /// The PID the remote framer reported for its login shell, once framing has completed.
    pub fn framed_pid(&self) -> Option<u64> {
        self.framed_pid
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Whether the last `getshell` probe judged the remote shell eligible for shell-integration
    /// injection (§6).
    pub fn shell_integration_injected(&self) -> bool {
        self.shell_integration_injected
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Queues a local variable to export into the remote shell before launch.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars_to_send.insert(name.into(), value.into());
    }

    pub fn set_client_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.client_vars.insert(name.into(), value.into());
    }

    pub fn set_initial_directory(&mut self, dir: impl Into<String>) {
        self.initial_directory = Some(dir.into());
    }

    pub fn set_should_inject_shell_integration(&mut self, enabled: bool) {
        self.should_inject_shell_integration = enabled;
    }

    /// Supplies the already-packaged tar bytes for each of [`PayloadBuilder::build_jobs`], in
    /// order. Must be called before [`Conductor::start`] if any payloads were [`add`](Self::add)ed.
    pub fn set_packaged_payloads(&mut self, tar_bytes: Vec<Vec<u8>>) {
        self.packaged_payloads = tar_bytes;
    }

    /// Installs the transport collaborator and flushes anything already queued. Clears the
    /// `restored` flag: a decoded-but-undelivered snapshot becomes live again once it has
    /// somewhere to write.
    pub fn set_delegate(&mut self, delegate: Box<dyn Delegate>) {
        self.delegate = Some(delegate);
        self.restored = false;
        self.dequeue();
    }

    /// Drains and returns autopoll batches accumulated since the last call. The process-info
    /// provider that interprets these bytes is an external collaborator (§4.4); this crate only
    /// buffers them between `EOF` sentinels.
    pub fn take_autopoll_batches(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.pending_autopoll_batches)
    }

    // --- public API (§6) ---

    /// Starts the launch sequence: probes the remote login shell.
    pub fn start(&mut self) {
        self.send(Command::GetShell, Handler::GetShell { lines: Vec::new() });
    }

    /// Quits the session: asks the framer (if any) or the bare shell to exit, and notifies the
    /// delegate that shutdown is underway.
    pub fn quit(&mut self) {
        if self.framing() {
            self.send(Command::FramerQuit, Handler::FireAndForget);
        } else {
            self.send(Command::Quit, Handler::FireAndForget);
        }
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.conductor_quit();
        }
    }

    /// Puts this conductor into the `:begin-recovery`/`:recovery:`/`:end-recovery` banner state,
    /// used when reconnecting to a transport that may still have a live framer on the other end.
    pub fn start_recovery(&mut self) {
        self.state = State::Recovery(RecoverySub::Ground);
    }

    /// Hook for callers that want an explicit "the recovered identity has been applied" signal
    /// once [`Conductor::handle_event`] returns a completed [`ConductorRecovery`]. By that point
    /// `framedPID` and `state` are already updated (§4.5), so there is nothing left to mutate
    /// here; it exists purely for symmetry with [`Conductor::did_resynchronize`].
    pub fn recovery_did_finish(&self) {}

    /// Clears the transient [`State::Recovered`] latch, allowing queued dispatch to resume.
    /// Call once the terminal/parser has caught up after a [`Conductor::reset`] on a still-live
    /// framer.
    pub fn did_resynchronize(&mut self) {
        if matches!(self.state, State::Recovered) {
            self.state = State::Ground;
            self.dequeue();
        }
    }

    /// Forces this conductor back to `ground`, discarding in-flight and queued work (every
    /// pending handler observes `on_abort`). If still framing, enters the transient `recovered`
    /// latch rather than `ground` directly, since the remote framer is presumed to still be
    /// alive and the caller's terminal needs to catch up before new commands are dispatched.
    pub fn reset(&mut self) {
        self.force_return_to_ground_state("reset");
        if self.framing() {
            self.state = State::Recovered;
        }
    }

    /// [`Conductor::reset`], then propagates the same reset up the parent chain.
    pub fn reset_transitively(&mut self) {
        self.reset();
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.borrow_mut().reset_transitively();
        }
    }

    /// Queues a local file for upload to `destination` on the next launch (§4.4).
    pub fn add(&mut self, local_path: impl Into<PathBuf>, destination: &str) {
        self.payloads.add(local_path, destination);
    }

    /// Registers interest in a remote process's lifecycle (fire-and-forget).
    pub fn register_process(&mut self, pid: u64) {
        self.send(Command::FramerRegister { pid }, Handler::FireAndForget);
    }

    /// Deregisters interest in a remote process's lifecycle (fire-and-forget).
    pub fn deregister_process(&mut self, pid: u64) {
        self.send(Command::FramerDeregister { pid }, Handler::FireAndForget);
    }

    /// Requests any buffered output across all tracked processes. A `poll` already queued (and
    /// not yet dispatched) coalesces with this one: the later call's callback is simply dropped,
    /// per the documented coalescing exception to FIFO ordering (§3).
    pub fn poll(&mut self, cb: oneshot::Sender<Vec<u8>>) {
        if self
            .queue
            .iter()
            .any(|ctx| matches!(ctx.command, Command::FramerPoll))
        {
            trace!("dropping coalesced poll");
            return;
        }
        self.send(Command::FramerPoll, Handler::poll(Some(cb)));
    }

    /// Runs `cmdline` as a background process. Resolves `cb` with `(Vec::new(), -1)` immediately
    /// if this conductor is not framing yet, since the framer is what tracks background PIDs.
    pub fn run_remote_command(&mut self, cmdline: String, cb: oneshot::Sender<(Vec<u8>, i32)>) {
        if !self.framing() {
            let _ = cb.send((Vec::new(), -1));
            return;
        }
        self.send(
            Command::FramerRun { cmdline },
            Handler::run_remote_command(Some(cb)),
        );
    }

    /// Sends keystrokes to this conductor's own interactive process: wrapped as `framerSend`
    /// when framing, or passed straight through to the delegate otherwise.
    pub fn send_keys(&mut self, bytes: &[u8]) {
        if self.framing() {
            self.dispatch_write(&Command::FramerSend {
                pid: self.framed_pid.expect("framing implies framedPID is set"),
                bytes: bytes.to_vec(),
            });
        } else {
            self.emit(bytes.to_vec());
        }
    }

    // --- dispatcher (§4.2) ---

    fn can_transmit(&self) -> bool {
        self.delegate.is_some() || self.parent.as_ref().and_then(Weak::upgrade).is_some()
    }

    fn send(&mut self, command: Command, handler: Handler) {
        self.queue.push_back(ExecutionContext::new(command, handler));
        if self.state.is_idle_for_dispatch() {
            self.dequeue();
        }
    }

    fn dequeue(&mut self) {
        if self.state.has_in_flight_context() {
            return;
        }
        if !self.can_transmit() {
            self.force_return_to_ground_state("delegate unavailable");
            return;
        }
        let Some(ctx) = self.queue.pop_front() else {
            return;
        };
        trace!(command = %ctx.command.operation_description(), "dispatching");
        self.dispatch_write(&ctx.command);
        self.state = State::WillExecute(ctx);
    }

    /// Renders `command`'s chunked wire form and commits it (§4.1, §4.2).
    fn dispatch_write(&mut self, command: &Command) {
        let rendered = chunk_for_wire(&command.string_value(), command.is_framer_command());
        self.emit(rendered.into_bytes());
    }

    /// Commits `bytes` to the transport exactly as given: either this conductor's own delegate,
    /// or — when nested — wrapped as a `framerSend` targeting the PID by which the parent's
    /// framer tracks this conductor, recursively until the root writes to its delegate (§4.2,
    /// §4.8). Re-entrant dispatch is already excluded by `&mut self` and the state machine (§9):
    /// `dequeue` only ever writes the head of the queue once per `command-end`/`send`.
    fn emit(&mut self, bytes: Vec<u8>) {
        match (self.parent.as_ref().and_then(Weak::upgrade), self.parent_pid) {
            (Some(parent), Some(pid)) => {
                let wrapped = Command::FramerSend { pid, bytes };
                let rendered = chunk_for_wire(&wrapped.string_value(), true);
                parent.borrow_mut().emit(rendered.into_bytes());
            }
            _ => {
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.conductor_write(&bytes);
                }
            }
        }
    }

    fn drain_queue_abort(&mut self) {
        while let Some(ctx) = self.queue.pop_front() {
            ctx.handler.on_abort();
        }
    }

    fn force_return_to_ground_state(&mut self, reason: &str) {
        trace!(reason, "forcing return to ground state");
        if let Some(ctx) = self.state.take_context() {
            ctx.handler.on_abort();
        }
        self.drain_queue_abort();
        self.background_jobs.drain_abort();
        self.state = State::Ground;
    }

    /// §7: a protocol violation resets this conductor and every ancestor, makes a best-effort
    /// attempt to leave the user with a working shell, and notifies the delegate.
    fn fail(&mut self, reason: String) {
        error!(reason = %reason, "protocol violation");
        self.force_return_to_ground_state(&reason);
        self.dispatch_write(&Command::ExecLoginShell);
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.conductor_abort(&reason);
        }
        let mut ancestor = self.parent.as_ref().and_then(Weak::upgrade);
        while let Some(parent) = ancestor {
            let next = {
                let mut parent_mut = parent.borrow_mut();
                parent_mut.force_return_to_ground_state(&reason);
                parent_mut.parent.as_ref().and_then(Weak::upgrade)
            };
            ancestor = next;
        }
    }

    // --- event handling (§4.3, §4.8) ---

    /// Delivers one parser event. Returns a completed [`ConductorRecovery`] if this event closed
    /// the `:recovery:` banner.
    ///
    /// If `event`'s depth doesn't match this conductor's own and it is currently framing, the
    /// event is forwarded unchanged to the parent; recursion terminates at the root, which
    /// always processes the event itself regardless of depth (§4.8).
    pub fn handle_event(&mut self, event: ParserEvent) -> Option<ConductorRecovery> {
        if event.depth() != self.depth && self.framing() {
            if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
                return parent.borrow_mut().handle_event(event);
            }
        }
        match event {
            ParserEvent::Line { text, .. } => {
                self.on_line(&text);
                None
            }
            ParserEvent::Unhook { .. } => {
                self.on_unhook();
                None
            }
            ParserEvent::CommandBegin { id, .. } => {
                self.on_command_begin(id);
                None
            }
            ParserEvent::CommandEnd { status, .. } => {
                self.on_command_end(status);
                None
            }
            ParserEvent::Terminate { pid, code, .. } => {
                self.on_terminate(pid, code);
                None
            }
            ParserEvent::SideChannelOutput {
                pid, channel, data, ..
            } => {
                self.on_side_channel(pid, channel, &data);
                None
            }
            ParserEvent::Recovery { line, .. } => self.on_recovery_line(&line),
        }
    }

    fn on_line(&mut self, text: &str) {
        match std::mem::replace(&mut self.state, State::Ground) {
            State::WillExecute(mut ctx) | State::Executing(mut ctx) => {
                ctx.handler.on_line(text);
                self.state = State::Executing(ctx);
            }
            other => {
                if !other.is_tolerant() {
                    warn!(state = other.name(), line = text, "line outside in-flight command");
                }
                self.state = other;
            }
        }
    }

    fn on_unhook(&mut self) {
        debug!("framer disabled, falling to passthrough");
        self.state = State::Unhooked;
    }

    fn on_command_begin(&mut self, _id: u64) {
        match std::mem::replace(&mut self.state, State::Ground) {
            State::WillExecute(ctx) => self.state = State::Executing(ctx),
            other => {
                if !other.is_tolerant() {
                    warn!(state = other.name(), "unexpected command-begin");
                }
                self.state = other;
            }
        }
    }

    fn on_command_end(&mut self, status: i32) {
        let ctx = match self.state.take_context() {
            Some(ctx) => ctx,
            None => {
                warn!(status, "command-end with no in-flight command");
                return;
            }
        };
        debug!(command = %ctx.command.operation_description(), status, "command finished");
        let outcome = ctx.handler.finalize(status);
        self.apply_outcome(outcome);
        self.dequeue();
    }

    fn on_terminate(&mut self, pid: u64, code: i32) {
        if self.framed_pid == Some(pid) {
            debug!(pid, code, "framer process exited");
            self.framed_pid = None;
            self.send(Command::FramerQuit, Handler::FireAndForget);
            return;
        }
        if let Some(outcome) = self.background_jobs.terminate(pid, code) {
            self.apply_outcome(outcome);
        }
    }

    fn on_side_channel(&mut self, pid: u64, channel: u8, data: &[u8]) {
        if pid == crate::config::AUTOPOLL_PID {
            let line = String::from_utf8_lossy(data).into_owned();
            if let Some(batch) = self.autopoll.on_line(&line) {
                self.pending_autopoll_batches.push(batch);
                if self.config.autopoll_enabled {
                    self.send(Command::FramerAutopoll, Handler::FireAndForget);
                }
            }
            return;
        }
        if self.background_jobs.on_side_channel(pid, channel, data) {
            return;
        }
        if let State::WillExecute(ctx) | State::Executing(ctx) = &mut self.state {
            ctx.handler.on_side_channel(channel, pid, data);
        }
    }

    fn on_recovery_line(&mut self, line: &str) -> Option<ConductorRecovery> {
        match classify(line) {
            RecoveryLine::Begin => {
                if matches!(self.state, State::Ground | State::Unhooked) {
                    self.state = State::Recovery(RecoverySub::Building(RecoveryBuilder::new()));
                } else {
                    warn!(state = self.state.name(), "unexpected :begin-recovery");
                }
                None
            }
            RecoveryLine::Field { key, value } => {
                if let State::Recovery(RecoverySub::Building(builder)) = &mut self.state {
                    builder.set_field(&key, &value);
                } else {
                    warn!(state = self.state.name(), key = %key, "recovery field outside banner");
                }
                None
            }
            RecoveryLine::End => match std::mem::replace(&mut self.state, State::Ground) {
                State::Recovery(RecoverySub::Building(builder)) => match builder.finish() {
                    Some(recovery) => {
                        self.framed_pid = Some(recovery.pid);
                        debug!(pid = recovery.pid, "recovered framer identity");
                        Some(recovery)
                    }
                    None => {
                        warn!("incomplete recovery banner, quitting");
                        self.quit();
                        None
                    }
                },
                other => {
                    warn!(state = other.name(), "unexpected :end-recovery");
                    self.state = other;
                    None
                }
            },
            RecoveryLine::Unrecognized => {
                warn!(line, "unrecognized recovery line");
                None
            }
        }
    }

    // --- launch sequence (§4.4) ---

    fn apply_outcome(&mut self, outcome: HandlerOutcome) {
        match outcome {
            HandlerOutcome::None => {}
            HandlerOutcome::Fail(reason) => self.fail(reason),
            HandlerOutcome::PythonVersion(version) => self.continue_after_python_probe(version),
            HandlerOutcome::FramerLoginPid(pid) => {
                self.framed_pid = Some(pid);
                debug!(pid, "framer login established");
                if self.config.autopoll_enabled {
                    self.send(Command::FramerAutopoll, Handler::FireAndForget);
                }
            }
            HandlerOutcome::WriteRaw(bytes) => {
                self.emit(bytes);
                self.queue_framer_save_and_login();
            }
            HandlerOutcome::BackgroundJobStarted { pid, buf, cb } => {
                debug!(pid, "background job started");
                self.background_jobs
                    .insert(pid, Handler::BackgroundJob { buf, cb });
            }
            HandlerOutcome::BackgroundJobDone { result, cb } => {
                if let Some(cb) = cb {
                    let _ = cb.send(result);
                }
            }
            HandlerOutcome::PollDone { payload, cb } => {
                if let Some(cb) = cb {
                    let _ = cb.send(payload);
                }
            }
            HandlerOutcome::GetShellParsed { shell, home, version } => {
                self.continue_after_getshell(shell, home, version);
            }
            HandlerOutcome::FileDone { result, cb } => {
                if let Some(cb) = cb {
                    let _ = cb.send(result);
                }
            }
        }
    }

    fn continue_after_getshell(&mut self, shell: String, _home: String, version: String) {
        let eligible = self.should_inject_shell_integration
            && self.config.shell_integration_enabled
            && is_shell_integration_eligible(&shell, &version);
        self.shell_integration_injected = eligible;
        debug!(shell = %shell, eligible, "getshell probe complete");

        // Actually generating the shell-integration script is an external collaborator's job
        // (§1); this crate only decides eligibility and carries the resulting variable/argv
        // overrides through unmodified.
        self.modified_vars = self.vars_to_send.clone();
        self.modified_command_args = self.parsed_args.command_args.clone();

        for cmd in framer::setenv_commands(&self.modified_vars) {
            self.send(cmd, Handler::FailIfNonzeroStatus);
        }

        let jobs = self.payloads.build_jobs();
        if !jobs.is_empty() {
            if jobs.len() == self.packaged_payloads.len() {
                for cmd in framer::write_commands(&jobs, &self.packaged_payloads) {
                    self.send(cmd, Handler::FailIfNonzeroStatus);
                }
            } else {
                warn!(
                    jobs = jobs.len(),
                    packaged = self.packaged_payloads.len(),
                    "payload jobs queued without matching packaged tar bytes; skipping upload"
                );
            }
        }

        if let Some(dir) = self.initial_directory.clone() {
            self.send(Command::Cd { path: dir }, Handler::FailIfNonzeroStatus);
        }

        self.send(
            Command::Shell {
                cmdline: "python3 -V".to_string(),
            },
            Handler::CheckForPython { lines: Vec::new() },
        );
    }

    fn continue_after_python_probe(&mut self, version: Option<(u32, u32)>) {
        match version {
            Some(v) if v >= self.config.minimum_python_version => {
                let source = framer::render_framer_source(self.depth, self.config.verbose_framer);
                self.send(
                    Command::RunPython,
                    Handler::WriteOnSuccess {
                        payload: source.into_bytes(),
                    },
                );
            }
            Some(v) => {
                debug!(major = v.0, minor = v.1, "remote python too old, falling back to login shell");
                self.send(Command::ExecLoginShell, Handler::FireAndForget);
            }
            None => self.fail("could not parse `python3 -V` output".to_string()),
        }
    }

    fn queue_framer_save_and_login(&mut self) {
        let fields = framer::framer_save_fields(
            &self.dcs_id,
            &self.sshargs,
            &self.bool_args,
            &self.client_unique_id,
        );
        self.send(Command::FramerSave { fields }, Handler::FireAndForget);

        let cwd = self
            .initial_directory
            .clone()
            .unwrap_or_else(|| "$HOME".to_string());
        let argv = if self.modified_command_args.is_empty() {
            self.parsed_args.command_args.clone()
        } else {
            self.modified_command_args.clone()
        };
        self.send(
            Command::FramerLogin { cwd, argv },
            Handler::FramerLogin { lines: Vec::new() },
        );
    }

    // --- serialization (§4.9) ---

    /// Builds this conductor's own snapshot, nesting `children` (already snapshotted by the
    /// caller) under it. This conductor does not track its own children (§9: ownership of the
    /// tree lives with whoever holds the `Rc`s), so the caller supplies them.
    pub fn snapshot(&self, children: Vec<ConductorSnapshot>) -> ConductorSnapshot {
        ConductorSnapshot {
            sshargs: self.sshargs.clone(),
            vars_to_send: self.vars_to_send.clone(),
            client_vars: self.client_vars.clone(),
            payloads: self
                .payloads
                .entries()
                .iter()
                .map(|e| PayloadSnapshot {
                    local_path: e.local_path.to_string_lossy().into_owned(),
                    destination: e.destination.clone(),
                })
                .collect(),
            initial_directory: self.initial_directory.clone(),
            should_inject_shell_integration: self.should_inject_shell_integration,
            parsed_args: self.parsed_args.command_args.clone(),
            depth: self.depth,
            framed_pid: self.framed_pid,
            state: "ground".to_string(),
            queue: Vec::new(),
            bool_args: self.bool_args.clone(),
            dcs_id: self.dcs_id.clone(),
            client_unique_id: self.client_unique_id.clone(),
            modified_vars: self.modified_vars.clone(),
            modified_command_args: self.modified_command_args.clone(),
            children,
        }
    }

    pub fn to_json(&self, children: Vec<ConductorSnapshot>) -> Result<String> {
        self.snapshot(children).to_json()
    }

    /// Rebuilds a conductor from a decoded snapshot. `parent`/`parent_pid` are supplied by the
    /// caller reconstructing the tree top-down (§9); `background_jobs`, `state` and `queue` start
    /// fresh regardless of what the snapshot carried, since none of those survive a restart.
    pub fn from_snapshot(
        snap: &ConductorSnapshot,
        parent: Option<Weak<RefCell<Conductor>>>,
        parent_pid: Option<u64>,
        config: ConductorConfig,
    ) -> Self {
        let mut payloads = PayloadBuilder::new();
        for entry in &snap.payloads {
            payloads.add(entry.local_path.clone(), &entry.destination);
        }
        Conductor {
            config,
            sshargs: snap.sshargs.clone(),
            bool_args: snap.bool_args.clone(),
            parsed_args: ParsedArgs {
                command_args: snap.parsed_args.clone(),
                identity: String::new(),
            },
            dcs_id: snap.dcs_id.clone(),
            client_unique_id: snap.client_unique_id.clone(),
            depth: snap.depth,
            parent,
            parent_pid,
            vars_to_send: snap.vars_to_send.clone(),
            client_vars: snap.client_vars.clone(),
            modified_vars: snap.modified_vars.clone(),
            modified_command_args: snap.modified_command_args.clone(),
            initial_directory: snap.initial_directory.clone(),
            should_inject_shell_integration: snap.should_inject_shell_integration,
            payloads,
            packaged_payloads: Vec::new(),
            shell_integration_injected: false,
            framed_pid: snap.framed_pid,
            state: State::Ground,
            queue: VecDeque::new(),
            background_jobs: BackgroundJobs::new(),
            autopoll: AutopollAccumulator::new(),
            pending_autopoll_batches: Vec::new(),
            delegate: None,
            restored: true,
        }
    }
}

impl FileRpcDispatch for Conductor {
    fn dispatch_file(&mut self, sub: FileSubcommand) -> oneshot::Receiver<(Vec<u8>, i32)> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::FramerFile { sub }, Handler::file(Some(tx)));
        rx
    }
}
