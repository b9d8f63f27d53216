//! How an in-flight [`Command`](crate::command::Command)'s response is consumed.
//!
//! Each [`Handler`] variant accumulates whatever subset of `line`/`side-channel`/`command-end`
//! events it cares about, and turns a terminal event into a [`HandlerOutcome`] that the
//! conductor's state machine acts on. Handlers that need to hand a result back to an `async`
//! caller (file RPC, `runRemoteCommand`, `poll`) carry the sending half of a
//! [`tokio::sync::oneshot`] channel rather than a stored closure — see §5 of `SPEC_FULL.md`.

use tokio::sync::oneshot;

/// A `(payload, status)` pair, matching the wire shape the framer uses to report completion of
/// a background job or a file RPC.
pub type PayloadAndStatus = (Vec<u8>, i32);

/// What the conductor should do once a handler observes a terminal event.
pub(crate) enum HandlerOutcome {
    /// Nothing further to do.
    None,
    /// A protocol violation was observed; `fail(reason)` must run.
    Fail(String),
    /// The Python version probe completed; `None` means the line could not be parsed at all.
    PythonVersion(Option<(u32, u32)>),
    /// The framer reported its login PID.
    FramerLoginPid(u64),
    /// Write these bytes directly (bypassing the queue), used to deliver the framer source
    /// followed by the `EOF` sentinel once `runpython` has been acknowledged.
    WriteRaw(Vec<u8>),
    /// A `framerRun` acknowledgement carried a PID; register a background job for it, seeding
    /// its buffer with whatever side-channel bytes had already arrived for that PID.
    BackgroundJobStarted {
        pid: u64,
        buf: Vec<u8>,
        cb: Option<oneshot::Sender<PayloadAndStatus>>,
    },
    /// A background job's output and final status, ready to deliver to its caller.
    BackgroundJobDone {
        result: PayloadAndStatus,
        cb: Option<oneshot::Sender<PayloadAndStatus>>,
    },
    /// A `poll` accumulated its lines; deliver them regardless of status.
    PollDone {
        payload: Vec<u8>,
        cb: Option<oneshot::Sender<Vec<u8>>>,
    },
    /// `getshell` output, parsed into its constituent fields.
    GetShellParsed {
        shell: String,
        home: String,
        version: String,
    },
    /// A file RPC call's raw result, ready for the façade to interpret.
    FileDone {
        result: PayloadAndStatus,
        cb: Option<oneshot::Sender<PayloadAndStatus>>,
    },
}

/// Consumes the events belonging to one in-flight [`Command`](crate::command::Command).
pub(crate) enum Handler {
    FailIfNonzeroStatus,
    CheckForPython {
        lines: Vec<String>,
    },
    FireAndForget,
    FramerLogin {
        lines: Vec<String>,
    },
    WriteOnSuccess {
        payload: Vec<u8>,
    },
    RunRemoteCommand {
        pid: Option<u64>,
        buf: Vec<u8>,
        cb: Option<oneshot::Sender<PayloadAndStatus>>,
    },
    BackgroundJob {
        buf: Vec<u8>,
        cb: Option<oneshot::Sender<PayloadAndStatus>>,
    },
    Poll {
        lines: Vec<String>,
        cb: Option<oneshot::Sender<Vec<u8>>>,
    },
    GetShell {
        lines: Vec<String>,
    },
    File {
        lines: Vec<String>,
        cb: Option<oneshot::Sender<PayloadAndStatus>>,
    },
}

impl Handler {
    /// A new handler for `runRemoteCommand`; `cb` is `None` when the caller dropped the
    /// receiving end of the result before the command even finished sending.
    pub(crate) fn run_remote_command(cb: Option<oneshot::Sender<PayloadAndStatus>>) -> Self {
        Handler::RunRemoteCommand {
            pid: None,
            buf: Vec::new(),
            cb,
        }
    }

    pub(crate) fn poll(cb: Option<oneshot::Sender<Vec<u8>>>) -> Self {
        Handler::Poll {
            lines: Vec::new(),
            cb,
        }
    }

    pub(crate) fn file(cb: Option<oneshot::Sender<PayloadAndStatus>>) -> Self {
        Handler::File {
            lines: Vec::new(),
            cb,
        }
    }

    /// A normal text-protocol line arrived, attributed to this command.
    pub(crate) fn on_line(&mut self, line: &str) {
        match self {
            Handler::FailIfNonzeroStatus | Handler::FireAndForget | Handler::WriteOnSuccess { .. } => {}
            Handler::CheckForPython { lines }
            | Handler::FramerLogin { lines }
            | Handler::Poll { lines, .. }
            | Handler::GetShell { lines }
            | Handler::File { lines, .. } => lines.push(line.to_string()),
            Handler::RunRemoteCommand { pid, .. } => {
                if pid.is_none() {
                    *pid = line.trim().parse().ok();
                }
            }
            Handler::BackgroundJob { .. } => {
                // Background jobs never observe a `line` event: by the time one is registered,
                // the command that spawned it has already reached `command-end`.
            }
        }
    }

    /// A side-channel line arrived. `channel == 1` is stdout. Returns whether this handler
    /// consumed it (relevant only for the pre-registration window of `RunRemoteCommand`, where
    /// the spawned PID is already known from the first response line but the job has not yet
    /// been promoted into the background-job registry).
    pub(crate) fn on_side_channel(&mut self, channel: u8, pid: u64, data: &[u8]) -> bool {
        match self {
            Handler::RunRemoteCommand {
                pid: known_pid,
                buf,
                ..
            } => {
                if *known_pid == Some(pid) && channel == 1 {
                    buf.extend_from_slice(data);
                    true
                } else {
                    false
                }
            }
            Handler::BackgroundJob { buf, .. } if channel == 1 => {
                buf.extend_from_slice(data);
                true
            }
            _ => false,
        }
    }

    /// The command boundary closed with `status`. Consumes the handler and returns what the
    /// conductor must do in response.
    pub(crate) fn finalize(self, status: i32) -> HandlerOutcome {
        match self {
            Handler::FailIfNonzeroStatus => {
                if status == 0 {
                    HandlerOutcome::None
                } else {
                    HandlerOutcome::Fail(format!("command exited with status {status}"))
                }
            }
            Handler::CheckForPython { lines } => {
                HandlerOutcome::PythonVersion(parse_python_version(&lines))
            }
            Handler::FireAndForget => HandlerOutcome::None,
            Handler::FramerLogin { lines } => {
                let joined = lines.join("").trim().to_string();
                match joined.parse::<u64>() {
                    Ok(pid) => HandlerOutcome::FramerLoginPid(pid),
                    Err(_) => HandlerOutcome::Fail(format!("malformed framer login pid: {joined:?}")),
                }
            }
            Handler::WriteOnSuccess { payload } => {
                if status == 0 {
                    let mut bytes = payload;
                    bytes.extend_from_slice(b"\nEOF\n");
                    HandlerOutcome::WriteRaw(bytes)
                } else {
                    HandlerOutcome::Fail(format!("runpython failed with status {status}"))
                }
            }
            Handler::RunRemoteCommand { pid, buf, cb } => match pid {
                Some(pid) => HandlerOutcome::BackgroundJobStarted { pid, buf, cb },
                None => HandlerOutcome::Fail("run did not return a pid".to_string()),
            },
            Handler::BackgroundJob { buf, cb } => {
                HandlerOutcome::BackgroundJobDone {
                    result: (buf, status),
                    cb,
                }
            }
            Handler::Poll { lines, cb } => HandlerOutcome::PollDone {
                payload: lines.join("\n").into_bytes(),
                cb,
            },
            Handler::GetShell { lines } => match parse_getshell(&lines) {
                Some((shell, home, version)) => {
                    HandlerOutcome::GetShellParsed { shell, home, version }
                }
                None => HandlerOutcome::Fail("malformed getshell response".to_string()),
            },
            Handler::File { lines, cb } => HandlerOutcome::FileDone {
                result: (lines.join("\n").into_bytes(), status),
                cb,
            },
        }
    }

    /// The command was abandoned (delegate lost, or a forced reset) before reaching a terminal
    /// event. Any caller awaiting a result observes it via their dropped or abort-fired channel.
    pub(crate) fn on_abort(self) {
        match self {
            Handler::RunRemoteCommand { cb, .. } => {
                if let Some(cb) = cb {
                    let _ = cb.send((Vec::new(), -1));
                }
            }
            Handler::BackgroundJob { cb, .. } => {
                if let Some(cb) = cb {
                    let _ = cb.send((Vec::new(), -1));
                }
            }
            Handler::Poll { cb, .. } => {
                if let Some(cb) = cb {
                    let _ = cb.send(Vec::new());
                }
            }
            Handler::File { cb, .. } => {
                if let Some(cb) = cb {
                    let _ = cb.send((Vec::new(), -1));
                }
            }
            Handler::FailIfNonzeroStatus
            | Handler::CheckForPython { .. }
            | Handler::FireAndForget
            | Handler::FramerLogin { .. }
            | Handler::WriteOnSuccess { .. }
            | Handler::GetShell { .. } => {}
        }
    }
}

/// Parses a `Python X.Y...` line into its major/minor version. Guards against the collected
/// lines being empty or not containing the expected prefix rather than indexing blindly.
fn parse_python_version(lines: &[String]) -> Option<(u32, u32)> {
    let line = lines.iter().find(|l| l.trim_start().starts_with("Python "))?;
    let rest = line.trim_start().strip_prefix("Python ")?;
    let mut parts = rest.trim().splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Parses `getshell` output: shell path, home directory, and (optional) shell version, each on
/// its own line. Per the open question this resolves, a response with fewer than 3 parts still
/// yields a result with an empty version rather than panicking.
fn parse_getshell(lines: &[String]) -> Option<(String, String, String)> {
    if lines.len() < 2 {
        return None;
    }
    let shell = lines[0].clone();
    let home = lines[1].clone();
    let version = if lines.len() >= 3 {
        lines[2..].join("\n")
    } else {
        String::new()
    };
    Some((shell, home, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_for_python_parses_version() {
        let mut h = Handler::CheckForPython { lines: Vec::new() };
        h.on_line("Python 3.8.1");
        match h.finalize(0) {
            HandlerOutcome::PythonVersion(Some((3, 8))) => {}
            other => panic!("unexpected outcome in test: {}", debug(&other)),
        }
    }

    #[test]
    fn check_for_python_rejects_garbage() {
        let mut h = Handler::CheckForPython { lines: Vec::new() };
        h.on_line("not python at all");
        match h.finalize(0) {
            HandlerOutcome::PythonVersion(None) => {}
            other => panic!("unexpected outcome in test: {}", debug(&other)),
        }
    }

    #[test]
    fn getshell_guards_short_response() {
        assert_eq!(
            parse_getshell(&["/bin/bash".to_string()]),
            None,
        );
        assert_eq!(
            parse_getshell(&["/bin/bash".to_string(), "/home/u".to_string()]),
            Some(("/bin/bash".to_string(), "/home/u".to_string(), String::new())),
        );
    }

    #[test]
    fn run_remote_command_promotes_to_background_job() {
        let mut h = Handler::run_remote_command(None);
        h.on_line("5678");
        match h.finalize(0) {
            HandlerOutcome::BackgroundJobStarted { pid, .. } => assert_eq!(pid, 5678),
            other => panic!("unexpected outcome in test: {}", debug(&other)),
        }
    }

    // `HandlerOutcome` intentionally has no `Debug` impl (it carries oneshot senders); this
    // helper renders just enough to make test failures legible.
    fn debug(outcome: &HandlerOutcome) -> &'static str {
        match outcome {
            HandlerOutcome::None => "None",
            HandlerOutcome::Fail(_) => "Fail",
            HandlerOutcome::PythonVersion(_) => "PythonVersion",
            HandlerOutcome::FramerLoginPid(_) => "FramerLoginPid",
            HandlerOutcome::WriteRaw(_) => "WriteRaw",
            HandlerOutcome::BackgroundJobStarted { .. } => "BackgroundJobStarted",
            HandlerOutcome::BackgroundJobDone { .. } => "BackgroundJobDone",
            HandlerOutcome::PollDone { .. } => "PollDone",
            HandlerOutcome::GetShellParsed { .. } => "GetShellParsed",
            HandlerOutcome::FileDone { .. } => "FileDone",
        }
    }
}
