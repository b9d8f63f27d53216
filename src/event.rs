//! Events the upstream DCS parser delivers to a conductor, and the delegate it writes through.
//!
//! Both are external collaborators (§1): the parser and the transport live outside this crate.
//! This module only defines the shapes the conductor consumes and produces.

/// Disambiguates a `command-end` boundary between a framer-targeted command and one executed
/// directly by the login shell, needed when a non-framing conductor has a framing parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// The command was a framer subcommand.
    Framer,
    /// The command ran directly in the login shell.
    Raw,
}

/// One event produced by the upstream DCS parser, always tagged with the nesting `depth` it was
/// observed at (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    /// A plain output line.
    Line { depth: u32, text: String },
    /// The framer (or remote shell) disabled command framing; passthrough begins.
    Unhook { depth: u32 },
    /// A DCS command boundary opened.
    CommandBegin { depth: u32, id: u64 },
    /// A DCS command boundary closed.
    CommandEnd {
        depth: u32,
        id: u64,
        kind: CommandKind,
        status: i32,
    },
    /// A tracked remote process exited.
    Terminate { depth: u32, pid: u64, code: i32 },
    /// A side-channel byte stream line, tagged with the PID and channel it belongs to.
    SideChannelOutput {
        depth: u32,
        pid: u64,
        channel: u8,
        data: Vec<u8>,
    },
    /// One line of the `:recovery:` banner protocol.
    Recovery { depth: u32, line: String },
}

impl ParserEvent {
    /// The nesting depth this event was observed at.
    pub fn depth(&self) -> u32 {
        match self {
            ParserEvent::Line { depth, .. }
            | ParserEvent::Unhook { depth }
            | ParserEvent::CommandBegin { depth, .. }
            | ParserEvent::CommandEnd { depth, .. }
            | ParserEvent::Terminate { depth, .. }
            | ParserEvent::SideChannelOutput { depth, .. }
            | ParserEvent::Recovery { depth, .. } => *depth,
        }
    }
}

/// External collaborator the conductor writes through and reports terminal conditions to.
///
/// Implemented by whatever owns the actual transport (an SSH subprocess's stdin, a PTY, a test
/// double); the conductor never touches a socket or subprocess handle directly (§1, Non-goals).
pub trait Delegate: std::fmt::Debug {
    /// Write opaque bytes to the transport.
    fn conductor_write(&mut self, bytes: &[u8]);
    /// A fatal, unrecoverable condition occurred; `reason` is for logs/diagnostics.
    fn conductor_abort(&mut self, reason: &str);
    /// The conductor is shutting down in an orderly fashion.
    fn conductor_quit(&mut self);
}
