//! An in-process remote session conductor: a driver that multiplexes a single interactive
//! remote-shell transport into a user-facing interactive terminal, background command execution,
//! a remote file-manipulation RPC, and a recoverable, serializable session model supporting
//! nested hops (§1–§2).
//!
//! # What this crate does not do
//!
//! The conductor writes and reads opaque strings through a [`Delegate`] (§1, Non-goals): it has
//! no socket or TLS transport of its own, no PTY, and no terminal emulator. The upstream DCS
//! parser that turns raw bytes into [`ParserEvent`]s, the SSH subprocess that carries those
//! bytes, local credential storage, tar construction for upload payloads, and shell-integration
//! script generation are all external collaborators with the narrow interfaces this crate
//! consumes. There is no scheduling fairness guarantee across background jobs, and no
//! retransmission or sequence-number layer of its own: reliability of bytes is assumed from the
//! transport underneath the delegate.
//!
//! # The conductor tree
//!
//! One [`Conductor`] drives one nesting level (§3, §4.8). A conductor started inside the remote
//! shell that another conductor controls is a *child*: its outgoing bytes are routed to its
//! parent as a `framerSend` command instead of reaching the delegate directly, and parser events
//! tagged with a mismatched depth are forwarded up the chain. The root conductor is the only one
//! that ever touches a [`Delegate`].
//!
//! ```rust,no_run
//! use ssh_conductor::{Conductor, ConductorConfig, ParsedArgs};
//!
//! let mut root = Conductor::new(
//!     "me@example.com".to_string(),
//!     String::new(),
//!     ParsedArgs { command_args: vec![], identity: "root".to_string() },
//!     "dcs-1".to_string(),
//!     "client-1".to_string(),
//!     None,
//!     None,
//!     ConductorConfig::default(),
//! );
//! root.start();
//! ```
//!
//! # Recovery
//!
//! If the client that owns a conductor tree restarts while the remote framer is still running,
//! the parser begins delivering `:recovery:` banner lines instead of the usual command
//! boundaries (§4.5). Feeding those through [`Conductor::handle_event`] (after
//! [`Conductor::start_recovery`]) produces a [`ConductorRecovery`] once the banner completes,
//! which the caller uses to reconstruct `framed_pid` and resume the session without repeating
//! the framer launch sequence.
//!
//! # File RPC
//!
//! The [`file_rpc`] module is a thin async façade over the same single-stream protocol: each
//! public call enqueues one `framerFile` subcommand through [`Conductor`] (which implements
//! [`file_rpc::FileRpcDispatch`]) and suspends until its handler fires completion. All file
//! operations on one conductor serialize through its single command queue; there is no
//! parallelism between two file RPCs on the same conductor (§4.7).

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

mod background;
mod chunk;
pub mod command;
pub mod conductor;
pub mod config;
mod escape;
pub mod error;
pub mod event;
pub mod file_rpc;
mod framer;
mod handler;
pub mod payload;
pub mod recovery;
pub mod serialize;
mod shell;
mod state;

pub use command::{Command, FileSubcommand, ListSort};
pub use conductor::{Conductor, ParsedArgs};
pub use config::ConductorConfig;
pub use error::{Error, Result};
pub use event::{CommandKind, Delegate, ParserEvent};
pub use file_rpc::{FileRpcDispatch, RemoteFile, RemoteStat};
pub use payload::{normalize_destination, PayloadEntry, PayloadBuilder, TarJob};
pub use recovery::ConductorRecovery;
pub use serialize::{ConductorSnapshot, PayloadSnapshot};
