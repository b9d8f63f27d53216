//! The per-conductor state machine (§4.3).
//!
//! This module only defines the states and the in-flight execution context; the transition
//! logic lives on [`crate::conductor::Conductor`], because almost every transition also needs
//! to touch the queue, the background-job registry, or the parent chain.

use crate::command::Command;
use crate::handler::Handler;
use crate::recovery::RecoveryBuilder;

/// A queued or in-flight `(Command, Handler)` pair.
pub(crate) struct ExecutionContext {
    pub(crate) command: Command,
    pub(crate) handler: Handler,
}

impl ExecutionContext {
    pub(crate) fn new(command: Command, handler: Handler) -> Self {
        Self { command, handler }
    }
}

/// The `recovery` state's sub-state: either idle, or accumulating a `:recovery:` banner.
pub(crate) enum RecoverySub {
    Ground,
    Building(RecoveryBuilder),
}

/// One conductor's position in the protocol state machine.
///
/// Invariant (§3, invariant 1): at most one of `WillExecute`/`Executing` exists at a time, and
/// when one does, its context is not also present in the queue.
pub(crate) enum State {
    /// Idle; the next queued command (if any) may be dispatched immediately.
    Ground,
    /// A command was written; no response event has arrived yet.
    WillExecute(ExecutionContext),
    /// The first response event for the in-flight command arrived; its boundary is pending.
    Executing(ExecutionContext),
    /// The remote framer has been disabled; events pass through raw.
    Unhooked,
    /// Reconnecting: rediscovering a still-running framer's identity via the banner protocol.
    Recovery(RecoverySub),
    /// A transient latch entered right after a successful recovery, cleared once the parser
    /// resynchronizes (`didResynchronize`).
    Recovered,
}

impl State {
    pub(crate) fn is_idle_for_dispatch(&self) -> bool {
        matches!(self, State::Ground | State::Recovery(_))
    }

    pub(crate) fn has_in_flight_context(&self) -> bool {
        matches!(self, State::WillExecute(_) | State::Executing(_))
    }

    pub(crate) fn is_tolerant(&self) -> bool {
        matches!(
            self,
            State::Ground | State::Unhooked | State::Recovery(_) | State::Recovered
        )
    }

    /// Takes the in-flight context out of the state, leaving `Ground` behind. Used when a
    /// boundary or abort finalizes the current command.
    pub(crate) fn take_context(&mut self) -> Option<ExecutionContext> {
        match std::mem::replace(self, State::Ground) {
            State::WillExecute(ctx) | State::Executing(ctx) => Some(ctx),
            other => {
                *self = other;
                None
            }
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            State::Ground => "ground",
            State::WillExecute(_) => "will_execute",
            State::Executing(_) => "executing",
            State::Unhooked => "unhooked",
            State::Recovery(_) => "recovery",
            State::Recovered => "recovered",
        }
    }
}
