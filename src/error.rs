use thiserror::Error;

/// Errors produced by the conductor.
///
/// This mirrors the taxonomy a reconnecting, recoverable remote session can actually hit:
/// the transport underneath the conductor can vanish at any time, the remote framer can send
/// something that doesn't fit the protocol, and the file RPC façade has its own narrow set of
/// outcomes dictated by the framer's `file` subcommand status codes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection to the remote framer (or, for a file RPC call, the in-flight command)
    /// was severed before a response arrived. Corresponds to the framer `file` status `< 0`
    /// case, to queue draining on delegate loss, and to a forced return to ground state.
    #[error("the connection was closed before a response arrived")]
    ConnectionClosed,

    /// The remote end returned something the state machine did not expect: a non-zero status
    /// where only success was assumed, a malformed PID, an unparseable Python version line, and
    /// so on. `fail()` is always invoked alongside raising this.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A file RPC operation's target path did not exist, or the framer reported a positive
    /// status. The framer does not distinguish a permission error from a missing path, so
    /// neither does this crate (see the open question this resolves in `DESIGN.md`).
    #[error("no such remote file")]
    FileNotFound,

    /// The framer reported overall success (status 0) but the payload it returned could not be
    /// decoded into the type the caller expected.
    #[error("could not decode remote response: {0}")]
    InternalError(String),

    /// One of the reserved file RPC stubs (`replace`, `setModificationDate`, `chmod`) was
    /// called. These exist in the façade's surface for API parity but have no framer
    /// counterpart yet.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Failed to encode or decode a conductor's JSON snapshot.
    #[error("failed to (de)serialize conductor state: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A `Result` alias using this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
