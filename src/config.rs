//! Externally-tunable knobs, kept out of hardcoded constants so a caller can override launch
//! policy the same way a [`ConductorConfig`] groups them rather than threading separate
//! arguments through every constructor.

/// The sentinel PID the framer tags autopoll side-channel output with. Real remote PIDs are
/// always positive; PID 0 is reserved by the kernel and never assigned to a user process, so it
/// cannot collide with a real one.
pub const AUTOPOLL_PID: u64 = 0;

/// The lowest remote Python version the framer launch sequence will accept (§6).
pub const MINIMUM_PYTHON_VERSION: (u32, u32) = (3, 7);

/// Tunables for one conductor's startup and runtime policy.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    /// Minimum remote Python version required to attempt framing; below this, the conductor
    /// falls back to [`crate::command::Command::ExecLoginShell`].
    pub minimum_python_version: (u32, u32),
    /// Whether to kick off the autopoll loop once the framer has logged in.
    pub autopoll_enabled: bool,
    /// Whether to attempt shell-integration injection during `getshell` handling at all, before
    /// even consulting shell eligibility (§6).
    pub shell_integration_enabled: bool,
    /// Whether the injected framer should log to stderr (`VERBOSE=1`); useful when debugging a
    /// launch sequence against a real host.
    pub verbose_framer: bool,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            minimum_python_version: MINIMUM_PYTHON_VERSION,
            autopoll_enabled: true,
            shell_integration_enabled: true,
            verbose_framer: false,
        }
    }
}
