//! The background-job registry (§4.6): remote PIDs spawned by `run` that keep producing output
//! after their spawning command's `command-end` boundary, until a later `terminate` event.

use std::collections::HashMap;

use crate::handler::{Handler, HandlerOutcome};

// No `Debug` derive: `Handler` intentionally has none (it carries oneshot senders).
#[derive(Default)]
pub(crate) struct BackgroundJobs {
    jobs: HashMap<u64, Handler>,
}

impl BackgroundJobs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, pid: u64) -> bool {
        self.jobs.contains_key(&pid)
    }

    pub(crate) fn insert(&mut self, pid: u64, handler: Handler) {
        self.jobs.insert(pid, handler);
    }

    /// Routes side-channel output to the job for `pid`, if one is registered.
    pub(crate) fn on_side_channel(&mut self, pid: u64, channel: u8, data: &[u8]) -> bool {
        match self.jobs.get_mut(&pid) {
            Some(handler) => {
                handler.on_side_channel(channel, pid, data);
                true
            }
            None => false,
        }
    }

    /// The remote process exited; removes and finalizes its job, if tracked.
    pub(crate) fn terminate(&mut self, pid: u64, code: i32) -> Option<HandlerOutcome> {
        self.jobs.remove(&pid).map(|handler| handler.finalize(code))
    }

    /// Drains every tracked job, delivering `abort` to each (used when the delegate is lost).
    pub(crate) fn drain_abort(&mut self) {
        for (_, handler) in self.jobs.drain() {
            handler.on_abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_removes_and_finalizes() {
        let mut jobs = BackgroundJobs::new();
        jobs.insert(5678, Handler::BackgroundJob { buf: Vec::new(), cb: None });
        assert!(jobs.contains(5678));
        let outcome = jobs.terminate(5678, 0);
        assert!(outcome.is_some());
        assert!(!jobs.contains(5678));
    }

    #[test]
    fn side_channel_reaches_registered_job() {
        let mut jobs = BackgroundJobs::new();
        jobs.insert(5678, Handler::BackgroundJob { buf: Vec::new(), cb: None });
        assert!(jobs.on_side_channel(5678, 1, b"load: 0.1"));
        match jobs.terminate(5678, 0) {
            Some(crate::handler::HandlerOutcome::BackgroundJobDone { result, .. }) => {
                assert_eq!(result.0, b"load: 0.1");
                assert_eq!(result.1, 0);
            }
            _ => panic!("expected BackgroundJobDone"),
        }
    }

    #[test]
    fn unregistered_pid_is_not_consumed() {
        let mut jobs = BackgroundJobs::new();
        assert!(!jobs.on_side_channel(1, 1, b"x"));
        assert!(jobs.terminate(1, 0).is_none());
    }
}
