//! The framer launch sequence and autopoll bookkeeping (§4.4).
//!
//! The launch sequence itself is inherently stateful — each step depends on the previous step's
//! response — so its ordering lives on [`crate::conductor::Conductor`]. This module holds the
//! pieces that are pure functions of their inputs: rendering the injected Python source, building
//! the individual [`Command`]s the sequence writes, and accumulating autopoll side-channel output
//! between `EOF` sentinels.

use std::collections::BTreeMap;

use crate::command::Command;
use crate::payload::TarJob;

/// The framer's source, with its `#{SUB}` placeholder still present.
const FRAMER_SOURCE_TEMPLATE: &str = include_str!("../assets/framer.py");

/// The sentinel line the framer emits to mark the end of one autopoll batch.
pub(crate) const AUTOPOLL_EOF_SENTINEL: &str = "EOF";

/// Renders the framer source for a conductor at `depth`, substituting `#{SUB}` with the
/// `DEPTH=N` assignment (and, if `verbose`, an additional `VERBOSE=1` line).
pub(crate) fn render_framer_source(depth: u32, verbose: bool) -> String {
    let sub = if verbose {
        format!("DEPTH = {depth}\nVERBOSE = 1")
    } else {
        format!("DEPTH = {depth}")
    };
    FRAMER_SOURCE_TEMPLATE.replacen("#{SUB}", &sub, 1)
}

/// Builds one [`Command::Setenv`] per entry in `vars`, in a deterministic order.
pub(crate) fn setenv_commands(vars: &BTreeMap<String, String>) -> Vec<Command> {
    vars.iter()
        .map(|(name, value)| Command::Setenv {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

/// Builds one [`Command::Write`] per tar job, given the already-packaged tar bytes for each
/// (packaging itself is an external collaborator's concern; see `payload.rs`).
pub(crate) fn write_commands(jobs: &[TarJob], tar_bytes: &[Vec<u8>]) -> Vec<Command> {
    jobs.iter()
        .zip(tar_bytes.iter())
        .map(|(job, bytes)| Command::Write {
            destination: job.destination.clone().into_bytes(),
            content: bytes.clone(),
        })
        .collect()
}

/// Builds the `framerSave` field map persisted on the remote side for later recovery.
pub(crate) fn framer_save_fields(
    dcs_id: &str,
    sshargs: &str,
    bool_args: &str,
    client_unique_id: &str,
) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("dcsID".to_string(), dcs_id.to_string());
    fields.insert("sshargs".to_string(), sshargs.to_string());
    fields.insert("boolArgs".to_string(), bool_args.to_string());
    fields.insert("clientUniqueID".to_string(), client_unique_id.to_string());
    fields
}

/// Accumulates side-channel lines tagged with [`crate::config::AUTOPOLL_PID`] between `EOF`
/// sentinels. A completed batch is handed to whatever process-info provider the caller wires up;
/// this module only tracks the buffering.
#[derive(Debug, Default)]
pub(crate) struct AutopollAccumulator {
    buf: Vec<u8>,
}

impl AutopollAccumulator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one autopoll-tagged line. Returns the completed batch (and resets) if this line was
    /// the `EOF` sentinel; otherwise appends the line and returns `None`.
    pub(crate) fn on_line(&mut self, line: &str) -> Option<Vec<u8>> {
        if line == AUTOPOLL_EOF_SENTINEL {
            Some(std::mem::take(&mut self.buf))
        } else {
            if !self.buf.is_empty() {
                self.buf.push(b'\n');
            }
            self.buf.extend_from_slice(line.as_bytes());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_depth_placeholder() {
        let rendered = render_framer_source(2, false);
        assert!(rendered.contains("DEPTH = 2"));
        assert!(!rendered.contains("#{SUB}"));
    }

    #[test]
    fn render_includes_verbose_when_requested() {
        let rendered = render_framer_source(0, true);
        assert!(rendered.contains("VERBOSE = 1"));
    }

    #[test]
    fn setenv_commands_cover_every_var() {
        let mut vars = BTreeMap::new();
        vars.insert("A".to_string(), "1".to_string());
        vars.insert("B".to_string(), "2".to_string());
        let cmds = setenv_commands(&vars);
        assert_eq!(cmds.len(), 2);
        assert!(cmds
            .iter()
            .all(|c| matches!(c, Command::Setenv { .. })));
    }

    #[test]
    fn autopoll_accumulates_until_eof() {
        let mut acc = AutopollAccumulator::new();
        assert_eq!(acc.on_line("pid=1 cpu=0.1"), None);
        assert_eq!(acc.on_line("pid=2 cpu=0.2"), None);
        let batch = acc.on_line("EOF").expect("eof completes the batch");
        assert_eq!(batch, b"pid=1 cpu=0.1\npid=2 cpu=0.2".to_vec());
    }

    #[test]
    fn autopoll_resets_after_each_batch() {
        let mut acc = AutopollAccumulator::new();
        acc.on_line("first");
        acc.on_line("EOF");
        assert_eq!(acc.on_line("EOF").unwrap(), Vec::<u8>::new());
    }
}
