//! The tagged union of every operation the conductor can send down the wire, and its
//! serialization to the line-oriented record the remote end (shell or framer) expects.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::BTreeMap;

use crate::escape::{escape, escape_setenv_value};

fn escape_arg(s: &str) -> String {
    escape(std::ffi::OsStr::new(s)).to_string_lossy().into_owned()
}

/// How a [`FileSubcommand::Ls`] listing should be ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSort {
    /// Sort entries by file name.
    ByName,
    /// Sort entries by modification date.
    ByDate,
}

impl ListSort {
    fn wire_flag(self) -> &'static str {
        match self {
            ListSort::ByName => "n",
            ListSort::ByDate => "d",
        }
    }
}

/// The `framerFile` subcommands exposed by the remote framer's `file` verb.
///
/// Every path and content argument travels on the wire as base64, since the underlying
/// transport is a line-oriented text protocol and arbitrary bytes (including newlines) must
/// survive a hop through it unscathed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSubcommand {
    /// List the contents of a directory.
    Ls { path: Vec<u8>, sort: ListSort },
    /// Read the full contents of a file.
    Fetch { path: Vec<u8> },
    /// Stat a path without reading it.
    Stat { path: Vec<u8> },
    /// Remove a path, optionally recursively.
    Rm { path: Vec<u8>, recursive: bool },
    /// Create a symlink `symlink` pointing at `source`.
    Ln { source: Vec<u8>, symlink: Vec<u8> },
    /// Rename/move `source` to `dest`.
    Mv { source: Vec<u8>, dest: Vec<u8> },
    /// Create a directory.
    Mkdir { path: Vec<u8> },
    /// Create a file with the given content.
    Create { path: Vec<u8>, content: Vec<u8> },
}

/// Base64 content is wrapped at this width when it is split across continuation lines inside
/// a `create` subcommand body. This is independent of, and smaller than, the dispatcher's
/// 128-byte wire chunk limit (§4.1 / §4.4 of the design doc).
const CREATE_CONTENT_CHUNK_WIDTH: usize = 80;

fn chunk_base64(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(CREATE_CONTENT_CHUNK_WIDTH)
        .map(|c| std::str::from_utf8(c).expect("base64 alphabet is ASCII"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl FileSubcommand {
    fn wire_body(&self) -> String {
        match self {
            FileSubcommand::Ls { path, sort } => {
                format!("ls\n{}\n{}", BASE64.encode(path), sort.wire_flag())
            }
            FileSubcommand::Fetch { path } => format!("fetch\n{}", BASE64.encode(path)),
            FileSubcommand::Stat { path } => format!("stat\n{}", BASE64.encode(path)),
            FileSubcommand::Rm { path, recursive } => format!(
                "rm\n{}\n{}",
                BASE64.encode(path),
                if *recursive { "y" } else { "n" }
            ),
            FileSubcommand::Ln { source, symlink } => {
                format!("ln\n{}\n{}", BASE64.encode(source), BASE64.encode(symlink))
            }
            FileSubcommand::Mv { source, dest } => {
                format!("mv\n{}\n{}", BASE64.encode(source), BASE64.encode(dest))
            }
            FileSubcommand::Mkdir { path } => format!("mkdir\n{}", BASE64.encode(path)),
            FileSubcommand::Create { path, content } => format!(
                "create\n{}\n{}",
                BASE64.encode(path),
                chunk_base64(&BASE64.encode(content))
            ),
        }
    }

    fn description(&self) -> String {
        match self {
            FileSubcommand::Ls { .. } => "list remote directory".into(),
            FileSubcommand::Fetch { .. } => "fetch remote file".into(),
            FileSubcommand::Stat { .. } => "stat remote path".into(),
            FileSubcommand::Rm { .. } => "remove remote path".into(),
            FileSubcommand::Ln { .. } => "symlink remote path".into(),
            FileSubcommand::Mv { .. } => "move remote path".into(),
            FileSubcommand::Mkdir { .. } => "create remote directory".into(),
            FileSubcommand::Create { .. } => "create remote file".into(),
        }
    }
}

/// A single wire-level operation the conductor can enqueue.
///
/// Variants are grouped into two families: those executed directly by the login shell before
/// (or instead of) framing, and those that target the remote framer once it is running. Both
/// families are modeled here as one enum because they share the same queue, state machine, and
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // --- non-framer family ---
    /// Fall back to an interactive login shell (used when Python is too old, or as a
    /// best-effort recovery action when a protocol violation strands the user).
    ExecLoginShell,
    /// `export NAME=VALUE` in the remote shell's native quoting.
    Setenv { name: String, value: String },
    /// Run a command synchronously in the current (non-framer) shell context.
    Run { cmdline: String },
    /// Pipe a Python program to `python3` and run it.
    RunPython,
    /// Run a single shell command line via the target shell's `-c` equivalent.
    Shell { cmdline: String },
    /// Probe the remote login shell, home directory and shell version.
    GetShell,
    /// Write bytes to a destination path.
    Write {
        destination: Vec<u8>,
        content: Vec<u8>,
    },
    /// Change the working directory.
    Cd { path: String },
    /// Terminate the session from the shell side (no framer involved yet).
    Quit,

    // --- framer family ---
    /// Ask the framer to spawn `cmdline` as a background process.
    FramerRun { cmdline: String },
    /// Log in to the framer, establishing `framedPID`.
    FramerLogin { cwd: String, argv: Vec<String> },
    /// Forward bytes to a nested conductor's framer-managed process.
    FramerSend { pid: u64, bytes: Vec<u8> },
    /// Ask the framer to kill a tracked process.
    FramerKill { pid: u64 },
    /// Ask the framer to shut itself down.
    FramerQuit,
    /// Register interest in a process's lifecycle.
    FramerRegister { pid: u64 },
    /// Deregister interest in a process's lifecycle.
    ///
    /// The wire token reproduces the framer's misspelling (`dereigster`) verbatim; this is not
    /// a typo in this crate, it is required wire compatibility (see `DESIGN.md`).
    FramerDeregister { pid: u64 },
    /// Ask the framer for any buffered output across all tracked processes.
    FramerPoll,
    /// Reset the framer's internal state.
    FramerReset,
    /// Start (or continue) the autopoll loop.
    FramerAutopoll,
    /// Persist identity fields on the remote side for later recovery.
    FramerSave { fields: BTreeMap<String, String> },
    /// A file RPC subcommand.
    FramerFile { sub: FileSubcommand },
}

impl Command {
    /// Whether this command targets the framer (as opposed to the bare login shell).
    ///
    /// Framer commands are chunked with a `\` continuation marker by the dispatcher; non-framer
    /// commands are chunked with an empty continuation marker. See §4.1.
    pub(crate) fn is_framer_command(&self) -> bool {
        matches!(
            self,
            Command::FramerRun { .. }
                | Command::FramerLogin { .. }
                | Command::FramerSend { .. }
                | Command::FramerKill { .. }
                | Command::FramerQuit
                | Command::FramerRegister { .. }
                | Command::FramerDeregister { .. }
                | Command::FramerPoll
                | Command::FramerReset
                | Command::FramerAutopoll
                | Command::FramerSave { .. }
                | Command::FramerFile { .. }
        )
    }

    /// The canonical wire form of this command, without chunking applied.
    pub(crate) fn string_value(&self) -> String {
        match self {
            Command::ExecLoginShell => "exec_login_shell".to_string(),
            Command::Setenv { name, value } => {
                format!("setenv\n{}={}", name, escape_setenv_value(value))
            }
            Command::Run { cmdline } => format!("run\n{cmdline}"),
            Command::RunPython => "runpython".to_string(),
            Command::Shell { cmdline } => format!("shell {cmdline}"),
            Command::GetShell => "getshell".to_string(),
            Command::Write {
                destination,
                content,
            } => format!(
                "write\n{}\n{}",
                BASE64.encode(destination),
                BASE64.encode(content)
            ),
            Command::Cd { path } => format!("cd\n{}", escape_arg(path)),
            Command::Quit => "quit".to_string(),

            Command::FramerRun { cmdline } => format!("run\n{cmdline}"),
            Command::FramerLogin { cwd, argv } => format!(
                "login\n{}\n{}",
                cwd,
                argv.iter().map(|a| escape_arg(a)).collect::<Vec<_>>().join(" ")
            ),
            Command::FramerSend { pid, bytes } => {
                format!("send\n{}\n{}", pid, BASE64.encode(bytes))
            }
            Command::FramerKill { pid } => format!("kill\n{pid}"),
            Command::FramerQuit => "quit".to_string(),
            Command::FramerRegister { pid } => format!("register\n{pid}"),
            Command::FramerDeregister { pid } => format!("dereigster\n{pid}"),
            Command::FramerPoll => "poll".to_string(),
            Command::FramerReset => "reset".to_string(),
            Command::FramerAutopoll => "autopoll".to_string(),
            Command::FramerSave { fields } => {
                let mut s = "save".to_string();
                for (k, v) in fields {
                    s.push('\n');
                    s.push_str(k);
                    s.push('=');
                    s.push_str(v);
                }
                s
            }
            Command::FramerFile { sub } => format!("file\n{}", sub.wire_body()),
        }
    }

    /// A human-readable description of this command, for logs.
    pub(crate) fn operation_description(&self) -> String {
        match self {
            Command::ExecLoginShell => "fall back to login shell".into(),
            Command::Setenv { name, .. } => format!("setenv {name}"),
            Command::Run { cmdline } => format!("run `{cmdline}`"),
            Command::RunPython => "run python helper".into(),
            Command::Shell { cmdline } => format!("shell `{cmdline}`"),
            Command::GetShell => "probe login shell".into(),
            Command::Write { destination, .. } => {
                format!("write payload to {}", String::from_utf8_lossy(destination))
            }
            Command::Cd { path } => format!("cd {path}"),
            Command::Quit => "quit".into(),

            Command::FramerRun { cmdline } => format!("framer run `{cmdline}`"),
            Command::FramerLogin { .. } => "framer login".into(),
            Command::FramerSend { pid, .. } => format!("framer send to pid {pid}"),
            Command::FramerKill { pid } => format!("framer kill pid {pid}"),
            Command::FramerQuit => "framer quit".into(),
            Command::FramerRegister { pid } => format!("framer register pid {pid}"),
            Command::FramerDeregister { pid } => format!("framer deregister pid {pid}"),
            Command::FramerPoll => "framer poll".into(),
            Command::FramerReset => "framer reset".into(),
            Command::FramerAutopoll => "framer autopoll".into(),
            Command::FramerSave { .. } => "framer save identity".into(),
            Command::FramerFile { sub } => format!("framer file: {}", sub.description()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setenv_wire_form_escapes_value() {
        let cmd = Command::Setenv {
            name: "FOO".into(),
            value: "a$b`c".into(),
        };
        assert_eq!(cmd.string_value(), "setenv\nFOO=\"a\\$b\\`c\"");
    }

    #[test]
    fn framer_deregister_reproduces_misspelling() {
        let cmd = Command::FramerDeregister { pid: 42 };
        assert_eq!(cmd.string_value(), "dereigster\n42");
    }

    #[test]
    fn file_ls_wire_form_base64_encodes_path() {
        let cmd = Command::FramerFile {
            sub: FileSubcommand::Ls {
                path: b"/tmp".to_vec(),
                sort: ListSort::ByName,
            },
        };
        assert_eq!(
            cmd.string_value(),
            format!("file\nls\n{}\nn", BASE64.encode("/tmp"))
        );
    }

    #[test]
    fn file_save_wire_form_is_newline_separated() {
        let mut fields = BTreeMap::new();
        fields.insert("dcsID".to_string(), "abc".to_string());
        fields.insert("sshargs".to_string(), "u@h".to_string());
        let cmd = Command::FramerSave { fields };
        assert_eq!(cmd.string_value(), "save\ndcsID=abc\nsshargs=u@h");
    }

    #[test]
    fn create_content_is_chunked_at_80_chars() {
        let content = vec![b'x'; 200];
        let cmd = Command::FramerFile {
            sub: FileSubcommand::Create {
                path: b"/f".to_vec(),
                content,
            },
        };
        let rendered = cmd.string_value();
        let last_line = rendered.lines().last().unwrap();
        assert!(rendered.lines().all(|l| l.len() <= 80 || l == last_line));
    }

    #[test]
    fn is_framer_command_partitions_families() {
        assert!(!Command::GetShell.is_framer_command());
        assert!(Command::FramerPoll.is_framer_command());
    }
}
