//! Wire-level chunking (§4.1): the dispatcher never writes a line longer than
//! [`MAX_CHUNK_LEN`] bytes. Longer records are split across multiple writes, each (but the
//! last) of a framer command carrying a trailing `\` continuation marker; non-framer commands
//! use an empty continuation marker (the remote shell just sees consecutive raw lines).

/// Maximum number of bytes per chunk, per §4.1.
pub(crate) const MAX_CHUNK_LEN: usize = 128;

/// Splits `rendered` into chunks of at most [`MAX_CHUNK_LEN`] bytes, appends the right
/// continuation marker to every chunk but the last, and joins the result into the exact bytes
/// that should be written to the transport, including the single mandatory trailing newline.
pub(crate) fn chunk_for_wire(rendered: &str, is_framer_command: bool) -> String {
    let continuation = if is_framer_command { "\\" } else { "" };
    let bytes = rendered.as_bytes();

    if bytes.len() <= MAX_CHUNK_LEN {
        return format!("{rendered}\n");
    }

    let mut out = String::with_capacity(rendered.len() + rendered.len() / MAX_CHUNK_LEN + 1);
    let mut chunks = bytes.chunks(MAX_CHUNK_LEN).peekable();
    while let Some(chunk) = chunks.next() {
        // `rendered` is built exclusively from ASCII (base64, decimal PIDs, shell-escaped
        // values) by `Command::string_value`, so splitting on byte boundaries never lands
        // inside a multi-byte UTF-8 sequence.
        out.push_str(std::str::from_utf8(chunk).expect("wire commands are ASCII"));
        if chunks.peek().is_some() {
            out.push_str(continuation);
        }
        out.push('\n');
    }
    out
}

/// Reassembles the original rendered command from the bytes written by [`chunk_for_wire`], by
/// stripping trailing continuation markers and rejoining lines. Used only by tests to state the
/// chunking round-trip law from §8; the real reassembly happens on the remote end.
#[cfg(test)]
pub(crate) fn unchunk(written: &str, is_framer_command: bool) -> String {
    let continuation = if is_framer_command { "\\" } else { "" };
    written
        .trim_end_matches('\n')
        .split('\n')
        .map(|line| {
            if !continuation.is_empty() {
                line.strip_suffix(continuation).unwrap_or(line)
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_command_is_a_single_chunk_with_trailing_newline() {
        assert_eq!(chunk_for_wire("getshell", false), "getshell\n");
    }

    #[test]
    fn long_framer_command_round_trips() {
        let long = "x".repeat(500);
        let written = chunk_for_wire(&long, true);
        assert!(written.lines().all(|l| l.len() <= MAX_CHUNK_LEN + 1));
        assert_eq!(unchunk(&written, true), long);
    }

    #[test]
    fn long_non_framer_command_round_trips() {
        let long = "y".repeat(400);
        let written = chunk_for_wire(&long, false);
        assert_eq!(unchunk(&written, false), long);
    }

    #[test]
    fn chunking_is_idempotent_on_the_unchunked_value() {
        let s = "z".repeat(300);
        let once = unchunk(&chunk_for_wire(&s, true), true);
        let twice = unchunk(&chunk_for_wire(&once, true), true);
        assert_eq!(once, twice);
    }
}
