//! The `:recovery:` banner protocol (§4.5): after a client reconnects to a still-running remote
//! framer, it re-derives the framer's identity from a short run of banner lines instead of
//! starting the launch sequence over.

/// The identity a reconnecting client recovers for one conductor.
///
/// `children` carries the identities recovered for any nested conductors (§4.8); assembling
/// those is the reconnecting client's responsibility; each conductor in the tree runs its own
/// [`RecoveryBuilder`] over the banner lines tagged with its own depth; see `DESIGN.md` for why
/// this crate does not attempt to multiplex nested banners itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConductorRecovery {
    /// The framer's login-shell PID.
    pub pid: u64,
    pub dcs_id: String,
    pub sshargs: String,
    pub bool_args: String,
    pub client_unique_id: String,
    pub children: Vec<ConductorRecovery>,
}

/// A parsed `:recovery:`-family banner line.
pub(crate) enum RecoveryLine {
    Begin,
    Field { key: String, value: String },
    End,
    /// A line that didn't match any of the above; tolerated, logged, discarded.
    Unrecognized,
}

pub(crate) fn classify(line: &str) -> RecoveryLine {
    if line == ":begin-recovery" {
        RecoveryLine::Begin
    } else if line == ":end-recovery" {
        RecoveryLine::End
    } else if let Some(rest) = line.strip_prefix(":recovery: ") {
        match rest.split_once(' ') {
            Some((key, value)) => RecoveryLine::Field {
                key: key.to_string(),
                value: value.to_string(),
            },
            // A field with an empty value (e.g. `boolArgs`) has nothing after the key.
            None => RecoveryLine::Field {
                key: rest.to_string(),
                value: String::new(),
            },
        }
    } else {
        RecoveryLine::Unrecognized
    }
}

/// Accumulates `:recovery:` fields between `:begin-recovery` and `:end-recovery`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RecoveryBuilder {
    login: Option<u64>,
    dcs_id: Option<String>,
    sshargs: Option<String>,
    bool_args: Option<String>,
    client_unique_id: Option<String>,
}

impl RecoveryBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_field(&mut self, key: &str, value: &str) {
        match key {
            "login" => self.login = value.trim().parse().ok(),
            "dcsID" => self.dcs_id = Some(value.to_string()),
            "sshargs" => self.sshargs = Some(value.to_string()),
            "boolArgs" => self.bool_args = Some(value.to_string()),
            "clientUniqueID" => self.client_unique_id = Some(value.to_string()),
            _ => tracing::warn!(key, "ignoring unrecognized recovery field"),
        }
    }

    /// Consumes the builder. `Some` only if every required field was set and `login` parsed as
    /// a valid PID.
    pub(crate) fn finish(self) -> Option<ConductorRecovery> {
        Some(ConductorRecovery {
            pid: self.login?,
            dcs_id: self.dcs_id?,
            sshargs: self.sshargs?,
            bool_args: self.bool_args?,
            client_unique_id: self.client_unique_id?,
            children: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_banner_recovers_identity() {
        let mut b = RecoveryBuilder::new();
        for line in [
            ":recovery: login 9999",
            ":recovery: dcsID abc",
            ":recovery: sshargs u@h",
            ":recovery: boolArgs ",
            ":recovery: clientUniqueID x",
        ] {
            match classify(line) {
                RecoveryLine::Field { key, value } => b.set_field(&key, &value),
                _ => panic!("expected a field line"),
            }
        }
        let recovered = b.finish().expect("all fields present");
        assert_eq!(recovered.pid, 9999);
        assert_eq!(recovered.dcs_id, "abc");
        assert_eq!(recovered.sshargs, "u@h");
        assert_eq!(recovered.bool_args, "");
        assert_eq!(recovered.client_unique_id, "x");
    }

    #[test]
    fn missing_field_fails_to_finish() {
        let mut b = RecoveryBuilder::new();
        b.set_field("login", "9999");
        assert!(b.finish().is_none());
    }

    #[test]
    fn non_numeric_login_is_rejected() {
        let mut b = RecoveryBuilder::new();
        b.set_field("login", "not-a-pid");
        b.set_field("dcsID", "abc");
        b.set_field("sshargs", "u@h");
        b.set_field("boolArgs", "");
        b.set_field("clientUniqueID", "x");
        assert!(b.finish().is_none());
    }

    #[test]
    fn begin_and_end_markers_classify() {
        assert!(matches!(classify(":begin-recovery"), RecoveryLine::Begin));
        assert!(matches!(classify(":end-recovery"), RecoveryLine::End));
    }
}
