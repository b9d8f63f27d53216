//! Conductor-tree JSON serialization (§4.9).
//!
//! The wire representation is a plain `#[derive(Serialize, Deserialize)]` struct tree rather than
//! hand-rolled `serde_json::Value` construction, matching how `codex-protocol` (in the retrieval
//! pack) defines its wire types. `state` and `queue` are always encoded at their reset values and
//! `background_jobs` is omitted entirely: the remote side is assumed to outlive the client and is
//! reattached via recovery (§4.5), not by replaying in-flight commands.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One payload entry as persisted on a conductor snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSnapshot {
    pub local_path: String,
    pub destination: String,
}

/// The full persisted state of one conductor, nested under `children` to mirror the live
/// parent/child tree (§9: the parent back-reference is not ownership, so the tree is written
/// top-down and each child's parent is reconstructed from its position on decode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorSnapshot {
    pub sshargs: String,
    pub vars_to_send: std::collections::BTreeMap<String, String>,
    pub client_vars: std::collections::BTreeMap<String, String>,
    pub payloads: Vec<PayloadSnapshot>,
    pub initial_directory: Option<String>,
    pub should_inject_shell_integration: bool,
    pub parsed_args: Vec<String>,
    pub depth: u32,
    pub framed_pid: Option<u64>,
    /// Always `"ground"` on encode; a freshly decoded conductor starts there too.
    pub state: String,
    /// Always empty on encode; in-flight and queued work is not carried across restart.
    pub queue: Vec<serde_json::Value>,
    pub bool_args: String,
    pub dcs_id: String,
    pub client_unique_id: String,
    pub modified_vars: std::collections::BTreeMap<String, String>,
    pub modified_command_args: Vec<String>,
    pub children: Vec<ConductorSnapshot>,
}

impl ConductorSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConductorSnapshot {
        ConductorSnapshot {
            sshargs: "user@host".to_string(),
            vars_to_send: Default::default(),
            client_vars: Default::default(),
            payloads: vec![PayloadSnapshot {
                local_path: "/local/a".to_string(),
                destination: "/$HOME".to_string(),
            }],
            initial_directory: Some("/home/user".to_string()),
            should_inject_shell_integration: true,
            parsed_args: vec!["-t".to_string()],
            depth: 0,
            framed_pid: Some(4321),
            state: "ground".to_string(),
            queue: Vec::new(),
            bool_args: "".to_string(),
            dcs_id: "abc".to_string(),
            client_unique_id: "x".to_string(),
            modified_vars: Default::default(),
            modified_command_args: Vec::new(),
            children: Vec::new(),
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let snap = sample();
        let json = snap.to_json().unwrap();
        let decoded = ConductorSnapshot::from_json(&json).unwrap();
        assert_eq!(snap, decoded);
    }

    #[test]
    fn children_nest_under_parent() {
        let mut parent = sample();
        let mut child = sample();
        child.depth = 1;
        parent.children.push(child);

        let json = parent.to_json().unwrap();
        let decoded = ConductorSnapshot::from_json(&json).unwrap();
        assert_eq!(decoded.children.len(), 1);
        assert_eq!(decoded.children[0].depth, 1);
    }

    #[test]
    fn state_and_queue_are_always_reset_shape() {
        let snap = sample();
        assert_eq!(snap.state, "ground");
        assert!(snap.queue.is_empty());
    }
}
