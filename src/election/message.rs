use serde::{Deserialize, Serialize};

use super::{Pid, Round};

/// Protocol message kinds exchanged between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// The sender is calling an election.
    Election,
    /// The sender outranks the receiver and takes the election over.
    Ok,
    /// Liveness probe sent to the believed leader.
    Alive,
    /// Reply to `Alive`.
    Yes,
    /// The sender declares itself leader. Always authoritative.
    Coordinator,
}

/// A round-tagged message. Receivers only consider messages tagged for the
/// round immediately preceding their current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Pid,
    pub round: Round,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(sender: Pid, round: Round, kind: MessageKind) -> Self {
        Self {
            sender,
            round,
            kind,
        }
    }
}
