use serde::{Deserialize, Serialize};

use super::{Pid, Round};

/// Conceptual phase derived from the raw election state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionPhase {
    Idle,
    ProbingLeader,
    ElectionPending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionState {
    pub believed_leader: Pid,
    /// Round in which the in-flight election was called, if any.
    pub election_started: Option<Round>,
    pub awaiting_leader_reply: bool,
    pub rounds_since_probe: u64,
    pub last_processed_round: Round,
}

impl ElectionState {
    pub fn new(initial_leader: Pid) -> Self {
        Self {
            believed_leader: initial_leader,
            election_started: None,
            awaiting_leader_reply: false,
            rounds_since_probe: 0,
            last_processed_round: 0,
        }
    }

    pub fn election_in_flight(&self) -> bool {
        self.election_started.is_some()
    }

    pub fn phase(&self) -> ElectionPhase {
        if self.election_in_flight() {
            ElectionPhase::ElectionPending
        } else if self.awaiting_leader_reply {
            ElectionPhase::ProbingLeader
        } else {
            ElectionPhase::Idle
        }
    }

    pub(crate) fn clear_election(&mut self) {
        self.election_started = None;
    }

    pub(crate) fn clear_probe(&mut self) {
        self.awaiting_leader_reply = false;
        self.rounds_since_probe = 0;
    }
}
