mod config;
mod error;
mod message;
mod node;
mod peers;
mod state;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::config::{ElectionConfig, ProbeResolution};
pub use self::error::ConfigError;
pub use self::message::{Message, MessageKind};
pub use self::node::{BullyNode, LeaderReport};
pub use self::peers::PeerDirectory;
pub use self::state::{ElectionPhase, ElectionState};

/// Round number handed out by the scheduler. The first round is 1.
pub type Round = u64;

/// Process identity. Higher pids outrank lower ones in an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}
