use thiserror::Error;

use super::Pid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Peer set is empty")]
    NoPeers,

    #[error("Duplicate pid in peer set: {0}")]
    DuplicatePid(Pid),

    #[error("Initial leader {0} is not a member of the peer set")]
    UnknownLeader(Pid),

    #[error("Scenario event at round {round} names unknown pid {pid}")]
    UnknownEventPid { round: u64, pid: Pid },

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
