use thiserror::Error;

use crate::election::{ConfigError, Pid};

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown process: {0}")]
    UnknownPid(Pid),

    #[error("Process {0} has crashed")]
    Crashed(Pid),

    #[error("Process {0} is not paused")]
    NotPaused(Pid),

    #[error("Process {0} stopped unexpectedly")]
    ProcessFailed(Pid),

    #[error("Round acknowledgement channel closed")]
    SchedulerClosed,
}
