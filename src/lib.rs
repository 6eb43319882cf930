// Per-process election core
pub mod election;
pub mod runtime;

// Harness: scheduler, fabric and scenarios
pub mod cluster;
pub mod config;

// Public exports
pub use cluster::{run_scenario, Cluster, ClusterError, ScenarioOutcome};
pub use config::{ClusterConfig, ScenarioConfig};
pub use election::{BullyNode, Message, MessageKind, Pid, Round};
