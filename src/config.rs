use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::election::{ConfigError, ElectionConfig, Pid, Round};

/// Static membership of a cluster and the protocol knobs every process
/// shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub peers: Vec<Pid>,
    pub initial_leader: Pid,
    #[serde(default)]
    pub election: ElectionConfig,
}

impl ClusterConfig {
    /// Peers `1..=count`, led by the highest one.
    pub fn with_peer_count(count: u64) -> Self {
        Self {
            peers: (1..=count).map(Pid).collect(),
            initial_leader: Pid(count),
            election: ElectionConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::NoPeers);
        }

        let mut seen = BTreeSet::new();
        for &pid in &self.peers {
            if !seen.insert(pid) {
                return Err(ConfigError::DuplicatePid(pid));
            }
        }

        if !seen.contains(&self.initial_leader) {
            return Err(ConfigError::UnknownLeader(self.initial_leader));
        }

        self.election.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Terminate the process for good.
    Crash,
    /// Stop scheduling the process; it keeps its state.
    Pause,
    /// Schedule a paused process again.
    Resume,
    /// Ask the process to probe its leader.
    CheckLeader,
}

/// Fault or trigger applied right before `round` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioEvent {
    pub round: Round,
    pub pid: Pid,
    pub action: EventAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(flatten)]
    pub cluster: ClusterConfig,
    pub rounds: Round,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

impl ScenarioConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ScenarioConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster.validate()?;
        for event in &self.events {
            if !self.cluster.peers.contains(&event.pid) {
                return Err(ConfigError::UnknownEventPid {
                    round: event.round,
                    pid: event.pid,
                });
            }
        }
        Ok(())
    }

    pub fn events_at(&self, round: Round) -> impl Iterator<Item = &ScenarioEvent> + '_ {
        self.events.iter().filter(move |e| e.round == round)
    }
}

impl Default for ScenarioConfig {
    /// Five peers led by 5. The leader goes dormant, 3 notices, and 4 ends
    /// up elected; 5 comes back later and takes over again.
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::with_peer_count(5),
            rounds: 12,
            events: vec![
                ScenarioEvent {
                    round: 1,
                    pid: Pid(5),
                    action: EventAction::Pause,
                },
                ScenarioEvent {
                    round: 1,
                    pid: Pid(3),
                    action: EventAction::CheckLeader,
                },
                ScenarioEvent {
                    round: 9,
                    pid: Pid(5),
                    action: EventAction::Resume,
                },
            ],
        }
    }
}
