use serde::{Deserialize, Serialize};

use super::ConfigError;

/// How an outstanding `Alive` probe gets resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResolution {
    /// A `Yes` reply clears the probe immediately.
    #[default]
    OnReply,
    /// Only the probe timeout clears the probe, so every probe ends in an
    /// election even when the leader answers.
    TimeoutOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Rounds an election may stay unanswered before self-declaring.
    pub election_timeout_rounds: u64,
    /// Rounds a probe may stay unanswered before calling an election.
    pub probe_timeout_rounds: u64,
    pub probe_resolution: ProbeResolution,
}

impl ElectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.election_timeout_rounds == 0 {
            return Err(ConfigError::InvalidTimeout(
                "election_timeout_rounds must be at least 1".to_string(),
            ));
        }
        if self.probe_timeout_rounds == 0 {
            return Err(ConfigError::InvalidTimeout(
                "probe_timeout_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_timeout_rounds: 2,
            probe_timeout_rounds: 2,
            probe_resolution: ProbeResolution::OnReply,
        }
    }
}
