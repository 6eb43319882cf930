use std::collections::BTreeMap;

use ::log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Cluster, ClusterError};
use crate::config::{ClusterConfig, EventAction, ScenarioConfig, ScenarioEvent};
use crate::election::{LeaderReport, Pid, Round};

// Rounds left between two injected faults so that the election triggered by
// the first one settles before the next.
const FAULT_SPACING: Round = 10;
const PAUSE_ROUNDS: Round = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub rounds: Round,
    /// Leader view of every process that was active at the end.
    pub leaders: BTreeMap<Pid, Pid>,
    pub converged_leader: Option<Pid>,
    pub reports: Vec<LeaderReport>,
}

/// Runs a scenario to completion. Events scheduled for a round are applied
/// right before that round runs.
pub async fn run_scenario(config: &ScenarioConfig) -> Result<ScenarioOutcome, ClusterError> {
    config.validate()?;
    let mut cluster = Cluster::start(config.cluster.clone())?;

    for round in 1..=config.rounds {
        for event in config.events_at(round) {
            apply_event(&mut cluster, event).await?;
        }
        cluster.run_round().await?;
    }

    let outcome = ScenarioOutcome {
        rounds: cluster.round(),
        leaders: cluster.leaders(),
        converged_leader: cluster.converged_leader(),
        reports: cluster.reports().to_vec(),
    };
    info!(
        "Scenario finished after {} rounds, converged leader: {:?}",
        outcome.rounds, outcome.converged_leader
    );

    cluster.shutdown().await?;
    Ok(outcome)
}

async fn apply_event(cluster: &mut Cluster, event: &ScenarioEvent) -> Result<(), ClusterError> {
    match event.action {
        EventAction::Crash => cluster.crash(event.pid).await,
        EventAction::Pause => cluster.pause(event.pid),
        EventAction::Resume => cluster.resume(event.pid),
        EventAction::CheckLeader => cluster.check_leader(event.pid),
    }
}

/// Generates a reproducible fault schedule for `rounds` rounds.
///
/// Each fault either crashes a random process or puts the current leader to
/// sleep for a while, and is followed by a leader check from a random
/// survivor. At least one process always survives, and the schedule leaves
/// enough quiet rounds at the end for the cluster to settle, so the highest
/// surviving pid is expected to lead once the scenario is over. Assumes the
/// initial leader is the highest pid.
pub fn random_events(cluster: &ClusterConfig, rounds: Round, seed: u64) -> Vec<ScenarioEvent> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut alive: Vec<Pid> = cluster.peers.clone();
    alive.sort();

    let mut events = Vec::new();
    let mut round: Round = 1;

    while round + FAULT_SPACING + PAUSE_ROUNDS < rounds && alive.len() > 1 {
        let leader = alive[alive.len() - 1];

        if rng.random_bool(0.5) {
            let victim = alive.remove(rng.random_range(0..alive.len()));
            events.push(ScenarioEvent {
                round,
                pid: victim,
                action: EventAction::Crash,
            });
        } else {
            events.push(ScenarioEvent {
                round,
                pid: leader,
                action: EventAction::Pause,
            });
            events.push(ScenarioEvent {
                round: round + PAUSE_ROUNDS,
                pid: leader,
                action: EventAction::Resume,
            });
        }

        let survivors: Vec<Pid> = alive.iter().copied().filter(|&p| p != leader).collect();
        if let Some(&checker) = survivors.get(rng.random_range(0..survivors.len().max(1))) {
            events.push(ScenarioEvent {
                round: round + 1,
                pid: checker,
                action: EventAction::CheckLeader,
            });
        }

        round += FAULT_SPACING + PAUSE_ROUNDS;
    }

    events.sort_by_key(|e| e.round);
    events
}
