mod error;
pub mod scenario;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use ::log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::ClusterConfig;
use crate::election::{BullyNode, LeaderReport, PeerDirectory, Pid, Round};
use crate::runtime::{gate, run_process, GateSignal, Mailbox, ProcessIo, RoundAck};

pub use self::error::ClusterError;
pub use self::scenario::{random_events, run_scenario, ScenarioOutcome};

// How often a round waiting on acknowledgements checks for dead processes.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    Active,
    /// Alive but skipped by the scheduler.
    Paused,
    Crashed,
}

struct ProcessHandle {
    gate: UnboundedSender<GateSignal>,
    check_leader: UnboundedSender<()>,
    status: ProcessStatus,
    task: Option<JoinHandle<()>>,
}

/// In-process round scheduler and message fabric.
///
/// Every process runs as its own tokio task. A round only completes once
/// every active process has acknowledged it, which keeps the whole cluster
/// in lockstep.
pub struct Cluster {
    processes: BTreeMap<Pid, ProcessHandle>,
    acks: UnboundedReceiver<RoundAck>,
    reports_rx: UnboundedReceiver<LeaderReport>,
    leaders: BTreeMap<Pid, Pid>,
    reports: Vec<LeaderReport>,
    round: Round,
}

impl Cluster {
    /// Spawns one task per peer. Must be called from within a tokio runtime.
    pub fn start(config: ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;

        let mut senders = BTreeMap::new();
        let mut inboxes = BTreeMap::new();
        for &pid in &config.peers {
            let (tx, rx) = unbounded_channel();
            senders.insert(pid, tx);
            inboxes.insert(pid, rx);
        }
        let directory = PeerDirectory::new(senders);

        let (ack_tx, acks) = unbounded_channel();
        let (report_tx, reports_rx) = unbounded_channel();

        let mut processes = BTreeMap::new();
        for (pid, inbox) in inboxes {
            let (gate_tx, gate) = gate::channel(pid, ack_tx.clone());
            let (check_tx, check_rx) = unbounded_channel();

            let mut node = BullyNode::new(
                pid,
                config.initial_leader,
                directory.clone(),
                config.election.clone(),
            );
            node.set_reporter(report_tx.clone());

            let io = ProcessIo {
                gate,
                mailbox: Mailbox::new(inbox),
                check_leader: check_rx,
            };
            let task = tokio::spawn(run_process(node, io));

            processes.insert(
                pid,
                ProcessHandle {
                    gate: gate_tx,
                    check_leader: check_tx,
                    status: ProcessStatus::Active,
                    task: Some(task),
                },
            );
        }

        info!(
            "Started cluster of {} processes, initial leader {}",
            processes.len(),
            config.initial_leader
        );

        let leaders = config
            .peers
            .iter()
            .map(|&pid| (pid, config.initial_leader))
            .collect();

        Ok(Self {
            processes,
            acks,
            reports_rx,
            leaders,
            reports: Vec::new(),
            round: 0,
        })
    }

    /// Last round that ran, 0 before the first one.
    pub fn round(&self) -> Round {
        self.round
    }

    /// Advances every active process by one round and waits until all of
    /// them are done with it.
    ///
    /// A process found dead before the round starts fails the call without
    /// advancing anything. A process dying mid-round leaves that round
    /// partially applied; the cluster should only be shut down after that.
    pub async fn run_round(&mut self) -> Result<Round, ClusterError> {
        let active = self.active_pids();
        if let Some(pid) = active
            .iter()
            .copied()
            .find(|pid| self.processes[pid].gate.is_closed())
        {
            return Err(ClusterError::ProcessFailed(pid));
        }

        self.round += 1;
        let round = self.round;

        let mut pending = BTreeSet::new();
        for pid in active {
            self.processes[&pid]
                .gate
                .send(GateSignal::Proceed(round))
                .map_err(|_| ClusterError::ProcessFailed(pid))?;
            pending.insert(pid);
        }

        while !pending.is_empty() {
            tokio::select! {
                ack = self.acks.recv() => {
                    let ack = ack.ok_or(ClusterError::SchedulerClosed)?;
                    if ack.round == round {
                        pending.remove(&ack.pid);
                    }
                }
                _ = sleep(ACK_POLL_INTERVAL) => {
                    let dead = pending.iter().copied().find(|pid| {
                        self.processes[pid]
                            .task
                            .as_ref()
                            .map_or(true, JoinHandle::is_finished)
                    });
                    if let Some(pid) = dead {
                        return Err(ClusterError::ProcessFailed(pid));
                    }
                }
            }
        }

        self.collect_reports();
        debug!("Round {round} complete");
        Ok(round)
    }

    /// Runs `count` rounds back to back.
    pub async fn run_rounds(&mut self, count: u64) -> Result<Round, ClusterError> {
        for _ in 0..count {
            self.run_round().await?;
        }
        Ok(self.round)
    }

    /// Terminates `pid` permanently and waits for its task to exit.
    pub async fn crash(&mut self, pid: Pid) -> Result<(), ClusterError> {
        let handle = self.live_handle(pid)?;
        info!("Crashing {pid}");

        let _ = handle.gate.send(GateSignal::Terminate);
        handle.status = ProcessStatus::Crashed;
        if let Some(task) = handle.task.take() {
            task.await.map_err(|_| ClusterError::ProcessFailed(pid))?;
        }
        Ok(())
    }

    /// Stops scheduling `pid` without killing it. Pausing twice is a no-op.
    pub fn pause(&mut self, pid: Pid) -> Result<(), ClusterError> {
        let handle = self.live_handle(pid)?;
        if handle.status == ProcessStatus::Active {
            info!("Pausing {pid}");
            handle.status = ProcessStatus::Paused;
        }
        Ok(())
    }

    pub fn resume(&mut self, pid: Pid) -> Result<(), ClusterError> {
        let handle = self.live_handle(pid)?;
        if handle.status != ProcessStatus::Paused {
            return Err(ClusterError::NotPaused(pid));
        }
        info!("Resuming {pid}");
        handle.status = ProcessStatus::Active;
        Ok(())
    }

    /// Asks `pid` to probe its leader during its next round.
    pub fn check_leader(&mut self, pid: Pid) -> Result<(), ClusterError> {
        let handle = self.live_handle(pid)?;
        handle
            .check_leader
            .send(())
            .map_err(|_| ClusterError::ProcessFailed(pid))
    }

    pub fn status(&self, pid: Pid) -> Option<ProcessStatus> {
        self.processes.get(&pid).map(|h| h.status)
    }

    pub fn active_pids(&self) -> Vec<Pid> {
        self.processes
            .iter()
            .filter(|(_, h)| h.status == ProcessStatus::Active)
            .map(|(&pid, _)| pid)
            .collect()
    }

    /// Leader as last reported by `pid`.
    pub fn believed_leader(&self, pid: Pid) -> Option<Pid> {
        self.leaders.get(&pid).copied()
    }

    /// Leader view of every active process.
    pub fn leaders(&self) -> BTreeMap<Pid, Pid> {
        self.active_pids()
            .into_iter()
            .filter_map(|pid| self.leaders.get(&pid).map(|&leader| (pid, leader)))
            .collect()
    }

    /// The leader every active process agrees on, if they agree.
    pub fn converged_leader(&self) -> Option<Pid> {
        let views = self.leaders();
        let mut leaders = views.values();
        let first = *leaders.next()?;
        leaders.all(|&l| l == first).then_some(first)
    }

    /// Every leader report received so far, in arrival order.
    pub fn reports(&self) -> &[LeaderReport] {
        &self.reports
    }

    /// Terminates every process still running and waits for all of them.
    pub async fn shutdown(mut self) -> Result<(), ClusterError> {
        for (&pid, handle) in self.processes.iter_mut() {
            if handle.status == ProcessStatus::Crashed {
                continue;
            }
            let _ = handle.gate.send(GateSignal::Terminate);
            handle.status = ProcessStatus::Crashed;
            if let Some(task) = handle.task.take() {
                task.await.map_err(|_| ClusterError::ProcessFailed(pid))?;
            }
        }
        info!("Cluster shut down after {} rounds", self.round);
        Ok(())
    }

    fn live_handle(&mut self, pid: Pid) -> Result<&mut ProcessHandle, ClusterError> {
        let handle = self
            .processes
            .get_mut(&pid)
            .ok_or(ClusterError::UnknownPid(pid))?;
        if handle.status == ProcessStatus::Crashed {
            return Err(ClusterError::Crashed(pid));
        }
        Ok(handle)
    }

    fn collect_reports(&mut self) {
        while let Ok(report) = self.reports_rx.try_recv() {
            self.leaders.insert(report.observer, report.leader);
            self.reports.push(report);
        }
    }
}
