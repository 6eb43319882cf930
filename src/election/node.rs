use ::log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use super::{
    ElectionConfig, ElectionPhase, ElectionState, Message, MessageKind, PeerDirectory, Pid,
    ProbeResolution, Round,
};

/// Emitted every time a process receives a `Coordinator` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderReport {
    pub observer: Pid,
    pub leader: Pid,
    pub round: Round,
}

/// Per-process Bully election state machine.
///
/// The node is driven one round at a time through [`BullyNode::on_round`]
/// and talks to the rest of the cluster only through its [`PeerDirectory`].
pub struct BullyNode {
    pid: Pid,
    state: ElectionState,
    config: ElectionConfig,
    peers: PeerDirectory,
    reporter: Option<UnboundedSender<LeaderReport>>,
}

impl BullyNode {
    pub fn new(pid: Pid, initial_leader: Pid, peers: PeerDirectory, config: ElectionConfig) -> Self {
        Self {
            pid,
            state: ElectionState::new(initial_leader),
            config,
            peers,
            reporter: None,
        }
    }

    pub fn set_reporter(&mut self, reporter: UnboundedSender<LeaderReport>) {
        self.reporter = Some(reporter);
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    pub fn believed_leader(&self) -> Pid {
        self.state.believed_leader
    }

    pub fn is_leader(&self) -> bool {
        self.state.believed_leader == self.pid
    }

    pub fn phase(&self) -> ElectionPhase {
        self.state.phase()
    }

    /// Runs one round. `inbound` must hold the messages tagged `round - 1`
    /// in delivery order; `check_leader` is the out-of-band liveness trigger.
    pub fn on_round(&mut self, round: Round, inbound: Vec<Message>, check_leader: bool) {
        // A leader that skipped rounds was dormant and must reassert itself
        // before anything else happens this round.
        if self.is_leader() && self.state.last_processed_round != round.saturating_sub(1) {
            info!(
                "{} resumed at round {} after last processing round {}, reasserting leadership",
                self.pid, round, self.state.last_processed_round
            );
            self.broadcast(round, MessageKind::Coordinator);
        }

        for message in inbound {
            self.handle_message(round, message);
        }

        if let Some(started) = self.state.election_started {
            if round.saturating_sub(started) >= self.config.election_timeout_rounds {
                info!(
                    "{}: election called in round {started} unanswered, self-declaring",
                    self.pid
                );
                self.declare_leader(round);
            }
        }

        if check_leader {
            self.probe_leader(round);
        }

        if self.state.awaiting_leader_reply
            && self.state.rounds_since_probe >= self.config.probe_timeout_rounds
        {
            info!(
                "{}: leader {} did not answer probe, calling election",
                self.pid, self.state.believed_leader
            );
            self.state.clear_probe();
            if !self.state.election_in_flight() {
                self.start_election(round);
            }
        }

        self.state.rounds_since_probe += 1;
        self.state.last_processed_round = round;
    }

    fn handle_message(&mut self, round: Round, message: Message) {
        debug!("{} round {round}: handling {:?}", self.pid, message);

        match message.kind {
            MessageKind::Coordinator => {
                if self.state.believed_leader != message.sender {
                    info!(
                        "{} now follows {} (was {})",
                        self.pid, message.sender, self.state.believed_leader
                    );
                }
                self.state.believed_leader = message.sender;
                self.report_leader(round);
                self.state.clear_election();
                if self.config.probe_resolution == ProbeResolution::OnReply {
                    self.state.clear_probe();
                }
            }
            MessageKind::Yes => {
                if self.config.probe_resolution == ProbeResolution::OnReply {
                    self.state.clear_probe();
                }
            }
            MessageKind::Alive => {
                self.send(message.sender, round, MessageKind::Yes);
            }
            MessageKind::Election => {
                if self.peers.is_highest(self.pid) {
                    self.broadcast(round, MessageKind::Coordinator);
                    return;
                }

                self.send(message.sender, round, MessageKind::Ok);

                if !self.state.election_in_flight() {
                    self.start_election(round);
                }
            }
            MessageKind::Ok => {
                debug!("{}: {} took over the election", self.pid, message.sender);
                self.state.clear_election();
            }
        }
    }

    /// Petitions every higher-ranked peer, or self-declares straight away
    /// when there is none.
    fn start_election(&mut self, round: Round) {
        let higher: Vec<Pid> = self.peers.higher_than(self.pid).collect();

        if higher.is_empty() {
            info!("{}: no higher-ranked peer, self-declaring", self.pid);
            self.declare_leader(round);
            return;
        }

        info!("{} calling election in round {round}, petitioning {higher:?}", self.pid);
        self.state.election_started = Some(round);
        for peer in higher {
            self.send(peer, round, MessageKind::Election);
        }
    }

    fn declare_leader(&mut self, round: Round) {
        self.state.clear_election();
        self.broadcast(round, MessageKind::Coordinator);
    }

    fn probe_leader(&mut self, round: Round) {
        debug!("{}: probing leader {}", self.pid, self.state.believed_leader);
        self.send(self.state.believed_leader, round, MessageKind::Alive);
        self.state.awaiting_leader_reply = true;
        self.state.rounds_since_probe = 0;
    }

    fn report_leader(&self, round: Round) {
        if let Some(tx) = &self.reporter {
            let report = LeaderReport {
                observer: self.pid,
                leader: self.state.believed_leader,
                round,
            };
            if tx.send(report).is_err() {
                debug!("{}: leader report dropped, reporter closed", self.pid);
            }
        }
    }

    fn send(&self, to: Pid, round: Round, kind: MessageKind) {
        self.peers.send(to, Message::new(self.pid, round, kind));
    }

    fn broadcast(&self, round: Round, kind: MessageKind) {
        self.peers.broadcast(Message::new(self.pid, round, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct Harness {
        peers: PeerDirectory,
        mailboxes: BTreeMap<Pid, UnboundedReceiver<Message>>,
    }

    impl Harness {
        fn new(pids: &[u64]) -> Self {
            let mut senders = BTreeMap::new();
            let mut mailboxes = BTreeMap::new();
            for &p in pids {
                let (tx, rx) = unbounded_channel();
                senders.insert(Pid(p), tx);
                mailboxes.insert(Pid(p), rx);
            }
            Self {
                peers: PeerDirectory::new(senders),
                mailboxes,
            }
        }

        fn node(&self, pid: u64, leader: u64) -> BullyNode {
            BullyNode::new(Pid(pid), Pid(leader), self.peers.clone(), ElectionConfig::default())
        }

        fn drain(&mut self, pid: u64) -> Vec<Message> {
            let rx = self.mailboxes.get_mut(&Pid(pid)).expect("known pid");
            let mut out = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn msg(sender: u64, round: Round, kind: MessageKind) -> Message {
        Message::new(Pid(sender), round, kind)
    }

    #[test]
    fn alive_is_always_answered_with_yes() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(3, 2);
        node.state.election_started = Some(1);

        node.on_round(2, vec![msg(1, 1, MessageKind::Alive)], false);

        assert_eq!(h.drain(1), vec![msg(3, 2, MessageKind::Yes)]);
    }

    #[test]
    fn election_from_lower_peer_yields_and_petitions_higher() {
        let mut h = Harness::new(&[1, 2, 3, 4, 5]);
        let mut node = h.node(3, 5);

        node.on_round(1, vec![msg(1, 0, MessageKind::Election)], false);

        assert_eq!(h.drain(1), vec![msg(3, 1, MessageKind::Ok)]);
        assert_eq!(h.drain(4), vec![msg(3, 1, MessageKind::Election)]);
        assert_eq!(h.drain(5), vec![msg(3, 1, MessageKind::Election)]);
        assert!(h.drain(2).is_empty());
        assert_eq!(node.state().election_started, Some(1));
        assert_eq!(node.phase(), ElectionPhase::ElectionPending);
    }

    #[test]
    fn second_election_message_does_not_restart_election() {
        let mut h = Harness::new(&[1, 2, 3, 4]);
        let mut node = h.node(3, 4);

        node.on_round(
            1,
            vec![msg(1, 0, MessageKind::Election), msg(2, 0, MessageKind::Election)],
            false,
        );

        assert_eq!(h.drain(1), vec![msg(3, 1, MessageKind::Ok)]);
        assert_eq!(h.drain(2), vec![msg(3, 1, MessageKind::Ok)]);
        assert_eq!(h.drain(4).len(), 1);
    }

    #[test]
    fn highest_pid_answers_election_with_coordinator() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(3, 2);

        node.on_round(1, vec![msg(1, 0, MessageKind::Election)], false);

        for p in [1, 2, 3] {
            assert_eq!(h.drain(p), vec![msg(3, 1, MessageKind::Coordinator)]);
        }
        assert!(!node.state().election_in_flight());
    }

    #[test]
    fn coordinator_updates_leader_and_reports() {
        let h = Harness::new(&[1, 2, 3]);
        let (tx, mut rx) = unbounded_channel();
        let mut node = h.node(1, 3);
        node.set_reporter(tx);
        node.state.election_started = Some(1);

        node.on_round(2, vec![msg(2, 1, MessageKind::Coordinator)], false);

        assert_eq!(node.believed_leader(), Pid(2));
        assert!(!node.state().election_in_flight());
        let report = rx.try_recv().expect("report sent");
        assert_eq!(
            report,
            LeaderReport {
                observer: Pid(1),
                leader: Pid(2),
                round: 2
            }
        );
    }

    #[test]
    fn ok_withdraws_from_election() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(1, 3);
        node.state.election_started = Some(1);

        node.on_round(2, vec![msg(2, 1, MessageKind::Ok)], false);
        node.on_round(3, vec![], false);

        assert!(!node.state().election_in_flight());
        assert!(h.drain(2).is_empty());
    }

    #[test]
    fn unanswered_election_self_declares_after_two_rounds() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(2, 3);

        node.on_round(1, vec![msg(1, 0, MessageKind::Election)], false);
        h.drain(1);
        h.drain(3);

        node.on_round(2, vec![], false);
        assert!(h.drain(1).is_empty());
        assert!(node.state().election_in_flight());

        node.on_round(3, vec![], false);
        for p in [1, 2, 3] {
            assert_eq!(h.drain(p), vec![msg(2, 3, MessageKind::Coordinator)]);
        }
        assert!(!node.state().election_in_flight());
    }

    #[test]
    fn unanswered_leader_check_starts_election() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(1, 3);

        node.on_round(1, vec![], true);
        assert_eq!(h.drain(3), vec![msg(1, 1, MessageKind::Alive)]);
        assert_eq!(node.phase(), ElectionPhase::ProbingLeader);

        node.on_round(2, vec![], false);
        assert!(h.drain(2).is_empty());

        node.on_round(3, vec![], false);
        assert_eq!(h.drain(2), vec![msg(1, 3, MessageKind::Election)]);
        assert_eq!(h.drain(3), vec![msg(1, 3, MessageKind::Election)]);
        assert!(!node.state().awaiting_leader_reply);
        assert_eq!(node.state().election_started, Some(3));
    }

    #[test]
    fn unanswered_leader_check_on_top_ranked_peer_self_declares_same_round() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(3, 2);

        node.on_round(1, vec![], true);
        node.on_round(2, vec![], false);
        h.drain(2);

        node.on_round(3, vec![], false);
        for p in [1, 2, 3] {
            assert_eq!(h.drain(p), vec![msg(3, 3, MessageKind::Coordinator)]);
        }
        assert_eq!(node.phase(), ElectionPhase::Idle);
    }

    #[test]
    fn yes_clears_leader_check_when_resolving_on_reply() {
        let mut h = Harness::new(&[1, 2]);
        let mut node = h.node(1, 2);

        node.on_round(1, vec![], true);
        node.on_round(2, vec![msg(2, 1, MessageKind::Yes)], false);
        node.on_round(3, vec![], false);

        assert_eq!(node.phase(), ElectionPhase::Idle);
        assert_eq!(h.drain(2), vec![msg(1, 1, MessageKind::Alive)]);
    }

    #[test]
    fn yes_is_ignored_when_resolving_on_timeout_only() {
        let mut h = Harness::new(&[1, 2]);
        let config = ElectionConfig {
            probe_resolution: ProbeResolution::TimeoutOnly,
            ..ElectionConfig::default()
        };
        let mut node = BullyNode::new(Pid(1), Pid(2), h.peers.clone(), config);

        node.on_round(1, vec![], true);
        node.on_round(2, vec![msg(2, 1, MessageKind::Yes)], false);
        assert_eq!(node.phase(), ElectionPhase::ProbingLeader);

        node.on_round(3, vec![], false);
        assert_eq!(
            h.drain(2),
            vec![msg(1, 1, MessageKind::Alive), msg(1, 3, MessageKind::Election)]
        );
    }

    #[test]
    fn resumed_leader_reasserts_before_handling_messages() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(3, 3);

        node.on_round(1, vec![], false);
        assert!(h.drain(1).is_empty());

        // Rounds 2 and 3 skipped while dormant.
        node.on_round(4, vec![msg(1, 3, MessageKind::Alive)], false);

        assert_eq!(
            h.drain(1),
            vec![msg(3, 4, MessageKind::Coordinator), msg(3, 4, MessageKind::Yes)]
        );
        assert_eq!(h.drain(2), vec![msg(3, 4, MessageKind::Coordinator)]);
    }

    #[test]
    fn liveness_timeout_during_election_does_not_petition_again() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(2, 3);

        node.on_round(1, vec![], true);
        node.on_round(2, vec![msg(1, 1, MessageKind::Election)], false);
        assert_eq!(node.state().election_started, Some(2));
        assert!(node.state().awaiting_leader_reply);

        // The leader check from round 1 times out while the election from round 2
        // is still running.
        node.on_round(3, vec![], false);

        assert_eq!(
            h.drain(3),
            vec![msg(2, 1, MessageKind::Alive), msg(2, 2, MessageKind::Election)]
        );
        assert_eq!(h.drain(1), vec![msg(2, 2, MessageKind::Ok)]);
        assert_eq!(node.state().election_started, Some(2));
        assert!(!node.state().awaiting_leader_reply);
    }

    #[test]
    fn coordinator_resolves_pending_leader_check() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(1, 3);

        node.on_round(1, vec![], true);
        node.on_round(2, vec![msg(2, 1, MessageKind::Coordinator)], false);
        node.on_round(3, vec![], false);
        node.on_round(4, vec![], false);

        assert_eq!(node.believed_leader(), Pid(2));
        assert_eq!(node.phase(), ElectionPhase::Idle);
        assert!(h.drain(2).is_empty());
        assert_eq!(h.drain(3), vec![msg(1, 1, MessageKind::Alive)]);
    }

    #[test]
    fn follower_skipping_rounds_stays_quiet() {
        let mut h = Harness::new(&[1, 2, 3]);
        let mut node = h.node(1, 3);

        node.on_round(1, vec![], false);
        node.on_round(5, vec![], false);

        assert!(h.drain(2).is_empty());
        assert!(h.drain(3).is_empty());
        assert_eq!(node.state().last_processed_round, 5);
    }
}
