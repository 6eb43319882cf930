use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::election::{Pid, Round};

/// Scheduler decision handed to a process at the top of each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSignal {
    Proceed(Round),
    /// Crash the process. Nothing is cleaned up and no peer is told.
    Terminate,
}

/// Sent back to the scheduler once a process has fully handled a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundAck {
    pub pid: Pid,
    pub round: Round,
}

/// Process side of the round gate.
pub struct RoundGate {
    pid: Pid,
    signals: UnboundedReceiver<GateSignal>,
    acks: UnboundedSender<RoundAck>,
}

impl RoundGate {
    /// Waits for the scheduler. `None` means the process must stop now,
    /// either because it was told to terminate or the scheduler is gone.
    pub async fn next_round(&mut self) -> Option<Round> {
        match self.signals.recv().await {
            Some(GateSignal::Proceed(round)) => Some(round),
            Some(GateSignal::Terminate) | None => None,
        }
    }

    pub fn complete(&self, round: Round) {
        // The scheduler only disappears on shutdown, in which case the next
        // `next_round` returns `None` anyway.
        let _ = self.acks.send(RoundAck {
            pid: self.pid,
            round,
        });
    }
}

/// Creates a gate for `pid` whose acknowledgements go to `acks`. The
/// returned sender is the scheduler's handle.
pub fn channel(pid: Pid, acks: UnboundedSender<RoundAck>) -> (UnboundedSender<GateSignal>, RoundGate) {
    let (tx, signals) = unbounded_channel();
    (tx, RoundGate { pid, signals, acks })
}
