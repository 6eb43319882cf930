pub mod gate;
mod mailbox;

use ::log::{debug, info};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::election::BullyNode;

pub use self::gate::{GateSignal, RoundAck, RoundGate};
pub use self::mailbox::Mailbox;

/// Everything a process reads from the outside world.
pub struct ProcessIo {
    pub gate: RoundGate,
    pub mailbox: Mailbox,
    pub check_leader: UnboundedReceiver<()>,
}

/// Drives `node` round by round until the gate says stop.
///
/// Termination abandons any election or probe in flight: the node and its
/// state are simply dropped.
pub async fn run_process(mut node: BullyNode, mut io: ProcessIo) {
    debug!("{} started, believing {} is leader", node.pid(), node.believed_leader());

    while let Some(round) = io.gate.next_round().await {
        let inbound = io.mailbox.drain_round(round.saturating_sub(1));
        let check_leader = io.check_leader.try_recv().is_ok();

        node.on_round(round, inbound, check_leader);
        io.gate.complete(round);
    }

    info!("{} terminated", node.pid());
}
