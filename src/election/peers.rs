use std::collections::BTreeMap;
use std::sync::Arc;

use ::log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;

use super::{Message, Pid};

/// Read-only directory of every process in the cluster, the owner included,
/// mapping each pid to the sending half of its mailbox.
///
/// Cloning is cheap; every process holds its own handle to the same map.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    peers: Arc<BTreeMap<Pid, UnboundedSender<Message>>>,
}

impl PeerDirectory {
    pub fn new(peers: BTreeMap<Pid, UnboundedSender<Message>>) -> Self {
        Self {
            peers: Arc::new(peers),
        }
    }

    /// True when no known peer outranks `pid`.
    pub fn is_highest(&self, pid: Pid) -> bool {
        self.peers.keys().next_back().map_or(true, |&max| max <= pid)
    }

    /// Peers with a strictly higher pid, in ascending order.
    pub fn higher_than(&self, pid: Pid) -> impl Iterator<Item = Pid> + '_ {
        self.peers
            .range((std::ops::Bound::Excluded(pid), std::ops::Bound::Unbounded))
            .map(|(&p, _)| p)
    }

    /// Enqueues `message` for `to`. Never blocks and never fails: a crashed
    /// or unknown destination only gets logged.
    pub fn send(&self, to: Pid, message: Message) {
        match self.peers.get(&to) {
            Some(tx) => {
                if tx.send(message).is_err() {
                    debug!("Dropping {:?} for {to}: mailbox closed", message.kind);
                }
            }
            None => warn!("Dropping {:?} for unknown peer {to}", message.kind),
        }
    }

    /// Enqueues `message` for every peer, the sender included.
    pub fn broadcast(&self, message: Message) {
        for &pid in self.peers.keys() {
            self.send(pid, message);
        }
    }
}
