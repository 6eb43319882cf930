use std::collections::BTreeMap;

use ::log::debug;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::election::{Message, Round};

/// Inbound queue of a single process.
///
/// Messages that arrive ahead of their round are staged per round until that
/// round is drained. Messages for rounds already gone by (typically
/// delivered while the process was dormant) are discarded.
pub struct Mailbox {
    inbound: UnboundedReceiver<Message>,
    staged: BTreeMap<Round, Vec<Message>>,
}

impl Mailbox {
    pub fn new(inbound: UnboundedReceiver<Message>) -> Self {
        Self {
            inbound,
            staged: BTreeMap::new(),
        }
    }

    /// Returns every message tagged `round`, in delivery order. Never blocks.
    pub fn drain_round(&mut self, round: Round) -> Vec<Message> {
        let later = self.staged.split_off(&round);
        let stale = std::mem::replace(&mut self.staged, later);
        let mut dropped: usize = stale.values().map(Vec::len).sum();

        let mut ready = self.staged.remove(&round).unwrap_or_default();

        while let Ok(message) = self.inbound.try_recv() {
            if message.round == round {
                ready.push(message);
            } else if message.round > round {
                self.staged.entry(message.round).or_default().push(message);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            debug!("Discarded {dropped} stale message(s) while draining round {round}");
        }

        ready
    }

    /// Number of messages held back for future rounds.
    pub fn staged_len(&self) -> usize {
        self.staged.values().map(Vec::len).sum()
    }
}
