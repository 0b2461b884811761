//! Correlation inbox
//!
//! Blocking interactions (prompts, alerts, device number changes) register a
//! one-shot waiter keyed by the request's correlation timestamp *before* the
//! request is sent. The ingestion path hands every reply to [`CorrelationInbox::deliver`],
//! which wakes the first waiter with the same timestamp. Replies nobody waits
//! for are queued (bounded) so a waiter registered late still finds them.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;
use tracing::trace;

use phonelink_core::{kinds, same_stamp, DataMsg, InformationMsg};

/// Which queue a reply belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboxChannel {
    /// `input_response` data messages
    Responses,
    /// `alert_confirm` data messages
    Alerts,
    /// `information_msg` events
    Information,
}

impl InboxChannel {
    /// Queue for a data message kind, if it is a reply at all.
    pub fn for_kind(kind: &str) -> Option<Self> {
        match kind {
            kinds::INPUT_RESPONSE => Some(Self::Responses),
            kinds::ALERT_CONFIRM => Some(Self::Alerts),
            _ => None,
        }
    }
}

/// A reply handed to a waiter.
#[derive(Debug, Clone, PartialEq)]
pub enum InboxEntry {
    Data(DataMsg),
    Information(InformationMsg),
}

impl InboxEntry {
    /// Correlation key carried by the reply.
    pub fn correlation_stamp(&self) -> Option<f64> {
        match self {
            InboxEntry::Data(msg) => Some(msg.time_stamp()),
            InboxEntry::Information(info) => info.action_time_stamp(),
        }
    }
}

struct Waiter {
    stamp: f64,
    tx: oneshot::Sender<InboxEntry>,
}

/// Pending waiters and unclaimed replies per channel.
pub struct CorrelationInbox {
    waiters: HashMap<InboxChannel, Vec<Waiter>>,
    queued: HashMap<InboxChannel, VecDeque<(f64, InboxEntry)>>,
    max_queued: usize,
}

impl std::fmt::Debug for CorrelationInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationInbox")
            .field("waiters", &self.waiters.values().map(Vec::len).sum::<usize>())
            .field("queued", &self.queued.values().map(VecDeque::len).sum::<usize>())
            .finish()
    }
}

impl CorrelationInbox {
    pub fn new(max_queued: usize) -> Self {
        Self {
            waiters: HashMap::new(),
            queued: HashMap::new(),
            max_queued: max_queued.max(1),
        }
    }

    /// Wait for the reply to the request stamped `stamp`.
    ///
    /// A matching reply already queued is consumed immediately.
    pub fn register(&mut self, channel: InboxChannel, stamp: f64) -> oneshot::Receiver<InboxEntry> {
        let (tx, rx) = oneshot::channel();

        if let Some(queue) = self.queued.get_mut(&channel) {
            if let Some(pos) = queue.iter().position(|(s, _)| same_stamp(*s, stamp)) {
                if let Some((_, entry)) = queue.remove(pos) {
                    let _ = tx.send(entry);
                    return rx;
                }
            }
        }

        self.waiters
            .entry(channel)
            .or_default()
            .push(Waiter { stamp, tx });
        rx
    }

    /// Hand a reply to its waiter, or queue it.
    ///
    /// Returns `true` when a waiter took it. Each reply is consumed at most
    /// once.
    pub fn deliver(&mut self, channel: InboxChannel, stamp: f64, entry: InboxEntry) -> bool {
        let mut entry = entry;
        if let Some(waiters) = self.waiters.get_mut(&channel) {
            while let Some(pos) = waiters.iter().position(|w| same_stamp(w.stamp, stamp)) {
                let waiter = waiters.remove(pos);
                match waiter.tx.send(entry) {
                    Ok(()) => return true,
                    // Receiver gone (timed out); try the next one
                    Err(returned) => entry = returned,
                }
            }
        }

        trace!("Queueing unclaimed {:?} reply {}", channel, stamp);
        let queue = self.queued.entry(channel).or_default();
        queue.push_back((stamp, entry));
        while queue.len() > self.max_queued {
            queue.pop_front();
        }
        false
    }

    /// Drop the waiter for `stamp`, e.g. after a timeout.
    pub fn cancel(&mut self, channel: InboxChannel, stamp: f64) {
        if let Some(waiters) = self.waiters.get_mut(&channel) {
            waiters.retain(|w| !same_stamp(w.stamp, stamp));
        }
    }

    /// Forget waiters and queued replies of one channel.
    pub fn clear(&mut self, channel: InboxChannel) {
        self.waiters.remove(&channel);
        self.queued.remove(&channel);
    }

    pub fn waiting(&self, channel: InboxChannel) -> usize {
        self.waiters.get(&channel).map_or(0, Vec::len)
    }

    pub fn queued(&self, channel: InboxChannel) -> usize {
        self.queued.get(&channel).map_or(0, VecDeque::len)
    }
}
