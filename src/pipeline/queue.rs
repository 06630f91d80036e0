//! Hand-off queues between pipeline stages
//!
//! Queues are crossbeam channels, bounded or unbounded, with an
//! [`OverflowPolicy`] deciding what [`QueueSender::push`] does when a bounded
//! queue is full. End-of-stream is signalled by dropping every sender: the
//! receiver still yields all queued items and only then reports
//! disconnection, so no item pushed before shutdown is lost.

use crate::config::OverflowPolicy;
use crate::error::{CollectError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

/// What happened to an item handed to [`QueueSender::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The item was queued
    Queued,
    /// The item was queued after evicting the oldest queued item
    Evicted,
    /// The queue was full and the item was rejected
    Rejected,
}

impl PushOutcome {
    /// Whether an item was lost to make this push happen
    pub fn dropped_item(&self) -> bool {
        !matches!(self, PushOutcome::Queued)
    }
}

/// Producer side of a hand-off queue
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: Sender<T>,
    /// Receiver clone used to evict under `DropOldest`
    evict: Option<Receiver<T>>,
    policy: OverflowPolicy,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
            policy: self.policy,
        }
    }
}

/// Create a hand-off queue; `None` capacity gives an unbounded queue
pub fn channel<T>(capacity: Option<usize>, policy: OverflowPolicy) -> (QueueSender<T>, Receiver<T>) {
    let (tx, rx) = match capacity {
        Some(cap) => bounded(cap),
        None => unbounded(),
    };
    let evict = match (capacity, policy) {
        (Some(_), OverflowPolicy::DropOldest) => Some(rx.clone()),
        _ => None,
    };
    (QueueSender { tx, evict, policy }, rx)
}

impl<T> QueueSender<T> {
    /// Push an item according to the queue's overflow policy
    ///
    /// Fails only when the consumer has gone away.
    pub fn push(&self, item: T) -> Result<PushOutcome> {
        match self.policy {
            OverflowPolicy::Block => {
                self.send_blocking(item)?;
                Ok(PushOutcome::Queued)
            }
            OverflowPolicy::DropNewest => self.try_push(item),
            OverflowPolicy::DropOldest => {
                let mut item = item;
                let mut evicted = false;
                loop {
                    match self.tx.try_send(item) {
                        Ok(()) => {
                            return Ok(if evicted {
                                PushOutcome::Evicted
                            } else {
                                PushOutcome::Queued
                            })
                        }
                        Err(TrySendError::Full(back)) => {
                            item = back;
                            // The consumer may have emptied the slot already
                            if let Some(evict) = &self.evict {
                                if evict.try_recv().is_ok() {
                                    evicted = true;
                                }
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return Err(disconnected()),
                    }
                }
            }
        }
    }

    /// Push without blocking, rejecting the item if the queue is full
    pub fn try_push(&self, item: T) -> Result<PushOutcome> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(PushOutcome::Queued),
            Err(TrySendError::Full(_)) => Ok(PushOutcome::Rejected),
            Err(TrySendError::Disconnected(_)) => Err(disconnected()),
        }
    }

    /// Push, waiting for space if the queue is full
    pub fn send_blocking(&self, item: T) -> Result<()> {
        self.tx.send(item).map_err(|_| disconnected())
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

fn disconnected() -> CollectError {
    CollectError::Channel("queue consumer has stopped".to_string())
}
