//! Rank-addressed message passing
//!
//! A [`Communicator`] gives one rank blocking point-to-point messaging with
//! every other rank of its run. Messages from one sender arrive in the order
//! they were sent; messages from different senders interleave arbitrarily.
//!
//! Both transports deliver incoming messages into a [`Mailbox`]: a crossbeam
//! channel fed by every peer, plus a stash for messages that arrived while
//! the rank was waiting on a specific sender.

use super::protocol::Message;
use crate::error::HeatError;
use crossbeam::channel::Receiver;
use std::collections::VecDeque;

/// Which sender a receive accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// First message from anyone
    Any,
    /// Next message from this rank
    Rank(usize),
}

impl Source {
    fn accepts(self, rank: usize) -> bool {
        match self {
            Source::Any => true,
            Source::Rank(wanted) => wanted == rank,
        }
    }
}

/// A received message and its sender
#[derive(Debug, Clone)]
pub struct Envelope {
    pub source: usize,
    pub message: Message,
}

/// Blocking point-to-point messaging for one rank
pub trait Communicator: Send {
    /// This process's rank, `0..size()`
    fn rank(&self) -> usize;

    /// Number of ranks in the run
    fn size(&self) -> usize;

    /// Send `message` to rank `dest`
    fn send(&mut self, dest: usize, message: &Message) -> Result<(), HeatError>;

    /// Block until a message from `source` arrives
    ///
    /// A peer whose connection broke yields a [`HeatError::Messaging`] once
    /// its earlier messages have been received.
    fn recv(&mut self, source: Source) -> Result<Envelope, HeatError>;
}

/// One incoming item: a message, or the reason a peer's link went down
#[derive(Debug)]
pub(crate) struct Delivery {
    pub source: usize,
    pub payload: Result<Message, String>,
}

/// Incoming queue of one rank
pub(crate) struct Mailbox {
    inbox: Receiver<Delivery>,
    stash: VecDeque<Delivery>,
}

impl Mailbox {
    pub fn new(inbox: Receiver<Delivery>) -> Self {
        Self {
            inbox,
            stash: VecDeque::new(),
        }
    }

    pub fn recv(&mut self, source: Source) -> Result<Envelope, HeatError> {
        if let Some(pos) = self.stash.iter().position(|d| source.accepts(d.source)) {
            if let Some(delivery) = self.stash.remove(pos) {
                return open(delivery);
            }
        }

        loop {
            let delivery = self
                .inbox
                .recv()
                .map_err(|_| HeatError::messaging("recv", "every peer has disconnected"))?;

            if source.accepts(delivery.source) {
                return open(delivery);
            }
            self.stash.push_back(delivery);
        }
    }
}

fn open(delivery: Delivery) -> Result<Envelope, HeatError> {
    match delivery.payload {
        Ok(message) => Ok(Envelope {
            source: delivery.source,
            message,
        }),
        Err(reason) => Err(HeatError::messaging(
            "recv",
            format!("link to rank {} failed: {}", delivery.source, reason),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    fn assign(source: usize, plate_index: usize) -> Delivery {
        Delivery {
            source,
            payload: Ok(Message::Assign { plate_index }),
        }
    }

    fn plate_of(envelope: Envelope) -> usize {
        match envelope.message {
            Message::Assign { plate_index } => plate_index,
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_any_source_takes_arrival_order() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send(assign(2, 20)).unwrap();
        tx.send(assign(1, 10)).unwrap();

        let first = mailbox.recv(Source::Any).unwrap();
        assert_eq!(first.source, 2);
        assert_eq!(plate_of(mailbox.recv(Source::Any).unwrap()), 10);
    }

    #[test]
    fn test_specific_source_stashes_others() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send(assign(2, 20)).unwrap();
        tx.send(assign(2, 21)).unwrap();
        tx.send(assign(1, 10)).unwrap();

        assert_eq!(plate_of(mailbox.recv(Source::Rank(1)).unwrap()), 10);
        // Per-sender order survives the stash
        assert_eq!(plate_of(mailbox.recv(Source::Rank(2)).unwrap()), 20);
        assert_eq!(plate_of(mailbox.recv(Source::Any).unwrap()), 21);
    }

    #[test]
    fn test_link_failure_surfaces_after_earlier_messages() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send(assign(1, 10)).unwrap();
        tx.send(Delivery {
            source: 1,
            payload: Err("connection reset".to_string()),
        })
        .unwrap();

        assert_eq!(plate_of(mailbox.recv(Source::Rank(1)).unwrap()), 10);
        let err = mailbox.recv(Source::Rank(1)).unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_all_senders_gone() {
        let (tx, rx) = unbounded::<Delivery>();
        let mut mailbox = Mailbox::new(rx);
        drop(tx);
        assert!(matches!(mailbox.recv(Source::Any), Err(HeatError::Messaging { .. })));
    }
}
