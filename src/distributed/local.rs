//! In-process ranks
//!
//! [`LocalCluster`] runs `size` ranks as threads of the current process,
//! connected by crossbeam channels. Standalone mode uses it for
//! `--processes N`; tests use it to exercise the distribution strategies
//! without sockets.

use super::protocol::Message;
use super::transport::{Communicator, Delivery, Envelope, Mailbox, Source};
use crate::error::HeatError;
use crossbeam::channel::{unbounded, Sender};
use std::thread;

/// [`Communicator`] of one in-process rank
pub struct LocalCommunicator {
    rank: usize,
    /// Sender into every other rank's mailbox; `None` at our own index
    peers: Vec<Option<Sender<Delivery>>>,
    mailbox: Mailbox,
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&mut self, dest: usize, message: &Message) -> Result<(), HeatError> {
        let peer = self
            .peers
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| HeatError::messaging("send", format!("rank {} cannot send to rank {}", self.rank, dest)))?;

        peer.send(Delivery {
            source: self.rank,
            payload: Ok(message.clone()),
        })
        .map_err(|_| HeatError::messaging("send", format!("rank {} has exited", dest)))
    }

    fn recv(&mut self, source: Source) -> Result<Envelope, HeatError> {
        self.mailbox.recv(source)
    }
}

/// Factory and runner for in-process ranks
pub struct LocalCluster;

impl LocalCluster {
    /// Create `size` fully connected communicators, in rank order
    pub fn new(size: usize) -> Result<Vec<LocalCommunicator>, HeatError> {
        if size == 0 {
            return Err(HeatError::InvalidArgument(
                "a cluster needs at least one rank".to_string(),
            ));
        }

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalCommunicator {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                    .collect(),
                mailbox: Mailbox::new(inbox),
            })
            .collect())
    }

    /// Run `body` once per rank, each on its own thread, and collect the
    /// results in rank order
    ///
    /// A rank thread that panics is reported as a thread failure for that rank.
    pub fn run<T, F>(size: usize, body: F) -> Result<Vec<Result<T, HeatError>>, HeatError>
    where
        T: Send,
        F: Fn(LocalCommunicator) -> Result<T, HeatError> + Sync,
    {
        let comms = Self::new(size)?;
        let body = &body;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for comm in comms {
                let rank = comm.rank;
                let handle = thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(scope, move || body(comm))
                    .map_err(|e| HeatError::ThreadCreation {
                        index: rank,
                        reason: e.to_string(),
                    })?;
                handles.push(handle);
            }

            Ok(handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(HeatError::ThreadCreation {
                            index: rank,
                            reason: "rank thread panicked".to_string(),
                        })
                    })
                })
                .collect())
        })
    }
}
