//! TCP transport
//!
//! Star topology: the coordinator (rank 0) holds one connection per service
//! and services only talk to rank 0. Each connection gets a reader task on
//! the tokio runtime that decodes frames into the owning rank's mailbox;
//! sends are written synchronously through `block_on`.
//!
//! The runtime is owned by the caller and must outlive the communicator.

use super::protocol::{read_message, write_message, Message, SessionMessage};
use super::transport::{Communicator, Delivery, Envelope, Mailbox, Source};
use crate::error::HeatError;
use crossbeam::channel::{unbounded, Sender};
use std::collections::HashMap;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// [`Communicator`] over TCP connections
pub struct TcpCommunicator {
    rank: usize,
    size: usize,
    runtime: Handle,
    writers: HashMap<usize, OwnedWriteHalf>,
    readers: Vec<JoinHandle<()>>,
    mailbox: Mailbox,
}

impl TcpCommunicator {
    /// Connect rank 0 to every service in `hosts`
    ///
    /// Services get ranks `1..=hosts.len()` in list order.
    pub fn connect(runtime: Handle, hosts: &[String]) -> Result<Self, HeatError> {
        let (tx, rx) = unbounded();
        let mut writers = HashMap::new();
        let mut readers = Vec::new();

        for (i, addr) in hosts.iter().enumerate() {
            let rank = i + 1;
            println!("  Connecting to node {} ({})...", rank, addr);
            let stream = runtime
                .block_on(TcpStream::connect(addr))
                .map_err(|e| HeatError::messaging("connect", format!("{}: {}", addr, e)))?;
            stream
                .set_nodelay(true)
                .map_err(|e| HeatError::messaging("connect", format!("{}: {}", addr, e)))?;
            println!("  Connected to node {} ({})", rank, addr);

            let (read_half, write_half) = stream.into_split();
            readers.push(runtime.spawn(pump(rank, read_half, tx.clone())));
            writers.insert(rank, write_half);
        }

        Ok(Self {
            rank: 0,
            size: hosts.len() + 1,
            runtime,
            writers,
            readers,
            mailbox: Mailbox::new(rx),
        })
    }

    /// Serve a coordinator connection
    ///
    /// Reads the first message, which must be a session, and returns a
    /// communicator for the rank it assigns.
    pub fn accept(runtime: Handle, mut stream: TcpStream) -> Result<(Self, SessionMessage), HeatError> {
        let first = runtime
            .block_on(read_message(&mut stream))
            .map_err(|e| HeatError::messaging("session setup", format!("{:#}", e)))?;

        let session = match first {
            Message::Session(session) => session,
            other => {
                return Err(HeatError::messaging(
                    "session setup",
                    format!("expected SESSION, got {}", other.kind()),
                ))
            }
        };

        if session.rank == 0 || session.rank >= session.size {
            return Err(HeatError::messaging(
                "session setup",
                format!("rank {} is invalid for a run of {} ranks", session.rank, session.size),
            ));
        }
        stream
            .set_nodelay(true)
            .map_err(|e| HeatError::messaging("session setup", e))?;

        let (tx, rx) = unbounded();
        let (read_half, write_half) = stream.into_split();
        let reader = runtime.spawn(pump(0, read_half, tx));

        let mut writers = HashMap::new();
        writers.insert(0, write_half);

        Ok((
            Self {
                rank: session.rank,
                size: session.size,
                runtime,
                writers,
                readers: vec![reader],
                mailbox: Mailbox::new(rx),
            },
            session,
        ))
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, message: &Message) -> Result<(), HeatError> {
        let writer = self
            .writers
            .get_mut(&dest)
            .ok_or_else(|| HeatError::messaging("send", format!("no connection from rank {} to rank {}", self.rank, dest)))?;

        self.runtime
            .block_on(write_message(writer, message))
            .map_err(|e| HeatError::messaging("send", format!("to rank {}: {:#}", dest, e)))
    }

    fn recv(&mut self, source: Source) -> Result<Envelope, HeatError> {
        self.mailbox.recv(source)
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Decode frames from `source` until the connection ends
async fn pump(source: usize, mut stream: OwnedReadHalf, inbox: Sender<Delivery>) {
    loop {
        let payload = read_message(&mut stream).await.map_err(|e| format!("{:#}", e));
        let failed = payload.is_err();

        if inbox.send(Delivery { source, payload }).is_err() || failed {
            return;
        }
    }
}
