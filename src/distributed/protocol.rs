//! Distributed mode protocol
//!
//! Messages exchanged between ranks. Over TCP they are serialized with
//! MessagePack (rmp-serde); the in-process cluster passes them as values.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! Session setup (TCP only):
//!
//! ```text
//! Coordinator (rank 0)             Service (rank r)
//!     |                              |
//!     |-------- SESSION(rank r) ---->|
//!     |<------- READY ---------------|
//! ```
//!
//! Static distribution: every rank solves its own block, then
//!
//! ```text
//!     |<------- STATE_COUNTS --------|
//! ```
//!
//! Dynamic distribution:
//!
//! ```text
//!     |-------- ASSIGN(i) ---------->|
//!     |<------- COMPLETED(i) --------|
//!     |-------- ASSIGN(j) ---------->|
//!     |<------- COMPLETED(j) --------|
//!     |-------- ASSIGN(sentinel) --->|
//! ```
//!
//! Either side may send ERROR instead of its next message; the receiver
//! aborts the run.
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::config::{DistributionStrategy, PlateErrorPolicy};
use crate::job::{Job, PlateOutcome};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// Coordinator and services must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body
pub const MAX_MESSAGE_BYTES: usize = 100 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Session message (Coordinator → Service)
    ///
    /// First message on every connection. Tells the service its rank and
    /// carries everything needed to solve plates.
    Session(SessionMessage),

    /// Ready message (Service → Coordinator)
    Ready(ReadyMessage),

    /// Assign message (rank 0 → worker, dynamic strategy)
    ///
    /// An index equal to the job's plate count tells the worker to stop.
    Assign { plate_index: usize },

    /// Completed message (worker → rank 0, dynamic strategy)
    Completed { plate_index: usize, outcome: PlateOutcome },

    /// State counts message (worker → rank 0, static strategy)
    ///
    /// Outcomes of the contiguous block of plates starting at `start`.
    StateCounts { start: usize, outcomes: Vec<PlateOutcome> },

    /// Error message (either direction)
    ///
    /// Sent by a rank that gives up, right before it exits.
    Error(ErrorMessage),
}

impl Message {
    /// Short name for log and error lines
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Session(_) => "SESSION",
            Message::Ready(_) => "READY",
            Message::Assign { .. } => "ASSIGN",
            Message::Completed { .. } => "COMPLETED",
            Message::StateCounts { .. } => "STATE_COUNTS",
            Message::Error(_) => "ERROR",
        }
    }
}

/// Session message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Rank assigned to the receiving service
    pub rank: usize,

    /// Total ranks, coordinator included
    pub size: usize,

    pub strategy: DistributionStrategy,

    /// Worker threads per plate
    pub threads: usize,

    /// Where equilibrated plates are written
    ///
    /// Paths are the coordinator's; services are expected to see the same
    /// file system.
    pub output_dir: PathBuf,

    pub on_plate_error: PlateErrorPolicy,

    pub debug: bool,

    /// The complete job
    pub job: Job,
}

/// Ready message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyMessage {
    /// Protocol version
    pub protocol_version: u32,

    /// Node identifier (hostname)
    pub node_id: String,

    pub rank: usize,

    /// Threads the service will use per plate
    pub threads: usize,
}

/// Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Rank that failed
    pub rank: usize,

    /// Error description
    pub error: String,
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg)
        .context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_bytes.len());
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Expects a 4-byte length prefix followed by MessagePack-serialized message.
///
/// # Returns
///
/// Returns (message, bytes_consumed) where bytes_consumed includes the length prefix.
pub(crate) fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < 4 {
        anyhow::bail!("Buffer too small for message length (need 4 bytes, got {})", buf.len());
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if msg_len > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_len);
    }

    if buf.len() < 4 + msg_len {
        anyhow::bail!("Incomplete message (need {} bytes, got {})", 4 + msg_len, buf.len());
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len])
        .context("Failed to deserialize message")?;

    Ok((msg, 4 + msg_len))
}

/// Read a complete message from a stream
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await
        .context("Failed to read message length")?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check: reject messages > 100MB
    if msg_len > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_len);
    }

    let mut frame = vec![0u8; 4 + msg_len];
    frame[..4].copy_from_slice(&len_buf);
    stream.read_exact(&mut frame[4..]).await
        .context("Failed to read message body")?;

    let (msg, _) = deserialize_message(&frame)?;
    Ok(msg)
}

/// Write a message to a stream
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, msg: &Message) -> Result<()> {
    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await
        .context("Failed to write message")?;

    // Flush to ensure message is sent immediately
    stream.flush().await
        .context("Failed to flush stream")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn job() -> Job {
        Job::parse(Path::new("jobs/job.txt"), "a.bin 60 0.08 450 0.075\nb.bin 1 1 1 1\n").unwrap()
    }

    #[test]
    fn test_serialize_deserialize_session() {
        let msg = Message::Session(SessionMessage {
            protocol_version: PROTOCOL_VERSION,
            rank: 2,
            size: 4,
            strategy: DistributionStrategy::Dynamic,
            threads: 8,
            output_dir: PathBuf::from("out"),
            on_plate_error: PlateErrorPolicy::Skip,
            debug: false,
            job: job(),
        });

        let bytes = serialize_message(&msg).unwrap();
        let (deserialized, consumed) = deserialize_message(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());

        match deserialized {
            Message::Session(session) => {
                assert_eq!(session.rank, 2);
                assert_eq!(session.size, 4);
                assert_eq!(session.strategy, DistributionStrategy::Dynamic);
                assert_eq!(session.on_plate_error, PlateErrorPolicy::Skip);
                assert_eq!(session.job, job());
            }
            other => panic!("Wrong message type: {}", other.kind()),
        }
    }

    #[test]
    fn test_serialize_deserialize_completed() {
        let msg = Message::Completed {
            plate_index: 7,
            outcome: PlateOutcome::Skipped { reason: "missing".into() },
        };

        let bytes = serialize_message(&msg).unwrap();
        let (deserialized, _) = deserialize_message(&bytes).unwrap();

        match deserialized {
            Message::Completed { plate_index, outcome } => {
                assert_eq!(plate_index, 7);
                assert_eq!(outcome, PlateOutcome::Skipped { reason: "missing".into() });
            }
            other => panic!("Wrong message type: {}", other.kind()),
        }
    }

    #[test]
    fn test_serialize_deserialize_state_counts() {
        let outcomes = vec![
            PlateOutcome::Equilibrated { states: 2162 },
            PlateOutcome::Equilibrated { states: 1 },
        ];
        let msg = Message::StateCounts { start: 3, outcomes: outcomes.clone() };

        let bytes = serialize_message(&msg).unwrap();
        match deserialize_message(&bytes).unwrap().0 {
            Message::StateCounts { start, outcomes: got } => {
                assert_eq!(start, 3);
                assert_eq!(got, outcomes);
            }
            other => panic!("Wrong message type: {}", other.kind()),
        }
    }

    #[test]
    fn test_message_framing() {
        let msg = Message::Assign { plate_index: 5 };
        let bytes = serialize_message(&msg).unwrap();

        assert!(bytes.len() >= 4);
        let msg_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(bytes.len(), 4 + msg_len);
    }

    #[test]
    fn test_incomplete_frame_rejected() {
        let bytes = serialize_message(&Message::Assign { plate_index: 5 }).unwrap();
        assert!(deserialize_message(&bytes[..bytes.len() - 1]).is_err());
        assert!(deserialize_message(&bytes[..2]).is_err());
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut bytes = ((MAX_MESSAGE_BYTES + 1) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let err = deserialize_message(&bytes).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_message(&mut client, &Message::Assign { plate_index: 9 }).await.unwrap();
        write_message(&mut client, &Message::Error(ErrorMessage { rank: 1, error: "boom".into() }))
            .await
            .unwrap();

        assert!(matches!(read_message(&mut server).await.unwrap(), Message::Assign { plate_index: 9 }));
        match read_message(&mut server).await.unwrap() {
            Message::Error(err) => {
                assert_eq!(err.rank, 1);
                assert_eq!(err.error, "boom");
            }
            other => panic!("Wrong message type: {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_stream_oversize_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, &u32::MAX.to_le_bytes()).await.unwrap();
        let err = read_message(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_stream_garbage_body_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let mut frame = 3u32.to_le_bytes().to_vec();
        frame.extend_from_slice(&[0xc1, 0xc1, 0xc1]);
        tokio::io::AsyncWriteExt::write_all(&mut client, &frame).await.unwrap();

        let err = read_message(&mut server).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to deserialize message"));
    }
}
