//! Node service for distributed mode
//!
//! Runs on each worker machine. The service:
//! - Listens for connections from the coordinator
//! - Receives the session (rank, strategy, the job)
//! - Answers READY
//! - Solves whatever share of the job its strategy gives it
//!
//! One coordinator is served at a time; when its run ends the service goes
//! back to waiting for the next one.

use super::protocol::{ErrorMessage, Message, ReadyMessage, SessionMessage, PROTOCOL_VERSION};
use super::tcp::TcpCommunicator;
use super::transport::Communicator;
use super::{distributor_for, get_node_id};
use crate::engine::Engine;
use crate::solver::FileSolver;
use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Handle, Runtime};

/// Node service
pub struct NodeService {
    /// Port to listen on
    listen_port: u16,

    /// Node identifier (hostname)
    node_id: String,
}

impl NodeService {
    pub fn new(listen_port: u16) -> Self {
        Self {
            listen_port,
            node_id: get_node_id(),
        }
    }

    /// Serve coordinators until the process is killed
    pub fn run(self) -> Result<()> {
        let runtime = Runtime::new().context("Failed to start async runtime")?;

        let addr = format!("0.0.0.0:{}", self.listen_port);
        let listener = runtime
            .block_on(TcpListener::bind(&addr))
            .with_context(|| format!("Failed to bind node service to {}", addr))?;

        println!("Node service listening on port {}", self.listen_port);
        println!("Node ID: {}", self.node_id);
        println!("Waiting for coordinator connection...");

        loop {
            let (stream, peer) = runtime
                .block_on(listener.accept())
                .context("Failed to accept connection")?;

            println!("Coordinator connected from: {}", peer);

            if let Err(e) = self.serve(runtime.handle().clone(), stream) {
                eprintln!("Session failed: {:#}", e);
            }

            println!("Session complete. Waiting for next connection...");
        }
    }

    /// Handle one coordinator connection from session to last plate
    pub fn serve(&self, runtime: Handle, stream: TcpStream) -> Result<()> {
        let (mut comm, session) = TcpCommunicator::accept(runtime, stream)?;

        if session.protocol_version != PROTOCOL_VERSION {
            let error = format!(
                "Protocol version mismatch: coordinator={}, node={}",
                session.protocol_version, PROTOCOL_VERSION
            );
            refuse(&mut comm, &error);
            anyhow::bail!(error);
        }

        let engine = match Engine::new(session.threads) {
            Ok(engine) => engine.with_debug(session.debug),
            Err(e) => {
                refuse(&mut comm, &e.to_string());
                return Err(e.into());
            }
        };

        print_session(&session);

        comm.send(
            0,
            &Message::Ready(ReadyMessage {
                protocol_version: PROTOCOL_VERSION,
                node_id: self.node_id.clone(),
                rank: session.rank,
                threads: engine.max_threads(),
            }),
        )?;

        let SessionMessage {
            strategy,
            output_dir,
            on_plate_error,
            job,
            ..
        } = session;
        let solver = FileSolver::new(engine, output_dir, on_plate_error);

        distributor_for(strategy)
            .distribute(&mut comm, &job, &solver)
            .with_context(|| format!("Rank {} failed", comm.rank()))?;

        Ok(())
    }
}

/// Decline the session instead of answering READY
fn refuse(comm: &mut TcpCommunicator, error: &str) {
    let message = Message::Error(ErrorMessage {
        rank: comm.rank(),
        error: error.to_string(),
    });
    if let Err(e) = comm.send(0, &message) {
        eprintln!("Warning: Could not send error to coordinator: {}", e);
    }
}

fn print_session(session: &SessionMessage) {
    println!("Received session:");
    println!("  Rank: {} of {}", session.rank, session.size);
    println!("  Strategy: {}", session.strategy);
    println!("  Threads: {}", session.threads);
    println!("  Plates: {}", session.job.len());
    println!("  Output directory: {}", session.output_dir.display());
}
