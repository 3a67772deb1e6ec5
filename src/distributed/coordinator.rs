//! Distributed coordinator
//!
//! Rank 0 of a TCP run. The coordinator:
//! - Reads the job and prepares the output directories
//! - Connects to every node service in `--host-list`
//! - Sends each one its session (rank, strategy, the job)
//! - Waits for every READY
//! - Takes part in the distribution as rank 0
//! - Writes the report
//!
//! Plate files and output directories are resolved on each node with the
//! coordinator's paths, so every node must see the same file system.

use super::protocol::{Message, SessionMessage, PROTOCOL_VERSION};
use super::tcp::TcpCommunicator;
use super::transport::{Communicator, Source};
use crate::config::Config;
use crate::job::Job;
use crate::simulation::{build_solver, finish_job, prepare_job, print_plan, run_rank, JobRun, RunClock};
use anyhow::{Context, Result};
use tokio::runtime::Runtime;

/// Distributed coordinator
pub struct DistributedCoordinator {
    config: Config,

    /// Node service addresses (HOST:PORT), in rank order
    node_addresses: Vec<String>,
}

impl DistributedCoordinator {
    pub fn new(config: Config, node_addresses: Vec<String>) -> Result<Self> {
        if node_addresses.is_empty() {
            anyhow::bail!("No nodes specified for distributed mode");
        }

        Ok(Self { config, node_addresses })
    }

    /// Run the job across all nodes
    ///
    /// Returns `None` for a dry run.
    pub fn run(self) -> Result<Option<JobRun>> {
        println!("Distributed Coordinator");
        println!();

        let job = prepare_job(&self.config)?;
        let size = self.node_addresses.len() + 1;

        if self.config.runtime.dry_run {
            print_plan(&self.config, &job, size);
            return Ok(None);
        }

        let runtime = Runtime::new().context("Failed to start async runtime")?;

        println!("Connecting to {} nodes...", self.node_addresses.len());
        let mut comm = TcpCommunicator::connect(runtime.handle().clone(), &self.node_addresses)?;
        println!();
        println!("All {} nodes connected!", self.node_addresses.len());

        self.start_sessions(&mut comm, &job)?;
        self.wait_ready(&mut comm)?;

        println!();
        println!("All nodes ready!");
        println!();

        let solver = build_solver(&self.config)?;
        let clock = RunClock::start();

        let outcomes = run_rank(&mut comm, &job, &solver, self.config.workers.strategy)?
            .context("Rank 0 finished without outcomes")?;

        // Close the connections before writing the report
        drop(comm);

        finish_job(&self.config, job, outcomes, size, clock).map(Some)
    }

    fn start_sessions(&self, comm: &mut TcpCommunicator, job: &Job) -> Result<()> {
        let size = comm.size();
        for rank in 1..size {
            let session = SessionMessage {
                protocol_version: PROTOCOL_VERSION,
                rank,
                size,
                strategy: self.config.workers.strategy,
                threads: self.config.workers.threads,
                output_dir: self.config.output_dir(),
                on_plate_error: self.config.runtime.on_plate_error,
                debug: self.config.runtime.debug,
                job: job.clone(),
            };
            comm.send(rank, &Message::Session(session))
                .with_context(|| format!("Failed to send SESSION to node {}", rank))?;
            println!("  Sent SESSION to node {} (rank {} of {})", self.node_addresses[rank - 1], rank, size);
        }
        Ok(())
    }

    fn wait_ready(&self, comm: &mut TcpCommunicator) -> Result<()> {
        println!();
        println!("Waiting for all nodes to be ready...");

        for rank in 1..comm.size() {
            let envelope = comm
                .recv(Source::Rank(rank))
                .with_context(|| format!("Failed to read READY from node {}", rank))?;

            match envelope.message {
                Message::Ready(ready) => {
                    if ready.protocol_version != PROTOCOL_VERSION {
                        anyhow::bail!(
                            "Protocol version mismatch on node {}: expected {}, got {}",
                            rank,
                            PROTOCOL_VERSION,
                            ready.protocol_version
                        );
                    }
                    if ready.rank != rank {
                        anyhow::bail!("Node {} answered as rank {}", rank, ready.rank);
                    }
                    println!("  Node {} ready ({}, {} threads)", rank, ready.node_id, ready.threads);
                }
                Message::Error(err) => {
                    anyhow::bail!("Node {} reported error: {}", rank, err.error);
                }
                other => {
                    anyhow::bail!("Expected READY from node {}, got {}", rank, other.kind());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistributionStrategy;
    use crate::distributed::NodeService;
    use crate::grid::Grid;
    use crate::job::PlateOutcome;
    use crate::plate_io::store_plate_grid;
    use std::fs;
    use std::path::Path;
    use std::thread;
    use tokio::net::TcpListener;

    /// Node services that each handle one connection, on their own runtime
    fn spawn_services(count: usize) -> (Vec<String>, Vec<thread::JoinHandle<Result<()>>>) {
        let mut addrs = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..count {
            let runtime = Runtime::new().unwrap();
            let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
            addrs.push(listener.local_addr().unwrap().to_string());

            handles.push(thread::spawn(move || {
                let (stream, _) = runtime.block_on(listener.accept())?;
                NodeService::new(0).serve(runtime.handle().clone(), stream)
            }));
        }
        (addrs, handles)
    }

    fn write_job(dir: &Path, plates: usize) -> Config {
        let mut text = String::new();
        for i in 0..plates {
            let name = format!("p{}.bin", i);
            store_plate_grid(&dir.join(&name), &Grid::from_cells(3, 5, vec![1.5; 15]).unwrap()).unwrap();
            text.push_str(&format!("{} 5 1 1 0.1\n", name));
        }
        let job_path = dir.join("job.txt");
        fs::write(&job_path, text).unwrap();

        let mut config = Config {
            job_file: Some(job_path),
            ..Config::default()
        };
        config.workers.threads = 1;
        config.output.report_dir = dir.join("reports");
        config
    }

    #[test]
    fn test_empty_host_list_rejected() {
        assert!(DistributedCoordinator::new(Config::default(), Vec::new()).is_err());
    }

    #[test]
    fn test_run_over_loopback() {
        for strategy in [DistributionStrategy::Static, DistributionStrategy::Dynamic] {
            let dir = tempfile::TempDir::new().unwrap();
            let mut config = write_job(dir.path(), 5);
            config.workers.strategy = strategy;

            let (addrs, services) = spawn_services(2);
            let run = DistributedCoordinator::new(config, addrs).unwrap().run().unwrap().unwrap();

            for service in services {
                service.join().unwrap().unwrap();
            }
            assert!(run
                .job
                .outcomes()
                .all(|o| o == Some(&PlateOutcome::Equilibrated { states: 1 })));
            assert!(run.report_file.exists());
            assert!(dir.path().join("p4-1.bin").exists());
        }
    }

    #[test]
    fn test_unreachable_node_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = write_job(dir.path(), 1);
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let err = DistributedCoordinator::new(config, vec![addr]).unwrap().run().unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), 5);
    }
}
