//! # multio-hammer
//!
//! Synthetic load generator for the core (§6 CLI: "tools are out of core
//! scope; listed for completeness"). Spins up `nbservers` server-side
//! listeners and `nbclients` client tasks that emit `nbsteps` steps' worth
//! of fields across `nblevels` levels, `nbparams` parameters, and
//! `nbensembles` ensemble members, sharded to servers by `FieldIdentity`
//! (§8 "Shard locality"). A thin CLI front end over the library, the same
//! layering the teacher's `main.rs` keeps over `ipc_benchmark::*`.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use multio::action::select::Select;
use multio::action::sink::Sink as SinkAction;
use multio::action::{Action, Pipeline};
use multio::error::FailurePolicy;
use multio::logging;
use multio::message::{Message, Payload, Peer, Tag};
use multio::metadata::{FieldIdentity, Metadata};
use multio::sink::file::FileSink;
use multio::transport::tcp::TcpTransport;
use multio::transport::thread::{ThreadBroker, ThreadTransport};
use multio::transport::{Transport, TransportConfig};
use multio::Listener;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKindArg {
    Mpi,
    Tcp,
    Thread,
    None,
}

/// A synthetic NWP client/server load generator for the multio core.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Carrier to move messages between clients and servers.
    #[arg(long, value_enum, default_value_t = TransportKindArg::Thread)]
    transport: TransportKindArg,

    /// Number of simulated clients.
    #[arg(long, default_value_t = 2)]
    nbclients: usize,

    /// Number of server-side listeners.
    #[arg(long, default_value_t = 1)]
    nbservers: usize,

    /// Simulation steps per client.
    #[arg(long, default_value_t = 2)]
    nbsteps: i64,

    /// Vertical levels per step.
    #[arg(long, default_value_t = 1)]
    nblevels: i64,

    /// Distinct parameters per level.
    #[arg(long, default_value_t = 1)]
    nbparams: i64,

    /// Ensemble members per parameter.
    #[arg(long, default_value_t = 1)]
    nbensembles: i64,

    /// Elements per field payload.
    #[arg(long, default_value_t = 16)]
    field_size: usize,

    /// Directory server sinks write their output files into.
    #[arg(long, default_value = "./multio-hammer-out")]
    output_dir: PathBuf,

    /// Base TCP port servers bind to (ignored for other transports).
    #[arg(long, default_value_t = 27182)]
    port_base: u16,

    /// Increase log verbosity (-v, -vv, ...).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress the colorized stdout log layer.
    #[arg(long)]
    quiet: bool,

    /// Write detailed logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<String>,
}

fn build_pipeline(output_dir: &std::path::Path, server_id: usize) -> Result<Pipeline> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {output_dir:?}"))?;
    let path = output_dir.join(format!("server-{server_id}.bin"));
    let sink = FileSink::create(&path).with_context(|| format!("creating sink file {path:?}"))?;
    let stages: Vec<Box<dyn Action>> = vec![
        Box::new(Select::new(vec!["ocean".to_string()])),
        Box::new(SinkAction::new(Box::new(sink))),
    ];
    Ok(Pipeline::new(stages))
}

fn field_payload(field_size: usize, seed: i64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(field_size * 4);
    for i in 0..field_size {
        let v = (seed as f32) + (i as f32) * 0.5;
        bytes.extend_from_slice(&v.to_ne_bytes());
    }
    bytes
}

fn field_metadata(param: i64, level: i64, step: i64, ensemble: i64) -> Metadata {
    let mut meta = Metadata::new();
    meta.set("category", "ocean");
    meta.set("precision", "single");
    meta.set("paramId", param);
    meta.set("param", param.to_string());
    meta.set("level", level);
    meta.set("step", step);
    meta.set("ensemble", ensemble);
    meta
}

async fn run_thread(args: &Args) -> Result<()> {
    let broker = ThreadBroker::new();
    let mut server_handles = Vec::new();
    for server_id in 0..args.nbservers {
        let transport = ThreadTransport::new(broker.clone(), Peer::new("server", server_id as i64));
        let pipeline = build_pipeline(&args.output_dir, server_id)?;
        let mut listener = Listener::new(transport);
        listener.register_pipeline("ocean", pipeline, FailurePolicy::Continue);
        server_handles.push(tokio::spawn(async move { listener.listen().await }));
    }

    let mut client_handles = Vec::new();
    for client_id in 0..args.nbclients {
        let broker = broker.clone();
        let nbservers = args.nbservers.max(1);
        let nbsteps = args.nbsteps;
        let nblevels = args.nblevels;
        let nbparams = args.nbparams;
        let nbensembles = args.nbensembles;
        let field_size = args.field_size;
        client_handles.push(tokio::spawn(async move {
            let client_peer = Peer::new("client", client_id as i64);
            let mut transport = ThreadTransport::new(broker, client_peer.clone());
            let servers: Vec<Peer> = (0..nbservers).map(|id| Peer::new("server", id as i64)).collect();

            for server in &servers {
                let open = Message::new(Tag::Open, client_peer.clone(), server.clone(), Metadata::new(), Payload::empty());
                transport.send(open).await.map_err(|e| e.error)?;
            }

            for step in 0..nbsteps {
                for level in 0..nblevels {
                    for param in 0..nbparams {
                        for ensemble in 0..nbensembles {
                            let identity = FieldIdentity {
                                param: param.to_string(),
                                level,
                                step,
                                ensemble,
                            };
                            let server = &servers[identity.shard(nbservers)];
                            let meta = field_metadata(param, level, step, ensemble);
                            let payload = Payload::new(field_payload(field_size, step + param + level));
                            let msg = Message::new(Tag::Field, client_peer.clone(), server.clone(), meta, payload);
                            transport.send(msg).await.map_err(|e| e.error)?;
                        }
                    }
                }
                for server in &servers {
                    let step_complete = Message::new(Tag::StepComplete, client_peer.clone(), server.clone(), Metadata::new(), Payload::empty());
                    transport.send(step_complete).await.map_err(|e| e.error)?;
                }
            }

            for server in &servers {
                let close = Message::new(Tag::Close, client_peer.clone(), server.clone(), Metadata::new(), Payload::empty());
                transport.send(close).await.map_err(|e| e.error)?;
            }
            Ok::<(), multio::error::MultioError>(())
        }));
    }

    for handle in client_handles {
        handle.await.context("client task panicked")?.context("client task failed")?;
    }
    for handle in server_handles {
        handle.await.context("server task panicked")?.context("listener exited with error")?;
    }
    Ok(())
}

async fn run_tcp(args: &Args) -> Result<()> {
    let mut server_handles = Vec::new();
    for server_id in 0..args.nbservers {
        let port = args.port_base + server_id as u16;
        let config = TransportConfig {
            kind: multio::transport::TransportKind::Tcp,
            host: "127.0.0.1".to_string(),
            port,
            local_peer: Peer::new("server", server_id as i64),
            ..Default::default()
        };
        let transport = TcpTransport::bind_server(&config).await?;
        let pipeline = build_pipeline(&args.output_dir, server_id)?;
        let mut listener = Listener::new(transport);
        listener.register_pipeline("ocean", pipeline, FailurePolicy::Continue);
        server_handles.push(tokio::spawn(async move { listener.listen().await }));
    }
    // Give the accept loops a moment to start listening before clients dial in.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut client_handles = Vec::new();
    for client_id in 0..args.nbclients {
        let nbservers = args.nbservers.max(1);
        let nbsteps = args.nbsteps;
        let nblevels = args.nblevels;
        let nbparams = args.nbparams;
        let nbensembles = args.nbensembles;
        let field_size = args.field_size;
        let port_base = args.port_base;
        client_handles.push(tokio::spawn(async move {
            let client_peer = Peer::new("client", client_id as i64);
            let mut connections = Vec::new();
            for server_id in 0..nbservers {
                let config = TransportConfig {
                    kind: multio::transport::TransportKind::Tcp,
                    host: "127.0.0.1".to_string(),
                    port: port_base + server_id as u16,
                    local_peer: client_peer.clone(),
                    ..Default::default()
                };
                connections.push(TcpTransport::connect_client(&config).await?);
            }
            let servers: Vec<Peer> = (0..nbservers).map(|id| Peer::new("server", id as i64)).collect();

            for (conn, server) in connections.iter_mut().zip(servers.iter()) {
                let open = Message::new(Tag::Open, client_peer.clone(), server.clone(), Metadata::new(), Payload::empty());
                conn.send(open).await.map_err(|e| e.error)?;
            }

            for step in 0..nbsteps {
                for level in 0..nblevels {
                    for param in 0..nbparams {
                        for ensemble in 0..nbensembles {
                            let identity = FieldIdentity {
                                param: param.to_string(),
                                level,
                                step,
                                ensemble,
                            };
                            let shard = identity.shard(nbservers);
                            let meta = field_metadata(param, level, step, ensemble);
                            let payload = Payload::new(field_payload(field_size, step + param + level));
                            let msg = Message::new(Tag::Field, client_peer.clone(), servers[shard].clone(), meta, payload);
                            connections[shard].send(msg).await.map_err(|e| e.error)?;
                        }
                    }
                }
                for (conn, server) in connections.iter_mut().zip(servers.iter()) {
                    let step_complete = Message::new(Tag::StepComplete, client_peer.clone(), server.clone(), Metadata::new(), Payload::empty());
                    conn.send(step_complete).await.map_err(|e| e.error)?;
                }
            }
            for (conn, server) in connections.iter_mut().zip(servers.iter()) {
                let close = Message::new(Tag::Close, client_peer.clone(), server.clone(), Metadata::new(), Payload::empty());
                conn.send(close).await.map_err(|e| e.error)?;
            }
            Ok::<(), multio::error::MultioError>(())
        }));
    }

    for handle in client_handles {
        handle.await.context("client task panicked")?.context("client task failed")?;
    }
    for handle in server_handles {
        handle.await.context("server task panicked")?.context("listener exited with error")?;
    }
    Ok(())
}

/// `--transport=none`: dispatch generated fields directly into one
/// in-process pipeline, with no transport hop at all. A quick way to
/// profile pipeline-stage cost in isolation from any carrier.
async fn run_none(args: &Args) -> Result<()> {
    let mut pipeline = build_pipeline(&args.output_dir, 0)?;
    let client_peer = Peer::new("client", 0);
    let server_peer = Peer::new("server", 0);
    for step in 0..args.nbsteps {
        for level in 0..args.nblevels {
            for param in 0..args.nbparams {
                for ensemble in 0..args.nbensembles {
                    let meta = field_metadata(param, level, step, ensemble);
                    let payload = Payload::new(field_payload(args.field_size, step + param + level));
                    let msg = Message::new(Tag::Field, client_peer.clone(), server_peer.clone(), meta, payload);
                    pipeline.dispatch(msg).await?;
                }
            }
        }
        let flush = Message::new(Tag::Flush, client_peer.clone(), server_peer.clone(), Metadata::new(), Payload::empty());
        pipeline.dispatch(flush).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = logging::init_tracing(args.verbose, args.log_file.as_deref(), args.quiet);

    info!(
        transport = ?args.transport,
        nbclients = args.nbclients,
        nbservers = args.nbservers,
        nbsteps = args.nbsteps,
        "starting multio-hammer"
    );

    let start = Instant::now();
    match args.transport {
        TransportKindArg::Thread => run_thread(&args).await?,
        TransportKindArg::Tcp => run_tcp(&args).await?,
        TransportKindArg::None => run_none(&args).await?,
        TransportKindArg::Mpi => {
            anyhow::bail!(
                "the mpi transport requires building with --features mpi-transport and an MPI-aware launcher (mpirun); not implemented in this CLI harness"
            );
        }
    }

    let total_fields = args.nbclients as i64 * args.nbsteps * args.nblevels * args.nbparams * args.nbensembles;
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        total_fields, "multio-hammer run complete"
    );
    Ok(())
}
