//! Command line interface for the `callframe` echo server.
//!
//! Also compiled by `build.rs` to render the man page, so it must not depend
//! on the rest of the crate.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `callframe` binary.
#[derive(Debug, Parser)]
#[command(name = "callframe", version, about = "Echo RPC server built on callframe")]
pub struct Cli {
    /// Address to accept RPC connections on.
    #[arg(short, long, default_value = "127.0.0.1:7100")]
    pub bind: SocketAddr,

    /// Log the trace of every call, not only slow ones.
    #[arg(long)]
    pub log_all_traces: bool,

    /// Maximum number of sidecars a response may carry.
    #[arg(long, default_value_t = 10)]
    pub max_sidecars: usize,

    /// Largest request frame accepted, in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_frame_len: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_bind: Option<SocketAddr>,
}
