//! Process configuration, read once at startup.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;

/// Tandem peer process
#[derive(Parser, Debug)]
#[command(name = "tandem")]
#[command(about = "Run a Tandem collaboration peer")]
pub struct Args {
    /// Peer name; combined with --host into the peer id `name@host`
    #[arg(short, long, default_value = "peer")]
    pub name: String,

    /// IPv4 address other peers use to reach this one
    #[arg(long, default_value = "127.0.0.1")]
    pub host: Ipv4Addr,

    /// Peer-to-peer transport port (shared by all peers of a mesh)
    #[arg(long, default_value_t = 4000)]
    pub api_port: u16,

    /// HTTP and WebSocket port for the editor front-end
    #[arg(long, default_value_t = 3000)]
    pub frontend_port: u16,

    /// Directory for crash-recovery snapshots and autosaved text
    #[arg(long, default_value = "./tandem-data")]
    pub save_dir: PathBuf,

    /// Local edits between autosave writes
    #[arg(long, default_value_t = 20)]
    pub autosave_threshold: u32,

    /// Link retransmission interval in seconds
    #[arg(long, default_value_t = 5)]
    pub retry_interval_secs: u64,
}
