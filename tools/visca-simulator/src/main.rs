//! VISCA Simulator - A debug tool for testing without hardware.
//!
//! Acts as a virtual PTZ camera on a TCP port. It stores scenes, answers
//! inquiries and applies property sets the way the selected camera family
//! does.

mod server;

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ptz_visca::DialectKind;

use server::{run_server, SimulatorServerConfig};

#[derive(Parser)]
#[command(
    name = "visca-simulator",
    about = "Virtual VISCA PTZ camera for debugging"
)]
struct Args {
    /// Camera family to emulate: ptzoptics or sony
    #[arg(short, long, default_value = "ptzoptics")]
    dialect: String,

    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// TCP port to listen on (defaults to the family's VISCA port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Delay before each reply, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Read commands but never answer, to exercise client timeouts
    #[arg(long)]
    silent: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let Some(dialect) = DialectKind::from_key(&args.dialect.to_ascii_lowercase()) else {
        log::error!(
            "unknown dialect '{}' (expected one of: {})",
            args.dialect,
            DialectKind::all()
                .iter()
                .map(|k| k.key())
                .collect::<Vec<_>>()
                .join(", ")
        );
        std::process::exit(2);
    };

    let config = SimulatorServerConfig {
        bind: SocketAddr::new(
            args.bind,
            args.port.unwrap_or(dialect.dialect().default_port),
        ),
        dialect,
        reply_delay: Duration::from_millis(args.delay_ms),
        silent: args.silent,
    };

    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = run_server(config, running) {
        log::error!("Failed to start server: {}", e);
        std::process::exit(1);
    }
}
