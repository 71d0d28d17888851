//! Answers NTP requests on a UDP port
//!
//! ```
//! cargo run -p ntp-server -- --port 4123 --duration-secs 60
//! ```
//!
//! Every 48-byte request is stamped with its arrival and departure time and sent back,
//! anything else is dropped. The server keeps no per-client state.
use ntpstamp::{NtpServer, ServerConfig, StdTimestampGen, sync};
use ntpstamp_net_std::UdpSocketWrapper;

use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::info;

/// Unprivileged default so the demo runs without root
const DEFAULT_PORT: u16 = 4123;

/// How often an idle server wakes up to look at the shutdown flag
const POLL_SHUTDOWN: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "ntp-server")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    listen: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Stratum announced in replies
    #[arg(long, default_value_t = 2)]
    stratum: u8,

    /// Poll exponent announced in replies
    #[arg(long, default_value_t = 16)]
    poll: i8,

    /// Stop after this many seconds instead of serving until killed
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Log at trace level regardless of build profile
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose || cfg!(debug_assertions) {
        log::Level::Trace
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level)?;

    let socket = UdpSocketWrapper::bind(SocketAddr::new(cli.listen, cli.port), Some(POLL_SHUTDOWN))?;
    let config = ServerConfig::default()
        .with_stratum(cli.stratum)
        .with_poll(cli.poll);
    info!("Listening on {}", socket.local_addr()?);

    let mut server = NtpServer::new(socket, StdTimestampGen::default()).with_config(config);
    let shutdown = Arc::new(AtomicBool::new(false));

    if let Some(secs) = cli.duration_secs {
        let flag = Arc::clone(&shutdown);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            flag.store(true, Ordering::Relaxed);
        });
    }

    let summary = sync::run(&mut server, &shutdown);
    info!(
        "Served {} requests, discarded {} datagrams",
        summary.replied, summary.discarded
    );

    Ok(())
}
