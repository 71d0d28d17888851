//! Queries an NTP server and reports round-trip delay and clock offset
//!
//! ```
//! cargo run -p ntp-client -- -s pool.ntp.org --count 3 --output results.txt
//! ```
//!
//! Options:
//! - `-s`/`--server` - server hostname (default: `pool.ntp.org`)
//! - `-p`/`--port` - server port (default: `123`)
//! - `-a`/`--attempts`, `--backoff-secs`, `--deadline-secs` - retry policy of one exchange
//! - `--timeout-secs` - socket receive timeout, `0` waits forever
//! - `-c`/`--count` - number of exchanges to run
//! - `-o`/`--output` - file to append `delay_us offset_us` lines to
//! - `--reuse-socket` - keep one socket across the attempts of an exchange
mod sink;

use ntpstamp::{
    ClientConfig, NTP_PORT, NtpContext, NtpResult, SocketPolicy, StdBackoff, StdTimestampGen,
    sync::get_time,
};
use ntpstamp_net_std::StdTransport;

use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use crate::sink::ResultSink;

const POOL_NTP_ADDR: &str = "pool.ntp.org";

#[derive(Parser)]
#[command(name = "ntp-client")]
#[command(version)]
struct Cli {
    /// NTP server hostname
    #[arg(short, long, default_value = POOL_NTP_ADDR)]
    server: String,

    /// NTP server port
    #[arg(short, long, default_value_t = NTP_PORT)]
    port: u16,

    /// Attempts per exchange before giving up
    #[arg(short, long, default_value_t = 5)]
    attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = 4)]
    backoff_secs: u64,

    /// Upper bound for a single exchange, in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Socket receive timeout in seconds, 0 waits forever
    #[arg(long, default_value_t = 2)]
    timeout_secs: u64,

    /// Number of exchanges to run
    #[arg(short, long, default_value_t = 1)]
    count: u32,

    /// Append "delay_us offset_us" lines to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep one socket for all attempts of an exchange
    #[arg(long)]
    reuse_socket: bool,

    /// Log at trace level regardless of build profile
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_port(self.port)
            .with_max_attempts(self.attempts)
            .with_backoff(Duration::from_secs(self.backoff_secs));

        if let Some(deadline) = self.deadline_secs {
            config = config.with_deadline(Duration::from_secs(deadline));
        }
        if self.reuse_socket {
            config = config.with_socket_policy(SocketPolicy::PerExchange);
        }

        config
    }

    fn transport(&self) -> StdTransport {
        let timeout = (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs));

        StdTransport::default().with_read_timeout(timeout)
    }
}

fn report(server: &str, result: &NtpResult) {
    info!(
        "[{server}] delay: {} us, offset: {} us, stratum: {}, attempts: {}",
        result.roundtrip(),
        result.offset(),
        result.stratum(),
        result.attempts()
    );

    #[cfg(feature = "chrono")]
    if let Some(time) = result.transmit_timestamp().to_datetime() {
        info!("[{server}] server time: {time}");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose || cfg!(debug_assertions) {
        log::Level::Trace
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level)?;

    let mut sink = cli.output.as_deref().map(ResultSink::append_to).transpose()?;
    let transport = cli.transport();
    let mut context = NtpContext::new(StdTimestampGen::default())
        .with_backoff(StdBackoff)
        .with_config(cli.client_config());

    for round in 0..cli.count {
        if round > 0 {
            thread::sleep(Duration::from_secs(cli.backoff_secs));
        }

        match get_time(&cli.server, &transport, &mut context) {
            Ok(result) => {
                report(&cli.server, &result);

                if let Some(sink) = sink.as_mut() {
                    sink.record(&result)?;
                }
            }
            Err(err) => error!("[{}] exchange failed: {err}", cli.server),
        }
    }

    Ok(())
}
