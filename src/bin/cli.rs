//! SerialLink CLI - Command-line interface
//!
//! Sends and receives byte streams over a serial line through the link layer.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rand::{Rng, SeedableRng};
use seriallink_core::cli::{format_stats, print_exit_codes, CliResult, ExitCodes};
use seriallink_core::config::{self, ConfigError};
use seriallink_core::core::transport::list_ports as available_ports;
use seriallink_core::{
    BitErrorChannel, BitErrorConfig, ChannelError, Connection, LinkConfig, LinkError,
    LinkStats, LoopbackChannel, OutputFormat, Role,
};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// CLI output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Human-readable text
    Text,
    /// JSON format for scripting
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// SerialLink CLI
#[derive(Parser, Debug)]
#[command(
    name = "seriallink",
    version,
    about = "Reliable stop-and-wait data link over serial lines",
    long_about = None
)]
struct Cli {
    /// Link configuration file (TOML)
    #[arg(short, long, env = "SERIALLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Retransmissions allowed per frame
    #[arg(long)]
    retries: Option<u32>,

    /// Retransmission timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Also write logs to a file; defaults to the data directory when no
    /// path is given
    #[arg(long, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Send stdin or a file as the initiator
    Send {
        /// Serial port name (e.g., COM3, /dev/ttyUSB0)
        #[arg(short, long)]
        port: String,

        /// Input file, stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Receive into stdout or a file as the responder
    Receive {
        /// Serial port name (e.g., COM3, /dev/ttyUSB0)
        #[arg(short, long)]
        port: String,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a sender and a receiver against each other in memory
    ///
    /// Payload errors are caught by an XOR BCC2, so two flips of the same
    /// bit position inside one frame cancel out and get delivered. With
    /// `--payload-error` above zero the transfer can end with differing
    /// bytes even though the link itself worked.
    Selftest {
        /// Probability (0 to 1) of a header bit error per frame
        #[arg(long, default_value_t = 0.0)]
        header_error: f64,

        /// Probability (0 to 1) of a bit error per payload byte; BCC2 misses
        /// paired flips of the same bit
        #[arg(long, default_value_t = 0.0)]
        payload_error: f64,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Number of bytes to transfer
        #[arg(long, default_value_t = 16 * 1024)]
        size: usize,
    },

    /// Show exit codes
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(ExitCodes::ERROR);
        }
    };

    let result = match run(&cli) {
        Ok(()) => CliResult::success(),
        Err(e) => classify(e),
    };
    if let Some(msg) = result.message() {
        eprintln!("Error: {}", msg);
    }
    result.to_exit_code()
}

/// Install the tracing subscriber; the returned guard flushes the log file
fn init_logging(cli: &Cli) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = match cli.format {
        FormatArg::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .boxed(),
        FormatArg::Text => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .boxed(),
    };

    let (file_layer, guard) = match &cli.log_file {
        Some(path) => {
            let path = match path {
                Some(path) => path.clone(),
                None => config::log_dir()
                    .ok_or(ConfigError::NoConfigDir)?
                    .join("seriallink.log"),
            };
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Map an error onto an exit code
fn classify(err: anyhow::Error) -> CliResult {
    let err = match err.downcast::<LinkError>() {
        Ok(err) => return err.into(),
        Err(err) => err,
    };
    let err = match err.downcast::<ChannelError>() {
        Ok(err) => return err.into(),
        Err(err) => err,
    };
    let err = match err.downcast::<ConfigError>() {
        Ok(err) => return err.into(),
        Err(err) => err,
    };
    match err.downcast::<io::Error>() {
        Ok(err) => err.into(),
        Err(err) => CliResult::error(ExitCodes::ERROR, format!("{:#}", err)),
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::ListPorts { detailed } => list_ports(cli, *detailed),
        Commands::Send { port, file } => send(cli, port, file.as_deref()),
        Commands::Receive { port, output } => receive(cli, port, output.as_deref()),
        Commands::Selftest {
            header_error,
            payload_error,
            seed,
            size,
        } => {
            let noise = BitErrorConfig {
                header_error_probability: *header_error,
                payload_error_probability: *payload_error,
                seed: *seed,
            };
            selftest(cli, noise, *size)
        }
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(())
        }
    }
}

/// Configuration file (or defaults) with command-line overrides applied
fn link_config(cli: &Cli, port: &str, role: Role) -> anyhow::Result<LinkConfig> {
    let mut config = match &cli.config {
        Some(path) => LinkConfig::load(path)?,
        None => LinkConfig::load_or_default()?,
    };
    config.port = port.to_string();
    config.role = role;
    if let Some(retries) = cli.retries {
        config = config.retry_limit(retries);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.timeout_ms(ms);
    }
    if let Some(baud) = cli.baud {
        config = config.baud_rate(baud);
    }
    config.validate()?;
    Ok(config)
}

fn list_ports(cli: &Cli, detailed: bool) -> anyhow::Result<()> {
    let ports = available_ports()?;

    if ports.is_empty() {
        if !cli.quiet {
            println!("No serial ports found.");
        }
        return Ok(());
    }

    match cli.format {
        FormatArg::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        FormatArg::Text => {
            if detailed {
                println!("Available Serial Ports:");
                println!("{:-<60}", "");
                for port in &ports {
                    println!("  {} [{:?}]", port.port_name, port.port_type);
                }
            } else {
                for port in &ports {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(())
}

fn send(cli: &Cli, port: &str, file: Option<&Path>) -> anyhow::Result<()> {
    let config = link_config(cli, port, Role::Initiator)?;
    let data = match file {
        Some(path) => std::fs::read(path)?,
        None => {
            let mut data = Vec::new();
            io::stdin().lock().read_to_end(&mut data)?;
            data
        }
    };

    let mut link = Connection::open(&config)?;
    if !cli.quiet {
        eprintln!("Connected to {}, sending {} bytes...", link.describe(), data.len());
    }
    send_stream(&mut link, &data, config.max_payload_size)?;
    let stats = link.close()?;

    report(cli, &stats);
    Ok(())
}

fn receive(cli: &Cli, port: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let config = link_config(cli, port, Role::Responder)?;
    let mut link = Connection::open(&config)?;
    if !cli.quiet {
        eprintln!("Connected to {}, receiving...", link.describe());
    }

    let data = receive_stream(&mut link)?;
    let stats = link.close()?;

    match output {
        Some(path) => std::fs::write(path, &data)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }

    report(cli, &stats);
    Ok(())
}

/// Send `data` in chunks and finish with an empty payload as end-of-stream
fn send_stream<C: seriallink_core::Channel>(
    link: &mut Connection<C>,
    data: &[u8],
    chunk_size: usize,
) -> Result<(), LinkError> {
    for chunk in data.chunks(chunk_size) {
        link.send(chunk)?;
    }
    link.send(&[])
}

/// Collect payloads until the empty end-of-stream payload
fn receive_stream<C: seriallink_core::Channel>(
    link: &mut Connection<C>,
) -> Result<Vec<u8>, LinkError> {
    let mut data = Vec::new();
    loop {
        let chunk = link.receive()?;
        if chunk.is_empty() {
            return Ok(data);
        }
        data.extend_from_slice(&chunk);
    }
}

fn selftest(cli: &Cli, noise: BitErrorConfig, size: usize) -> anyhow::Result<()> {
    let mut base = match &cli.config {
        Some(path) => LinkConfig::load(path)?,
        None => LinkConfig::default(),
    };
    base = base
        .retry_limit(cli.retries.unwrap_or(10))
        .timeout_ms(cli.timeout_ms.unwrap_or(50));
    base.validate()?;
    noise.validate()?;

    let mut rng = match noise.seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    let data: Vec<u8> = (0..size).map(|_| rng.gen()).collect();

    let (a, b) = LoopbackChannel::pair();
    let responder_noise = BitErrorConfig {
        seed: noise.seed.map(|s| s.wrapping_add(1)),
        ..noise
    };
    let initiator = BitErrorChannel::new(a, noise)?;
    let responder = BitErrorChannel::new(b, responder_noise)?;

    let responder_config = base.clone().role(Role::Responder);
    let peer = thread::spawn(move || -> Result<(Vec<u8>, LinkStats), LinkError> {
        let mut link = Connection::establish(responder, &responder_config)?;
        let data = receive_stream(&mut link)?;
        let so_far = link.stats().clone();
        match link.close() {
            Ok(stats) => Ok((data, stats)),
            // The final UA was lost and the initiator already hung up
            Err(LinkError::Channel(ChannelError::Disconnected)) => {
                tracing::warn!("Initiator left before the final UA arrived");
                Ok((data, so_far))
            }
            Err(e) => Err(e),
        }
    });

    let config = base.role(Role::Initiator);
    let mut link = Connection::establish(initiator, &config)?;
    send_stream(&mut link, &data, config.max_payload_size)?;
    let stats = link.close()?;

    let (received, peer_stats) = match peer.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("Responder thread panicked"),
    };
    anyhow::ensure!(
        received == data,
        "Received {} bytes that differ from the {} bytes sent \
         (paired payload bit errors can pass BCC2)",
        received.len(),
        data.len()
    );

    if !cli.quiet {
        eprintln!("Transferred {} bytes intact", data.len());
    }
    report(cli, &stats);
    if !cli.quiet {
        eprintln!("Responder:");
    }
    report(cli, &peer_stats);
    Ok(())
}

fn report(cli: &Cli, stats: &LinkStats) {
    if cli.quiet {
        return;
    }
    println!("{}", format_stats(stats, cli.format.into()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_selftest_help_mentions_bcc2_blind_spot() {
        let mut cmd = Cli::command();
        let help = cmd
            .find_subcommand_mut("selftest")
            .unwrap()
            .render_long_help()
            .to_string();
        assert!(help.contains("BCC2"));
    }

    #[test]
    fn test_selftest_rejects_nan_probability() {
        let cli = Cli::try_parse_from([
            "seriallink",
            "--quiet",
            "selftest",
            "--header-error",
            "NaN",
        ])
        .unwrap();
        let result = classify(run(&cli).unwrap_err());
        assert_eq!(result.code(), ExitCodes::CONFIG_ERROR);
    }

    #[test]
    fn test_selftest_rejects_probability_above_one() {
        let cli = Cli::try_parse_from(["seriallink", "selftest", "--payload-error", "1.5"])
            .unwrap();
        let result = classify(run(&cli).unwrap_err());
        assert_eq!(result.code(), ExitCodes::CONFIG_ERROR);
    }
}
