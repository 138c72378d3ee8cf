//! digitlink CLI - send digit images to an inference device over serial.
//!
//! ## Features
//!
//! - Send raw 28x28 payload files and print the prediction
//! - Synthetic test payloads (all zeros, single pixel)
//! - MNIST IDX batch evaluation with accuracy report
//! - Firmware menu commands (self-test, model info, ping)
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use digitlink::{
    DEFAULT_BAUD, LinkConfig, LooseConfig, ResponseConfig, SerialConfig, StrictConfig,
    TransferMode,
};
use env_logger::Env;
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

mod commands;
mod config;

use config::{Config, Mode};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress bars should be drawn (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// CLI-level failures that map to dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Missing or inconsistent arguments.
    #[error("{0}")]
    Usage(String),
    /// The user cancelled the operation.
    #[error("{0}")]
    Cancelled(String),
}

/// digitlink - send digit images to an embedded inference device.
///
/// Environment variables:
///   DIGITLINK_PORT   - Serial port
///   DIGITLINK_BAUD   - Baud rate (default: 9600)
///   DIGITLINK_MODE   - Transfer mode (strict, loose)
#[derive(Parser)]
#[command(name = "digitlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:
  digitlink -p /dev/ttyUSB0 send img_28x28.bin
  digitlink -p COM3 --mode loose pixel 406
  digitlink -p /dev/ttyUSB0 mnist --images t10k-images-idx3-ubyte --labels t10k-labels-idx1-ubyte --first 20")]
pub(crate) struct Cli {
    /// Serial port to use.
    #[arg(short, long, global = true, env = "DIGITLINK_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate [default: 9600].
    #[arg(short, long, global = true, env = "DIGITLINK_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Transfer protocol [default: strict].
    #[arg(short, long, global = true, value_enum, env = "DIGITLINK_MODE")]
    pub(crate) mode: Option<Mode>,

    /// Attempts per frame in strict mode [default: 3].
    #[arg(long, global = true, value_name = "N")]
    pub(crate) retries: Option<u32>,

    /// Ack deadline per attempt in strict mode [default: 2000].
    #[arg(long, global = true, value_name = "MS")]
    pub(crate) ack_timeout_ms: Option<u64>,

    /// READY deadline in loose mode [default: 10000].
    #[arg(long, global = true, value_name = "MS")]
    pub(crate) ready_timeout_ms: Option<u64>,

    /// Reply deadline [default: 2000 strict, 20000 loose].
    #[arg(long, global = true, value_name = "MS")]
    pub(crate) response_timeout_ms: Option<u64>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Send a raw payload file and print the prediction.
    Send {
        /// Raw payload (784 bytes for a 28x28 image).
        file: PathBuf,

        /// Invert pixel values (255 - v) before sending.
        #[arg(long)]
        invert: bool,

        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Send an all-zero payload.
    Zeros {
        /// Payload length in bytes.
        #[arg(long, default_value_t = digitlink::IMAGE_SIZE)]
        len: usize,

        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Send an image with a single pixel set.
    Pixel {
        /// Pixel index (0-783).
        index: usize,

        /// Pixel value.
        #[arg(default_value_t = 255)]
        value: u8,

        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Send images from an MNIST IDX dataset and report accuracy.
    Mnist {
        /// IDX image file (magic 2051).
        #[arg(long)]
        images: PathBuf,

        /// IDX label file (magic 2049).
        #[arg(long)]
        labels: PathBuf,

        /// Send a single image.
        #[arg(long, conflicts_with = "first")]
        index: Option<usize>,

        /// Send the first N images.
        #[arg(long, value_name = "N")]
        first: Option<usize>,
    },

    /// Run the device self-test and print its output.
    SelfTest {
        /// How long to collect output.
        #[arg(long, default_value_t = 3000, value_name = "MS")]
        wait_ms: u64,
    },

    /// Print model information reported by the device.
    Info {
        /// How long to collect output.
        #[arg(long, default_value_t = 2000, value_name = "MS")]
        wait_ms: u64,
    },

    /// Check that the device answers.
    Ping {
        /// How long to wait for an answer.
        #[arg(long, default_value_t = 1000, value_name = "MS")]
        wait_ms: u64,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Resolved connection and protocol settings.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) port: Option<String>,
    pub(crate) baud: u32,
    pub(crate) link: LinkConfig,
}

impl Settings {
    /// Merge CLI/env values over the config file over library defaults.
    pub(crate) fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let transfer = &config.transfer;
        let port = cli
            .port
            .clone()
            .or_else(|| {
                config
                    .connection
                    .port
                    .clone()
            });
        let baud = cli
            .baud
            .or(config.connection.baud)
            .unwrap_or(DEFAULT_BAUD);

        let mode = match cli
            .mode
            .or(transfer.mode)
            .unwrap_or_default()
        {
            Mode::Strict => {
                let mut strict = StrictConfig::default();
                if let Some(retries) = cli
                    .retries
                    .or(transfer.retries)
                {
                    if retries == 0 {
                        return Err(CliError::Usage("--retries must be at least 1".into()).into());
                    }
                    strict = strict.with_max_attempts(retries);
                }
                if let Some(ms) = cli
                    .ack_timeout_ms
                    .or(transfer.ack_timeout_ms)
                {
                    strict = strict.with_ack_timeout(Duration::from_millis(ms));
                }
                TransferMode::Strict(strict)
            },
            Mode::Loose => {
                let mut loose = LooseConfig::default();
                if let Some(ms) = cli
                    .ready_timeout_ms
                    .or(transfer.ready_timeout_ms)
                {
                    loose = loose.with_ready_timeout(Duration::from_millis(ms));
                }
                TransferMode::Loose(loose)
            },
        };

        let mut response = ResponseConfig::default();
        if let Some(ms) = cli
            .response_timeout_ms
            .or(transfer.response_timeout_ms)
        {
            response.raw_timeout = Duration::from_millis(ms);
            response.lines_timeout = Duration::from_millis(ms);
        }

        Ok(Self {
            port,
            baud,
            link: LinkConfig::new(mode).with_response(response),
        })
    }

    /// Serial settings for the resolved port.
    pub(crate) fn serial(&self) -> Result<SerialConfig> {
        let port = self
            .port
            .as_deref()
            .ok_or_else(|| {
                CliError::Usage(
                    "No serial port given. Use --port, DIGITLINK_PORT or the config file".into(),
                )
            })?;
        Ok(SerialConfig::new(port, self.baud))
    }
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return match cli_err {
                CliError::Usage(_) => 2,
                CliError::Cancelled(_) => 130,
            };
        }
        if let Some(lib_err) = cause.downcast_ref::<digitlink::Error>() {
            if lib_err.is_interrupted() {
                return 130;
            }
        }
    }
    1
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    digitlink::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    debug!(
        "digitlink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Commands::Completions { shell } = &cli.command {
        commands::completions::cmd_completions(*shell);
        return Ok(());
    }

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let settings = Settings::resolve(cli, &config)?;
    install_interrupt_handler();

    match &cli.command {
        Commands::Send { file, invert, json } => {
            commands::send::cmd_send(cli, &settings, file, *invert, *json)
        },
        Commands::Zeros { len, json } => commands::send::cmd_zeros(cli, &settings, *len, *json),
        Commands::Pixel { index, value, json } => {
            commands::send::cmd_pixel(cli, &settings, *index, *value, *json)
        },
        Commands::Mnist {
            images,
            labels,
            index,
            first,
        } => commands::mnist::cmd_mnist(cli, &settings, images, labels, *index, *first),
        Commands::SelfTest { wait_ms } => {
            commands::device::cmd_self_test(cli, &settings, Duration::from_millis(*wait_ms))
        },
        Commands::Info { wait_ms } => {
            commands::device::cmd_info(cli, &settings, Duration::from_millis(*wait_ms))
        },
        Commands::Ping { wait_ms } => {
            commands::device::cmd_ping(cli, &settings, Duration::from_millis(*wait_ms))
        },
        Commands::Completions { .. } => Ok(()),
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if std::env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&e))
        },
    }
}
