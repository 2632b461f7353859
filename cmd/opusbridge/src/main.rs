//! opusbridge - Encode raw PCM to Opus packets and back.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod decode;
mod encode;
mod stream;

use decode::DecodeCommand;
use encode::EncodeCommand;

/// opusbridge - Encode raw PCM to Opus packets and back.
///
/// PCM files are headerless, interleaved, signed 16-bit little-endian.
/// Packet streams are a sequence of `u32` little-endian lengths, each
/// followed by that many bytes of Opus packet.
#[derive(Parser)]
#[command(name = "opusbridge")]
#[command(about = "Opus session bridge CLI")]
#[command(version)]
pub struct Cli {
    /// Config file (YAML, with `encoder:` and `decoder:` sections)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Sample rate in Hz (8000, 12000, 16000, 24000, 48000)
    #[arg(long, global = true)]
    pub sample_rate: Option<i64>,

    /// Number of channels (1 or 2)
    #[arg(long, global = true)]
    pub channels: Option<i64>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode raw PCM into a packet stream
    Encode(EncodeCommand),
    /// Decode a packet stream into raw PCM
    Decode(DecodeCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Encode(cmd) => cmd.run(&cli),
        Commands::Decode(cmd) => cmd.run(&cli),
    }
}
