//! `encode` subcommand.

use std::fs::File;
use std::io::{BufWriter, Read, Write};

use anyhow::{Context, Result};
use clap::Args;
use opusbridge_codec::sizing::pcm_bytes;
use opusbridge_codec::{FrameDuration, bridge};
use tracing::info;

use crate::Cli;
use crate::config::{ConfigFile, EncoderOverrides, encoder_config};
use crate::stream::write_packet;

#[derive(Args)]
pub struct EncodeCommand {
    /// Input raw PCM file (s16le, interleaved)
    #[arg(short, long)]
    input: String,

    /// Output packet stream
    #[arg(short, long)]
    output: String,

    /// Frame duration in ms (2.5, 5, 10, 20, 40, 60)
    #[arg(long, default_value = "20")]
    frame_ms: String,

    /// Application mode (voip, audio, restricted_lowdelay)
    #[arg(long)]
    application: Option<String>,

    /// Target bitrate in bits per second (500-512000)
    #[arg(long)]
    bitrate: Option<i64>,

    /// Signal type hint (auto, voice, music)
    #[arg(long)]
    signal: Option<String>,
}

impl EncodeCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let file = ConfigFile::from_cli(cli)?;
        let config = encoder_config(
            cli,
            &file,
            &EncoderOverrides {
                application: self.application.as_deref(),
                bitrate: self.bitrate,
                signal: self.signal.as_deref(),
            },
        )?;
        let frame_duration: FrameDuration = self.frame_ms.parse()?;
        let frame_size = frame_duration.samples(config.sample_rate);
        let frame_bytes = pcm_bytes(frame_size, config.channels);

        let mut pcm = Vec::new();
        File::open(&self.input)
            .with_context(|| format!("failed to open {}", self.input))?
            .read_to_end(&mut pcm)?;

        let mut out = BufWriter::new(
            File::create(&self.output).with_context(|| format!("failed to create {}", self.output))?,
        );

        let enc = bridge().encoder_create_with_config(&config)?;
        let result = (|| -> Result<usize> {
            let mut packets = 0;
            for chunk in pcm.chunks(frame_bytes) {
                let packet = if chunk.len() == frame_bytes {
                    bridge().encoder_encode_packet(enc, chunk, frame_size as i64)?
                } else {
                    let mut padded = chunk.to_vec();
                    padded.resize(frame_bytes, 0);
                    bridge().encoder_encode_packet(enc, &padded, frame_size as i64)?
                };
                write_packet(&mut out, &packet)?;
                packets += 1;
            }
            out.flush()?;
            Ok(packets)
        })();
        bridge().encoder_destroy(enc)?;
        let packets = result?;

        info!(
            "encoded {} packets of {} from {} to {}",
            packets, frame_duration, self.input, self.output
        );
        Ok(())
    }
}
