//! `decode` subcommand.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Args;
use opusbridge_codec::{DecoderHandle, bridge};
use serde::Serialize;
use tracing::{debug, info};

use crate::Cli;
use crate::config::{ConfigFile, decoder_config};
use crate::stream::read_all;

#[derive(Args)]
pub struct DecodeCommand {
    /// Input packet stream
    #[arg(short, long)]
    input: String,

    /// Output raw PCM file (s16le, interleaved)
    #[arg(short, long)]
    output: String,

    /// Treat every N-th packet as lost (0 = no loss)
    #[arg(long, default_value_t = 0)]
    loss_every: usize,

    /// Recover lost packets from FEC data in the following packet
    #[arg(long)]
    fec: bool,

    /// Duration in ms assumed for a lost packet before any packet was decoded
    #[arg(long, default_value_t = 20)]
    frame_ms: i64,

    /// Print a JSON summary to stdout
    #[arg(long)]
    json: bool,
}

/// What happened while decoding a stream.
#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub packets: usize,
    pub decoded: usize,
    pub concealed: usize,
    pub recovered: usize,
    pub duration_ms: u64,
    pub output_bytes: usize,
}

impl DecodeCommand {
    fn is_lost(&self, index: usize) -> bool {
        self.loss_every > 0 && (index + 1) % self.loss_every == 0
    }

    pub fn run(&self, cli: &Cli) -> Result<()> {
        let file = ConfigFile::from_cli(cli)?;
        let config = decoder_config(cli, &file)?;

        let packets = read_all(&mut BufReader::new(
            File::open(&self.input).with_context(|| format!("failed to open {}", self.input))?,
        ))
        .with_context(|| format!("failed to read packet stream {}", self.input))?;

        let mut out = BufWriter::new(
            File::create(&self.output).with_context(|| format!("failed to create {}", self.output))?,
        );

        let dec = bridge().decoder_create(
            config.sample_rate.hz() as i64,
            config.channels.count() as i64,
        )?;
        let result = self.decode_all(dec, &packets, &mut out);
        bridge().decoder_destroy(dec)?;
        let summary = result?;
        out.flush()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            info!(
                "decoded {} packets ({} concealed, {} recovered), {} ms of audio",
                summary.packets, summary.concealed, summary.recovered, summary.duration_ms
            );
        }
        Ok(())
    }

    fn decode_all<W: Write>(
        &self,
        dec: DecoderHandle,
        packets: &[Vec<u8>],
        out: &mut W,
    ) -> Result<Summary> {
        let mut summary = Summary {
            packets: packets.len(),
            ..Default::default()
        };
        let mut last_ms = self.frame_ms;

        for (i, packet) in packets.iter().enumerate() {
            let pcm = if self.is_lost(i) {
                let next = packets.get(i + 1).filter(|_| !self.is_lost(i + 1));
                match next {
                    Some(next) if self.fec => {
                        debug!("packet {} lost, recovering {} ms from FEC", i, last_ms);
                        summary.recovered += 1;
                        bridge().decoder_decode_packet(dec, next, true, last_ms)?
                    }
                    _ => {
                        debug!("packet {} lost, concealing {} ms", i, last_ms);
                        summary.concealed += 1;
                        bridge().decoder_decode_packet(dec, &[], false, last_ms)?
                    }
                }
            } else {
                summary.decoded += 1;
                bridge().decoder_decode_packet(dec, packet, false, 0)?
            };

            let ms = bridge().decoder_get_last_packet_duration(dec)?;
            if ms > 0 {
                last_ms = ms as i64;
            }
            summary.duration_ms += ms as u64;
            summary.output_bytes += pcm.len();
            out.write_all(&pcm)?;
        }

        Ok(summary)
    }
}
