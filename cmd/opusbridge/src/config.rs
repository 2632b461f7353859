//! Configuration file loading.

use std::path::Path;

use anyhow::{Context, Result};
use opusbridge_codec::params::{validate_application, validate_bitrate, validate_signal};
use opusbridge_codec::params::{validate_channels, validate_sample_rate};
use opusbridge_codec::{DecoderConfig, EncoderConfig};
use serde::Deserialize;

use crate::Cli;

/// Configuration file format.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub encoder: Option<EncoderConfig>,
    #[serde(default)]
    pub decoder: Option<DecoderConfig>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Loads the file named by `--config`, or an empty config.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        match &cli.config {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Encoder-only overrides from the command line.
#[derive(Debug, Default)]
pub struct EncoderOverrides<'a> {
    pub application: Option<&'a str>,
    pub bitrate: Option<i64>,
    pub signal: Option<&'a str>,
}

/// Resolves the encoder configuration: file values, then flags.
pub fn encoder_config(
    cli: &Cli,
    file: &ConfigFile,
    overrides: &EncoderOverrides<'_>,
) -> Result<EncoderConfig> {
    let mut config = file.encoder.unwrap_or_default();
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = validate_sample_rate(rate)?;
    }
    if let Some(channels) = cli.channels {
        config.channels = validate_channels(channels)?;
    }
    if let Some(app) = overrides.application {
        config.application = validate_application(app)?;
    }
    if let Some(bitrate) = overrides.bitrate {
        config.bitrate = Some(validate_bitrate(bitrate)?);
    }
    if let Some(signal) = overrides.signal {
        config.signal = Some(validate_signal(signal)?);
    }
    Ok(config)
}

/// Resolves the decoder configuration: file values, then flags.
pub fn decoder_config(cli: &Cli, file: &ConfigFile) -> Result<DecoderConfig> {
    let mut config = file.decoder.unwrap_or_default();
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = validate_sample_rate(rate)?;
    }
    if let Some(channels) = cli.channels {
        config.channels = validate_channels(channels)?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use opusbridge_codec::{Application, Channels, SampleRate, Signal};

    #[test]
    fn test_parse_config_file() {
        let file: ConfigFile = serde_yaml::from_str(
            r#"
encoder:
  sample_rate: 16000
  channels: 1
  application: voip
  bitrate: 24000
  signal: voice
decoder:
  sample_rate: 16000
  channels: 1
"#,
        )
        .unwrap();
        let enc = file.encoder.unwrap();
        assert_eq!(enc.sample_rate, SampleRate::Hz16000);
        assert_eq!(enc.application, Application::Voip);
        assert_eq!(enc.signal, Some(Signal::Voice));
        assert_eq!(file.decoder.unwrap().channels, Channels::Mono);
    }

    #[test]
    fn test_flags_override_file() {
        let cli = Cli::parse_from(["opusbridge", "--sample-rate", "24000", "decode", "-i", "a", "-o", "b"]);
        let file: ConfigFile =
            serde_yaml::from_str("decoder:\n  sample_rate: 8000\n  channels: 1\n").unwrap();
        let config = decoder_config(&cli, &file).unwrap();
        assert_eq!(config.sample_rate, SampleRate::Hz24000);
        assert_eq!(config.channels, Channels::Mono);

        let overrides = EncoderOverrides {
            application: Some("restricted_lowdelay"),
            bitrate: Some(96000),
            signal: None,
        };
        let config = encoder_config(&cli, &ConfigFile::default(), &overrides).unwrap();
        assert_eq!(config.sample_rate, SampleRate::Hz24000);
        assert_eq!(config.application, Application::RestrictedLowdelay);
        assert_eq!(config.bitrate.unwrap().bits_per_second(), 96000);
    }

    #[test]
    fn test_bad_override_rejected() {
        let cli = Cli::parse_from(["opusbridge", "--channels", "6", "decode", "-i", "a", "-o", "b"]);
        assert!(decoder_config(&cli, &ConfigFile::default()).is_err());
    }
}
