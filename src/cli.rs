//! Command-line flags in the recorder's `-flag[:value]` form

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use crate::config::{CodecKind, RecorderSettings, X264Preset};

/// Run options that are not persisted settings
#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    /// Record as soon as a sender is bound, exit when the recording ends
    pub auto_start: bool,
    /// Output file, or a directory to name the file in
    pub output: Option<PathBuf>,
    /// Write the resulting settings back to the settings file
    pub save: bool,
    pub sender_name: String,
    pub sender_size: (u32, u32),
    pub frame_limit: Option<u32>,
    /// Test pattern sender delivers rows bottom first
    pub bottom_up: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            auto_start: false,
            output: None,
            save: false,
            sender_name: "TestPattern".to_string(),
            sender_size: (1280, 720),
            frame_limit: None,
            bottom_up: false,
        }
    }
}

pub const USAGE: &str = "\
Usage: spout-recorder [flags]
  -start            record as soon as a sender appears, exit when it ends
  -mpeg4 | -x264    codec
  -preset:NAME      x264 preset (ultrafast..medium)
  -tune:NAME        x264 tune (none to omit)
  -crf:N            x264 quality, 0-51
  -fps:N            frame rate
  -audio            record system audio
  -out:PATH         output file or directory
  -ffmpeg:PATH      FFmpeg executable
  -args:\"...\"       FFmpeg arguments replacing the codec clause
  -name:NAME        test pattern sender name
  -size:WxH         test pattern sender size
  -frames:N         close the test pattern sender after N frames
  -bottomup         test pattern sender delivers rows bottom first
  -save             store the resulting settings";

/// Apply `args` on top of `settings`, returning the per-run options
pub fn parse_args<I>(args: I, settings: &mut RecorderSettings) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();

    for arg in args {
        let (flag, value) = match arg.split_once(':') {
            Some((flag, value)) => (flag, Some(value)),
            None => (arg.as_str(), None),
        };
        let flag = flag.to_ascii_lowercase();

        match (flag.as_str(), value) {
            ("-start", None) => options.auto_start = true,
            ("-mpeg4", None) => settings.codec = CodecKind::Mpeg4,
            ("-x264", None) => settings.codec = CodecKind::X264,
            ("-audio", None) => settings.audio_enabled = true,
            ("-save", None) => options.save = true,
            ("-bottomup", None) => options.bottom_up = true,
            ("-preset", Some(v)) => settings.x264_preset = v.parse::<X264Preset>()?,
            ("-tune", Some(v)) => settings.tune = v.to_string(),
            ("-crf", Some(v)) => settings.crf = parse_number(&flag, v)?,
            ("-fps", Some(v)) => {
                settings.frame_rate = parse_number(&flag, v)?;
                if settings.frame_rate == 0 {
                    bail!("Frame rate must be greater than zero");
                }
            }
            ("-out", Some(v)) => options.output = Some(PathBuf::from(v)),
            ("-ffmpeg", Some(v)) => settings.encoder_path = Some(PathBuf::from(v)),
            ("-args", Some(v)) => settings.passthrough_args = Some(v.trim_matches('"').to_string()),
            ("-name", Some(v)) => options.sender_name = v.to_string(),
            ("-size", Some(v)) => options.sender_size = parse_size(v)?,
            ("-frames", Some(v)) => options.frame_limit = Some(parse_number(&flag, v)?),
            _ => bail!("Unknown argument: {}\n{}", arg, USAGE),
        }
    }

    Ok(options)
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", flag, value))
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("Size must be WxH, got {}", value))?;
    let width = parse_number("-size", w)?;
    let height = parse_number("-size", h)?;
    if width == 0 || height == 0 {
        bail!("Size must be non-zero, got {}", value);
    }
    Ok((width, height))
}
