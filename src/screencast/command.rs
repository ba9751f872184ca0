//! FFmpeg command line construction

use std::fmt;

use crate::buffer::{Geometry, RowOrder};
use crate::config::{Codec, RecordingConfig};

/// Argument list for one encoder invocation, excluding the program name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderArgs(Vec<String>);

impl EncoderArgs {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[cfg(test)]
    pub fn contains(&self, arg: &str) -> bool {
        self.0.iter().any(|a| a == arg)
    }

    /// Value following `flag`, if present
    #[cfg(test)]
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.0
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.0.get(i + 1))
            .map(String::as_str)
    }

    fn push(&mut self, arg: impl Into<String>) {
        self.0.push(arg.into());
    }

    fn extend<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(args.into_iter().map(Into::into));
    }
}

impl From<Vec<String>> for EncoderArgs {
    fn from(args: Vec<String>) -> Self {
        Self(args)
    }
}

/// Space-joined, with arguments containing whitespace in double quotes
impl fmt::Display for EncoderArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                write!(f, "\"{}\"", arg)?;
            } else {
                f.write_str(arg)?;
            }
        }
        Ok(())
    }
}

/// Build the FFmpeg arguments for raw frames of `geometry` read from stdin
pub fn build_args(config: &RecordingConfig, geometry: Geometry, row_order: RowOrder) -> EncoderArgs {
    let mut args = EncoderArgs(Vec::new());

    // All available threads, overwrite without asking
    args.extend(["-threads", "0", "-y"]);

    // Raw frames on stdin
    args.extend(["-f", "rawvideo", "-vcodec", "rawvideo", "-pix_fmt"]);
    args.push(geometry.format.ffmpeg_pix_fmt());
    args.push("-s");
    args.push(geometry.size_arg());
    args.push("-r");
    args.push(config.frame_rate.to_string());
    args.extend(["-i", "-"]);

    match &config.audio {
        Some(audio) => {
            args.push("-f");
            args.push(audio.backend.as_str());
            args.push("-i");
            args.push(audio.device.as_str());
        }
        None => args.push("-an"),
    }

    match config.passthrough_args.as_deref() {
        Some(raw) if !raw.trim().is_empty() => args.extend(split_passthrough(raw)),
        _ => push_codec_clause(&mut args, &config.codec),
    }

    if row_order == RowOrder::BottomUp {
        args.extend(["-vf", "vflip"]);
    }

    args.push(config.output_path.to_string_lossy());
    args
}

fn push_codec_clause(args: &mut EncoderArgs, codec: &Codec) {
    match codec {
        Codec::Mpeg4 => {
            // q:v 5 trades file size against quality well for mpeg4
            args.extend(["-f", "mp4", "-q:v", "5", "-vcodec", "mpeg4"]);
        }
        Codec::X264 { preset, crf, tune } => {
            args.extend(["-vcodec", "libx264", "-preset", preset.as_str(), "-crf"]);
            args.push(crf.to_string());
            let tune = tune.trim();
            if !tune.is_empty() && tune != "none" {
                args.push("-tune");
                args.push(tune);
            }
        }
    }
}

/// Split a user-supplied argument string on whitespace, keeping double-quoted
/// runs together
pub fn split_passthrough(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    out.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        out.push(current);
    }
    out
}
