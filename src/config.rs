//! Recording configuration and persisted recorder settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// x264 speed preset
///
/// Slow presets cannot keep up with a live source, so only the fast end of
/// the x264 range is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum X264Preset {
    Ultrafast,
    Superfast,
    #[default]
    Veryfast,
    Faster,
    Fast,
    Medium,
}

impl X264Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            X264Preset::Ultrafast => "ultrafast",
            X264Preset::Superfast => "superfast",
            X264Preset::Veryfast => "veryfast",
            X264Preset::Faster => "faster",
            X264Preset::Fast => "fast",
            X264Preset::Medium => "medium",
        }
    }
}

impl FromStr for X264Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ultrafast" => Ok(X264Preset::Ultrafast),
            "superfast" => Ok(X264Preset::Superfast),
            "veryfast" => Ok(X264Preset::Veryfast),
            "faster" => Ok(X264Preset::Faster),
            "fast" => Ok(X264Preset::Fast),
            "medium" => Ok(X264Preset::Medium),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Video codec used when no pass-through arguments are given
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Codec {
    /// FFmpeg's built-in mpeg4 encoder in an mp4 container; cheapest on CPU
    #[default]
    Mpeg4,
    /// libx264 with quality knobs
    X264 {
        preset: X264Preset,
        /// Constant rate factor, 0-51 (18 is near lossless, 23 is x264's default)
        crf: u8,
        /// `-tune` value; empty or "none" omits the option
        tune: String,
    },
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Mpeg4 => "MPEG-4",
            Codec::X264 { .. } => "H.264 (x264)",
        }
    }

    /// x264 with the recorder's stock tuning for live sources
    #[cfg(test)]
    pub fn x264_default() -> Self {
        Codec::X264 {
            preset: X264Preset::default(),
            crf: DEFAULT_CRF,
            tune: DEFAULT_TUNE.to_string(),
        }
    }
}

pub const DEFAULT_CRF: u8 = 23;
pub const DEFAULT_TUNE: &str = "zerolatency";
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const OUTPUT_EXTENSION: &str = "mp4";

/// System audio capture device fed to FFmpeg as a second input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInput {
    /// FFmpeg input format (`dshow`, `pulse`, `avfoundation`)
    pub backend: String,
    /// Device name as the backend expects it
    pub device: String,
}

impl Default for AudioInput {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            Self {
                backend: "dshow".to_string(),
                device: "audio=virtual-audio-capturer".to_string(),
            }
        } else if cfg!(target_os = "macos") {
            Self {
                backend: "avfoundation".to_string(),
                device: ":0".to_string(),
            }
        } else {
            Self {
                backend: "pulse".to_string(),
                device: "default".to_string(),
            }
        }
    }
}

/// Everything one recording session is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingConfig {
    pub codec: Codec,
    pub audio: Option<AudioInput>,
    pub output_path: PathBuf,
    pub frame_rate: u32,
    /// Replaces the default codec/quality clause verbatim
    pub passthrough_args: Option<String>,
}

impl RecordingConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            codec: Codec::default(),
            audio: None,
            output_path: output_path.into(),
            frame_rate: DEFAULT_FRAME_RATE,
            passthrough_args: None,
        }
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio.is_some()
    }

    /// Reject configurations FFmpeg would fail on, before spawning anything
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputPath);
        }
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigError::MissingOutputDir(parent.to_path_buf()));
            }
        }
        if let Codec::X264 { crf, .. } = &self.codec {
            if *crf > 51 {
                return Err(ConfigError::CrfOutOfRange(*crf));
            }
        }
        if let Some(args) = &self.passthrough_args {
            if args.trim().is_empty() {
                return Err(ConfigError::EmptyPassthrough);
            }
        }
        Ok(())
    }
}

/// Which codec family the settings select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CodecKind {
    #[default]
    Mpeg4,
    X264,
}

/// Recorder settings persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderSettings {
    #[serde(default)]
    pub codec: CodecKind,
    #[serde(default)]
    pub x264_preset: X264Preset,
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_tune")]
    pub tune: String,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default)]
    pub audio_enabled: bool,
    #[serde(default)]
    pub audio: AudioInput,
    /// Where recordings go (None = resolved from the environment)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// FFmpeg executable (None = bundled copy, then PATH)
    #[serde(default)]
    pub encoder_path: Option<PathBuf>,
    #[serde(default)]
    pub passthrough_args: Option<String>,
    /// Seconds to wait for FFmpeg to finalize the file after stdin closes
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_crf() -> u8 {
    DEFAULT_CRF
}

fn default_tune() -> String {
    DEFAULT_TUNE.to_string()
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

fn default_stop_timeout_secs() -> u64 {
    10
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            codec: CodecKind::Mpeg4,
            x264_preset: X264Preset::default(),
            crf: default_crf(),
            tune: default_tune(),
            frame_rate: default_frame_rate(),
            audio_enabled: false,
            audio: AudioInput::default(),
            output_dir: None,
            encoder_path: None,
            passthrough_args: None,
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl RecorderSettings {
    const APP_DIR: &'static str = "spout-recorder";
    const FILE_NAME: &'static str = "settings.json";

    fn settings_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("No configuration directory on this platform")?;
        Ok(dir.join(Self::APP_DIR).join(Self::FILE_NAME))
    }

    /// Load settings from disk, or return defaults if unavailable
    pub fn load() -> Self {
        match Self::settings_path() {
            Ok(path) if path.exists() => match Self::load_from(&path) {
                Ok(settings) => settings,
                Err(err) => {
                    log::warn!("Error loading settings, using defaults: {:#}", err);
                    Self::default()
                }
            },
            Ok(_) => Self::default(),
            Err(err) => {
                log::warn!("Could not locate settings file: {:#}", err);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        if settings.frame_rate == 0 {
            return Err(anyhow::Error::new(ConfigError::ZeroFrameRate)
                .context(format!("Invalid settings file: {}", path.display())));
        }
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    pub fn codec(&self) -> Codec {
        match self.codec {
            CodecKind::Mpeg4 => Codec::Mpeg4,
            CodecKind::X264 => Codec::X264 {
                preset: self.x264_preset,
                crf: self.crf,
                tune: self.tune.clone(),
            },
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Session configuration for a recording written to `output_path`
    pub fn recording_config(&self, output_path: PathBuf) -> RecordingConfig {
        RecordingConfig {
            codec: self.codec(),
            audio: self.audio_enabled.then(|| self.audio.clone()),
            frame_rate: self.frame_rate,
            passthrough_args: self.passthrough_args.clone(),
            ..RecordingConfig::new(output_path)
        }
    }
}
