//! Encoder executable discovery and output path resolution
//!
//! FFmpeg is looked up next to the recorder first (`DATA/FFMPEG`), then on `PATH`.

use std::path::{Path, PathBuf};

use crate::config::OUTPUT_EXTENSION;
use crate::error::EncoderError;

#[cfg(windows)]
pub const ENCODER_PROGRAM: &str = "ffmpeg.exe";
#[cfg(not(windows))]
pub const ENCODER_PROGRAM: &str = "ffmpeg";

/// Where an encoder executable was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderOrigin {
    /// Configured by the user
    Explicit,
    /// Shipped alongside the recorder
    Bundled,
    /// Found on `PATH`
    SearchPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderLocation {
    pub path: PathBuf,
    pub origin: EncoderOrigin,
}

/// Find the encoder to launch
///
/// An explicit path is returned as given; whether it exists is checked when
/// the process is started.
pub fn locate_encoder(explicit: Option<&Path>) -> Result<EncoderLocation, EncoderError> {
    if let Some(path) = explicit {
        return Ok(EncoderLocation {
            path: path.to_path_buf(),
            origin: EncoderOrigin::Explicit,
        });
    }

    if let Some(path) = bundled_encoder_path().filter(|p| p.is_file()) {
        return Ok(EncoderLocation {
            path,
            origin: EncoderOrigin::Bundled,
        });
    }

    if let Some(path) = find_in_path(ENCODER_PROGRAM) {
        return Ok(EncoderLocation {
            path,
            origin: EncoderOrigin::SearchPath,
        });
    }

    Err(EncoderError::NotFound(PathBuf::from(ENCODER_PROGRAM)))
}

/// `<exe dir>/DATA/FFMPEG/ffmpeg`
pub fn bundled_encoder_path() -> Option<PathBuf> {
    Some(exe_dir()?.join("DATA").join("FFMPEG").join(ENCODER_PROGRAM))
}

/// Resolve a program name against `PATH`
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Resolve `path` to an existing executable file
///
/// A bare program name (no directory part) is searched on `PATH`.
pub fn resolve_executable(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let is_bare = path.parent().is_none_or(|p| p.as_os_str().is_empty());
    if is_bare {
        return find_in_path(&path.to_string_lossy());
    }
    None
}

/// Directory recordings are written to
///
/// Configured directory, else `<exe dir>/DATA/Videos` when it exists, else the
/// user's video directory, else the working directory.
pub fn resolve_output_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    if let Some(bundled) = exe_dir().map(|d| d.join("DATA").join("Videos")) {
        if bundled.is_dir() {
            return bundled;
        }
    }
    dirs::video_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `<dir>/<sender name>.mp4`, with characters unsafe in file names replaced
pub fn default_output_path(dir: &Path, sender_name: &str) -> PathBuf {
    dir.join(format!("{}.{}", sanitize_file_stem(sender_name), OUTPUT_EXTENSION))
}

fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned
    }
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let location = locate_encoder(Some(Path::new("/opt/ffmpeg/bin/ffmpeg"))).unwrap();
        assert_eq!(location.origin, EncoderOrigin::Explicit);
        assert_eq!(location.path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_locate_without_explicit() {
        // Succeeds or fails depending on whether FFmpeg is installed
        match locate_encoder(None) {
            Ok(location) => assert!(location.path.is_file()),
            Err(err) => assert!(matches!(err, EncoderError::NotFound(_))),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_bare_name_on_path() {
        let sh = resolve_executable(Path::new("sh")).expect("sh should be on PATH");
        assert!(sh.is_absolute());
        assert!(resolve_executable(Path::new("/definitely/not/here/ffmpeg")).is_none());
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("videos"), "Spout DX Sender");
        assert_eq!(path, Path::new("videos").join("Spout DX Sender.mp4"));

        let path = default_output_path(Path::new("videos"), "a/b:c*");
        assert_eq!(path, Path::new("videos").join("a_b_c_.mp4"));

        let path = default_output_path(Path::new("videos"), "  ");
        assert_eq!(path, Path::new("videos").join("recording.mp4"));
    }

    #[test]
    fn test_configured_output_dir_is_used() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_output_dir(Some(dir.path())), dir.path());
    }
}
