//! Encoder subprocess ownership
//!
//! Frames go to FFmpeg's stdin as raw bytes. A full pipe blocks the writer,
//! which is the only backpressure between the recorder and the encoder.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use crate::buffer::Geometry;
use crate::error::EncoderError;

use super::command::EncoderArgs;
use super::encoder::resolve_executable;
#[cfg(unix)]
use super::state::process_alive;

/// Time FFmpeg gets to finalize the container after stdin closes
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Facts about a running encoder session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub pid: u32,
    pub geometry: Geometry,
    pub started_at: DateTime<Local>,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited on its own within the grace period
    Exited { code: Option<i32> },
    /// Still running at the end of the grace period and killed
    Killed,
}

impl StopOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, StopOutcome::Exited { code: Some(0) })
    }
}

/// Start/write/stop lifecycle of one encoder session at a time
pub trait EncoderBackend {
    /// Launch `executable` reading raw frames of `geometry` from stdin
    fn start(
        &mut self,
        executable: &Path,
        args: &EncoderArgs,
        geometry: Geometry,
    ) -> Result<SessionInfo, EncoderError>;

    /// Write one whole frame, blocking while the pipe is full
    fn write(&mut self, frame: &[u8]) -> Result<(), EncoderError>;

    /// Close the pipe and wait (bounded) for the process to exit.
    /// Returns `None` when no session was active.
    fn stop(&mut self) -> Option<StopOutcome>;

    fn is_active(&self) -> bool;
}

struct ActiveSession {
    child: Child,
    stdin: ChildStdin,
    info: SessionInfo,
    frames_written: u64,
}

/// FFmpeg subprocess fed through its stdin
///
/// Dropping an active process stops it, so the encoder is always given the
/// chance to finalize its output.
pub struct EncoderProcess {
    session: Option<ActiveSession>,
    stop_timeout: Duration,
}

impl Default for EncoderProcess {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_TIMEOUT)
    }
}

impl EncoderProcess {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            session: None,
            stop_timeout,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref().map(|s| &s.info)
    }

    /// Frames written to the current session
    #[cfg(test)]
    pub fn frames_written(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.frames_written)
    }
}

impl EncoderBackend for EncoderProcess {
    fn start(
        &mut self,
        executable: &Path,
        args: &EncoderArgs,
        geometry: Geometry,
    ) -> Result<SessionInfo, EncoderError> {
        if self.session.is_some() {
            return Err(EncoderError::AlreadyActive);
        }

        let program = resolve_executable(executable)
            .ok_or_else(|| EncoderError::NotFound(executable.to_path_buf()))?;

        log::info!("Starting encoder: {} {}", program.display(), args);

        let mut cmd = Command::new(&program);
        cmd.args(args.as_slice())
            .stdin(Stdio::piped())
            // Encoder diagnostics stay visible on the console
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Own process group so Ctrl+C reaches only the recorder; the encoder
        // is ended by closing its stdin.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(EncoderError::Spawn)?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EncoderError::Spawn(std::io::Error::other(
                "encoder stdin was not captured",
            )));
        };

        let info = SessionInfo {
            pid: child.id(),
            geometry,
            started_at: Local::now(),
        };
        log::info!(
            "Encoder started (pid {}) for {} at {}",
            info.pid,
            geometry,
            info.started_at.format("%Y-%m-%d %H:%M:%S")
        );

        self.session = Some(ActiveSession {
            child,
            stdin,
            info: info.clone(),
            frames_written: 0,
        });
        Ok(info)
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), EncoderError> {
        let session = self.session.as_mut().ok_or(EncoderError::NotActive)?;

        let expected = session.info.geometry.frame_len();
        if frame.len() != expected {
            return Err(EncoderError::GeometryMismatch {
                expected,
                actual: frame.len(),
            });
        }

        match session.stdin.write_all(frame) {
            Ok(()) => {
                session.frames_written += 1;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(EncoderError::BrokenPipe),
            Err(e) => Err(EncoderError::Io(e)),
        }
    }

    fn stop(&mut self) -> Option<StopOutcome> {
        let ActiveSession {
            mut child,
            mut stdin,
            info,
            frames_written,
        } = self.session.take()?;

        log::info!(
            "Stopping encoder (pid {}) after {} frames...",
            info.pid,
            frames_written
        );

        if let Err(e) = stdin.flush() {
            log::debug!("Flushing encoder pipe failed: {}", e);
        }
        // End of stream for the encoder
        drop(stdin);

        let outcome = wait_for_exit(&mut child, self.stop_timeout);
        match outcome {
            StopOutcome::Exited { code: Some(0) } => {
                log::info!("Encoder (pid {}) finished", info.pid)
            }
            StopOutcome::Exited { code } => {
                log::warn!("Encoder (pid {}) exited with code {:?}", info.pid, code)
            }
            StopOutcome::Killed => log::warn!(
                "Encoder (pid {}) did not exit within {:?} and was killed",
                info.pid,
                self.stop_timeout
            ),
        }

        #[cfg(unix)]
        if process_alive(info.pid) {
            log::error!("Encoder (pid {}) is still running after stop", info.pid);
        }
        Some(outcome)
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        if self.session.is_some() {
            log::warn!("Encoder still running at shutdown, stopping it");
            self.stop();
        }
    }
}

/// Poll for exit until `timeout`, then kill and reap
fn wait_for_exit(child: &mut Child, timeout: Duration) -> StopOutcome {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return StopOutcome::Exited { code: status.code() },
            Ok(None) if Instant::now() < deadline => std::thread::sleep(EXIT_POLL_INTERVAL),
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to query encoder status: {}", e);
                break;
            }
        }
    }

    if let Err(e) = child.kill() {
        log::error!("Failed to kill encoder process {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        log::error!("Failed to reap encoder process {}: {}", child.id(), e);
    }
    StopOutcome::Killed
}

/// Check the encoder left a non-empty file behind, returning its size
pub fn verify_output(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Output file was not created: {}", path.display()))?;

    if metadata.len() == 0 {
        anyhow::bail!("Output file is empty: {}", path.display());
    }

    log::info!(
        "Output file verified: {} ({} bytes)",
        path.display(),
        metadata.len()
    );
    Ok(metadata.len())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;

    const SH: &str = "/bin/sh";

    fn tiny() -> Geometry {
        Geometry::new(4, 2, PixelFormat::Rgb8)
    }

    fn sh(script: &str, extra: &[&str]) -> EncoderArgs {
        let mut args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        EncoderArgs::from(args)
    }

    #[test]
    fn test_frames_reach_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames.raw");
        let out_arg = out.to_string_lossy().to_string();

        let mut encoder = EncoderProcess::default();
        let info = encoder
            .start(Path::new(SH), &sh("cat > \"$1\"", &[&out_arg]), tiny())
            .unwrap();
        assert!(encoder.is_active());
        assert_eq!(info.geometry, tiny());

        let frame = vec![7u8; tiny().frame_len()];
        for _ in 0..3 {
            encoder.write(&frame).unwrap();
        }
        assert_eq!(encoder.frames_written(), 3);

        let outcome = encoder.stop().unwrap();
        assert!(outcome.is_clean());
        assert!(!encoder.is_active());
        assert!(!process_alive(info.pid));
        assert_eq!(verify_output(&out).unwrap(), 3 * 24);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut encoder = EncoderProcess::default();
        let first = encoder
            .start(Path::new(SH), &sh("cat > /dev/null", &[]), tiny())
            .unwrap();

        let err = encoder
            .start(Path::new(SH), &sh("cat > /dev/null", &[]), tiny())
            .unwrap_err();
        assert!(matches!(err, EncoderError::AlreadyActive));
        assert_eq!(encoder.session().map(|s| s.pid), Some(first.pid));

        encoder.stop();
    }

    #[test]
    fn test_missing_executable() {
        let mut encoder = EncoderProcess::default();
        let err = encoder
            .start(Path::new("/no/such/dir/ffmpeg"), &sh("", &[]), tiny())
            .unwrap_err();
        assert!(matches!(err, EncoderError::NotFound(_)));
        assert!(!encoder.is_active());
    }

    #[test]
    fn test_wrong_frame_size_is_not_written() {
        let mut encoder = EncoderProcess::default();
        encoder
            .start(Path::new(SH), &sh("cat > /dev/null", &[]), tiny())
            .unwrap();

        let err = encoder.write(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            EncoderError::GeometryMismatch {
                expected: 24,
                actual: 10
            }
        ));
        assert_eq!(encoder.frames_written(), 0);
        encoder.stop();
    }

    #[test]
    fn test_exited_encoder_reports_broken_pipe() {
        let mut encoder = EncoderProcess::default();
        encoder
            .start(Path::new(SH), &sh("exit 0", &[]), tiny())
            .unwrap();

        let frame = vec![0u8; tiny().frame_len()];
        let mut broken = false;
        for _ in 0..500 {
            match encoder.write(&frame) {
                Ok(()) => std::thread::sleep(Duration::from_millis(10)),
                Err(EncoderError::BrokenPipe) => {
                    broken = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert!(broken);
        assert!(encoder.stop().is_some());
    }

    #[test]
    fn test_stop_is_bounded_and_idempotent() {
        let mut encoder = EncoderProcess::new(Duration::from_millis(200));
        let info = encoder
            .start(Path::new(SH), &sh("exec sleep 5", &[]), tiny())
            .unwrap();

        let started = Instant::now();
        assert_eq!(encoder.stop(), Some(StopOutcome::Killed));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!process_alive(info.pid));

        assert_eq!(encoder.stop(), None);
    }

    #[test]
    fn test_drop_stops_encoder() {
        let pid = {
            let mut encoder = EncoderProcess::default();
            encoder
                .start(Path::new(SH), &sh("cat > /dev/null", &[]), tiny())
                .unwrap()
                .pid
        };
        assert!(!process_alive(pid));
    }

    #[test]
    fn test_write_without_session() {
        let mut encoder = EncoderProcess::default();
        assert!(matches!(encoder.write(&[]), Err(EncoderError::NotActive)));
        assert_eq!(encoder.stop(), None);
    }
}
