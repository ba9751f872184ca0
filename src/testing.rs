//! Fakes for exercising the recording engine without FFmpeg

use std::path::{Path, PathBuf};

use crate::buffer::Geometry;
use crate::error::EncoderError;
use crate::screencast::command::EncoderArgs;
use crate::screencast::process::{EncoderBackend, SessionInfo, StopOutcome};

/// Records every call instead of running a process
#[derive(Debug, Default)]
pub struct FakeEncoder {
    pub starts: u32,
    pub stops: u32,
    /// Every write attempt as (session number, frame length), including failed ones
    pub writes: Vec<(u32, usize)>,
    pub last_args: Option<EncoderArgs>,
    pub last_executable: Option<PathBuf>,
    /// 1-based write attempt (across sessions) that fails with a broken pipe
    pub break_on_write: Option<usize>,
    /// Every start fails with `NotFound`
    pub missing: bool,
    /// Every stop reports the process had to be killed
    pub hang_on_stop: bool,
    session: Option<Geometry>,
    broken: bool,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes_in_session(&self, session: u32) -> usize {
        self.writes.iter().filter(|(s, _)| *s == session).count()
    }
}

impl EncoderBackend for FakeEncoder {
    fn start(
        &mut self,
        executable: &Path,
        args: &EncoderArgs,
        geometry: Geometry,
    ) -> Result<SessionInfo, EncoderError> {
        if self.session.is_some() {
            return Err(EncoderError::AlreadyActive);
        }
        if self.missing {
            return Err(EncoderError::NotFound(executable.to_path_buf()));
        }
        self.starts += 1;
        self.session = Some(geometry);
        self.broken = false;
        self.last_args = Some(args.clone());
        self.last_executable = Some(executable.to_path_buf());
        Ok(SessionInfo {
            pid: 40_000 + self.starts,
            geometry,
            started_at: chrono::Local::now(),
        })
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), EncoderError> {
        let geometry = self.session.ok_or(EncoderError::NotActive)?;
        self.writes.push((self.starts, frame.len()));

        if self.broken || self.break_on_write == Some(self.writes.len()) {
            self.broken = true;
            return Err(EncoderError::BrokenPipe);
        }
        if frame.len() != geometry.frame_len() {
            return Err(EncoderError::GeometryMismatch {
                expected: geometry.frame_len(),
                actual: frame.len(),
            });
        }
        Ok(())
    }

    fn stop(&mut self) -> Option<StopOutcome> {
        self.session.take()?;
        self.stops += 1;
        if self.hang_on_stop {
            Some(StopOutcome::Killed)
        } else {
            Some(StopOutcome::Exited { code: Some(0) })
        }
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }
}
