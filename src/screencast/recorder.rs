//! Main recording loop
//!
//! One thread polls the sender, applies user commands and feeds the encoder.
//! Everything that touches the encoder session happens here, so a stop is
//! always complete before the next frame or the next session.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::buffer::Geometry;
use crate::capture::{FrameReceiver, SourceEvent, SourceInfo, SourceMonitor};
use crate::config::{DEFAULT_FRAME_RATE, RecordingConfig};
use crate::error::{EncoderError, StartError};

use super::command::build_args;
use super::encoder::{default_output_path, locate_encoder};
use super::notification::Notification;
use super::pacer::FramePacer;
use super::process::{EncoderBackend, EncoderProcess, StopOutcome, verify_output};
use super::state::{RecordingState, SharedState};

/// Global flag for graceful shutdown on SIGTERM/SIGINT
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Undelivered notifications per subscriber beyond this are dropped with a warning
const NOTIFICATION_QUEUE: usize = 64;

/// Requests from the control surface
#[derive(Debug)]
pub enum UserCommand {
    Start(RecordingConfig),
    Stop,
    Quit,
}

/// Cloneable remote control for a [`RecordingEngine`]
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: Sender<UserCommand>,
    state: SharedState,
}

impl EngineHandle {
    pub fn request_start(&self, config: RecordingConfig) {
        self.send(UserCommand::Start(config));
    }

    pub fn request_stop(&self) {
        self.send(UserCommand::Stop);
    }

    pub fn request_quit(&self) {
        self.send(UserCommand::Quit);
    }

    pub fn current_state(&self) -> RecordingState {
        self.state.get()
    }

    fn send(&self, command: UserCommand) {
        if let Err(e) = self.commands.send(command) {
            log::warn!("Recording engine is gone, dropping {:?}", e.into_inner());
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Encoder executable; discovered when unset
    pub encoder_path: Option<PathBuf>,
    /// Poll rate while not recording
    pub idle_fps: u32,
    /// Start recording with this config whenever a sender appears
    pub auto_start: Option<RecordingConfig>,
    /// End the loop once a recording has ended for any reason
    pub exit_after_recording: bool,
    /// Log progress every this many frames (0 disables)
    pub progress_interval: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            encoder_path: None,
            idle_fps: DEFAULT_FRAME_RATE,
            auto_start: None,
            exit_after_recording: false,
            progress_interval: 60,
        }
    }
}

#[derive(Debug)]
enum EndReason {
    UserStop,
    Quit,
    SourceChanged,
    SourceLost,
    EncoderFailed(String),
}

struct ActiveRecording {
    config: RecordingConfig,
    pid: u32,
    geometry: Geometry,
    frames: u64,
    started: Instant,
}

pub struct RecordingEngine<R: FrameReceiver, E: EncoderBackend = EncoderProcess> {
    monitor: SourceMonitor<R>,
    encoder: E,
    options: EngineOptions,
    state: RecordingState,
    shared: SharedState,
    session: Option<ActiveRecording>,
    pending_start: Option<RecordingConfig>,
    commands_tx: Sender<UserCommand>,
    commands: Receiver<UserCommand>,
    subscribers: Vec<Sender<Notification>>,
    quit: bool,
    recording_ended: bool,
}

impl<R: FrameReceiver, E: EncoderBackend> RecordingEngine<R, E> {
    pub fn with_encoder(receiver: R, encoder: E, options: EngineOptions) -> Self {
        let (commands_tx, commands) = crossbeam_channel::unbounded();
        Self {
            monitor: SourceMonitor::new(receiver),
            encoder,
            options,
            state: RecordingState::Idle,
            shared: SharedState::default(),
            session: None,
            pending_start: None,
            commands_tx,
            commands,
            subscribers: Vec::new(),
            quit: false,
            recording_ended: false,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            commands: self.commands_tx.clone(),
            state: self.shared.clone(),
        }
    }

    /// Subscribe to notifications from now on
    ///
    /// The receiver must be drained: once it holds `NOTIFICATION_QUEUE`
    /// undelivered items further ones are dropped with a warning. Dropping the
    /// receiver unsubscribes it.
    pub fn notifications(&mut self) -> Receiver<Notification> {
        let (tx, rx) = crossbeam_channel::bounded(NOTIFICATION_QUEUE);
        self.subscribers.push(tx);
        rx
    }

    #[cfg(test)]
    pub fn current_state(&self) -> RecordingState {
        self.state
    }

    #[cfg(test)]
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    #[cfg(test)]
    pub fn receiver_mut(&mut self) -> &mut R {
        self.monitor.receiver_mut()
    }

    /// Pacing rate for the next iteration, never zero
    fn loop_fps(&self) -> u32 {
        self.session
            .as_ref()
            .map_or(self.options.idle_fps, |s| s.config.frame_rate)
            .max(1)
    }

    /// Run until Quit, the shutdown flag, or (with `exit_after_recording`)
    /// the end of a recording
    pub fn run(&mut self, shutdown: &AtomicBool) {
        if self.options.idle_fps == 0 {
            log::warn!("Idle frame rate of 0 fps, polling at 1 fps instead");
        }
        log::info!("Recording engine running (idle at {} fps)", self.loop_fps());
        let mut pacer = FramePacer::new();

        loop {
            if shutdown.load(Ordering::Relaxed) && !self.quit {
                log::info!("Shutdown requested");
                self.quit = true;
            }
            if self.tick().is_break() {
                break;
            }

            pacer.hold_fps(self.loop_fps());
        }

        log::info!("Recording engine stopped");
    }

    /// One loop iteration: poll, react to sender changes, apply commands,
    /// then write the frame if recording
    pub fn tick(&mut self) -> ControlFlow<()> {
        let event = self.monitor.poll();
        let frame_ready = matches!(event, SourceEvent::Unchanged);
        let source_changed = matches!(event, SourceEvent::Changed(_) | SourceEvent::Lost(_));
        match event {
            SourceEvent::Changed(info) => self.on_source_changed(info),
            SourceEvent::Lost(name) => self.on_source_lost(name),
            SourceEvent::NoSource | SourceEvent::Unchanged => {}
        }

        self.drain_commands();
        if self.quit {
            self.end_session(EndReason::Quit);
            return ControlFlow::Break(());
        }

        // A start requested alongside a sender change waits one iteration so
        // it binds to the new sender
        if !source_changed {
            if let Some(config) = self.pending_start.take() {
                self.handle_start(config);
            }
        }

        if frame_ready && self.state == RecordingState::Recording {
            self.write_frame();
        }

        if self.options.exit_after_recording && self.recording_ended {
            log::info!("Recording ended, exiting");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn on_source_changed(&mut self, info: SourceInfo) {
        let was_idle = self.state == RecordingState::Idle;
        self.end_session(EndReason::SourceChanged);

        // The old session is gone; only now may a buffer of the new size exist
        if self.monitor.allocate_buffer().is_none() {
            log::error!("No sender to allocate a frame buffer for");
            return;
        }
        self.set_state(RecordingState::Bound);
        self.notify(Notification::SourceFound {
            name: info.name.clone(),
            width: info.width(),
            height: info.height(),
        });

        if was_idle && self.pending_start.is_none() {
            if let Some(config) = self.options.auto_start.clone() {
                log::info!("Sender [{}] bound, starting recording", info.name);
                self.pending_start = Some(config);
            }
        }
    }

    fn on_source_lost(&mut self, name: String) {
        if self.session.is_some() {
            self.end_session(EndReason::SourceLost);
        } else {
            self.notify(Notification::SourceLost { name });
        }
        self.set_state(RecordingState::Idle);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            log::debug!("Command: {:?}", command);
            match command {
                UserCommand::Start(config) => {
                    if self.pending_start.replace(config).is_some() {
                        log::debug!("Replacing pending start request");
                    }
                }
                UserCommand::Stop => {
                    self.pending_start = None;
                    if self.session.is_some() {
                        self.end_session(EndReason::UserStop);
                    } else {
                        log::debug!("Stop requested while not recording");
                    }
                }
                UserCommand::Quit => {
                    self.quit = true;
                    return;
                }
            }
        }
    }

    fn handle_start(&mut self, config: RecordingConfig) {
        if let Err(e) = self.start_recording(config) {
            log::warn!("Recording not started: {}", e);
            let notification = match e {
                StartError::NoSource => Notification::NoSource,
                StartError::AlreadyRecording => Notification::AlreadyRecording,
                StartError::Encoder(EncoderError::NotFound(path)) => {
                    Notification::EncoderNotFound { path }
                }
                other => Notification::StartFailed {
                    reason: other.to_string(),
                },
            };
            self.notify(notification);
        }
    }

    fn start_recording(&mut self, mut config: RecordingConfig) -> Result<(), StartError> {
        if self.session.is_some() {
            return Err(StartError::AlreadyRecording);
        }
        let source = self.monitor.source().cloned().ok_or(StartError::NoSource)?;

        if config.output_path.is_dir() {
            config.output_path = default_output_path(&config.output_path, &source.name);
        }
        config.validate()?;

        let location = locate_encoder(self.options.encoder_path.as_deref())?;
        log::debug!("Using encoder {} ({:?})", location.path.display(), location.origin);

        let args = build_args(&config, source.geometry, source.row_order);
        let info = self.encoder.start(&location.path, &args, source.geometry)?;

        log::info!(
            "Recording [{}] {} at {} fps ({}) to {}",
            source.name,
            source.geometry,
            config.frame_rate,
            config.codec.name(),
            config.output_path.display()
        );
        self.notify(Notification::RecordingStarted {
            path: config.output_path.clone(),
        });
        self.session = Some(ActiveRecording {
            config,
            pid: info.pid,
            geometry: info.geometry,
            frames: 0,
            started: Instant::now(),
        });
        self.recording_ended = false;
        self.set_state(RecordingState::Recording);
        Ok(())
    }

    fn write_frame(&mut self) {
        let result = match (self.session.as_ref(), self.monitor.frame()) {
            (Some(session), Some(frame)) if frame.geometry() != session.geometry => {
                Err(EncoderError::GeometryMismatch {
                    expected: session.geometry.frame_len(),
                    actual: frame.as_bytes().len(),
                })
            }
            (Some(_), Some(frame)) => self.encoder.write(frame.as_bytes()),
            _ => return,
        };

        match result {
            Ok(()) => self.count_frame(),
            Err(e) => {
                log::error!("Failed to write frame to encoder: {}", e);
                self.end_session(EndReason::EncoderFailed(e.to_string()));
            }
        }
    }

    fn count_frame(&mut self) {
        let interval = self.options.progress_interval;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.frames += 1;

        if interval > 0 && session.frames % interval == 0 {
            let fps = session.frames as f64 / session.started.elapsed().as_secs_f64();
            log::info!(
                "Recording: {} frames written ({:.1} fps)",
                session.frames,
                fps
            );
        }
    }

    /// Stop the encoder session, if any, and report why it ended
    fn end_session(&mut self, reason: EndReason) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.set_state(RecordingState::Stopping);

        let outcome = self.encoder.stop();
        log::info!(
            "Recording stopped ({:?}): {} frames in {:.1}s (encoder pid {})",
            reason,
            session.frames,
            session.started.elapsed().as_secs_f64(),
            session.pid
        );

        let path = session.config.output_path;
        if outcome.is_some_and(|o| !o.is_clean()) {
            log::warn!("Encoder did not exit cleanly, {} may be incomplete", path.display());
        }
        let notification = match reason {
            EndReason::UserStop | EndReason::Quit => {
                if outcome == Some(StopOutcome::Killed) {
                    Notification::StopTimedOut { path }
                } else {
                    if let Err(e) = verify_output(&path) {
                        log::warn!("{:#}", e);
                    }
                    Notification::RecordingSaved { path }
                }
            }
            EndReason::SourceChanged => Notification::SourceChanged { path },
            EndReason::SourceLost => Notification::SourceClosed { path },
            EndReason::EncoderFailed(reason) => Notification::EncoderExited { reason },
        };
        self.notify(notification);
        self.recording_ended = true;

        let next = if self.monitor.is_active() {
            RecordingState::Bound
        } else {
            RecordingState::Idle
        };
        self.set_state(next);
    }

    fn set_state(&mut self, state: RecordingState) {
        if self.state != state {
            log::debug!("State {} -> {}", self.state, state);
        }
        self.state = state;
        self.shared.set(state);
    }

    fn notify(&mut self, notification: Notification) {
        log::debug!("Notify: {}", notification);
        self.subscribers
            .retain(|tx| match tx.try_send(notification.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(dropped)) => {
                    log::warn!("Notification queue full, dropping: {}", dropped);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

impl<R: FrameReceiver, E: EncoderBackend> Drop for RecordingEngine<R, E> {
    fn drop(&mut self) {
        if self.session.is_some() {
            log::warn!("Recording still active at shutdown, stopping it");
            self.end_session(EndReason::Quit);
        }
    }
}

/// Flag set by SIGINT/SIGTERM once [`setup_signal_handler`] has run
pub fn shutdown_flag() -> &'static AtomicBool {
    &STOP_REQUESTED
}

/// Set up signal handler for SIGTERM and SIGINT
pub fn setup_signal_handler() -> Result<()> {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| unsafe {
        let handler = stop_signal_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    });

    Ok(())
}

// Only async-signal-safe work here; `run` logs the request
extern "C" fn stop_signal_handler(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::Relaxed);
}
