mod buffer;
mod capture;
mod cli;
mod config;
mod error;
mod screencast;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::io::BufRead;

use buffer::{PixelFormat, RowOrder};
use capture::TestPatternSource;
use config::{RecorderSettings, RecordingConfig};
use screencast::{
    EncoderProcess, EngineHandle, EngineOptions, RecordingEngine, resolve_output_dir,
    setup_signal_handler, shutdown_flag,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut settings = RecorderSettings::load();
    let options = cli::parse_args(std::env::args().skip(1), &mut settings)?;
    if options.save {
        settings.save().context("Failed to save settings")?;
        log::info!("Settings saved");
    }

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| resolve_output_dir(settings.output_dir.as_deref()));
    let config = settings.recording_config(output);
    log::info!(
        "Codec {}, {} fps, audio {}, output {}",
        config.codec.name(),
        config.frame_rate,
        if config.audio_enabled() { "on" } else { "off" },
        config.output_path.display()
    );

    let (width, height) = options.sender_size;
    let mut source = TestPatternSource::new(&options.sender_name, width, height, PixelFormat::Rgb8);
    if options.bottom_up {
        source = source.with_row_order(RowOrder::BottomUp);
    }
    if let Some(frames) = options.frame_limit {
        source = source.with_frame_limit(frames);
    }

    let engine_options = EngineOptions {
        encoder_path: settings.encoder_path.clone(),
        idle_fps: settings.frame_rate,
        auto_start: options.auto_start.then(|| config.clone()),
        exit_after_recording: options.auto_start,
        ..Default::default()
    };
    let mut engine = RecordingEngine::with_encoder(
        source,
        EncoderProcess::new(settings.stop_timeout()),
        engine_options,
    );

    setup_signal_handler()?;

    let notifications = engine.notifications();
    std::thread::spawn(move || {
        for notification in notifications.iter() {
            println!("{}", notification);
        }
    });

    let handle = engine.handle();
    std::thread::spawn(move || read_commands(handle, config));

    engine.run(shutdown_flag());
    Ok(())
}

/// Line commands on stdin: r = record, s = stop, q = quit, ? = state
fn read_commands(handle: EngineHandle, config: RecordingConfig) {
    println!("Commands: r = record, s = stop, q = quit, ? = state");
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match line.trim() {
            "r" => handle.request_start(config.clone()),
            "s" => handle.request_stop(),
            "q" => {
                handle.request_quit();
                break;
            }
            "?" => println!("{}", handle.current_state()),
            "" => {}
            other => println!("Unknown command: {}", other),
        }
    }
}
