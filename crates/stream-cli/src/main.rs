//! streamplay: plays an MP3 while it downloads.
//!
//! The library streams the response body into an in-memory buffer on one worker
//! and decodes from that buffer into the output device on another, so playback
//! starts before the download completes. While a track plays, stdin accepts
//! short commands (see [`cli::USAGE`]); Ctrl-C stops playback and exits.

mod cli;
mod config;

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, Sender, select};
use stream_player::{PlaybackController, PlaybackDelegate, PlaybackState, PlayerConfig};
use tracing_subscriber::EnvFilter;

use cli::Input;

#[derive(Clone, Copy, Debug)]
enum Event {
    Started,
    Progress,
    Finished,
}

struct ChannelDelegate(Sender<Event>);

impl PlaybackDelegate for ChannelDelegate {
    fn playback_started(&self) {
        let _ = self.0.send(Event::Started);
    }

    fn playback_progress(&self) {
        let _ = self.0.send(Event::Progress);
    }

    fn playback_finished(&self) {
        let _ = self.0.send(Event::Finished);
    }
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    let file = match &args.config {
        Some(path) => config::FileConfig::load(path)?,
        None => config::FileConfig::default(),
    };
    let default_filter = file
        .log_filter
        .clone()
        .unwrap_or_else(|| "info,stream_player=info,streamplay=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match &args.cmd {
        cli::Command::Devices => {
            for name in stream_player::output::list_output_devices()? {
                println!("{name}");
            }
        }
        cli::Command::Play { url } => {
            let mut player = file.player;
            if let Some(device) = &args.device {
                player.output.device = Some(device.clone());
            }
            if let Some(volume) = args.start_volume {
                player.initial_volume = volume;
            }
            play(&player, url)?;
        }
    }

    Ok(())
}

fn play(cfg: &PlayerConfig, url: &str) -> Result<()> {
    let controller = PlaybackController::with_system_output(cfg).context("start playback workers")?;
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    controller.set_delegate(Some(Arc::new(ChannelDelegate(event_tx))));

    let (input_tx, input_rx) = crossbeam_channel::unbounded();
    let interrupt_tx = input_tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Input::Quit);
    })
    .context("install Ctrl-C handler")?;
    spawn_stdin_reader(input_tx)?;

    eprintln!("{}", cli::USAGE);
    controller.play_track(url);
    run_until_done(&controller, &event_rx, &input_rx);
    controller.stop();
    eprintln!();
    Ok(())
}

fn spawn_stdin_reader(tx: Sender<Input>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match cli::parse_input(&line) {
                    Ok(input) => {
                        if tx.send(input).is_err() {
                            break;
                        }
                    }
                    Err(msg) => eprintln!("{msg}"),
                }
            }
        })
        .context("spawn stdin reader")?;
    Ok(())
}

fn run_until_done(
    controller: &PlaybackController,
    events: &Receiver<Event>,
    inputs: &Receiver<Input>,
) {
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(Event::Started) => tracing::info!(volume = controller.volume(), "audio started"),
                Ok(Event::Progress) => {
                    let played = controller.get_last_progress();
                    // Zero means a seek discarded the value this event announced.
                    if played > 0.0 {
                        print_status(played, controller.download_progress());
                    }
                }
                Ok(Event::Finished) | Err(_) => return,
            },
            recv(inputs) -> input => match input {
                Ok(Input::TogglePause) => {
                    if controller.state() == PlaybackState::Paused {
                        controller.resume();
                    } else {
                        controller.pause();
                    }
                }
                Ok(Input::Seek(secs)) => controller.seek(secs),
                Ok(Input::Volume(v)) => {
                    controller.change_volume(v);
                    tracing::info!(volume = controller.volume(), "volume");
                }
                Ok(Input::Quit) | Err(_) => return,
            },
        }
    }
}

fn print_status(played: f64, cached: f64) {
    const WIDTH: usize = 30;
    let filled = (played.clamp(0.0, 1.0) * WIDTH as f64).round() as usize;
    let mut err = std::io::stderr().lock();
    let _ = write!(
        err,
        "\r[{}{}] {:>3.0}% (cached {:>3.0}%)",
        "#".repeat(filled),
        "-".repeat(WIDTH - filled),
        played * 100.0,
        cached * 100.0
    );
    let _ = err.flush();
}
