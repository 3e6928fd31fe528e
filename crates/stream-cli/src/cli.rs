use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "streamplay", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML file with player settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Volume to start at, 0.0 to 1.0
    #[arg(long)]
    pub start_volume: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream and play an MP3 over HTTP
    Play {
        /// http(s) URL of the track
        url: String,
    },

    /// List output devices and exit
    Devices,
}

/// A line typed while a track plays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Input {
    TogglePause,
    Seek(f64),
    Volume(f64),
    Quit,
}

pub const USAGE: &str = "commands: p (pause/resume), s <secs> (seek), v <0..1> (volume), q (quit)";

pub fn parse_input(line: &str) -> Result<Input, String> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().ok_or_else(|| USAGE.to_string())?;
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("too many arguments; {USAGE}"));
    }
    let number = |name: &str| -> Result<f64, String> {
        let raw = arg.ok_or_else(|| format!("{name} needs a value"))?;
        let value: f64 = raw.parse().map_err(|_| format!("not a number: {raw}"))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("not a number: {raw}"))
        }
    };
    match cmd {
        "p" | "pause" if arg.is_none() => Ok(Input::TogglePause),
        "q" | "quit" if arg.is_none() => Ok(Input::Quit),
        "s" | "seek" => {
            let secs = number("seek")?;
            if secs < 0.0 {
                return Err("seek position must not be negative".to_string());
            }
            Ok(Input::Seek(secs))
        }
        "v" | "volume" => {
            let v = number("volume")?;
            if !(0.0..=1.0).contains(&v) {
                return Err("volume must be in 0..1".to_string());
            }
            Ok(Input::Volume(v))
        }
        _ => Err(USAGE.to_string()),
    }
}
