//! Tuning parameters shared by the download, decode, and output stages.

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration for a [`crate::controller::PlaybackController`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Bytes pulled from the stream buffer per consumer iteration.
    pub chunk_bytes: usize,
    /// Volume scale applied before the first `change_volume` call.
    pub initial_volume: f64,
    /// How many progress values the relay keeps before dropping the oldest.
    pub progress_capacity: usize,
    /// Network transport settings.
    pub http: HttpConfig,
    /// Audio output settings.
    pub output: OutputConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 4096,
            initial_volume: 0.5,
            progress_capacity: 64,
            http: HttpConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Settings for the HTTP transport.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Maximum time to establish a connection.
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Maximum time to wait for the response head.
    #[serde(with = "secs")]
    pub response_timeout: Duration,
    /// User-Agent header sent with each request.
    pub user_agent: String,
    /// Bytes requested from the body reader per read call.
    pub read_chunk_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(15),
            user_agent: concat!("streamplay/", env!("CARGO_PKG_VERSION")).to_string(),
            read_chunk_bytes: 16 * 1024,
        }
    }
}

/// Settings for the cpal-backed sink.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device substring match; default device when unset.
    pub device: Option<String>,
    /// Queue buffer target in seconds between `write` and the device callback.
    pub buffer_seconds: f32,
    /// Resampler input chunk size in frames.
    pub resample_chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_seconds: 2.0,
            resample_chunk_frames: 1024,
            refill_max_frames: 4096,
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(
                "timeout must be a non-negative number of seconds",
            ));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
