pub mod config;
pub mod controller;
mod controls;
pub mod decode;
pub mod delegate;
mod downloader;
pub mod error;
pub mod net;
pub mod output;
mod player;
pub mod progress;
pub mod registry;
pub mod stream_buffer;
mod sync;
pub mod task;
pub mod task_queue;

pub use config::{HttpConfig, OutputConfig, PlayerConfig};
pub use controller::{DecoderFactory, PlaybackController};
pub use controls::PlaybackState;
pub use delegate::PlaybackDelegate;
pub use error::{DecodeError, TaskError, TransportError, TransportErrorKind};
pub use registry::TaskRegistry;
pub use stream_buffer::StreamBuffer;
pub use task::Task;
pub use task_queue::{TaskQueue, Token};
