//! Feed-mode decoding: compressed bytes are pushed in, PCM frames are pulled out.

mod header;
mod mpeg;

pub use mpeg::MpegFeedDecoder;

use crate::error::DecodeError;

/// PCM layout of decoded frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// Result of one [`FeedDecoder::decode_next`] step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// Everything fed so far has been consumed.
    NeedMoreInput,
    /// The stream (re)announced its format; frames that follow use it.
    NewFormat(AudioFormat),
    /// Interleaved native-endian PCM.
    Frame(Vec<u8>),
}

/// Incremental decoder driven by the playback consumer.
pub trait FeedDecoder: Send {
    /// Reset to the start of a new stream.
    fn open(&mut self) -> Result<(), DecodeError>;

    /// Append the next compressed bytes of the stream.
    fn feed(&mut self, bytes: &[u8]) -> Result<(), DecodeError>;

    fn decode_next(&mut self) -> Result<DecodeEvent, DecodeError>;

    /// Translate a sample position into the input byte offset to feed from.
    ///
    /// Returns `None` when the position cannot be located yet. Does not move the decoder.
    fn feed_seek(&mut self, sample_offset: u64) -> Option<u64>;

    /// Drop buffered input and resume decoding from `input_offset`, a value
    /// previously returned by [`FeedDecoder::feed_seek`].
    fn restart_at(&mut self, input_offset: u64);
}
