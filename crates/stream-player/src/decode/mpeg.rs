//! MPEG Layer III feed decoder on top of symphonia's MP3 codec.
//!
//! Frames are located by header parsing so bytes can be pushed in arbitrary
//! chunks; each complete frame is decoded as one packet. While decoding runs
//! contiguously the decoder records where every frame starts, which makes seeks
//! into already-decoded territory exact.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_MP3, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::Packet;

use super::header::{FrameHeader, id3v2_len};
use super::{AudioFormat, DecodeEvent, FeedDecoder};
use crate::error::DecodeError;

/// One indexed frame: first sample position and input byte offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct IndexEntry {
    sample: u64,
    byte: u64,
}

pub struct MpegFeedDecoder {
    pending: Vec<u8>,
    /// Stream offset of `pending[0]`.
    pending_offset: u64,
    /// Bytes of a leading tag still to discard.
    skip: usize,
    tag_checked: bool,
    locked: Option<FrameHeader>,
    format: Option<AudioFormat>,
    codec: Option<Box<dyn Decoder>>,
    /// Sample position of the next frame; `None` after an estimated restart.
    position: Option<u64>,
    index: Vec<IndexEntry>,
    data_start: u64,
    first_frame_len: Option<usize>,
}

impl Default for MpegFeedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MpegFeedDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            pending_offset: 0,
            skip: 0,
            tag_checked: false,
            locked: None,
            format: None,
            codec: None,
            position: Some(0),
            index: Vec::new(),
            data_start: 0,
            first_frame_len: None,
        }
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.pending.len());
        self.pending.drain(..n);
        self.pending_offset += n as u64;
    }

    /// Handle a leading ID3v2 tag. Returns false while more bytes are needed to decide.
    fn skip_tag(&mut self) -> bool {
        if !self.tag_checked {
            if self.pending_offset == 0 && self.pending.len() < 10 {
                return false;
            }
            self.tag_checked = true;
            if self.pending_offset == 0 {
                if let Some(len) = id3v2_len(&self.pending) {
                    tracing::debug!(bytes = len, "skipping id3v2 tag");
                    self.skip = len;
                    self.data_start = len as u64;
                }
            }
        }
        if self.skip > 0 {
            let n = self.skip.min(self.pending.len());
            self.consume(n);
            self.skip -= n;
        }
        self.skip == 0
    }

    /// Find the next complete frame at the front of `pending`, discarding garbage.
    fn next_frame(&mut self) -> Option<FrameHeader> {
        loop {
            let Some(start) = self
                .pending
                .windows(2)
                .position(|w| w[0] == 0xff && w[1] & 0xe0 == 0xe0)
            else {
                // Keep a trailing 0xff that may start a header.
                let keep = usize::from(self.pending.last() == Some(&0xff));
                let drop = self.pending.len() - keep;
                self.consume(drop);
                return None;
            };
            self.consume(start);

            let header = match FrameHeader::parse(&self.pending) {
                Some(h) => h,
                None if self.pending.len() < 4 => return None,
                None => {
                    self.consume(1);
                    continue;
                }
            };
            let len = header.frame_len();
            if let Some(locked) = self.locked {
                if !locked.compatible(&header) {
                    self.consume(1);
                    self.locked = None;
                    continue;
                }
                if self.pending.len() < len {
                    return None;
                }
                return Some(header);
            }

            // Not synchronised yet: confirm with the following header.
            if self.pending.len() < len + 4 {
                return None;
            }
            match FrameHeader::parse(&self.pending[len..]) {
                Some(next) if next.compatible(&header) => {
                    self.locked = Some(header);
                    return Some(header);
                }
                _ => self.consume(1),
            }
        }
    }

    fn make_codec(header: &FrameHeader) -> Result<Box<dyn Decoder>, DecodeError> {
        let channels = if header.channels == 1 {
            Channels::FRONT_LEFT
        } else {
            Channels::FRONT_LEFT | Channels::FRONT_RIGHT
        };
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_MP3)
            .with_sample_rate(header.sample_rate)
            .with_channels(channels);
        Ok(symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?)
    }

    fn record_frame(&mut self, header: &FrameHeader) {
        if self.first_frame_len.is_none() {
            self.first_frame_len = Some(header.frame_len());
        }
        let Some(sample) = self.position else {
            return;
        };
        let byte = self.pending_offset;
        if self.index.last().is_none_or(|last| byte > last.byte) {
            self.index.push(IndexEntry { sample, byte });
        }
        self.position = Some(sample + header.samples_per_frame());
    }

    fn samples_per_frame(&self) -> u64 {
        self.locked.map_or(1152, |h| h.samples_per_frame())
    }

    fn average_frame_len(&self) -> Option<f64> {
        match self.index.as_slice() {
            [first, .., last] => {
                Some((last.byte - first.byte) as f64 / (self.index.len() - 1) as f64)
            }
            _ => self.first_frame_len.map(|n| n as f64),
        }
    }
}

impl FeedDecoder for MpegFeedDecoder {
    fn open(&mut self) -> Result<(), DecodeError> {
        *self = Self::new();
        Ok(())
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    fn decode_next(&mut self) -> Result<DecodeEvent, DecodeError> {
        if !self.skip_tag() {
            return Ok(DecodeEvent::NeedMoreInput);
        }
        loop {
            let Some(header) = self.next_frame() else {
                return Ok(DecodeEvent::NeedMoreInput);
            };

            let announced = AudioFormat {
                channels: header.channels,
                sample_rate: header.sample_rate,
                bits_per_sample: 16,
            };
            if self.format != Some(announced) {
                self.codec = Some(Self::make_codec(&header)?);
                self.format = Some(announced);
                tracing::debug!(
                    channels = announced.channels,
                    rate = announced.sample_rate,
                    "mpeg stream format"
                );
                // The frame stays queued and decodes on the next call.
                return Ok(DecodeEvent::NewFormat(announced));
            }

            let len = header.frame_len();
            self.record_frame(&header);
            let Some(codec) = self.codec.as_mut() else {
                return Err(DecodeError::Backend("codec missing after format change".into()));
            };
            let packet =
                Packet::new_from_slice(0, 0, header.samples_per_frame(), &self.pending[..len]);
            let pcm = match codec.decode(&packet) {
                Ok(decoded) => {
                    let mut samples =
                        SampleBuffer::<i16>::new(decoded.frames() as u64, *decoded.spec());
                    samples.copy_interleaved_ref(decoded);
                    let mut out = Vec::with_capacity(samples.samples().len() * 2);
                    for s in samples.samples() {
                        out.extend_from_slice(&s.to_ne_bytes());
                    }
                    Some(out)
                }
                Err(symphonia::core::errors::Error::DecodeError(reason)) => {
                    // Typical right after a restart while the bit reservoir refills.
                    tracing::debug!(reason, "skipping undecodable mpeg frame");
                    None
                }
                Err(err) => return Err(err.into()),
            };
            self.consume(len);
            match pcm {
                Some(out) if !out.is_empty() => return Ok(DecodeEvent::Frame(out)),
                _ => continue,
            }
        }
    }

    fn feed_seek(&mut self, sample_offset: u64) -> Option<u64> {
        self.format?;
        let spf = self.samples_per_frame();
        if let Some(last) = self.index.last().copied() {
            if sample_offset < last.sample + spf {
                let at = self.index.partition_point(|e| e.sample <= sample_offset);
                return self.index.get(at.saturating_sub(1)).map(|e| e.byte);
            }
            let frames_beyond = (sample_offset - last.sample) / spf;
            return extrapolate(last.byte, frames_beyond, self.average_frame_len()?);
        }
        extrapolate(self.data_start, sample_offset / spf, self.average_frame_len()?)
    }

    fn restart_at(&mut self, input_offset: u64) {
        self.pending.clear();
        self.pending_offset = input_offset;
        self.skip = 0;
        self.tag_checked = true;
        self.locked = None;
        if let Some(codec) = self.codec.as_mut() {
            codec.reset();
        }
        self.position = self
            .index
            .binary_search_by_key(&input_offset, |e| e.byte)
            .ok()
            .map(|i| self.index[i].sample);
        tracing::debug!(
            offset = input_offset,
            exact = self.position.is_some(),
            "mpeg decoder restarted"
        );
    }
}

/// Byte offset `frames` average-sized frames past `base`, or `None` if it does not fit.
fn extrapolate(base: u64, frames: u64, avg_frame_len: f64) -> Option<u64> {
    let distance = (frames as f64 * avg_frame_len).round();
    if !distance.is_finite() || distance >= u64::MAX as f64 {
        return None;
    }
    base.checked_add(distance as u64)
}
