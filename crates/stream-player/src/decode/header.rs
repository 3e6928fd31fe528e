//! MPEG audio Layer III frame headers and ID3v2 tag boundaries.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct FrameHeader {
    pub(super) version: MpegVersion,
    pub(super) bitrate_kbps: u32,
    pub(super) sample_rate: u32,
    pub(super) padding: bool,
    pub(super) channels: u16,
}

const BITRATES_V1: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

impl FrameHeader {
    /// Parse a Layer III header from the first four bytes of `b`.
    ///
    /// Free-format and reserved encodings are rejected.
    pub(super) fn parse(b: &[u8]) -> Option<Self> {
        let word = u32::from_be_bytes([*b.first()?, *b.get(1)?, *b.get(2)?, *b.get(3)?]);
        if word >> 21 != 0x7ff {
            return None;
        }
        let version = match (word >> 19) & 0b11 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };
        // Layer III only.
        if (word >> 17) & 0b11 != 0b01 {
            return None;
        }
        let bitrate_idx = ((word >> 12) & 0xf) as usize;
        if bitrate_idx == 0 || bitrate_idx == 15 {
            return None;
        }
        let rate_idx = ((word >> 10) & 0b11) as usize;
        if rate_idx == 3 {
            return None;
        }
        let (bitrate_kbps, base_rate) = match version {
            MpegVersion::Mpeg1 => (BITRATES_V1[bitrate_idx], [44_100, 48_000, 32_000][rate_idx]),
            MpegVersion::Mpeg2 => (BITRATES_V2[bitrate_idx], [22_050, 24_000, 16_000][rate_idx]),
            MpegVersion::Mpeg25 => (BITRATES_V2[bitrate_idx], [11_025, 12_000, 8_000][rate_idx]),
        };
        let padding = (word >> 9) & 1 == 1;
        let channels = if (word >> 6) & 0b11 == 0b11 { 1 } else { 2 };
        Some(Self {
            version,
            bitrate_kbps,
            sample_rate: base_rate,
            padding,
            channels,
        })
    }

    /// Whole frame size in bytes, header included.
    pub(super) fn frame_len(&self) -> usize {
        let coeff = match self.version {
            MpegVersion::Mpeg1 => 144,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 72,
        };
        (coeff * self.bitrate_kbps * 1000 / self.sample_rate) as usize + usize::from(self.padding)
    }

    pub(super) fn samples_per_frame(&self) -> u64 {
        match self.version {
            MpegVersion::Mpeg1 => 1152,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 576,
        }
    }

    /// Whether `other` can belong to the same stream.
    pub(super) fn compatible(&self, other: &FrameHeader) -> bool {
        self.version == other.version && self.sample_rate == other.sample_rate
    }
}

/// Total size of a leading ID3v2 tag, or `None` if `b` does not start with one.
///
/// Needs the first 10 bytes.
pub(super) fn id3v2_len(b: &[u8]) -> Option<usize> {
    if b.len() < 10 || &b[..3] != b"ID3" {
        return None;
    }
    let size = b[6..10]
        .iter()
        .fold(0usize, |acc, byte| (acc << 7) | usize::from(byte & 0x7f));
    let footer = if b[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}

#[cfg(test)]
pub(super) fn encode_header(
    version_bits: u32,
    bitrate_idx: u32,
    rate_idx: u32,
    padding: bool,
    mono: bool,
) -> [u8; 4] {
    let word = (0x7ff << 21)
        | (version_bits << 19)
        | (0b01 << 17)
        | (1 << 16)
        | (bitrate_idx << 12)
        | (rate_idx << 10)
        | (u32::from(padding) << 9)
        | ((u32::from(mono) * 0b11) << 6);
    word.to_be_bytes()
}
