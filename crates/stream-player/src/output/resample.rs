//! Synchronous sample-rate conversion for the output path.
//!
//! Uses Rubato's sinc resampler with fixed-size input chunks. Input that does
//! not fill a chunk is carried over to the next call.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

pub(crate) struct StreamResampler {
    resampler: Async<f32>,
    channels: usize,
    chunk_frames: usize,
    carry: Vec<f32>,
    out: Vec<f32>,
}

impl StreamResampler {
    pub(crate) fn new(
        src_rate: u32,
        dst_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self> {
        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };
        let chunk_frames = chunk_frames.max(1);
        let channels = channels.max(1);
        let resampler = Async::<f32>::new_sinc(
            dst_rate as f64 / src_rate as f64,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )?;
        let out = vec![0.0f32; resampler.output_frames_max() * channels];
        tracing::debug!(src_rate, dst_rate, channels, "resampler ready");
        Ok(Self {
            resampler,
            channels,
            chunk_frames,
            carry: Vec::new(),
            out,
        })
    }

    /// Resample as many whole chunks as `input` (plus carried samples) provides.
    pub(crate) fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.carry.extend_from_slice(input);
        let chunk_samples = self.chunk_frames * self.channels;
        let mut produced = Vec::new();
        let mut consumed = 0;
        while self.carry.len() - consumed >= chunk_samples {
            let chunk = self.carry[consumed..consumed + chunk_samples].to_vec();
            self.run(&chunk, None, &mut produced)?;
            consumed += chunk_samples;
        }
        self.carry.drain(..consumed);
        Ok(produced)
    }

    /// Resample the carried partial chunk.
    pub(crate) fn flush(&mut self) -> Result<Vec<f32>> {
        let frames = self.carry.len() / self.channels;
        let mut produced = Vec::new();
        if frames > 0 {
            let mut chunk = std::mem::take(&mut self.carry);
            chunk.resize(self.chunk_frames * self.channels, 0.0);
            self.run(&chunk, Some(frames), &mut produced)?;
        }
        self.carry.clear();
        Ok(produced)
    }

    fn run(
        &mut self,
        chunk: &[f32],
        partial_len: Option<usize>,
        produced: &mut Vec<f32>,
    ) -> Result<()> {
        let input = InterleavedSlice::new(chunk, self.channels, self.chunk_frames)
            .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
        let out_frames = self.out.len() / self.channels;
        let mut output = InterleavedSlice::new_mut(&mut self.out, self.channels, out_frames)
            .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };
        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input, &mut output, Some(&indexing))?;
        produced.extend_from_slice(&self.out[..nbr_out * self.channels]);
        Ok(())
    }
}
