//! Audio output capability and its CPAL implementation.

mod cpal_sink;
mod device;
mod queue;
mod resample;

pub use cpal_sink::CpalSink;
pub use device::list_output_devices;

/// Destination for decoded PCM.
pub trait AudioSink: Send {
    /// Prepare for interleaved PCM in the given layout. Returns false if the device
    /// cannot be opened.
    fn open(&mut self, bits_per_sample: u16, channels: u16, sample_rate: u32) -> bool;

    /// Queue interleaved PCM; may block for backpressure. Returns false once the
    /// output is gone.
    fn write(&mut self, pcm: &[u8]) -> bool;

    /// Release the output, discarding anything still queued.
    fn close(&mut self);

    /// Apply a volume scale in `[0, 1]`.
    fn set_volume(&mut self, _scale: f64) {}

    /// Let queued audio play out, then release the output.
    fn drain(&mut self) {
        self.close();
    }
}
