//! Producer side: pulls a remote resource into a [`StreamBuffer`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::controls::Controls;
use crate::net::{FetchHandler, Transport};
use crate::stream_buffer::StreamBuffer;
use crate::sync::panic_message;

pub(crate) struct Downloader {
    transport: Arc<dyn Transport>,
    buffer: Arc<StreamBuffer>,
    controls: Arc<Controls>,
}

struct BufferSink<'a> {
    buffer: &'a StreamBuffer,
    controls: &'a Controls,
}

impl FetchHandler for BufferSink<'_> {
    fn on_data(&mut self, bytes: &[u8]) -> usize {
        if self.controls.is_stopping() {
            return 0;
        }
        self.buffer.append(bytes);
        bytes.len()
    }

    fn on_progress(&mut self, total: Option<u64>, received: u64) {
        if let Some(total) = total.filter(|t| *t > 0) {
            self.buffer.set_expected_total(total);
            self.controls
                .set_download_progress((received as f64 / total as f64).min(1.0));
        }
        self.controls.notify(|d| d.cache_progress());
    }
}

impl Downloader {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        buffer: Arc<StreamBuffer>,
        controls: Arc<Controls>,
    ) -> Self {
        Self {
            transport,
            buffer,
            controls,
        }
    }

    /// Fetch `url` into the buffer. The buffer is marked finished however the
    /// transfer ends.
    pub(crate) fn run(&self, url: &str) {
        if self.controls.is_stopping() {
            self.buffer.finish();
            return;
        }

        tracing::info!(url, "download started");
        let mut sink = BufferSink {
            buffer: &self.buffer,
            controls: &self.controls,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| self.transport.fetch(url, &mut sink)));
        match outcome {
            Ok(Ok(summary)) => {
                tracing::info!(
                    url,
                    status = summary.status,
                    received = summary.received,
                    "download finished"
                );
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    url,
                    error = %err,
                    received = self.buffer.len(),
                    "download ended early"
                );
            }
            Err(payload) => {
                tracing::error!(url, panic = %panic_message(&*payload), "transport panicked");
            }
        }
        self.buffer.finish();
    }
}
