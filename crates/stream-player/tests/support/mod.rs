#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use stream_player::decode::{AudioFormat, DecodeEvent, FeedDecoder};
use stream_player::net::{FetchHandler, FetchSummary, Transport};
use stream_player::output::AudioSink;
use stream_player::{
    DecodeError, DecoderFactory, PlaybackController, PlaybackDelegate, PlayerConfig,
    TransportError, TransportErrorKind,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// What the fake network returns for one URL.
pub enum Script {
    /// Chunks delivered in order. With a gate, each chunk waits for one permit and
    /// the transfer ends early once the gate sender is dropped.
    Chunks {
        chunks: Vec<Vec<u8>>,
        total: Option<u64>,
        gate: Option<Receiver<()>>,
    },
    /// `fill` bytes forever, until the handler refuses them.
    Endless { fill: u8, chunk: usize },
    Fail(TransportErrorKind),
    /// Panics inside the transport after delivering `before` bytes.
    Panic { before: usize },
}

impl Script {
    pub fn split(bytes: &[u8], chunk: usize) -> Vec<Vec<u8>> {
        bytes.chunks(chunk).map(<[u8]>::to_vec).collect()
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn with(self, url: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(url.to_owned(), script);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }
}

fn deliver(
    handler: &mut dyn FetchHandler,
    bytes: &[u8],
    total: Option<u64>,
    received: &mut u64,
) -> Result<(), TransportError> {
    if handler.on_data(bytes) < bytes.len() {
        return Err(TransportError::new(TransportErrorKind::Aborted, "handler refused data"));
    }
    *received += bytes.len() as u64;
    handler.on_progress(total, *received);
    Ok(())
}

fn play_script(
    script: Script,
    handler: &mut dyn FetchHandler,
) -> Result<FetchSummary, TransportError> {
    let mut received = 0;
    match script {
        Script::Chunks { chunks, total, gate } => {
            for chunk in chunks {
                if let Some(gate) = &gate {
                    if gate.recv().is_err() {
                        break;
                    }
                }
                deliver(handler, &chunk, total, &mut received)?;
            }
            Ok(FetchSummary { status: 200, total, received })
        }
        Script::Endless { fill, chunk } => loop {
            deliver(handler, &vec![fill; chunk], None, &mut received)?;
            thread::sleep(Duration::from_millis(2));
        },
        Script::Fail(kind) => Err(TransportError::new(kind, "scripted failure")),
        Script::Panic { before } => {
            deliver(handler, &vec![0; before], None, &mut received)?;
            panic!("scripted transport panic");
        }
    }
}

impl Transport for ScriptedTransport {
    fn fetch(
        &self,
        url: &str,
        handler: &mut dyn FetchHandler,
    ) -> Result<FetchSummary, TransportError> {
        let script = self.scripts.lock().unwrap().remove(url);
        self.record(format!("start {url}"));
        let result = match script {
            Some(script) => play_script(script, handler),
            None => Err(TransportError::new(TransportErrorKind::Status(404), "no script")),
        };
        self.record(format!("end {url}"));
        result
    }
}

pub type DecoderLogs = Arc<Mutex<Vec<Arc<Mutex<DecoderLog>>>>>;

#[derive(Default)]
pub struct DecoderLog {
    pub fed: Vec<u8>,
    pub seeks: Vec<u64>,
    pub restarts: Vec<u64>,
}

/// Announces `format` on the first fed bytes, then returns every fed chunk as one
/// frame. One input byte corresponds to one sample.
pub struct ScriptedDecoder {
    log: Arc<Mutex<DecoderLog>>,
    format: AudioFormat,
    announced: bool,
    pending: Vec<u8>,
    panic_on_frame: bool,
}

impl FeedDecoder for ScriptedDecoder {
    fn open(&mut self) -> Result<(), DecodeError> {
        self.announced = false;
        self.pending.clear();
        Ok(())
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.pending.extend_from_slice(bytes);
        self.log.lock().unwrap().fed.extend_from_slice(bytes);
        Ok(())
    }

    fn decode_next(&mut self) -> Result<DecodeEvent, DecodeError> {
        if self.pending.is_empty() {
            Ok(DecodeEvent::NeedMoreInput)
        } else if !self.announced {
            self.announced = true;
            Ok(DecodeEvent::NewFormat(self.format))
        } else if self.panic_on_frame {
            panic!("scripted decoder panic");
        } else {
            Ok(DecodeEvent::Frame(std::mem::take(&mut self.pending)))
        }
    }

    fn feed_seek(&mut self, sample_offset: u64) -> Option<u64> {
        self.log.lock().unwrap().seeks.push(sample_offset);
        self.announced.then_some(sample_offset)
    }

    fn restart_at(&mut self, input_offset: u64) {
        self.pending.clear();
        self.log.lock().unwrap().restarts.push(input_offset);
    }
}

/// Factory for [`ScriptedDecoder`]s plus the logs of every decoder it built.
pub fn scripted_decoders(sample_rate: u32) -> (DecoderFactory, DecoderLogs) {
    scripted_decoders_with(sample_rate, false)
}

/// Like [`scripted_decoders`], but every decoder panics once it has a frame to return.
pub fn panicking_decoders(sample_rate: u32) -> (DecoderFactory, DecoderLogs) {
    scripted_decoders_with(sample_rate, true)
}

fn scripted_decoders_with(sample_rate: u32, panic_on_frame: bool) -> (DecoderFactory, DecoderLogs) {
    let logs: DecoderLogs = Arc::default();
    let made = logs.clone();
    let factory: DecoderFactory = Arc::new(move || -> Box<dyn FeedDecoder> {
        let log = Arc::new(Mutex::new(DecoderLog::default()));
        made.lock().unwrap().push(log.clone());
        Box::new(ScriptedDecoder {
            log,
            format: AudioFormat {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
            },
            announced: false,
            pending: Vec::new(),
            panic_on_frame,
        })
    });
    (factory, logs)
}

#[derive(Default)]
pub struct SinkLog {
    pub opens: Vec<(u16, u16, u32)>,
    pub written: Vec<u8>,
    pub volumes: Vec<f64>,
    pub closes: usize,
    pub drains: usize,
}

pub struct RecordingSink {
    pub log: Arc<Mutex<SinkLog>>,
    pub accept_open: bool,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self {
                log: log.clone(),
                accept_open: true,
            },
            log,
        )
    }
}

impl AudioSink for RecordingSink {
    fn open(&mut self, bits_per_sample: u16, channels: u16, sample_rate: u32) -> bool {
        if self.accept_open {
            self.log
                .lock()
                .unwrap()
                .opens
                .push((bits_per_sample, channels, sample_rate));
        }
        self.accept_open
    }

    fn write(&mut self, pcm: &[u8]) -> bool {
        self.log.lock().unwrap().written.extend_from_slice(pcm);
        true
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }

    fn set_volume(&mut self, scale: f64) {
        self.log.lock().unwrap().volumes.push(scale);
    }

    fn drain(&mut self) {
        self.log.lock().unwrap().drains += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Started,
    Progress,
    Finished,
    Cache,
}

pub struct RecordingDelegate(pub Sender<Event>);

impl PlaybackDelegate for RecordingDelegate {
    fn playback_started(&self) {
        let _ = self.0.send(Event::Started);
    }

    fn playback_progress(&self) {
        let _ = self.0.send(Event::Progress);
    }

    fn playback_finished(&self) {
        let _ = self.0.send(Event::Finished);
    }

    fn cache_progress(&self) {
        let _ = self.0.send(Event::Cache);
    }
}

pub struct Harness {
    pub controller: PlaybackController,
    pub transport: Arc<ScriptedTransport>,
    pub decoders: DecoderLogs,
    pub sink: Arc<Mutex<SinkLog>>,
    pub events: Receiver<Event>,
}

impl Harness {
    pub fn new(transport: ScriptedTransport) -> Self {
        let (sink, log) = RecordingSink::new();
        Self::with_sink(transport, sink, log)
    }

    pub fn with_sink(
        transport: ScriptedTransport,
        sink: RecordingSink,
        log: Arc<Mutex<SinkLog>>,
    ) -> Self {
        Self::build(transport, scripted_decoders(1000), sink, log)
    }

    pub fn with_panicking_decoder(transport: ScriptedTransport) -> Self {
        let (sink, log) = RecordingSink::new();
        Self::build(transport, panicking_decoders(1000), sink, log)
    }

    fn build(
        transport: ScriptedTransport,
        (factory, decoders): (DecoderFactory, DecoderLogs),
        sink: RecordingSink,
        log: Arc<Mutex<SinkLog>>,
    ) -> Self {
        let transport = Arc::new(transport);
        let config = PlayerConfig {
            chunk_bytes: 250,
            ..PlayerConfig::default()
        };
        let controller =
            PlaybackController::new(transport.clone(), factory, Box::new(sink), &config).unwrap();
        let (tx, events) = crossbeam_channel::unbounded();
        controller.set_delegate(Some(Arc::new(RecordingDelegate(tx))));
        Self {
            controller,
            transport,
            decoders,
            sink: log,
            events,
        }
    }

    /// Skip events until `wanted` arrives.
    pub fn wait_for(&self, wanted: Event) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.events.recv_timeout(left) {
                Ok(event) if event == wanted => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    /// Events other than cache progress seen within `window`.
    pub fn quiet_events(&self, window: Duration) -> Vec<Event> {
        let deadline = Instant::now() + window;
        let mut seen = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.events.recv_timeout(left) {
                Ok(Event::Cache) => {}
                Ok(event) => seen.push(event),
                Err(_) => break,
            }
        }
        seen
    }

    pub fn decoder(&self, index: usize) -> Arc<Mutex<DecoderLog>> {
        self.decoders.lock().unwrap()[index].clone()
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// A 1000-byte resource split into four gated 250-byte chunks.
pub fn gated_track(fill: u8) -> (Script, Sender<()>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let script = Script::Chunks {
        chunks: Script::split(&[fill; 1000], 250),
        total: Some(1000),
        gate: Some(rx),
    };
    (script, tx)
}
