//! Network fetch capability: a streaming GET that pushes bytes into a handler.

use std::io::{self, Read};

use crate::config::HttpConfig;
use crate::error::{TransportError, TransportErrorKind};

/// Receives the body of a transfer as it arrives.
pub trait FetchHandler {
    /// Consume `bytes`; returning fewer than `bytes.len()` aborts the transfer.
    fn on_data(&mut self, bytes: &[u8]) -> usize;
    /// Called after each accepted chunk. `total` is `None` while the size is unknown.
    fn on_progress(&mut self, total: Option<u64>, received: u64);
}

/// Outcome of a transfer that ran to completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchSummary {
    pub status: u16,
    pub total: Option<u64>,
    pub received: u64,
}

/// Performs streaming GET requests.
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        handler: &mut dyn FetchHandler,
    ) -> Result<FetchSummary, TransportError>;
}

/// [`Transport`] over a shared `ureq` agent.
pub struct HttpTransport {
    agent: ureq::Agent,
    read_chunk_bytes: usize,
}

impl HttpTransport {
    pub fn new(cfg: &HttpConfig) -> Self {
        let config = ureq::Agent::config_builder()
            .user_agent(&cfg.user_agent)
            .timeout_connect(Some(cfg.connect_timeout))
            .timeout_recv_response(Some(cfg.response_timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            read_chunk_bytes: cfg.read_chunk_bytes.max(1),
        }
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        url: &str,
        handler: &mut dyn FetchHandler,
    ) -> Result<FetchSummary, TransportError> {
        let resp = self.agent.get(url).call().map_err(classify)?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(TransportError::new(
                TransportErrorKind::from_status(status.as_u16()),
                format!("GET {url} returned {status}"),
            ));
        }
        let total = resp
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        tracing::debug!(url, status = status.as_u16(), total = ?total, "http response");

        let (_, body) = resp.into_parts();
        let mut reader = body.into_reader();
        let received = pump(&mut reader, self.read_chunk_bytes, total, handler)?;

        if received == 0 {
            return Err(TransportError::new(
                TransportErrorKind::EmptyResponse,
                format!("GET {url} returned no body"),
            ));
        }
        Ok(FetchSummary {
            status: status.as_u16(),
            total,
            received,
        })
    }
}

/// Copy `reader` into `handler` chunk by chunk; returns the final received count.
fn pump(
    reader: &mut dyn Read,
    chunk: usize,
    total: Option<u64>,
    handler: &mut dyn FetchHandler,
) -> Result<u64, TransportError> {
    let mut buf = vec![0u8; chunk];
    let mut received = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_io(&e)),
        };
        let accepted = handler.on_data(&buf[..n]);
        received = received.saturating_add(accepted as u64);
        if accepted < n {
            return Err(TransportError::new(
                TransportErrorKind::Aborted,
                format!("handler accepted {accepted} of {n} bytes"),
            ));
        }
        handler.on_progress(total, received);
    }
    Ok(received)
}

fn classify(err: ureq::Error) -> TransportError {
    let kind = match &err {
        ureq::Error::StatusCode(code) => TransportErrorKind::from_status(*code),
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::Resolution,
        ureq::Error::ConnectionFailed => TransportErrorKind::ConnectionFailure,
        ureq::Error::BadUri(_) => TransportErrorKind::InvalidUrl,
        ureq::Error::Protocol(_) => TransportErrorKind::Protocol,
        ureq::Error::Tls(_) => TransportErrorKind::Tls,
        ureq::Error::Io(io) => return classify_io(io),
        _ => TransportErrorKind::Unknown,
    };
    TransportError::new(kind, err.to_string())
}

fn classify_io(err: &io::Error) -> TransportError {
    let kind = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TransportErrorKind::ConnectionFailure,
        io::ErrorKind::InvalidData => TransportErrorKind::Protocol,
        _ => TransportErrorKind::Unknown,
    };
    TransportError::new(kind, err.to_string())
}
