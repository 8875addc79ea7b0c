//! Camera stream client
//!
//! Connects to the printer's camera service, sends the handshake packet and
//! cuts JPEG frames out of the byte stream that follows. Two modes:
//!
//! - [`CameraStreamClient::capture_frame`] returns the first complete frame
//!   and closes the connection.
//! - [`CameraStreamClient::start_stream`] runs a background session that hands
//!   every frame to a callback until stopped.
//!
//! Stopping is cooperative: [`CameraStreamClient::stop_stream`] clears the
//! session's streaming flag, which is checked each time data arrives, so the
//! socket is closed on the next read. [`CameraStreamClient::close`] tears the
//! session down immediately.
//!
//! Stream and capture sessions report their state separately
//! ([`CameraStreamClient::state`] and [`CameraStreamClient::capture_state`]),
//! so a snapshot taken while streaming leaves the stream state alone.
//! Overlapping `capture_frame` calls each open their own connection and share
//! the capture state and counters.

mod stats;

pub use stats::StreamStats;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::auth::{AuthPacket, Credential};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{ExtractPolicy, FrameExtractor, DEFAULT_MAX_BUFFER_BYTES};
use crate::transport::{Endpoint, TlsOptions, TlsTransport, Transport, DEFAULT_PORT};

/// Per-session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub extract_policy: ExtractPolicy,
    pub max_buffer_bytes: usize,
    pub read_chunk_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            extract_policy: ExtractPolicy::OnePerRead,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            read_chunk_size: 4096,
        }
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been started
    Idle,

    /// Transport and TLS handshake in progress
    Connecting,

    /// Handshake sent, incoming bytes are scanned for frames
    Scanning,

    /// Session over; a new one may be started
    Closed,
}

/// Why a stream session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    PeerClosed,
}

/// State shared between the client and its session task
struct Shared {
    stream_state: Mutex<SessionState>,
    capture_state: Mutex<SessionState>,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    bytes_discarded: AtomicU64,
    sessions_opened: AtomicU64,
    session_errors: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            stream_state: Mutex::new(SessionState::Idle),
            capture_state: Mutex::new(SessionState::Idle),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            session_errors: AtomicU64::new(0),
        }
    }

    fn set_stream_state(&self, state: SessionState) {
        *self.stream_state.lock() = state;
    }

    fn set_capture_state(&self, state: SessionState) {
        *self.capture_state.lock() = state;
    }
}

/// Running stream session
struct StreamHandle {
    streaming: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

pub struct CameraStreamClient<T: Transport = TlsTransport> {
    transport: Arc<T>,
    auth: AuthPacket,
    options: ClientOptions,
    shared: Arc<Shared>,
    stream: Mutex<Option<StreamHandle>>,
}

impl CameraStreamClient<TlsTransport> {
    /// Client for `host` on the default camera port
    ///
    /// The printer's self-signed certificate is accepted without
    /// verification; use [`CameraStreamClient::with_tls`] to choose.
    pub fn new(host: impl Into<String>, access_code: impl Into<String>) -> Result<Self, CameraError> {
        Self::with_port(host, access_code, DEFAULT_PORT)
    }

    pub fn with_port(
        host: impl Into<String>,
        access_code: impl Into<String>,
        port: u16,
    ) -> Result<Self, CameraError> {
        Self::with_tls(
            Endpoint::new(host, port),
            access_code,
            TlsOptions::device_default(),
            ClientOptions::default(),
        )
    }

    pub fn with_tls(
        endpoint: Endpoint,
        access_code: impl Into<String>,
        tls: TlsOptions,
        options: ClientOptions,
    ) -> Result<Self, CameraError> {
        let credential = Credential::new(access_code)?;
        let transport = TlsTransport::new(endpoint, tls)?;
        Ok(Self::with_transport(transport, &credential, options))
    }

    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        Self::with_tls(
            config.endpoint(),
            config.access_code.clone(),
            config.tls_options(),
            config.client_options(),
        )
    }
}

impl<T: Transport> CameraStreamClient<T> {
    /// Builds a client over any transport. No I/O happens here.
    pub fn with_transport(transport: T, credential: &Credential, options: ClientOptions) -> Self {
        Self {
            transport: Arc::new(transport),
            auth: AuthPacket::new(credential),
            options,
            shared: Arc::new(Shared::new()),
            stream: Mutex::new(None),
        }
    }

    /// Connects, authenticates and returns the first complete frame
    ///
    /// Keeps reading until a frame shows up or the connection fails; there
    /// is no internal deadline (see [`Self::capture_frame_within`]).
    pub async fn capture_frame(&self) -> Result<Bytes, CameraError> {
        self.shared.set_capture_state(SessionState::Connecting);

        let result = self.capture_session().await;

        self.shared.set_capture_state(SessionState::Closed);
        match &result {
            Ok(frame) => debug!(bytes = frame.len(), "Captured single frame"),
            Err(e) => {
                self.shared.session_errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Frame capture failed");
            }
        }

        result
    }

    /// [`Self::capture_frame`] bounded by a deadline
    pub async fn capture_frame_within(&self, timeout: Duration) -> Result<Bytes, CameraError> {
        match tokio::time::timeout(timeout, self.capture_frame()).await {
            Ok(result) => result,
            Err(_) => {
                self.shared.set_capture_state(SessionState::Closed);
                Err(CameraError::Timeout(timeout))
            }
        }
    }

    async fn capture_session(&self) -> Result<Bytes, CameraError> {
        let mut stream = self.transport.connect().await?;
        authenticate(&mut stream, &self.auth).await?;
        self.shared.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.shared.set_capture_state(SessionState::Scanning);

        let mut extractor = FrameExtractor::new(self.options.max_buffer_bytes);
        let mut chunk = vec![0u8; self.options.read_chunk_size.max(1)];
        let mut discarded = 0;

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(CameraError::ConnectionClosed);
            }
            self.shared.bytes_received.fetch_add(n as u64, Ordering::Relaxed);

            let frame = extractor
                .ingest(&chunk[..n], ExtractPolicy::OnePerRead)
                .into_iter()
                .next();
            record_discarded(&self.shared, &extractor, &mut discarded);

            if let Some(frame) = frame {
                self.shared.frames_received.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = stream.shutdown().await {
                    debug!(error = %e, "Error closing camera connection");
                }
                return Ok(frame);
            }
        }
    }

    /// Starts a background session that calls `on_frame` for every frame
    ///
    /// Does nothing if a session is already streaming. Must be called from
    /// within a Tokio runtime. Transport errors end the session and are
    /// logged; there is no reconnect.
    pub fn start_stream<F>(&self, on_frame: F)
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        let mut slot = self.stream.lock();

        if let Some(handle) = slot.as_ref() {
            if handle.streaming.load(Ordering::Acquire) {
                info!(peer = %self.transport.describe(), "Stream already running");
                return;
            }
        }

        // A stopped session may still be waiting for its next read
        if let Some(stale) = slot.take() {
            debug!("Dropping stopped stream session");
            stale.task.abort();
        }

        let streaming = Arc::new(AtomicBool::new(true));
        self.shared.set_stream_state(SessionState::Connecting);

        let session = StreamSession {
            transport: Arc::clone(&self.transport),
            auth: self.auth.clone(),
            options: self.options,
            streaming: Arc::clone(&streaming),
            shared: Arc::clone(&self.shared),
        };

        info!(
            peer = %self.transport.describe(),
            policy = ?self.options.extract_policy,
            "Starting camera stream"
        );

        let task = tokio::spawn(session.run(on_frame));
        *slot = Some(StreamHandle { streaming, task });
    }

    /// Asks the running session to stop
    ///
    /// The connection is closed the next time data arrives; a frame in that
    /// data is not delivered. Use [`Self::close`] to close at once.
    pub fn stop_stream(&self) {
        let slot = self.stream.lock();

        let was_streaming = slot
            .as_ref()
            .map(|handle| handle.streaming.swap(false, Ordering::AcqRel))
            .unwrap_or(false);

        if was_streaming {
            info!("Stream stop requested, closing on next data");
        } else {
            info!("Stream is not running");
        }
    }

    /// Stops the session and closes its connection immediately
    pub fn close(&self) {
        if let Some(handle) = self.stream.lock().take() {
            handle.streaming.store(false, Ordering::Release);
            handle.task.abort();
            self.shared.set_stream_state(SessionState::Closed);
            info!(peer = %self.transport.describe(), "Camera stream closed");
        }
    }

    /// True while a stream session is live and has not been asked to stop
    pub fn is_streaming(&self) -> bool {
        self.stream
            .lock()
            .as_ref()
            .map(|handle| handle.streaming.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// State of the most recent stream session
    pub fn state(&self) -> SessionState {
        *self.shared.stream_state.lock()
    }

    /// State of the most recent single-frame capture
    pub fn capture_state(&self) -> SessionState {
        *self.shared.capture_state.lock()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            frames_received: self.shared.frames_received.load(Ordering::Relaxed),
            bytes_received: self.shared.bytes_received.load(Ordering::Relaxed),
            bytes_discarded: self.shared.bytes_discarded.load(Ordering::Relaxed),
            sessions_opened: self.shared.sessions_opened.load(Ordering::Relaxed),
            session_errors: self.shared.session_errors.load(Ordering::Relaxed),
        }
    }

    pub fn options(&self) -> ClientOptions {
        self.options
    }

    pub fn auth_packet(&self) -> &AuthPacket {
        &self.auth
    }
}

impl<T: Transport> Drop for CameraStreamClient<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.stream.get_mut().take() {
            handle.streaming.store(false, Ordering::Release);
            handle.task.abort();
        }
    }
}

/// Everything a background stream session owns
struct StreamSession<T: Transport> {
    transport: Arc<T>,
    auth: AuthPacket,
    options: ClientOptions,
    streaming: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl<T: Transport> StreamSession<T> {
    async fn run<F>(self, mut on_frame: F)
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        let peer = self.transport.describe();

        match self.scan(&mut on_frame).await {
            Ok(SessionEnd::Stopped) => info!(peer = %peer, "Camera stream stopped"),
            Ok(SessionEnd::PeerClosed) => info!(peer = %peer, "Camera closed the stream"),
            Err(e) => {
                self.shared.session_errors.fetch_add(1, Ordering::Relaxed);
                error!(peer = %peer, error = %e, "Camera stream failed");
            }
        }

        self.streaming.store(false, Ordering::Release);
        self.shared.set_stream_state(SessionState::Closed);
    }

    async fn scan<F>(&self, on_frame: &mut F) -> Result<SessionEnd, CameraError>
    where
        F: FnMut(Bytes),
    {
        let mut stream = self.transport.connect().await?;
        authenticate(&mut stream, &self.auth).await?;
        self.shared.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.shared.set_stream_state(SessionState::Scanning);

        debug!("Camera stream authenticated");

        let mut extractor = FrameExtractor::new(self.options.max_buffer_bytes);
        let mut chunk = vec![0u8; self.options.read_chunk_size.max(1)];
        let mut discarded = 0;

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(SessionEnd::PeerClosed);
            }

            if !self.streaming.load(Ordering::Acquire) {
                if let Err(e) = stream.shutdown().await {
                    debug!(error = %e, "Error closing camera connection");
                }
                return Ok(SessionEnd::Stopped);
            }

            self.shared.bytes_received.fetch_add(n as u64, Ordering::Relaxed);

            for frame in extractor.ingest(&chunk[..n], self.options.extract_policy) {
                self.shared.frames_received.fetch_add(1, Ordering::Relaxed);
                on_frame(frame);
            }
            record_discarded(&self.shared, &extractor, &mut discarded);
        }
    }
}

async fn authenticate<S>(stream: &mut S, auth: &AuthPacket) -> Result<(), CameraError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(auth.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn record_discarded(shared: &Shared, extractor: &FrameExtractor, seen: &mut u64) {
    let total = extractor.bytes_discarded();
    if total > *seen {
        shared
            .bytes_discarded
            .fetch_add(total - *seen, Ordering::Relaxed);
        *seen = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialError;

    #[test]
    fn test_new_does_no_io() {
        // Nothing listens on this address; construction must still succeed
        let client = CameraStreamClient::new("192.0.2.1", "12345678").unwrap();
        assert_eq!(client.state(), SessionState::Idle);
        assert_eq!(client.capture_state(), SessionState::Idle);
        assert!(!client.is_streaming());
        assert_eq!(&client.auth_packet().as_bytes()[48..56], b"12345678");
        assert_eq!(client.stats().sessions_opened, 0);
    }

    #[test]
    fn test_new_rejects_bad_access_code() {
        let result = CameraStreamClient::new("192.0.2.1", "x".repeat(40));
        assert!(matches!(
            result,
            Err(CameraError::Credential(CredentialError::TooLong { len: 40, .. }))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = CameraConfig {
            host: "printer.local".to_string(),
            access_code: "abcd1234".to_string(),
            extract_policy: ExtractPolicy::Drain,
            ..Default::default()
        };

        let client = CameraStreamClient::from_config(&config).unwrap();
        assert_eq!(client.options().extract_policy, ExtractPolicy::Drain);
    }

    #[test]
    fn test_stop_without_stream_is_noop() {
        let client = CameraStreamClient::new("192.0.2.1", "12345678").unwrap();
        client.stop_stream();
        client.stop_stream();
        client.close();
        assert_eq!(client.state(), SessionState::Idle);
    }
}
