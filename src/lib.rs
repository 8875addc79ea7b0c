//! Camera stream client for Bambu Lab printers
//!
//! The printer exposes its camera on TCP port 6000 behind TLS with a
//! self-signed certificate. After an 80-byte handshake it streams back-to-back
//! JPEG images with no framing other than the JPEG markers themselves. This
//! crate provides:
//! - The handshake packet ([`auth`])
//! - Frame extraction from the raw stream ([`frame`])
//! - TCP/TLS connection setup ([`transport`])
//! - Single-shot capture and continuous streaming ([`client`])
//! - Fan-out of frames to multiple viewers ([`distributor`])
//!
//! # Example
//!
//! ```no_run
//! use bambu_camera::CameraStreamClient;
//!
//! # async fn run() -> Result<(), bambu_camera::CameraError> {
//! let client = CameraStreamClient::new("192.168.1.21", "12345678")?;
//! let jpeg = client.capture_frame().await?;
//! println!("got {} bytes", jpeg.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod distributor;
pub mod error;
pub mod frame;
pub mod transport;

// Re-exports for convenience
pub use auth::{AuthPacket, Credential, CredentialError};
pub use client::{CameraStreamClient, ClientOptions, SessionState, StreamStats};
pub use config::{CameraConfig, Config, ConfigError};
pub use distributor::{FrameDistributor, Viewer};
pub use error::CameraError;
pub use frame::{ExtractPolicy, FrameExtractor, JpegInfo};
pub use transport::{Endpoint, TlsOptions, TlsTransport, Transport, DEFAULT_PORT};
