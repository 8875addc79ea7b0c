//! Connection setup for the camera service
//!
//! The client only needs a duplex byte stream. [`TlsTransport`] provides the
//! real one (TCP upgraded to TLS); tests plug in in-memory streams.

mod tls;

pub use tls::{TlsOptions, TlsTransport};

use std::fmt;
use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CameraError;

/// Camera service port on the printer
pub const DEFAULT_PORT: u16 = 6000;

/// Address of a printer's camera service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens byte streams to the camera service
///
/// Every call yields a fresh, fully established connection. No retries and
/// no timeouts are applied at this layer.
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;

    /// Human readable peer description for logs
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_accessors() {
        let endpoint = Endpoint::new("192.168.1.21", DEFAULT_PORT);
        assert_eq!(endpoint.host(), "192.168.1.21");
        assert_eq!(endpoint.port(), 6000);
        assert_eq!(endpoint.to_string(), "192.168.1.21:6000");
    }
}
