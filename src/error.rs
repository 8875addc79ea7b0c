//! Camera client errors

use std::time::Duration;

use thiserror::Error;

use crate::auth::CredentialError;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("connection failed: {0}")]
    Connection(#[source] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed before a frame was received")]
    ConnectionClosed,

    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    #[error("invalid credential: {0}")]
    Credential(#[from] CredentialError),
}
