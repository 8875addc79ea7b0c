//! Camera handshake payload
//!
//! Right after the TLS session is up the client sends a fixed 80-byte packet
//! carrying the username and the printer's LAN access code at fixed offsets.
//! The printer answers by streaming JPEG frames; nothing else is exchanged.

use thiserror::Error;

/// Username the printer expects on the camera port
pub const USERNAME: &str = "bblp";

/// Total size of the handshake packet
pub const AUTH_PACKET_LEN: usize = 80;

/// Capacity of each string field in the packet
pub const FIELD_CAPACITY: usize = 32;

const HEADER_MAGIC: u32 = 0x40;
const HEADER_FLAGS: u32 = 0x3000;
const USERNAME_OFFSET: usize = 16;
const ACCESS_CODE_OFFSET: usize = 48;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("{field} is {len} bytes, at most 32 fit in the handshake")]
    TooLong { field: &'static str, len: usize },

    #[error("{field} must be ASCII")]
    NotAscii { field: &'static str },

    #[error("access code is empty")]
    Empty,
}

/// Login for the camera service
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    access_code: String,
}

impl Credential {
    /// Creates a credential for the fixed `bblp` user
    pub fn new(access_code: impl Into<String>) -> Result<Self, CredentialError> {
        let access_code = access_code.into();
        if access_code.is_empty() {
            return Err(CredentialError::Empty);
        }
        check_field("username", USERNAME)?;
        check_field("access code", &access_code)?;

        Ok(Self {
            username: USERNAME.to_string(),
            access_code,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn access_code(&self) -> &str {
        &self.access_code
    }
}

// Keep the access code out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("access_code", &"***")
            .finish()
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), CredentialError> {
    if !value.is_ascii() {
        return Err(CredentialError::NotAscii { field });
    }
    if value.len() > FIELD_CAPACITY {
        return Err(CredentialError::TooLong {
            field,
            len: value.len(),
        });
    }
    Ok(())
}

/// Fixed-layout handshake packet
///
/// Layout (little-endian words):
/// - `[0..4)`   0x40
/// - `[4..8)`   0x3000
/// - `[8..16)`  zero
/// - `[16..48)` username, zero padded
/// - `[48..80)` access code, zero padded
#[derive(Clone, PartialEq, Eq)]
pub struct AuthPacket([u8; AUTH_PACKET_LEN]);

impl AuthPacket {
    pub fn new(credential: &Credential) -> Self {
        let mut data = [0u8; AUTH_PACKET_LEN];

        data[0..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
        data[4..8].copy_from_slice(&HEADER_FLAGS.to_le_bytes());

        // Field lengths were checked when the credential was built
        let username = credential.username().as_bytes();
        data[USERNAME_OFFSET..USERNAME_OFFSET + username.len()].copy_from_slice(username);

        let access_code = credential.access_code().as_bytes();
        data[ACCESS_CODE_OFFSET..ACCESS_CODE_OFFSET + access_code.len()]
            .copy_from_slice(access_code);

        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; AUTH_PACKET_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for AuthPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPacket")
            .field("len", &AUTH_PACKET_LEN)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_layout() {
        let credential = Credential::new("12345678").unwrap();
        let packet = AuthPacket::new(&credential);
        let bytes = packet.as_bytes();

        assert_eq!(bytes.len(), 80);
        assert_eq!(&bytes[0..4], &0x40u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x00, 0x30, 0x00, 0x00]);
        assert!(bytes[8..16].iter().all(|&b| b == 0));
        assert_eq!(&bytes[16..20], b"bblp");
        assert!(bytes[20..48].iter().all(|&b| b == 0));
        assert_eq!(&bytes[48..56], b"12345678");
        assert!(bytes[56..80].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_packet_is_deterministic() {
        let a = AuthPacket::new(&Credential::new("93994527").unwrap());
        let b = AuthPacket::new(&Credential::new("93994527").unwrap());
        assert_eq!(a, b);

        let c = AuthPacket::new(&Credential::new("31106685").unwrap());
        assert_ne!(a, c);
    }

    #[test]
    fn test_full_width_access_code() {
        let code = "A".repeat(FIELD_CAPACITY);
        let packet = AuthPacket::new(&Credential::new(code.clone()).unwrap());
        assert_eq!(&packet.as_bytes()[48..80], code.as_bytes());
    }

    #[test]
    fn test_rejects_long_access_code() {
        let err = Credential::new("x".repeat(33)).unwrap_err();
        assert_eq!(
            err,
            CredentialError::TooLong {
                field: "access code",
                len: 33
            }
        );
    }

    #[test]
    fn test_rejects_non_ascii_and_empty() {
        assert_eq!(
            Credential::new("café").unwrap_err(),
            CredentialError::NotAscii {
                field: "access code"
            }
        );
        assert_eq!(Credential::new("").unwrap_err(), CredentialError::Empty);
    }

    #[test]
    fn test_debug_hides_access_code() {
        let credential = Credential::new("12345678").unwrap();
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("12345678"));
    }
}
