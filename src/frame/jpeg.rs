//! Minimal JPEG header inspection
//!
//! Only enough of the marker structure is walked to report the frame size;
//! the image data itself is passed through untouched.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JpegParseError {
    #[error("invalid JPEG: too short")]
    TooShort,

    #[error("missing SOI marker")]
    MissingSoi,

    #[error("missing EOI marker")]
    MissingEoi,

    #[error("truncated {0:#04x} segment")]
    Truncated(u8),

    #[error("no frame header before scan data")]
    MissingSof,
}

/// JPEG marker codes
mod markers {
    pub const SOI: u8 = 0xD8; // Start of Image
    pub const EOI: u8 = 0xD9; // End of Image
    pub const SOS: u8 = 0xDA; // Start of Scan
    pub const DHT: u8 = 0xC4; // Define Huffman Table
    pub const JPG: u8 = 0xC8; // Reserved
    pub const DAC: u8 = 0xCC; // Define Arithmetic Coding
    pub const SOF0: u8 = 0xC0; // Start of Frame (Baseline)
    pub const SOF15: u8 = 0xCF;
    pub const TEM: u8 = 0x01;
    pub const RST0: u8 = 0xD0;
    pub const RST7: u8 = 0xD7;
}

/// Frame header information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    /// Width in pixels
    pub width: u16,

    /// Height in pixels
    pub height: u16,

    /// Number of colour components
    pub components: u8,
}

impl JpegInfo {
    /// Reads the first SOFn segment of a JPEG
    pub fn probe(data: &[u8]) -> Result<Self, JpegParseError> {
        if data.len() < 4 {
            return Err(JpegParseError::TooShort);
        }

        if data[0] != 0xFF || data[1] != markers::SOI {
            return Err(JpegParseError::MissingSoi);
        }

        let mut pos = 2;

        while pos + 1 < data.len() {
            if data[pos] != 0xFF {
                pos += 1;
                continue;
            }

            let marker = data[pos + 1];
            pos += 2;

            match marker {
                // Fill bytes and standalone markers carry no length
                0xFF => pos -= 1,
                0x00 | markers::TEM | markers::SOI => {}
                markers::RST0..=markers::RST7 => {}

                markers::EOI | markers::SOS => return Err(JpegParseError::MissingSof),

                markers::SOF0..=markers::SOF15
                    if !matches!(marker, markers::DHT | markers::JPG | markers::DAC) =>
                {
                    // length(2) + precision(1) + height(2) + width(2) + components(1)
                    if pos + 8 > data.len() {
                        return Err(JpegParseError::Truncated(marker));
                    }

                    return Ok(Self {
                        height: u16::from_be_bytes([data[pos + 3], data[pos + 4]]),
                        width: u16::from_be_bytes([data[pos + 5], data[pos + 6]]),
                        components: data[pos + 7],
                    });
                }

                _ => {
                    if pos + 2 > data.len() {
                        return Err(JpegParseError::Truncated(marker));
                    }
                    let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                    pos += length;
                }
            }
        }

        Err(JpegParseError::MissingSof)
    }
}

/// Quick check that a buffer starts with SOI and ends with EOI
pub fn validate_jpeg(data: &[u8]) -> Result<(), JpegParseError> {
    if data.len() < 4 {
        return Err(JpegParseError::TooShort);
    }

    if data[0] != 0xFF || data[1] != markers::SOI {
        return Err(JpegParseError::MissingSoi);
    }

    if data[data.len() - 2] != 0xFF || data[data.len() - 1] != markers::EOI {
        return Err(JpegParseError::MissingEoi);
    }

    Ok(())
}
