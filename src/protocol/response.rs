//! Outbound response framing.
//!
//! # Text responses
//!
//! ```text
//! ┌──────────┬────────────────┬──────────────────┐
//! │ Tag (4)  │ Length (u32 LE)│ XML text payload │
//! └──────────┴────────────────┴──────────────────┘
//! ```
//!
//! # Image responses
//!
//! ```text
//! mult │ image bound │ metadata length          (12 bytes, once)
//! uImG │ len │ w │ h │ camera │ format │ 0 │ 0  (32 bytes, per camera)
//! <pixels>                                     (len bytes, per camera)
//! <metadata XML> or 4 zero bytes               (trailer)
//! ```

use super::tags::{self, Tag};

/// Size of a text response header
pub const RESPONSE_HEADER_LEN: usize = 8;
/// Size of the aggregate multi-image header
pub const MULTI_IMAGE_HEADER_LEN: usize = 12;
/// Size of a per-camera image header
pub const IMAGE_HEADER_LEN: usize = 32;
/// Trailer sent when no metadata was requested
pub const NULL_TRAILER: [u8; 4] = [0; 4];

/// `[tag][payload length]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub tag: Tag,
    pub length: u32,
}

impl ResponseHeader {
    pub fn new(tag: Tag, length: usize) -> Self {
        Self {
            tag,
            length: length as u32,
        }
    }

    pub fn encode(&self) -> [u8; RESPONSE_HEADER_LEN] {
        let mut buf = [0u8; RESPONSE_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.tag.bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RESPONSE_HEADER_LEN {
            return None;
        }
        Some(Self {
            tag: Tag([buf[0], buf[1], buf[2], buf[3]]),
            length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// Aggregate header preceding a batch of camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiImageHeader {
    /// Upper bound on the bytes of all `uImG` headers and payloads
    pub image_bound: u32,
    /// Length of the trailer (metadata XML or the 4-byte null payload)
    pub metadata_length: u32,
}

impl MultiImageHeader {
    pub fn encode(&self) -> [u8; MULTI_IMAGE_HEADER_LEN] {
        let mut buf = [0u8; MULTI_IMAGE_HEADER_LEN];
        buf[0..4].copy_from_slice(&tags::MULTI_IMAGE.bytes());
        buf[4..8].copy_from_slice(&self.image_bound.to_le_bytes());
        buf[8..12].copy_from_slice(&self.metadata_length.to_le_bytes());
        buf
    }
}

/// Pixel payload encoding of one camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// PNG-compressed colour
    CompressedRgb,
    /// Raw 8-bit RGB, row-major
    Rgb,
    /// Raw 8-bit single channel
    Gray,
    /// Raw 4 bytes per pixel (depth)
    Float,
}

impl PixelFormat {
    pub fn tag(&self) -> Tag {
        match self {
            PixelFormat::CompressedRgb => tags::FORMAT_COMPRESSED_RGB,
            PixelFormat::Rgb => tags::FORMAT_RGB,
            PixelFormat::Gray => tags::FORMAT_GRAY,
            PixelFormat::Float => tags::FORMAT_FLOAT,
        }
    }
}

/// Per-camera frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub payload_length: u32,
    pub width: u32,
    pub height: u32,
    pub camera_id: u32,
    pub format: PixelFormat,
}

impl ImageHeader {
    pub fn encode(&self) -> [u8; IMAGE_HEADER_LEN] {
        let mut buf = [0u8; IMAGE_HEADER_LEN];
        buf[0..4].copy_from_slice(&tags::IMAGE_FRAME.bytes());
        buf[4..8].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.width.to_le_bytes());
        buf[12..16].copy_from_slice(&self.height.to_le_bytes());
        buf[16..20].copy_from_slice(&self.camera_id.to_le_bytes());
        buf[20..24].copy_from_slice(&self.format.tag().bytes());
        // 24..32 reserved, zero
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_header_layout() {
        let header = ResponseHeader::new(tags::SCENE_RESPONSE, 42);
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"scni");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 42);
        assert_eq!(ResponseHeader::decode(&bytes), Some(header));
        assert_eq!(ResponseHeader::decode(&bytes[..7]), None);
    }

    #[test]
    fn test_image_header_layout() {
        let header = ImageHeader {
            payload_length: 640 * 480 * 3,
            width: 640,
            height: 480,
            camera_id: 2,
            format: PixelFormat::Rgb,
        };
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"uImG");
        assert_eq!(&bytes[4..8], &(921_600u32).to_le_bytes());
        assert_eq!(&bytes[8..12], &640u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &480u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &2u32.to_le_bytes());
        assert_eq!(&bytes[20..24], b"xRGB");
        assert!(bytes[24..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_multi_header_layout() {
        let bytes = MultiImageHeader {
            image_bound: 1000,
            metadata_length: 4,
        }
        .encode();
        assert_eq!(&bytes[0..4], b"mult");
        assert_eq!(&bytes[4..8], &1000u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &4u32.to_le_bytes());
    }
}
