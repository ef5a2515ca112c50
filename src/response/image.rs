//! Multi-camera image responses.
//!
//! Frames are rendered and encoded on the tick thread, when the engine state
//! matches the request; the finished [`ImageResponse`] is then handed to a
//! reply worker which only writes bytes.
//!
//! # Size bound
//!
//! The aggregate `mult` header announces an upper bound on the bytes of all
//! `uImG` headers and payloads so the client can size its buffer before the
//! first frame arrives. Per requested camera:
//!
//! | Request | Bound |
//! |---------|-------|
//! | single channel | `w * h + 32` |
//! | depth camera | `w * h * 4 + 32` |
//! | anything else | `w * h * 3 + 32` |
//!
//! This is exact for raw frames and an over-estimate for PNG frames; a PNG
//! that comes out larger than its raw size raises the bound to match. A frame
//! that would push the total past `u32::MAX` is skipped.

use crate::core::adapter::{CameraAdapter, RawImage};
use crate::core::camera::{CameraDescriptor, CameraRig};
use crate::error::{Error, Result};
use crate::protocol::response::{
    IMAGE_HEADER_LEN, ImageHeader, MultiImageHeader, NULL_TRAILER, PixelFormat,
};
use crate::protocol::CameraRequest;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use std::io::{self, Write};

/// One encoded camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub header: ImageHeader,
    pub payload: Vec<u8>,
}

/// Everything written back for one image request
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResponse {
    pub image_bound: u32,
    pub frames: Vec<ImageFrame>,
    /// Metadata XML for `tIMG` requests
    pub metadata: Option<Vec<u8>>,
}

impl ImageResponse {
    pub fn header(&self) -> MultiImageHeader {
        MultiImageHeader {
            image_bound: self.image_bound,
            metadata_length: self
                .metadata
                .as_ref()
                .map_or(NULL_TRAILER.len(), |m| m.len()) as u32,
        }
    }

    /// Aggregate header, frames in request order, then metadata or the
    /// 4-byte null trailer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.header().encode())?;
        for frame in &self.frames {
            w.write_all(&frame.header.encode())?;
            w.write_all(&frame.payload)?;
        }
        match &self.metadata {
            Some(metadata) => w.write_all(metadata),
            None => w.write_all(&NULL_TRAILER),
        }
    }
}

/// Upper bound for one requested camera (header included)
pub fn frame_bound(camera: &CameraDescriptor, single_channel: bool) -> usize {
    let channels = if single_channel {
        1
    } else {
        camera.kind.channels()
    };
    (camera.width as usize)
        .saturating_mul(camera.height as usize)
        .saturating_mul(channels)
        .saturating_add(IMAGE_HEADER_LEN)
}

/// Render and encode every requested camera.
///
/// Unknown camera ids and failed renders are skipped with a warning; the
/// remaining frames keep the request order.
pub fn assemble<C>(
    cameras: &mut C,
    rig: &CameraRig,
    requests: &[CameraRequest],
    metadata: Option<String>,
) -> ImageResponse
where
    C: CameraAdapter + ?Sized,
{
    let mut frames = Vec::with_capacity(requests.len());
    let mut bound = 0u32;

    for request in requests {
        let Some(camera) = rig.get(request.camera) else {
            log::warn!("Image request for unknown camera {}", request.camera);
            continue;
        };
        let Some(estimate) = fits(bound, frame_bound(camera, request.single_channel)) else {
            log::warn!(
                "Camera {} ({}) skipped: {}x{} frame exceeds the response size limit",
                camera.id,
                camera.name,
                camera.width,
                camera.height
            );
            continue;
        };
        let frame = cameras
            .render(camera)
            .and_then(|raw| encode_frame(camera, request, raw));
        match frame {
            Ok(frame) => {
                let actual = IMAGE_HEADER_LEN + frame.payload.len();
                match fits(bound, actual) {
                    Some(total) => {
                        bound = total.max(estimate);
                        frames.push(frame);
                    }
                    None => log::warn!(
                        "Camera {} ({}) skipped: {} byte frame exceeds the response size limit",
                        camera.id,
                        camera.name,
                        actual
                    ),
                }
            }
            Err(e) => log::warn!("Camera {} ({}) skipped: {}", camera.id, camera.name, e),
        }
    }

    ImageResponse {
        image_bound: bound,
        frames,
        metadata: metadata.map(String::into_bytes),
    }
}

/// `bound + frame` if the sum still fits a `u32` length field
fn fits(bound: u32, frame: usize) -> Option<u32> {
    u32::try_from(frame).ok().and_then(|f| bound.checked_add(f))
}

fn encode_frame(camera: &CameraDescriptor, request: &CameraRequest, raw: RawImage) -> Result<ImageFrame> {
    let expected = raw.width as usize * raw.height as usize * raw.channels;
    if raw.channels == 0 || raw.data.len() != expected {
        return Err(Error::Render(format!(
            "buffer of {} bytes for {}x{}x{}",
            raw.data.len(),
            raw.width,
            raw.height,
            raw.channels
        )));
    }

    let format = camera
        .kind
        .format(request.compressed, request.single_channel);
    let payload = match format {
        PixelFormat::Gray => raw.data.chunks_exact(raw.channels).map(|px| px[0]).collect(),
        PixelFormat::CompressedRgb => encode_png(&raw)?,
        PixelFormat::Rgb | PixelFormat::Float => raw.data,
    };

    let payload_length = u32::try_from(payload.len())
        .map_err(|_| Error::Render(format!("{} byte payload is too large", payload.len())))?;
    Ok(ImageFrame {
        header: ImageHeader {
            payload_length,
            width: raw.width,
            height: raw.height,
            camera_id: camera.id,
            format,
        },
        payload,
    })
}

fn encode_png(raw: &RawImage) -> Result<Vec<u8>> {
    let color = match raw.channels {
        1 => ColorType::L8,
        3 => ColorType::Rgb8,
        4 => ColorType::Rgba8,
        n => return Err(Error::Render(format!("cannot compress {} channels", n))),
    };
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&raw.data, raw.width, raw.height, color)
        .map_err(|e| Error::Render(format!("PNG encoding failed: {}", e)))?;
    Ok(out)
}
