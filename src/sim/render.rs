//! Synthetic camera images.
//!
//! Not a renderer: each camera kind gets a cheap image that still changes
//! with the agent pose, enough for clients to tell frames apart.
//!
//! - colour: horizontal hue ramp shifted by heading, vertical brightness ramp
//! - segmentation: wall colour above the horizon, floor colour below, one
//!   vertical band per spawned object
//! - depth: per-column distance to the wall seen through that column,
//!   normalised by the far clip plane, little-endian `f32`

use super::room::Room;
use crate::core::adapter::RawImage;
use crate::core::camera::CameraDescriptor;
use crate::core::types::{Pose, Quat, Vec3};

pub fn color(camera: &CameraDescriptor, agent: &Pose) -> RawImage {
    let (w, h) = (camera.width as usize, camera.height as usize);
    let heading = (camera_rotation(camera, agent).yaw_degrees() + 360.0) % 360.0;
    let shift = (heading / 360.0 * 255.0) as u32;

    let mut data = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        let shade = 255 - (y * 255 / h.max(1)) as u32;
        for x in 0..w {
            let ramp = (x * 255 / w.max(1)) as u32;
            data.push(((ramp + shift) % 256) as u8);
            data.push(shade as u8);
            data.push(((255 - ramp + shift) % 256) as u8);
        }
    }
    RawImage {
        width: camera.width,
        height: camera.height,
        channels: 3,
        data,
    }
}

/// `bands` are the segmentation colours of the spawned objects, in id order.
pub fn segmentation(camera: &CameraDescriptor, wall: [u8; 3], floor: [u8; 3], bands: &[[u8; 3]]) -> RawImage {
    let (w, h) = (camera.width as usize, camera.height as usize);
    let band_width = if bands.is_empty() {
        0
    } else {
        (w / (bands.len() * 2)).max(1)
    };

    let mut data = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let band = (band_width > 0 && y >= h / 3)
                .then(|| x / band_width)
                .filter(|i| i % 2 == 1)
                .and_then(|i| bands.get(i / 2));
            let px = match band {
                Some(color) => *color,
                None if y < h / 2 => wall,
                None => floor,
            };
            data.extend_from_slice(&px);
        }
    }
    RawImage {
        width: camera.width,
        height: camera.height,
        channels: 3,
        data,
    }
}

pub fn depth(camera: &CameraDescriptor, agent: &Pose, room: &Room) -> RawImage {
    let (w, h) = (camera.width as usize, camera.height as usize);
    let rotation = camera_rotation(camera, agent);
    let origin = agent.position + agent.rotation.rotate(camera.position);
    let far = camera.far.max(f32::EPSILON);
    // Horizontal fov from the vertical one and the aspect ratio
    let aspect = camera.width as f32 / camera.height.max(1) as f32;
    let half_h = (camera.fov.to_radians() * 0.5).tan() * aspect;

    let columns: Vec<[u8; 4]> = (0..w)
        .map(|x| {
            let offset = ((x as f32 + 0.5) / w as f32 * 2.0 - 1.0) * half_h;
            let dir = rotation.rotate(Vec3::new(offset, 0.0, 1.0));
            let distance = room
                .raycast(origin, dir, far)
                .map_or(far, |(t, _)| t.max(camera.near));
            (distance / far).clamp(0.0, 1.0).to_le_bytes()
        })
        .collect();

    let mut data = Vec::with_capacity(w * h * 4);
    for _ in 0..h {
        for column in &columns {
            data.extend_from_slice(column);
        }
    }
    RawImage {
        width: camera.width,
        height: camera.height,
        channels: 4,
        data,
    }
}

fn camera_rotation(camera: &CameraDescriptor, agent: &Pose) -> Quat {
    agent.rotation * camera.rotation
}
