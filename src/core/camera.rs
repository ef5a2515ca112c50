//! Camera descriptors and the camera rig.
//!
//! Camera ids are indices into the configured camera table, so id `n` always
//! refers to the `n`-th `[[cameras]]` entry. The rig is owned by the tick
//! driver and only changes through camera commands.
//!
//! Resolution changes are capped at the rig's pixel budget; a request over
//! the budget leaves the resolution untouched.

use super::types::{Quat, Vec3};
use crate::protocol::{CameraParams, PixelFormat};
use serde::{Deserialize, Serialize};

/// Default pixel budget per camera (4096 x 4096)
pub const DEFAULT_MAX_PIXELS: u64 = 4096 * 4096;

/// Largest pixel budget whose 4-byte depth frame still fits a `u32` length
pub const PIXEL_BUDGET_LIMIT: u64 = (u32::MAX as u64 - 64) / 4;

/// What a camera renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    Color,
    Segmentation,
    Depth,
}

impl CameraKind {
    /// Bytes per pixel of the uncompressed multi-channel payload
    pub fn channels(&self) -> usize {
        match self {
            CameraKind::Depth => 4,
            CameraKind::Color | CameraKind::Segmentation => 3,
        }
    }

    /// Payload format for a request's compression/channel flags.
    ///
    /// Single channel wins over compression: a gray frame is always raw.
    pub fn format(&self, compressed: bool, single_channel: bool) -> PixelFormat {
        if single_channel {
            PixelFormat::Gray
        } else if compressed {
            PixelFormat::CompressedRgb
        } else if *self == CameraKind::Depth {
            PixelFormat::Float
        } else {
            PixelFormat::Rgb
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraDescriptor {
    pub id: u32,
    pub name: String,
    pub kind: CameraKind,
    /// Requested output size, independent of the native render size
    pub width: u32,
    pub height: u32,
    /// Vertical field of view (degrees)
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Offset from the agent body
    pub position: Vec3,
    pub rotation: Quat,
}

impl CameraDescriptor {
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn apply_params(&mut self, params: &CameraParams, max_pixels: u64) {
        let height = if params.height > 0 {
            params.height as u32
        } else {
            self.height
        };
        let width = if params.width > 0 {
            params.width as u32
        } else {
            self.width
        };
        if width as u64 * height as u64 <= max_pixels {
            self.width = width;
            self.height = height;
        } else {
            log::warn!(
                "Camera {} resolution {}x{} exceeds {} pixels, keeping {}x{}",
                self.name,
                width,
                height,
                max_pixels,
                self.width,
                self.height
            );
        }
        if params.fov > 0.0 {
            self.fov = params.fov;
        }
        if let (Some(near), Some(far)) = (params.near, params.far) {
            if near > 0.0 && far > 0.0 && near < far {
                self.near = near;
                self.far = far;
            }
        }
    }
}

/// Which cameras a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSelector {
    All,
    One(u32),
}

/// Ordered camera table
#[derive(Debug, Clone)]
pub struct CameraRig {
    cameras: Vec<CameraDescriptor>,
    max_pixels: u64,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CameraRig {
    pub fn new(cameras: Vec<CameraDescriptor>) -> Self {
        Self {
            cameras,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    /// Cap resolution changes at `max_pixels` per camera
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels.min(PIXEL_BUDGET_LIMIT);
        self
    }

    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn cameras(&self) -> &[CameraDescriptor] {
        &self.cameras
    }

    pub fn get(&self, id: i32) -> Option<&CameraDescriptor> {
        usize::try_from(id).ok().and_then(|i| self.cameras.get(i))
    }

    /// Resolve a wire camera id; `-1` means every camera.
    pub fn select(&self, id: i32) -> Option<CameraSelector> {
        if id == -1 {
            Some(CameraSelector::All)
        } else {
            self.get(id).map(|c| CameraSelector::One(c.id))
        }
    }

    fn for_each_selected(&mut self, id: i32, mut f: impl FnMut(&mut CameraDescriptor)) -> bool {
        match self.select(id) {
            Some(CameraSelector::All) => {
                self.cameras.iter_mut().for_each(&mut f);
                true
            }
            Some(CameraSelector::One(i)) => {
                f(&mut self.cameras[i as usize]);
                true
            }
            None => false,
        }
    }

    /// Apply resolution / fov / clip changes. Returns false for an unknown id.
    pub fn set_params(&mut self, params: &CameraParams) -> bool {
        let max_pixels = self.max_pixels;
        self.for_each_selected(params.camera, |cam| cam.apply_params(params, max_pixels))
    }

    pub fn set_position(&mut self, id: i32, offset: Vec3) -> bool {
        self.for_each_selected(id, |cam| cam.position = offset)
    }

    pub fn set_rotation(&mut self, id: i32, rotation: Quat) -> bool {
        self.for_each_selected(id, |cam| cam.rotation = rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn rig() -> CameraRig {
        let cam = |id: u32, name: &str, kind| CameraDescriptor {
            id,
            name: name.to_string(),
            kind,
            width: 320,
            height: 240,
            fov: 60.0,
            near: 0.05,
            far: 50.0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        };
        CameraRig::new(vec![
            cam(0, "rgb_left", CameraKind::Color),
            cam(1, "rgb_right", CameraKind::Color),
            cam(2, "segmentation", CameraKind::Segmentation),
            cam(3, "depth", CameraKind::Depth),
        ])
    }

    fn params(camera: i32) -> CameraParams {
        CameraParams {
            camera,
            height: 480,
            width: 640,
            fov: 90.0,
            near: Some(0.3),
            far: Some(20.0),
        }
    }

    #[test]
    fn test_set_params_single_camera() {
        let mut rig = rig();
        assert!(rig.set_params(&params(1)));
        let cam = rig.get(1).unwrap();
        assert_eq!((cam.width, cam.height, cam.fov), (640, 480, 90.0));
        assert_eq!((cam.near, cam.far), (0.3, 20.0));
        assert_eq!(rig.get(0).unwrap().width, 320);
    }

    #[test]
    fn test_set_params_is_idempotent() {
        let mut once = rig();
        once.set_params(&params(2));
        let mut twice = rig();
        twice.set_params(&params(2));
        twice.set_params(&params(2));
        assert_eq!(once.cameras(), twice.cameras());
    }

    #[test]
    fn test_non_positive_values_are_ignored() {
        let mut rig = rig();
        rig.set_params(&CameraParams {
            camera: 0,
            height: 0,
            width: -5,
            fov: 0.0,
            near: Some(10.0),
            far: Some(5.0),
        });
        let cam = rig.get(0).unwrap();
        assert_eq!((cam.width, cam.height, cam.fov), (320, 240, 60.0));
        assert_eq!((cam.near, cam.far), (0.05, 50.0));
    }

    #[test]
    fn test_oversized_resolution_is_rejected() {
        let mut bytes = b"sCaR".to_vec();
        for field in [0i32, 2_000_000_000, 2_000_000_000] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes.extend_from_slice(&75.0f32.to_le_bytes());
        let Command::SetCameraParams(params) = Command::decode(&bytes).unwrap() else {
            panic!("expected camera params");
        };

        let mut rig = rig();
        assert!(rig.set_params(&params));
        let cam = rig.get(0).unwrap();
        assert_eq!((cam.width, cam.height), (320, 240));
        // Other fields still apply
        assert_eq!(cam.fov, 75.0);
        assert!(cam.pixels() <= rig.max_pixels());
    }

    #[test]
    fn test_pixel_budget() {
        let mut rig = rig().with_max_pixels(640 * 480);
        rig.set_params(&params(0));
        assert_eq!(rig.get(0).unwrap().width, 640);

        let mut wide = params(1);
        wide.width = 641;
        rig.set_params(&wide);
        assert_eq!(rig.get(1).unwrap().width, 320);

        let capped = CameraRig::default().with_max_pixels(u64::MAX);
        assert_eq!(capped.max_pixels(), PIXEL_BUDGET_LIMIT);
    }

    #[test]
    fn test_all_cameras_and_invalid_id() {
        let mut rig = rig();
        assert!(rig.set_position(-1, Vec3::new(0.0, 1.0, 0.0)));
        assert!(rig.cameras().iter().all(|c| c.position.y == 1.0));
        assert!(!rig.set_rotation(9, Quat::from_yaw_degrees(10.0)));
        assert!(!rig.set_params(&params(-3)));
        assert!(rig.cameras().iter().all(|c| c.rotation == Quat::IDENTITY));
    }

    #[test]
    fn test_pixel_format_selection() {
        assert_eq!(CameraKind::Color.format(true, false), PixelFormat::CompressedRgb);
        assert_eq!(CameraKind::Color.format(false, false), PixelFormat::Rgb);
        assert_eq!(CameraKind::Depth.format(false, false), PixelFormat::Float);
        assert_eq!(CameraKind::Depth.format(true, true), PixelFormat::Gray);
    }
}
