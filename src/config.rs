//! Configuration for SetuIO
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) yields the classic port layout:
//!
//! | Endpoint | Transport | Default port |
//! |----------|-----------|--------------|
//! | position / agent commands | UDP in | 9000 |
//! | metadata requests | UDP in | 9001 |
//! | image / camera requests | UDP in | 9002 |
//! | stepped commands | TCP in | 9005 |
//! | position / metadata / image replies | TCP out | 9000 / 9001 / 9002 |
//! | telemetry broadcast | UDP out | 9004 |
//!
//! Command line flags override the file (see `main.rs`).

use crate::core::camera::{
    CameraDescriptor, CameraKind, CameraRig, DEFAULT_MAX_PIXELS, PIXEL_BUDGET_LIMIT,
};
use crate::core::types::{Quat, Vec3};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraConfig>,
}

/// Inbound listener endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Interface the listeners bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_position_port")]
    pub position_port: u16,
    #[serde(default = "default_metadata_port")]
    pub metadata_port: u16,
    #[serde(default = "default_image_port")]
    pub image_port: u16,
    #[serde(default = "default_step_port")]
    pub step_port: u16,
    /// Receive/accept poll timeout; bounds shutdown latency
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long the step listener waits for a connected client's frame
    #[serde(default = "default_step_read_timeout_ms")]
    pub step_read_timeout_ms: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_position_port() -> u16 {
    9000
}
fn default_metadata_port() -> u16 {
    9001
}
fn default_image_port() -> u16 {
    9002
}
fn default_step_port() -> u16 {
    9005
}
fn default_poll_interval_ms() -> u64 {
    1
}
fn default_step_read_timeout_ms() -> u64 {
    500
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            position_port: default_position_port(),
            metadata_port: default_metadata_port(),
            image_port: default_image_port(),
            step_port: default_step_port(),
            poll_interval_ms: default_poll_interval_ms(),
            step_read_timeout_ms: default_step_read_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn step_read_timeout(&self) -> Duration {
        Duration::from_millis(self.step_read_timeout_ms.max(1))
    }
}

/// Outbound TCP replies
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseConfig {
    /// Reply port for scene and object commands
    #[serde(default = "default_position_port")]
    pub position_port: u16,
    #[serde(default = "default_metadata_port")]
    pub metadata_port: u16,
    /// Reply port for images and camera info
    #[serde(default = "default_image_port")]
    pub image_port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Fixed backoff between connect attempts
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Upper bound on waiting for the client to close after a reply
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    1000
}
fn default_connect_retry_ms() -> u64 {
    500
}
fn default_connect_attempts() -> u32 {
    10
}
fn default_write_timeout_ms() -> u64 {
    1000
}
fn default_drain_timeout_ms() -> u64 {
    5000
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            position_port: default_position_port(),
            metadata_port: default_metadata_port(),
            image_port: default_image_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_retry_ms: default_connect_retry_ms(),
            connect_attempts: default_connect_attempts(),
            write_timeout_ms: default_write_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

/// High-rate metadata broadcast
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Destination address (broadcast or unicast)
    #[serde(default = "default_telemetry_address")]
    pub address: String,
    #[serde(default = "default_telemetry_port")]
    pub port: u16,
    /// Frames buffered between the tick loop and the broadcaster
    #[serde(default = "default_telemetry_queue")]
    pub queue_depth: usize,
}

fn default_true() -> bool {
    true
}
fn default_telemetry_address() -> String {
    "255.255.255.255".to_string()
}
fn default_telemetry_port() -> u16 {
    9004
}
fn default_telemetry_queue() -> usize {
    4
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_telemetry_address(),
            port: default_telemetry_port(),
            queue_depth: default_telemetry_queue(),
        }
    }
}

/// Tick loop and mock engine parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Physics ticks per simulated second
    #[serde(default = "default_physics_hz")]
    pub physics_hz: f64,
    /// Capture rate at startup (0 = real-time)
    #[serde(default)]
    pub capture_rate: u32,
    /// Keyboard drive speed (forwarded to the engine)
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_turn_speed")]
    pub turn_speed: f32,
    /// RNG seed for spawn points (0 = from entropy)
    #[serde(default)]
    pub seed: u64,
    /// Scene names; index 0 is the persistent root scene
    #[serde(default = "default_scenes")]
    pub scenes: Vec<String>,
    /// Objects that can be spawned, by index
    #[serde(default = "default_spawnables")]
    pub spawnables: Vec<String>,
    /// Half side length of each scene's square room (meters)
    #[serde(default = "default_room_half_extent")]
    pub room_half_extent: f32,
    /// Random offset around a chosen spawn point (meters)
    #[serde(default = "default_spawn_jitter")]
    pub spawn_jitter: f32,
    #[serde(default = "default_agent_mass")]
    pub agent_mass: f32,
    /// Linear and angular velocity damping (1/s)
    #[serde(default = "default_damping")]
    pub damping: f32,
    /// Largest width x height a camera may be set to
    #[serde(default = "default_max_camera_pixels")]
    pub max_camera_pixels: u64,
}

fn default_physics_hz() -> f64 {
    50.0
}
fn default_speed() -> f32 {
    10.0
}
fn default_turn_speed() -> f32 {
    0.5
}
fn default_scenes() -> Vec<String> {
    ["root", "windridge_city", "office", "warehouse", "forest"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_spawnables() -> Vec<String> {
    ["cube", "sphere", "traffic_cone", "crate"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_room_half_extent() -> f32 {
    10.0
}
fn default_spawn_jitter() -> f32 {
    2.0
}
fn default_agent_mass() -> f32 {
    1.0
}
fn default_damping() -> f32 {
    0.5
}
fn default_max_camera_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            physics_hz: default_physics_hz(),
            capture_rate: 0,
            speed: default_speed(),
            turn_speed: default_turn_speed(),
            seed: 0,
            scenes: default_scenes(),
            spawnables: default_spawnables(),
            room_half_extent: default_room_half_extent(),
            spawn_jitter: default_spawn_jitter(),
            agent_mass: default_agent_mass(),
            damping: default_damping(),
            max_camera_pixels: default_max_camera_pixels(),
        }
    }
}

impl SimulationConfig {
    /// Simulated seconds per physics tick
    pub fn physics_dt(&self) -> f64 {
        1.0 / self.physics_hz
    }
}

/// One entry of the camera table. The entry's position is its wire id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    pub name: String,
    pub kind: CameraKind,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fov")]
    pub fov: f32,
    #[serde(default = "default_camera_near")]
    pub near: f32,
    #[serde(default = "default_camera_far")]
    pub far: f32,
    /// Offset from the agent body (x, y, z)
    #[serde(default)]
    pub position: [f32; 3],
    /// Yaw relative to the agent body (degrees)
    #[serde(default)]
    pub yaw: f32,
}

fn default_camera_width() -> u32 {
    768
}
fn default_camera_height() -> u32 {
    432
}
fn default_camera_fov() -> f32 {
    60.0
}
fn default_camera_near() -> f32 {
    0.05
}
fn default_camera_far() -> f32 {
    50.0
}

impl CameraConfig {
    fn new(name: &str, kind: CameraKind, position: [f32; 3]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            width: default_camera_width(),
            height: default_camera_height(),
            fov: default_camera_fov(),
            near: default_camera_near(),
            far: default_camera_far(),
            position,
            yaw: 0.0,
        }
    }
}

fn default_cameras() -> Vec<CameraConfig> {
    vec![
        CameraConfig::new("rgb_left", CameraKind::Color, [-0.05, 0.0, 0.0]),
        CameraConfig::new("rgb_right", CameraKind::Color, [0.05, 0.0, 0.0]),
        CameraConfig::new("segmentation", CameraKind::Segmentation, [-0.05, 0.0, 0.0]),
        CameraConfig::new("depth", CameraKind::Depth, [-0.05, 0.0, 0.0]),
        CameraConfig::new("third_person", CameraKind::Color, [0.0, 2.0, -5.0]),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            response: ResponseConfig::default(),
            telemetry: TelemetryConfig::default(),
            simulation: SimulationConfig::default(),
            cameras: default_cameras(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.simulation.physics_hz > 0.0) {
            return Err(Error::Config(format!(
                "physics_hz must be positive, got {}",
                self.simulation.physics_hz
            )));
        }
        if self.simulation.scenes.is_empty() {
            return Err(Error::Config("at least the root scene is required".into()));
        }
        if self.simulation.room_half_extent <= 0.0 {
            return Err(Error::Config("room_half_extent must be positive".into()));
        }
        let max_pixels = self.simulation.max_camera_pixels;
        if max_pixels == 0 || max_pixels > PIXEL_BUDGET_LIMIT {
            return Err(Error::Config(format!(
                "max_camera_pixels must be in 1..={}, got {}",
                PIXEL_BUDGET_LIMIT, max_pixels
            )));
        }
        if let Some(cam) = self.cameras.iter().find(|c| c.width == 0 || c.height == 0) {
            return Err(Error::Config(format!(
                "camera {} has an empty resolution",
                cam.name
            )));
        }
        if let Some(cam) = self
            .cameras
            .iter()
            .find(|c| c.width as u64 * c.height as u64 > max_pixels)
        {
            return Err(Error::Config(format!(
                "camera {} resolution {}x{} exceeds max_camera_pixels {}",
                cam.name, cam.width, cam.height, max_pixels
            )));
        }
        Ok(())
    }

    /// Shift every listen port from a base port, keeping the classic offsets
    /// (position +0, metadata +1, image +2, step +5).
    pub fn set_listen_base(&mut self, base: u16) {
        self.network.position_port = base;
        self.network.metadata_port = base.saturating_add(1);
        self.network.image_port = base.saturating_add(2);
        self.network.step_port = base.saturating_add(5);
    }

    /// Shift every outbound port from a base port
    /// (position +0, metadata +1, image +2, telemetry +4).
    pub fn set_send_base(&mut self, base: u16) {
        self.response.position_port = base;
        self.response.metadata_port = base.saturating_add(1);
        self.response.image_port = base.saturating_add(2);
        self.telemetry.port = base.saturating_add(4);
    }

    /// Camera rig described by the camera table
    pub fn camera_rig(&self) -> CameraRig {
        let cameras = self
            .cameras
            .iter()
            .enumerate()
            .map(|(id, c)| CameraDescriptor {
                id: id as u32,
                name: c.name.clone(),
                kind: c.kind,
                width: c.width,
                height: c.height,
                fov: c.fov,
                near: c.near,
                far: c.far,
                position: Vec3::new(c.position[0], c.position[1], c.position[2]),
                rotation: Quat::from_yaw_degrees(c.yaw),
            })
            .collect();
        CameraRig::new(cameras).with_max_pixels(self.simulation.max_camera_pixels)
    }
}
