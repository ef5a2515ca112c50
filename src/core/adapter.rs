//! Engine-facing traits.
//!
//! The tick driver never touches rendering, physics or scene assets
//! directly. It talks to an engine through these two traits; the daemon
//! ships [`MockEngine`](crate::sim::MockEngine) as its in-process
//! implementation.

use super::camera::CameraDescriptor;
use super::types::{AgentState, Pose, Quat, Vec3};
use crate::error::Result;

/// Engine-side identity of a spawned object
pub type ObjectHandle = u64;

/// Raw camera output
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel (3 for colour, 4 for depth)
    pub channels: usize,
    /// Row-major pixel bytes, `width * height * channels` long
    pub data: Vec<u8>,
}

/// Simulation adapter: agent rigid body, scenes and spawned objects
pub trait SimulationAdapter: Send {
    /// Current agent rigid-body state
    fn agent_state(&self) -> AgentState;

    /// Distance to the first obstacle along `direction` from `origin`,
    /// if one lies within `max_distance`
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32>;

    /// Move the agent by a world-frame offset without physics
    fn translate(&mut self, offset: Vec3);

    /// Rotate the agent by a body-frame rotation
    fn rotate(&mut self, rotation: Quat);

    /// Overwrite the agent pose and zero its velocities
    fn set_pose(&mut self, pose: Pose);

    /// Body-frame force and torque applied during the next physics steps
    fn apply_force(&mut self, force: Vec3, torque: Vec3);

    /// Integrate physics by `dt` seconds of simulated time
    fn step(&mut self, dt: f64);

    fn set_collider(&mut self, enabled: bool);

    fn set_hover_height(&mut self, height: f32);

    fn set_seed(&mut self, seed: i32);

    /// Move the agent to a random valid spawn point
    fn respawn(&mut self);

    fn set_keyboard_enabled(&mut self, enabled: bool);

    /// Name of the object hit since the last call, clearing it
    fn take_collision(&mut self) -> Option<String>;

    /// Number of scenes, including the persistent root scene at index 0
    fn scene_count(&self) -> usize;

    /// Unload the current scene and load `index`, refreshing segmentation
    /// colours and spawn points. Returns the new scene's name.
    fn load_scene(&mut self, index: usize) -> Result<String>;

    fn spawnable_count(&self) -> usize;

    fn spawnable_name(&self, index: usize) -> Option<String>;

    /// Random valid spawn pose with random heading
    fn random_spawn_pose(&mut self) -> Pose;

    fn spawn_object(&mut self, index: usize, pose: Pose) -> Result<ObjectHandle>;

    /// Assign a segmentation colour to a freshly spawned object
    fn tag_segmentation(&mut self, handle: ObjectHandle, name: &str);

    fn object_pose(&self, handle: ObjectHandle) -> Option<Pose>;

    fn remove_object(&mut self, handle: ObjectHandle);
}

/// Camera adapter: renders one camera into a raw pixel buffer
pub trait CameraAdapter: Send {
    fn render(&mut self, camera: &CameraDescriptor) -> Result<RawImage>;
}
