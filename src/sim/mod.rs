//! In-process mock engine.
//!
//! Implements [`SimulationAdapter`] and [`CameraAdapter`] without any
//! external dependency so the daemon runs stand-alone and the tick driver
//! can be tested end to end. Every scene is the same square room; scenes
//! differ only in name, segmentation colours and spawn points.

pub mod body;
pub mod render;
pub mod room;
pub mod spawn;

pub use body::RigidBody;
pub use room::{Room, Wall};
pub use spawn::SpawnSampler;

use crate::config::SimulationConfig;
use crate::core::adapter::{CameraAdapter, ObjectHandle, RawImage, SimulationAdapter};
use crate::core::camera::{CameraDescriptor, CameraKind};
use crate::core::types::{AgentState, Pose, Quat, Vec3};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct MockObject {
    kind: String,
    pose: Pose,
    color: [u8; 3],
}

/// Keyboard teleoperation settings; the mock has no input device and only
/// tracks whether driving would be allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyboard {
    pub enabled: bool,
    pub speed: f32,
    pub turn_speed: f32,
}

pub struct MockEngine {
    scenes: Vec<String>,
    current_scene: usize,
    spawnables: Vec<String>,
    room: Room,
    body: RigidBody,
    sampler: SpawnSampler,
    objects: BTreeMap<ObjectHandle, MockObject>,
    next_handle: ObjectHandle,
    wall_color: [u8; 3],
    floor_color: [u8; 3],
    collider_enabled: bool,
    collision: Option<String>,
    keyboard: Keyboard,
    time: f64,
}

impl MockEngine {
    /// Start in the root scene (index 0) at a random spawn point
    pub fn new(config: &SimulationConfig) -> Self {
        let room = Room::new(config.room_half_extent);
        let mut sampler = SpawnSampler::new(config.seed, config.spawn_jitter);
        sampler.refresh_points(&room);
        let mut engine = Self {
            scenes: config.scenes.clone(),
            current_scene: 0,
            spawnables: config.spawnables.clone(),
            room,
            body: RigidBody::new(config.agent_mass, config.damping),
            wall_color: sampler.color(),
            floor_color: sampler.color(),
            sampler,
            objects: BTreeMap::new(),
            next_handle: 1,
            collider_enabled: true,
            collision: None,
            keyboard: Keyboard {
                enabled: config.capture_rate == 0,
                speed: config.speed,
                turn_speed: config.turn_speed,
            },
            time: 0.0,
        };
        engine.respawn();
        engine
    }

    pub fn current_scene(&self) -> usize {
        self.current_scene
    }

    pub fn keyboard(&self) -> Keyboard {
        self.keyboard
    }

    /// Body-frame force and torque currently applied to the agent
    pub fn held_force(&self) -> (Vec3, Vec3) {
        self.body.held_force()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    fn segmentation_bands(&self) -> Vec<[u8; 3]> {
        self.objects.values().map(|o| o.color).collect()
    }
}

impl SimulationAdapter for MockEngine {
    fn agent_state(&self) -> AgentState {
        self.body.state(self.time, self.collider_enabled)
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        if !self.collider_enabled {
            return None;
        }
        self.room
            .raycast(origin, direction, max_distance)
            .map(|(distance, _)| distance)
    }

    fn translate(&mut self, offset: Vec3) {
        self.body.translate(offset);
    }

    fn rotate(&mut self, rotation: Quat) {
        self.body.rotate(rotation);
    }

    fn set_pose(&mut self, pose: Pose) {
        self.body.set_pose(pose);
    }

    fn apply_force(&mut self, force: Vec3, torque: Vec3) {
        self.body.apply_force(force, torque);
    }

    fn step(&mut self, dt: f64) {
        let room = self.collider_enabled.then_some(&self.room);
        if let Some(wall) = self.body.step(dt as f32, room) {
            self.collision = Some(wall.name().to_string());
        }
        self.time += dt;
    }

    fn set_collider(&mut self, enabled: bool) {
        log::debug!("collider {}", if enabled { "enabled" } else { "disabled" });
        self.collider_enabled = enabled;
    }

    fn set_hover_height(&mut self, height: f32) {
        self.body.set_hover_height(height);
    }

    fn set_seed(&mut self, seed: i32) {
        self.sampler.reseed(seed as u32 as u64);
    }

    fn respawn(&mut self) {
        let pose = self.sampler.pose(&self.room, self.body.hover_height());
        self.body.set_pose(pose);
    }

    fn set_keyboard_enabled(&mut self, enabled: bool) {
        if self.keyboard.enabled != enabled {
            log::debug!(
                "keyboard {} (speed {}, turn speed {})",
                if enabled { "enabled" } else { "disabled" },
                self.keyboard.speed,
                self.keyboard.turn_speed
            );
        }
        self.keyboard.enabled = enabled;
    }

    fn take_collision(&mut self) -> Option<String> {
        self.collision.take()
    }

    fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    fn load_scene(&mut self, index: usize) -> Result<String> {
        let name = self
            .scenes
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Scene(format!("no scene with index {}", index)))?;
        self.objects.clear();
        self.current_scene = index;
        self.wall_color = self.sampler.color();
        self.floor_color = self.sampler.color();
        self.sampler.refresh_points(&self.room);
        self.collision = None;
        self.respawn();
        log::info!("Loaded scene {} ({})", index, name);
        Ok(name)
    }

    fn spawnable_count(&self) -> usize {
        self.spawnables.len()
    }

    fn spawnable_name(&self, index: usize) -> Option<String> {
        self.spawnables.get(index).cloned()
    }

    fn random_spawn_pose(&mut self) -> Pose {
        self.sampler.pose(&self.room, 0.0)
    }

    fn spawn_object(&mut self, index: usize, pose: Pose) -> Result<ObjectHandle> {
        let kind = self
            .spawnable_name(index)
            .ok_or_else(|| Error::Other(format!("no spawnable object with index {}", index)))?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(
            handle,
            MockObject {
                kind,
                pose,
                color: [0, 0, 0],
            },
        );
        Ok(handle)
    }

    fn tag_segmentation(&mut self, handle: ObjectHandle, name: &str) {
        let color = self.sampler.color();
        if let Some(object) = self.objects.get_mut(&handle) {
            log::debug!("{} ({}) segmentation colour {:?}", name, object.kind, color);
            object.color = color;
        }
    }

    fn object_pose(&self, handle: ObjectHandle) -> Option<Pose> {
        self.objects.get(&handle).map(|o| o.pose)
    }

    fn remove_object(&mut self, handle: ObjectHandle) {
        self.objects.remove(&handle);
    }
}

impl CameraAdapter for MockEngine {
    fn render(&mut self, camera: &CameraDescriptor) -> Result<RawImage> {
        if camera.width == 0 || camera.height == 0 {
            return Err(Error::Render(format!("camera {} has no pixels", camera.name)));
        }
        let pose = self.body.pose();
        Ok(match camera.kind {
            CameraKind::Color => render::color(camera, &pose),
            CameraKind::Segmentation => render::segmentation(
                camera,
                self.wall_color,
                self.floor_color,
                &self.segmentation_bands(),
            ),
            CameraKind::Depth => render::depth(camera, &pose, &self.room),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MockEngine {
        MockEngine::new(&SimulationConfig {
            seed: 11,
            ..SimulationConfig::default()
        })
    }

    #[test]
    fn test_starts_in_root_scene_inside_room() {
        let e = engine();
        assert_eq!(e.current_scene(), 0);
        let p = e.agent_state().pose.position;
        assert!(p.x.abs() <= e.room().walkable_half_extent());
        assert!(p.z.abs() <= e.room().walkable_half_extent());
    }

    #[test]
    fn test_load_scene() {
        let mut e = engine();
        let handle = e.spawn_object(0, Pose::default()).unwrap();
        assert_eq!(e.load_scene(2).unwrap(), "office");
        assert_eq!(e.current_scene(), 2);
        assert!(e.object_pose(handle).is_none());
        assert!(matches!(e.load_scene(99), Err(Error::Scene(_))));
    }

    #[test]
    fn test_collision_reported_once() {
        let mut e = engine();
        e.set_pose(Pose::default());
        e.apply_force(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        for _ in 0..100 {
            e.step(0.02);
        }
        assert_eq!(e.take_collision().as_deref(), Some("wall_north"));
        e.apply_force(Vec3::ZERO, Vec3::ZERO);
        e.set_pose(Pose::default());
        e.step(0.02);
        assert_eq!(e.take_collision(), None);
    }

    #[test]
    fn test_collider_off_passes_walls() {
        let mut e = engine();
        e.set_collider(false);
        assert!(e.raycast(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), 100.0).is_none());
        assert!(!e.agent_state().collider_enabled);
    }

    #[test]
    fn test_spawn_unknown_index() {
        let mut e = engine();
        assert!(e.spawn_object(e.spawnable_count(), Pose::default()).is_err());
    }

    #[test]
    fn test_time_advances_with_steps() {
        let mut e = engine();
        e.step(0.02);
        e.step(0.02);
        assert!((e.agent_state().time - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_render_every_kind() {
        let config = crate::config::Config::default();
        let mut e = engine();
        for camera in config.camera_rig().cameras() {
            let image = e.render(camera).unwrap();
            assert_eq!(
                image.data.len(),
                (camera.width * camera.height) as usize * camera.kind.channels()
            );
        }
    }
}
