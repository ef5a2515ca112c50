//! Simulation tick driver.
//!
//! The only consumer of the command queue and the only mutator of the
//! engine, the camera rig and the object registry. One tick:
//!
//! ```text
//! drain ─▶ capture-rate switch / step start (keyboard)
//!       ─▶ agent toggles: collider, hover height, seed, respawn
//!       ─▶ movement: teleport | absolute pose | held force
//!       ─▶ scene ─▶ objects ─▶ camera ─▶ image ─▶ metadata
//!       ─▶ physics step (dt · time scale)
//!       ─▶ step progress: on completion zero force, restore keyboard, ack
//!       ─▶ telemetry
//! ```
//!
//! In real-time mode a force lasts one tick unless it is re-issued; a
//! stepped force is held for the whole step.

use crate::core::adapter::{CameraAdapter, SimulationAdapter};
use crate::core::camera::CameraRig;
use crate::core::types::{Quat, Vec3};
use crate::listeners::TelemetrySender;
use crate::listeners::close_ack;
use crate::protocol::payload::{self, ObjectEntry};
use crate::protocol::{ForceInput, SpawnMethod, SpawnRequest, Tag, TeleportDelta, tags};
use crate::response::{ReplyRoute, ResponseSender, image};
use crate::state::{
    Addressed, CameraCommand, CommandQueue, ExecutionMode, ImageRequest, Movement, ObjectCommand,
    ObjectRegistry, PendingCommands, SessionSnapshot, StepProgress,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// What happened during one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Mode the tick ran in
    pub mode: ExecutionMode,
    /// Simulated seconds the engine advanced
    pub simulated: f64,
    /// A stepped command finished on this tick
    pub step_completed: bool,
}

pub struct TickDriver<E> {
    engine: E,
    queue: Arc<CommandQueue>,
    sender: ResponseSender,
    telemetry: Option<TelemetrySender>,
    rig: CameraRig,
    registry: ObjectRegistry,
    dt: f64,
    ticks: u64,
}

impl<E> TickDriver<E>
where
    E: SimulationAdapter + CameraAdapter,
{
    /// `dt` is the simulated length of one physics tick in seconds.
    pub fn new(
        engine: E,
        queue: Arc<CommandQueue>,
        sender: ResponseSender,
        rig: CameraRig,
        dt: f64,
    ) -> Self {
        Self {
            engine,
            queue,
            sender,
            telemetry: None,
            rig,
            registry: ObjectRegistry::new(),
            dt,
            ticks: 0,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySender) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn session(&self) -> SessionSnapshot {
        self.queue.session()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Tick at the physics rate of wall-clock time until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) {
        let period = Duration::from_secs_f64(self.dt);
        log::info!("Tick loop started ({:.1} Hz)", 1.0 / self.dt);
        let mut next = Instant::now();
        while running.load(Ordering::Relaxed) {
            self.tick();
            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                // Overran; don't try to catch up
                next = now;
            }
        }
        log::info!("Tick loop stopped after {} ticks", self.ticks);
    }

    /// Run one tick
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let batch = self.queue.drain_tick();
        for stream in batch.dropped_acks {
            close_ack(stream);
        }

        if let Some(t) = batch.transition {
            log::info!(
                "Capture rate {} ({:?} -> {:?})",
                batch.session.capture_rate,
                t.from,
                t.to
            );
            self.engine.set_keyboard_enabled(t.keyboard_enabled);
        }
        if batch.step_started {
            log::debug!(
                "Stepped command started ({:.4}s)",
                batch.session.command_duration
            );
            self.engine.set_keyboard_enabled(false);
        }

        self.apply(batch.commands);

        let mode = batch.session.mode;
        let simulated = match mode {
            ExecutionMode::Paused => 0.0,
            ExecutionMode::RealTime | ExecutionMode::Executing => self.dt,
        };
        if simulated > 0.0 {
            self.engine.step(simulated);
        }

        let mut step_completed = false;
        match self.queue.finish_tick(self.dt) {
            StepProgress::Completed(completion) => {
                step_completed = true;
                self.release_force();
                self.engine.set_keyboard_enabled(completion.keyboard_enabled);
                if let Some(stream) = completion.ack {
                    if let Err(e) = self.sender.send_ack(stream) {
                        log::warn!("Step ack not sent: {}", e);
                    }
                }
                log::debug!("Stepped command complete");
            }
            StepProgress::Running | StepProgress::Idle => {}
        }
        if mode == ExecutionMode::RealTime {
            self.release_force();
        }

        if let Some(telemetry) = &self.telemetry {
            let state = self.engine.agent_state();
            telemetry.publish(payload::metadata(&state, None).into_bytes());
        }

        TickReport {
            mode,
            simulated,
            step_completed,
        }
    }

    fn apply(&mut self, commands: PendingCommands) {
        if let Some(enabled) = commands.collider {
            self.engine.set_collider(enabled);
        }
        if let Some(height) = commands.hover_height {
            self.engine.set_hover_height(height);
        }
        if let Some(seed) = commands.seed {
            self.engine.set_seed(seed);
        }
        if commands.respawn {
            self.engine.respawn();
        }
        if let Some(pending) = commands.movement {
            self.apply_movement(pending.movement);
        }
        if let Some(scene) = commands.scene {
            self.change_scene(scene);
        }
        if let Some(objects) = commands.objects {
            self.handle_objects(objects);
        }
        if let Some(camera) = commands.camera {
            self.handle_camera(camera);
        }
        if let Some(image) = commands.image {
            self.handle_image(image);
        }
        if let Some(requester) = commands.metadata {
            let text = self.metadata_with_collision();
            self.reply(ReplyRoute::Metadata, requester, tags::METADATA_RESPONSE, text);
        }
    }

    fn apply_movement(&mut self, movement: Movement) {
        match movement {
            Movement::Teleport(delta) => self.teleport(delta),
            Movement::Pose(pose) => self.engine.set_pose(pose),
            Movement::Force(input) => self.hold_force(input),
        }
    }

    /// Body-frame translation clipped at the first obstacle, then a yaw turn
    fn teleport(&mut self, delta: TeleportDelta) {
        let pose = self.engine.agent_state().pose;
        let mut offset = pose.rotation.rotate(Vec3::new(delta.dx, 0.0, delta.dz));
        let distance = offset.length();
        if distance > 0.0 {
            if let Some(hit) = self.engine.raycast(pose.position, offset, distance) {
                offset = offset.normalized() * hit;
            }
            self.engine.translate(offset);
        }
        if delta.dyaw != 0.0 {
            self.engine.rotate(Quat::from_yaw_degrees(delta.dyaw));
        }
    }

    fn hold_force(&mut self, input: ForceInput) {
        self.engine.apply_force(
            Vec3::new(input.strafe, 0.0, input.force),
            Vec3::new(0.0, input.torque, 0.0),
        );
    }

    fn release_force(&mut self) {
        self.engine.apply_force(Vec3::ZERO, Vec3::ZERO);
    }

    fn change_scene(&mut self, request: Addressed<i32>) {
        let count = self.engine.scene_count();
        let index = usize::try_from(request.value)
            .ok()
            .filter(|i| *i >= 1 && *i < count);

        let text = match index {
            Some(index) => {
                self.despawn_all();
                match self.engine.load_scene(index) {
                    Ok(name) => payload::scene_info(index, &name),
                    Err(e) => {
                        log::error!("Scene {} failed to load: {}", index, e);
                        payload::scene_range(count)
                    }
                }
            }
            None => {
                log::warn!(
                    "Scene index {} out of range (1 - {})",
                    request.value,
                    count.saturating_sub(1)
                );
                payload::scene_range(count)
            }
        };
        self.reply(ReplyRoute::Position, request.requester, tags::SCENE_RESPONSE, text);
    }

    fn handle_objects(&mut self, request: Addressed<ObjectCommand>) {
        match request.value {
            ObjectCommand::Spawn(spawn) => self.spawn(spawn),
            ObjectCommand::Remove(ids) if ids.is_empty() => self.despawn_all(),
            ObjectCommand::Remove(ids) => {
                for id in ids {
                    match self.registry.remove(id) {
                        Some(object) => self.engine.remove_object(object.handle),
                        None => log::debug!("No spawned object with id {}", id),
                    }
                }
            }
            ObjectCommand::Query => {}
        }

        let listing = payload::object_listing(self.registry.iter().map(|(id, object)| ObjectEntry {
            id,
            kind: &object.kind,
            pose: self.engine.object_pose(object.handle).unwrap_or_default(),
        }));
        self.reply(ReplyRoute::Position, request.requester, tags::OBJECTS_RESPONSE, listing);
    }

    fn spawn(&mut self, request: SpawnRequest) {
        let Some(index) = usize::try_from(request.index)
            .ok()
            .filter(|i| *i < self.engine.spawnable_count())
        else {
            log::warn!(
                "Spawnable index {} out of range ({} available)",
                request.index,
                self.engine.spawnable_count()
            );
            return;
        };
        let pose = match request.method {
            SpawnMethod::Explicit => request.pose,
            SpawnMethod::Random => self.engine.random_spawn_pose(),
            // Any non-zero method picks a spawn point
            SpawnMethod::Unknown(code) => {
                log::debug!("Spawn method {} treated as random", code);
                self.engine.random_spawn_pose()
            }
        };
        let kind = self
            .engine
            .spawnable_name(index)
            .unwrap_or_else(|| format!("object_{}", index));
        match self.engine.spawn_object(index, pose) {
            Ok(handle) => {
                let id = self.registry.insert(kind.clone(), handle);
                self.engine.tag_segmentation(handle, &format!("{}_{}", kind, id));
                log::debug!("Spawned {} as object {}", kind, id);
            }
            Err(e) => log::warn!("Spawn of {} failed: {}", kind, e),
        }
    }

    fn despawn_all(&mut self) {
        for object in self.registry.take_all() {
            self.engine.remove_object(object.handle);
        }
    }

    fn handle_camera(&mut self, request: Addressed<CameraCommand>) {
        let (camera, applied) = match request.value {
            CameraCommand::Info(id) => (id, true),
            CameraCommand::Params(params) => (params.camera, self.rig.set_params(&params)),
            CameraCommand::Position { camera, offset } => {
                (camera, self.rig.set_position(camera, offset))
            }
            CameraCommand::Rotation { camera, rotation } => {
                (camera, self.rig.set_rotation(camera, rotation))
            }
        };
        if !applied {
            log::warn!("Camera command for unknown camera {}", camera);
        }
        let text = payload::camera_info(&self.rig, camera);
        self.reply(ReplyRoute::Image, request.requester, tags::CAMERA_INFO_RESPONSE, text);
    }

    fn handle_image(&mut self, request: Addressed<ImageRequest>) {
        let metadata = request
            .value
            .with_metadata
            .then(|| self.metadata_with_collision());
        let response = image::assemble(&mut self.engine, &self.rig, &request.value.cameras, metadata);
        if let Err(e) = self.sender.send_images(request.requester, response) {
            log::warn!("Image reply to {} not sent: {}", request.requester, e);
        }
    }

    /// Metadata for a client request; consumes the collision flag
    fn metadata_with_collision(&mut self) -> String {
        let collision = self.engine.take_collision();
        payload::metadata(&self.engine.agent_state(), collision.as_deref())
    }

    fn reply(&self, route: ReplyRoute, requester: SocketAddr, tag: Tag, text: String) {
        if let Err(e) = self.sender.send_text(route, requester, tag, text) {
            log::warn!("{} reply to {} not sent: {}", tag, requester, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResponseConfig, SimulationConfig};
    use crate::core::types::Pose;
    use crate::protocol::response::ResponseHeader;
    use crate::protocol::{CameraParams, Command};
    use crate::sim::MockEngine;
    use crate::state::SessionState;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    struct Harness {
        driver: TickDriver<MockEngine>,
        queue: Arc<CommandQueue>,
        replies: TcpListener,
    }

    fn harness(capture_rate: u32) -> Harness {
        let replies = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = replies.local_addr().unwrap().port();
        let sender = ResponseSender::new(
            ResponseConfig {
                position_port: port,
                metadata_port: port,
                image_port: port,
                connect_timeout_ms: 500,
                connect_retry_ms: 20,
                connect_attempts: 3,
                write_timeout_ms: 1000,
                drain_timeout_ms: 500,
            },
            Arc::new(AtomicBool::new(true)),
        );
        let sim = SimulationConfig {
            seed: 5,
            capture_rate,
            ..SimulationConfig::default()
        };
        let queue = Arc::new(CommandQueue::new(SessionState::new(capture_rate)));
        let rig = crate::config::Config::default().camera_rig();
        let driver = TickDriver::new(
            MockEngine::new(&sim),
            Arc::clone(&queue),
            sender,
            rig,
            sim.physics_dt(),
        );
        Harness {
            driver,
            queue,
            replies,
        }
    }

    fn client() -> SocketAddr {
        "127.0.0.1:40001".parse().unwrap()
    }

    /// Accept one reply and return its header and body
    fn read_reply(listener: &TcpListener) -> (ResponseHeader, String) {
        let (mut stream, _) = listener.accept().unwrap();
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).unwrap();
        let header = ResponseHeader::decode(&header).unwrap();
        let mut body = vec![0u8; header.length as usize];
        stream.read_exact(&mut body).unwrap();
        (header, String::from_utf8(body).unwrap())
    }

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_stepped_force_runs_one_capture_frame() {
        let mut h = harness(10);
        h.driver.engine_mut().set_pose(Pose::default());
        let (mut client_stream, server) = loopback_pair();
        let command = Command::AddForceStepped {
            input: ForceInput {
                force: 1.0,
                torque: 0.0,
                strafe: 0.0,
            },
            duration: 0.0,
        };
        h.queue.publish(command, client(), Some(server)).unwrap();

        let start = h.driver.engine().agent_state().time;
        let mut ticks = 0;
        loop {
            ticks += 1;
            let report = h.driver.tick();
            assert_eq!(report.mode, ExecutionMode::Executing);
            if report.step_completed {
                break;
            }
            assert!(ticks < 50, "step never completed");
        }
        assert_eq!(ticks, 5);
        let state = h.driver.engine().agent_state();
        assert!((state.time - start - 0.1).abs() < 1e-9);
        assert!(state.pose.position.z > 0.0);
        assert_eq!(h.driver.engine().held_force(), (Vec3::ZERO, Vec3::ZERO));

        // Paused again: the clock no longer advances
        let report = h.driver.tick();
        assert_eq!(report.mode, ExecutionMode::Paused);
        assert_eq!(report.simulated, 0.0);

        let mut received = Vec::new();
        client_stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        client_stream.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"ack");
    }

    #[test]
    fn test_real_time_force_lasts_one_tick() {
        let mut h = harness(0);
        h.driver.engine_mut().set_pose(Pose::default());
        h.queue
            .publish(Command::AddForce2D { force: 2.0, torque: 0.5 }, client(), None)
            .unwrap();
        let report = h.driver.tick();
        assert_eq!(report.mode, ExecutionMode::RealTime);
        assert_eq!(h.driver.engine().held_force(), (Vec3::ZERO, Vec3::ZERO));
        assert!(h.driver.engine().agent_state().velocity.z > 0.0);
    }

    #[test]
    fn test_scene_index_out_of_range() {
        let mut h = harness(0);
        h.queue.publish(Command::ChangeScene(7), client(), None).unwrap();
        h.driver.tick();
        let (header, body) = read_reply(&h.replies);
        assert_eq!(header.tag, tags::SCENE_RESPONSE);
        assert_eq!(body, "<available scene indices are 1 - 4/>\n");
        assert_eq!(h.driver.engine().current_scene(), 0);

        h.queue.publish(Command::ChangeScene(0), client(), None).unwrap();
        h.driver.tick();
        let (_, body) = read_reply(&h.replies);
        assert_eq!(body, "<available scene indices are 1 - 4/>\n");
    }

    #[test]
    fn test_scene_change_clears_objects() {
        let mut h = harness(0);
        h.queue
            .publish(
                Command::SpawnObject(SpawnRequest {
                    index: 0,
                    method: SpawnMethod::Random,
                    pose: Pose::default(),
                }),
                client(),
                None,
            )
            .unwrap();
        h.driver.tick();
        read_reply(&h.replies);
        assert_eq!(h.driver.registry().len(), 1);

        h.queue.publish(Command::ChangeScene(3), client(), None).unwrap();
        h.driver.tick();
        let (_, body) = read_reply(&h.replies);
        assert!(body.contains("<index>3</index>"));
        assert!(body.contains("<name>warehouse</name>"));
        assert!(h.driver.registry().is_empty());
        assert_eq!(h.driver.engine().object_count(), 0);
    }

    #[test]
    fn test_spawn_query_remove() {
        let mut h = harness(0);
        let pose = Pose::new(Vec3::new(1.0, 0.0, 2.0), Quat::IDENTITY);
        h.queue
            .publish(
                Command::SpawnObject(SpawnRequest {
                    index: 1,
                    method: SpawnMethod::Explicit,
                    pose,
                }),
                client(),
                None,
            )
            .unwrap();
        h.driver.tick();
        let (header, body) = read_reply(&h.replies);
        assert_eq!(header.tag, tags::OBJECTS_RESPONSE);
        assert!(body.contains("<type>sphere</type>"));
        assert!(body.contains("<id>0</id>"));
        assert!(body.contains("<position x='1' y='0' z='2'/>"));

        h.queue.publish(Command::RemoveObjects(vec![0]), client(), None).unwrap();
        h.driver.tick();
        let (_, body) = read_reply(&h.replies);
        assert_eq!(body, "<objects>\n</objects>\n");
    }

    #[test]
    fn test_spawn_out_of_range_spawns_nothing() {
        let mut h = harness(0);
        h.queue
            .publish(
                Command::SpawnObject(SpawnRequest {
                    index: 42,
                    method: SpawnMethod::Explicit,
                    pose: Pose::default(),
                }),
                client(),
                None,
            )
            .unwrap();
        h.driver.tick();
        let (_, body) = read_reply(&h.replies);
        assert_eq!(body, "<objects>\n</objects>\n");
    }

    #[test]
    fn test_unknown_spawn_method_uses_spawn_point() {
        let mut h = harness(0);
        h.queue
            .publish(
                Command::SpawnObject(SpawnRequest {
                    index: 0,
                    method: SpawnMethod::Unknown(7),
                    pose: Pose::new(Vec3::new(100.0, 0.0, 100.0), Quat::IDENTITY),
                }),
                client(),
                None,
            )
            .unwrap();
        h.driver.tick();
        let (_, body) = read_reply(&h.replies);
        assert!(body.contains("<type>cube</type>"));
        assert_eq!(h.driver.registry().len(), 1);
        let (_, object) = h.driver.registry().iter().next().unwrap();
        let pose = h.driver.engine().object_pose(object.handle).unwrap();
        let limit = h.driver.engine().room().walkable_half_extent();
        assert!(pose.position.x.abs() <= limit && pose.position.z.abs() <= limit);
    }

    #[test]
    fn test_teleport_clipped_at_wall() {
        let mut h = harness(0);
        h.driver.engine_mut().set_pose(Pose::default());
        h.queue
            .publish(
                Command::Teleport(TeleportDelta {
                    dx: 0.0,
                    dz: 100.0,
                    dyaw: 90.0,
                }),
                client(),
                None,
            )
            .unwrap();
        h.driver.tick();
        let pose = h.driver.engine().agent_state().pose;
        assert!(pose.position.z <= 10.0 + 1e-3);
        assert!(pose.position.z > 9.0);
        assert!((pose.rotation.yaw_degrees() - 90.0).abs() < 1e-2);
    }

    #[test]
    fn test_camera_params_reply_and_idempotence() {
        let mut h = harness(0);
        let params = CameraParams {
            camera: 0,
            height: 240,
            width: 320,
            fov: 90.0,
            near: None,
            far: None,
        };
        for _ in 0..2 {
            h.queue
                .publish(Command::SetCameraParams(params), client(), None)
                .unwrap();
            h.driver.tick();
            let (header, body) = read_reply(&h.replies);
            assert_eq!(header.tag, tags::CAMERA_INFO_RESPONSE);
            assert!(body.contains("<parameters height='240' width='320' fov='90'/>"));
        }
        let cam = h.driver.rig().get(0).unwrap();
        assert_eq!((cam.width, cam.height), (320, 240));
    }

    #[test]
    fn test_metadata_reply() {
        let mut h = harness(0);
        h.queue.publish(Command::MetadataRequest, client(), None).unwrap();
        h.driver.tick();
        let (header, body) = read_reply(&h.replies);
        assert_eq!(header.tag, tags::METADATA_RESPONSE);
        assert!(body.starts_with("<TESSE_Agent_Metadata_v0.5>\n"));
        assert!(body.contains("<collider status='true'/>"));
    }

    #[test]
    fn test_agent_toggles() {
        let mut h = harness(0);
        h.queue.publish(Command::SetCollider(false), client(), None).unwrap();
        h.queue.publish(Command::SetHoverHeight(1.5), client(), None).unwrap();
        h.driver.tick();
        let state = h.driver.engine().agent_state();
        assert!(!state.collider_enabled);
        assert_eq!(state.pose.position.y, 1.5);
    }

    #[test]
    fn test_capture_rate_toggles_keyboard() {
        let mut h = harness(0);
        assert!(h.driver.engine().keyboard().enabled);
        h.queue.publish(Command::SetCaptureRate(10), client(), None).unwrap();
        let report = h.driver.tick();
        assert_eq!(report.mode, ExecutionMode::Paused);
        assert!(!h.driver.engine().keyboard().enabled);

        h.queue.publish(Command::SetCaptureRate(0), client(), None).unwrap();
        h.driver.tick();
        assert!(h.driver.engine().keyboard().enabled);
    }
}
