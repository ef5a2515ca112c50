//! Inbound command messages.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────┐
//! │ Tag (4 ASCII)│ Payload (little-endian i32/f32 fields)    │
//! └──────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Payload sizes (bytes after the tag):
//!
//! | Tag | Command | Payload |
//! |-----|---------|---------|
//! | `TLPT` / `tlpt` | teleport (real-time / stepped) | 12: dx, dz, dyaw |
//! | `xBFF` | 2-axis force | 8: force, torque |
//! | `fBff` | stepped force | 16: force, torque, strafe, duration |
//! | `xBff` | 3-axis force | 12: force, torque, strafe |
//! | `fScR` | capture rate | 4: i32 |
//! | `xSHh` | hover height | 4: f32 |
//! | `sPoS` | absolute pose | 28: xyz + quat xyzw |
//! | `RSPN` | respawn | 0 |
//! | `sCOL` | collider | 1: bool byte |
//! | `CScN` | change scene | 4: i32 |
//! | `SEED` | seed | 4: i32 |
//! | `oSpn` | spawn object | 36: index, method, xyz, quat xyzw |
//! | `oRem` | remove objects | 4 × n: ids (empty = all) |
//! | `oReq` | query objects | 0 |
//! | `rIMG` / `tIMG` | images (± metadata) | 12 × n, n ≥ 1: id, compressed, single channel |
//! | `gCaI` | camera info | 4: id (-1 = all) |
//! | `sCaR` | camera params | ≥ 16: id, height, width, fov, \[near\], \[far\] |
//! | `sCaP` | camera position | 16: id, xyz |
//! | `sCaQ` | camera rotation | 20: id, quat xyzw |
//! | `rMET` | metadata | 0 |
//!
//! Decoding validates the payload length for the tag before touching any
//! field, so a short or oversized datagram never panics.

use super::tags::{self, Tag};
use crate::core::types::{Pose, Quat, Vec3};
use std::fmt;

/// Payload length rule for a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Exact(usize),
    AtLeast(usize),
    /// Multiple of the block size, possibly zero blocks
    Blocks(usize),
    /// Multiple of the block size, at least one block
    NonEmptyBlocks(usize),
}

impl LengthRule {
    fn accepts(&self, len: usize) -> bool {
        match *self {
            LengthRule::Exact(n) => len == n,
            LengthRule::AtLeast(n) => len >= n,
            LengthRule::Blocks(n) => len % n == 0,
            LengthRule::NonEmptyBlocks(n) => len > 0 && len % n == 0,
        }
    }
}

impl fmt::Display for LengthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthRule::Exact(n) => write!(f, "exactly {}", n),
            LengthRule::AtLeast(n) => write!(f, "at least {}", n),
            LengthRule::Blocks(n) => write!(f, "a multiple of {}", n),
            LengthRule::NonEmptyBlocks(n) => write!(f, "a non-zero multiple of {}", n),
        }
    }
}

/// Wire decode failure. The message is dropped; there is no NACK channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("message of {0} bytes is too short to carry a tag")]
    Truncated(usize),

    #[error("unknown tag {0}")]
    UnknownTag(Tag),

    #[error("malformed {tag}: payload must be {expected} bytes, got {actual}")]
    MalformedLength {
        tag: Tag,
        expected: LengthRule,
        actual: usize,
    },
}

/// Body-frame teleport offset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TeleportDelta {
    /// Strafe offset (meters)
    pub dx: f32,
    /// Forward offset (meters)
    pub dz: f32,
    /// Yaw change (degrees)
    pub dyaw: f32,
}

/// Body-frame force/torque request
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ForceInput {
    /// Forward force (along +z)
    pub force: f32,
    /// Torque about the up axis
    pub torque: f32,
    /// Strafe force (along +x)
    pub strafe: f32,
}

/// How a spawned object is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMethod {
    /// Use the pose carried in the request
    Explicit,
    /// Random spawn point, random heading
    Random,
    /// Any other code; placed like `Random`, code kept for logging
    Unknown(i32),
}

impl SpawnMethod {
    fn from_code(code: i32) -> Self {
        match code {
            0 => SpawnMethod::Explicit,
            1 => SpawnMethod::Random,
            other => SpawnMethod::Unknown(other),
        }
    }

    fn code(&self) -> i32 {
        match *self {
            SpawnMethod::Explicit => 0,
            SpawnMethod::Random => 1,
            SpawnMethod::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    /// Index into the spawnable object table
    pub index: i32,
    pub method: SpawnMethod,
    pub pose: Pose,
}

/// One camera entry of an image request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub camera: i32,
    pub compressed: bool,
    pub single_channel: bool,
}

/// Camera parameter change. Non-positive values leave the field unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    /// Camera id, -1 for every camera
    pub camera: i32,
    pub height: i32,
    pub width: i32,
    /// Vertical field of view (degrees)
    pub fov: f32,
    pub near: Option<f32>,
    /// Follows `near` on the wire; not encoded when `near` is `None`
    pub far: Option<f32>,
}

/// Decoded inbound command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Teleport(TeleportDelta),
    TeleportStepped(TeleportDelta),
    AddForce2D { force: f32, torque: f32 },
    AddForceStepped { input: ForceInput, duration: f32 },
    SetCaptureRate(i32),
    AddForce3D(ForceInput),
    SetHoverHeight(f32),
    SetPositionOrientation(Pose),
    Respawn,
    SetCollider(bool),
    ChangeScene(i32),
    SetSeed(i32),
    SpawnObject(SpawnRequest),
    RemoveObjects(Vec<i32>),
    QuerySpawnedObjects,
    ImageRequest(Vec<CameraRequest>),
    ImageWithMetadataRequest(Vec<CameraRequest>),
    CameraInfoRequest(i32),
    SetCameraParams(CameraParams),
    SetCameraPosition { camera: i32, offset: Vec3 },
    SetCameraRotation { camera: i32, rotation: Quat },
    MetadataRequest,
}

/// Admission and overwrite group of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    Movement,
    CaptureRate,
    Agent,
    Scene,
    Objects,
    Image,
    Camera,
    Metadata,
}

const CAMERA_REQUEST_BLOCK: usize = 12;

fn length_rule(tag: Tag) -> Option<LengthRule> {
    use LengthRule::*;
    let rule = match tag {
        tags::TELEPORT | tags::TELEPORT_STEPPED => Exact(12),
        tags::ADD_FORCE_2D => Exact(8),
        tags::ADD_FORCE_STEPPED => Exact(16),
        tags::SET_CAPTURE_RATE => Exact(4),
        tags::ADD_FORCE_3D => Exact(12),
        tags::SET_HOVER_HEIGHT => Exact(4),
        tags::SET_POSE => Exact(28),
        tags::RESPAWN => Exact(0),
        tags::SET_COLLIDER => Exact(1),
        tags::CHANGE_SCENE => Exact(4),
        tags::SET_SEED => Exact(4),
        tags::SPAWN_OBJECT => Exact(36),
        tags::REMOVE_OBJECTS => Blocks(4),
        tags::QUERY_OBJECTS => Exact(0),
        tags::IMAGE_REQUEST | tags::IMAGE_WITH_METADATA => NonEmptyBlocks(CAMERA_REQUEST_BLOCK),
        tags::CAMERA_INFO => Exact(4),
        tags::SET_CAMERA_PARAMS => AtLeast(16),
        tags::SET_CAMERA_POSITION => Exact(16),
        tags::SET_CAMERA_ROTATION => Exact(20),
        tags::METADATA_REQUEST => Exact(0),
        _ => return None,
    };
    Some(rule)
}

/// Sequential little-endian field reader over a length-checked payload
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn word(&mut self) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        bytes
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.word())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.word())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.word())
    }

    fn vec3(&mut self) -> Vec3 {
        Vec3::new(self.f32(), self.f32(), self.f32())
    }

    fn quat(&mut self) -> Quat {
        Quat::new(self.f32(), self.f32(), self.f32(), self.f32())
    }

    fn teleport(&mut self) -> TeleportDelta {
        TeleportDelta {
            dx: self.f32(),
            dz: self.f32(),
            dyaw: self.f32(),
        }
    }

    fn camera_requests(&mut self) -> Vec<CameraRequest> {
        let mut requests = Vec::with_capacity(self.remaining() / CAMERA_REQUEST_BLOCK);
        while self.remaining() >= CAMERA_REQUEST_BLOCK {
            requests.push(CameraRequest {
                camera: self.i32(),
                compressed: self.u32() > 0,
                single_channel: self.u32() > 0,
            });
        }
        requests
    }
}

/// Little-endian field writer
struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    fn new(tag: Tag) -> Self {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&tag.bytes());
        Self { buf }
    }

    fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn vec3(&mut self, v: Vec3) -> &mut Self {
        self.f32(v.x).f32(v.y).f32(v.z)
    }

    fn quat(&mut self, q: Quat) -> &mut Self {
        self.f32(q.x).f32(q.y).f32(q.z).f32(q.w)
    }

    fn teleport(&mut self, t: &TeleportDelta) -> &mut Self {
        self.f32(t.dx).f32(t.dz).f32(t.dyaw)
    }

    fn camera_requests(&mut self, requests: &[CameraRequest]) -> &mut Self {
        for r in requests {
            self.i32(r.camera)
                .u32(r.compressed as u32)
                .u32(r.single_channel as u32);
        }
        self
    }

    fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

impl Command {
    /// Decode one datagram (or one step-port frame).
    pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::Truncated(bytes.len()));
        }
        let tag = Tag([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let payload = &bytes[4..];

        let rule = length_rule(tag).ok_or(DecodeError::UnknownTag(tag))?;
        if !rule.accepts(payload.len()) {
            return Err(DecodeError::MalformedLength {
                tag,
                expected: rule,
                actual: payload.len(),
            });
        }

        let mut r = FieldReader::new(payload);
        let command = match tag {
            tags::TELEPORT => Command::Teleport(r.teleport()),
            tags::TELEPORT_STEPPED => Command::TeleportStepped(r.teleport()),
            tags::ADD_FORCE_2D => Command::AddForce2D {
                force: r.f32(),
                torque: r.f32(),
            },
            tags::ADD_FORCE_STEPPED => Command::AddForceStepped {
                input: ForceInput {
                    force: r.f32(),
                    torque: r.f32(),
                    strafe: r.f32(),
                },
                duration: r.f32(),
            },
            tags::SET_CAPTURE_RATE => Command::SetCaptureRate(r.i32()),
            tags::ADD_FORCE_3D => Command::AddForce3D(ForceInput {
                force: r.f32(),
                torque: r.f32(),
                strafe: r.f32(),
            }),
            tags::SET_HOVER_HEIGHT => Command::SetHoverHeight(r.f32()),
            tags::SET_POSE => Command::SetPositionOrientation(Pose::new(r.vec3(), r.quat())),
            tags::RESPAWN => Command::Respawn,
            tags::SET_COLLIDER => Command::SetCollider(payload[0] != 0),
            tags::CHANGE_SCENE => Command::ChangeScene(r.i32()),
            tags::SET_SEED => Command::SetSeed(r.i32()),
            tags::SPAWN_OBJECT => Command::SpawnObject(SpawnRequest {
                index: r.i32(),
                method: SpawnMethod::from_code(r.i32()),
                pose: Pose::new(r.vec3(), r.quat()),
            }),
            tags::REMOVE_OBJECTS => {
                let mut ids = Vec::with_capacity(payload.len() / 4);
                while r.remaining() >= 4 {
                    ids.push(r.i32());
                }
                Command::RemoveObjects(ids)
            }
            tags::QUERY_OBJECTS => Command::QuerySpawnedObjects,
            tags::IMAGE_REQUEST => Command::ImageRequest(r.camera_requests()),
            tags::IMAGE_WITH_METADATA => Command::ImageWithMetadataRequest(r.camera_requests()),
            tags::CAMERA_INFO => Command::CameraInfoRequest(r.i32()),
            tags::SET_CAMERA_PARAMS => {
                let camera = r.i32();
                let height = r.i32();
                let width = r.i32();
                let fov = r.f32();
                let near = (r.remaining() >= 4).then(|| r.f32());
                let far = (r.remaining() >= 4).then(|| r.f32());
                Command::SetCameraParams(CameraParams {
                    camera,
                    height,
                    width,
                    fov,
                    near,
                    far,
                })
            }
            tags::SET_CAMERA_POSITION => Command::SetCameraPosition {
                camera: r.i32(),
                offset: r.vec3(),
            },
            tags::SET_CAMERA_ROTATION => Command::SetCameraRotation {
                camera: r.i32(),
                rotation: r.quat(),
            },
            tags::METADATA_REQUEST => Command::MetadataRequest,
            _ => return Err(DecodeError::UnknownTag(tag)),
        };
        Ok(command)
    }

    /// Encode into the client-side wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FieldWriter::new(self.tag());
        match self {
            Command::Teleport(t) | Command::TeleportStepped(t) => {
                w.teleport(t);
            }
            Command::AddForce2D { force, torque } => {
                w.f32(*force).f32(*torque);
            }
            Command::AddForceStepped { input, duration } => {
                w.f32(input.force)
                    .f32(input.torque)
                    .f32(input.strafe)
                    .f32(*duration);
            }
            Command::SetCaptureRate(rate) => {
                w.i32(*rate);
            }
            Command::AddForce3D(input) => {
                w.f32(input.force).f32(input.torque).f32(input.strafe);
            }
            Command::SetHoverHeight(height) => {
                w.f32(*height);
            }
            Command::SetPositionOrientation(pose) => {
                w.vec3(pose.position).quat(pose.rotation);
            }
            Command::Respawn | Command::QuerySpawnedObjects | Command::MetadataRequest => {}
            Command::SetCollider(enabled) => {
                w.buf.push(*enabled as u8);
            }
            Command::ChangeScene(index) => {
                w.i32(*index);
            }
            Command::SetSeed(seed) => {
                w.i32(*seed);
            }
            Command::SpawnObject(req) => {
                w.i32(req.index)
                    .i32(req.method.code())
                    .vec3(req.pose.position)
                    .quat(req.pose.rotation);
            }
            Command::RemoveObjects(ids) => {
                for id in ids {
                    w.i32(*id);
                }
            }
            Command::ImageRequest(requests) | Command::ImageWithMetadataRequest(requests) => {
                w.camera_requests(requests);
            }
            Command::CameraInfoRequest(camera) => {
                w.i32(*camera);
            }
            Command::SetCameraParams(p) => {
                w.i32(p.camera).i32(p.height).i32(p.width).f32(p.fov);
                if let Some(near) = p.near {
                    w.f32(near);
                    if let Some(far) = p.far {
                        w.f32(far);
                    }
                }
            }
            Command::SetCameraPosition { camera, offset } => {
                w.i32(*camera).vec3(*offset);
            }
            Command::SetCameraRotation { camera, rotation } => {
                w.i32(*camera).quat(*rotation);
            }
        }
        w.finish()
    }

    pub fn tag(&self) -> Tag {
        match self {
            Command::Teleport(_) => tags::TELEPORT,
            Command::TeleportStepped(_) => tags::TELEPORT_STEPPED,
            Command::AddForce2D { .. } => tags::ADD_FORCE_2D,
            Command::AddForceStepped { .. } => tags::ADD_FORCE_STEPPED,
            Command::SetCaptureRate(_) => tags::SET_CAPTURE_RATE,
            Command::AddForce3D(_) => tags::ADD_FORCE_3D,
            Command::SetHoverHeight(_) => tags::SET_HOVER_HEIGHT,
            Command::SetPositionOrientation(_) => tags::SET_POSE,
            Command::Respawn => tags::RESPAWN,
            Command::SetCollider(_) => tags::SET_COLLIDER,
            Command::ChangeScene(_) => tags::CHANGE_SCENE,
            Command::SetSeed(_) => tags::SET_SEED,
            Command::SpawnObject(_) => tags::SPAWN_OBJECT,
            Command::RemoveObjects(_) => tags::REMOVE_OBJECTS,
            Command::QuerySpawnedObjects => tags::QUERY_OBJECTS,
            Command::ImageRequest(_) => tags::IMAGE_REQUEST,
            Command::ImageWithMetadataRequest(_) => tags::IMAGE_WITH_METADATA,
            Command::CameraInfoRequest(_) => tags::CAMERA_INFO,
            Command::SetCameraParams(_) => tags::SET_CAMERA_PARAMS,
            Command::SetCameraPosition { .. } => tags::SET_CAMERA_POSITION,
            Command::SetCameraRotation { .. } => tags::SET_CAMERA_ROTATION,
            Command::MetadataRequest => tags::METADATA_REQUEST,
        }
    }

    pub fn family(&self) -> CommandFamily {
        match self {
            Command::Teleport(_)
            | Command::TeleportStepped(_)
            | Command::AddForce2D { .. }
            | Command::AddForceStepped { .. }
            | Command::AddForce3D(_)
            | Command::SetPositionOrientation(_) => CommandFamily::Movement,
            Command::SetCaptureRate(_) => CommandFamily::CaptureRate,
            Command::SetHoverHeight(_)
            | Command::Respawn
            | Command::SetCollider(_)
            | Command::SetSeed(_) => CommandFamily::Agent,
            Command::ChangeScene(_) => CommandFamily::Scene,
            Command::SpawnObject(_)
            | Command::RemoveObjects(_)
            | Command::QuerySpawnedObjects => CommandFamily::Objects,
            Command::ImageRequest(_) | Command::ImageWithMetadataRequest(_) => {
                CommandFamily::Image
            }
            Command::CameraInfoRequest(_)
            | Command::SetCameraParams(_)
            | Command::SetCameraPosition { .. }
            | Command::SetCameraRotation { .. } => CommandFamily::Camera,
            Command::MetadataRequest => CommandFamily::Metadata,
        }
    }

    /// True for commands that run for exactly one capture frame and are
    /// acknowledged on completion.
    pub fn is_stepped(&self) -> bool {
        matches!(
            self,
            Command::TeleportStepped(_) | Command::AddForceStepped { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: &[u8; 4], fields: &[[u8; 4]]) -> Vec<u8> {
        let mut buf = tag.to_vec();
        for f in fields {
            buf.extend_from_slice(f);
        }
        buf
    }

    #[test]
    fn test_decode_teleport_fields() {
        let bytes = frame(
            b"TLPT",
            &[1.5f32.to_le_bytes(), (-2.0f32).to_le_bytes(), 90.0f32.to_le_bytes()],
        );
        assert_eq!(
            Command::decode(&bytes).unwrap(),
            Command::Teleport(TeleportDelta {
                dx: 1.5,
                dz: -2.0,
                dyaw: 90.0
            })
        );
    }

    #[test]
    fn test_decode_stepped_force_keeps_duration() {
        let bytes = frame(
            b"fBff",
            &[
                1.0f32.to_le_bytes(),
                0.5f32.to_le_bytes(),
                0.0f32.to_le_bytes(),
                0.25f32.to_le_bytes(),
            ],
        );
        match Command::decode(&bytes).unwrap() {
            Command::AddForceStepped { input, duration } => {
                assert_eq!(input.force, 1.0);
                assert_eq!(input.torque, 0.5);
                assert_eq!(duration, 0.25);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_every_kind() {
        let pose = Pose::new(Vec3::new(1.0, 0.0, 1.0), Quat::new(0.0, 0.0, 0.0, 1.0));
        let cams = vec![
            CameraRequest {
                camera: 0,
                compressed: true,
                single_channel: false,
            },
            CameraRequest {
                camera: 3,
                compressed: false,
                single_channel: true,
            },
        ];
        let commands = vec![
            Command::Teleport(TeleportDelta {
                dx: 0.5,
                dz: 1.0,
                dyaw: -10.0,
            }),
            Command::TeleportStepped(TeleportDelta::default()),
            Command::AddForce2D {
                force: 2.0,
                torque: -0.5,
            },
            Command::AddForceStepped {
                input: ForceInput {
                    force: 1.0,
                    torque: 0.0,
                    strafe: 0.25,
                },
                duration: 0.1,
            },
            Command::SetCaptureRate(10),
            Command::AddForce3D(ForceInput {
                force: 1.0,
                torque: 2.0,
                strafe: 3.0,
            }),
            Command::SetHoverHeight(0.75),
            Command::SetPositionOrientation(pose),
            Command::Respawn,
            Command::SetCollider(true),
            Command::SetCollider(false),
            Command::ChangeScene(3),
            Command::SetSeed(-7),
            Command::SpawnObject(SpawnRequest {
                index: 2,
                method: SpawnMethod::Explicit,
                pose,
            }),
            Command::SpawnObject(SpawnRequest {
                index: 0,
                method: SpawnMethod::Unknown(9),
                pose,
            }),
            Command::RemoveObjects(vec![]),
            Command::RemoveObjects(vec![0, 4, 7]),
            Command::QuerySpawnedObjects,
            Command::ImageRequest(cams.clone()),
            Command::ImageWithMetadataRequest(cams),
            Command::CameraInfoRequest(-1),
            Command::SetCameraParams(CameraParams {
                camera: 1,
                height: 480,
                width: 640,
                fov: 60.0,
                near: None,
                far: None,
            }),
            Command::SetCameraParams(CameraParams {
                camera: -1,
                height: 0,
                width: 0,
                fov: 0.0,
                near: Some(0.1),
                far: Some(100.0),
            }),
            Command::SetCameraPosition {
                camera: 2,
                offset: Vec3::new(0.05, 0.0, 0.0),
            },
            Command::SetCameraRotation {
                camera: 2,
                rotation: Quat::from_yaw_degrees(15.0),
            },
            Command::MetadataRequest,
        ];

        for cmd in commands {
            let bytes = cmd.encode();
            assert_eq!(Command::decode(&bytes).as_ref(), Ok(&cmd), "{}", cmd.tag());
        }
    }

    #[test]
    fn test_encoded_lengths_match_layout() {
        assert_eq!(Command::SetPositionOrientation(Pose::default()).encode().len(), 32);
        assert_eq!(
            Command::SpawnObject(SpawnRequest {
                index: 0,
                method: SpawnMethod::Random,
                pose: Pose::default()
            })
            .encode()
            .len(),
            40
        );
        assert_eq!(Command::SetCollider(true).encode().len(), 5);
        assert_eq!(Command::Respawn.encode(), b"RSPN".to_vec());
    }

    #[test]
    fn test_short_messages_never_panic() {
        let samples = [
            Command::Teleport(TeleportDelta::default()).encode(),
            Command::SetPositionOrientation(Pose::default()).encode(),
            Command::ImageRequest(vec![CameraRequest {
                camera: 0,
                compressed: false,
                single_channel: false,
            }])
            .encode(),
            Command::SetCameraParams(CameraParams {
                camera: 0,
                height: 1,
                width: 1,
                fov: 1.0,
                near: None,
                far: None,
            })
            .encode(),
        ];
        for full in samples.iter() {
            for len in 0..full.len() {
                let result = Command::decode(&full[..len]);
                assert!(result.is_err(), "prefix of {} bytes decoded", len);
            }
        }
    }

    #[test]
    fn test_malformed_length_reports_rule() {
        let err = Command::decode(b"CScN\x01\x00").unwrap_err();
        assert_eq!(
            err,
            DecodeError::MalformedLength {
                tag: tags::CHANGE_SCENE,
                expected: LengthRule::Exact(4),
                actual: 2
            }
        );
        assert!(err.to_string().contains("CScN"));
    }

    #[test]
    fn test_unknown_and_truncated() {
        assert_eq!(Command::decode(b"ab"), Err(DecodeError::Truncated(2)));
        assert_eq!(
            Command::decode(b"ZZZZ1234"),
            Err(DecodeError::UnknownTag(Tag(*b"ZZZZ")))
        );
    }

    #[test]
    fn test_remove_objects_rejects_partial_id() {
        assert!(Command::decode(b"oRem\x01\x00\x00").is_err());
        assert_eq!(
            Command::decode(b"oRem").unwrap(),
            Command::RemoveObjects(vec![])
        );
    }

    #[test]
    fn test_image_request_requires_a_camera() {
        assert!(matches!(
            Command::decode(b"rIMG"),
            Err(DecodeError::MalformedLength { .. })
        ));
    }

    #[test]
    fn test_camera_params_optional_clip_planes() {
        let mut bytes = Command::SetCameraParams(CameraParams {
            camera: 0,
            height: 100,
            width: 200,
            fov: 45.0,
            near: None,
            far: None,
        })
        .encode();
        bytes.extend_from_slice(&0.3f32.to_le_bytes());
        match Command::decode(&bytes).unwrap() {
            Command::SetCameraParams(p) => {
                assert_eq!(p.near, Some(0.3));
                assert_eq!(p.far, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_far_without_near_is_not_encoded() {
        let bytes = Command::SetCameraParams(CameraParams {
            camera: 0,
            height: 100,
            width: 200,
            fov: 45.0,
            near: None,
            far: Some(30.0),
        })
        .encode();
        assert_eq!(bytes.len(), 4 + 16);
        match Command::decode(&bytes).unwrap() {
            Command::SetCameraParams(p) => assert_eq!((p.near, p.far), (None, None)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_families() {
        assert_eq!(Command::SetPositionOrientation(Pose::default()).family(), CommandFamily::Movement);
        assert_eq!(Command::SetSeed(1).family(), CommandFamily::Agent);
        assert_eq!(Command::MetadataRequest.family(), CommandFamily::Metadata);
        assert!(Command::TeleportStepped(TeleportDelta::default()).is_stepped());
        assert!(!Command::Teleport(TeleportDelta::default()).is_stepped());
    }
}
