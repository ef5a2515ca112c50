//! Command queue shared by the listener threads and the tick driver.
//!
//! # Slots
//!
//! The queue holds at most one pending command per family. A later arrival
//! overwrites the earlier unconsumed one and records its sender as the
//! family's requester:
//!
//! | Slot | Commands | Requester kept |
//! |------|----------|----------------|
//! | movement | teleport, force, absolute pose (real-time or stepped) | no |
//! | capture_rate | `fScR` | no |
//! | hover / respawn / collider / seed | agent toggles | no |
//! | scene | `CScN` | yes |
//! | objects | spawn, remove, query | yes |
//! | image | `rIMG` / `tIMG` | yes |
//! | camera | info, params, position, rotation | yes |
//! | metadata | `rMET` | yes |
//!
//! # Locking
//!
//! One `parking_lot::Mutex` guards the slots and the [`SessionState`].
//! Admission checks read the session under the same lock as the overwrite,
//! and [`CommandQueue::drain_tick`] applies the session transitions implied
//! by the drained commands before releasing it, so a listener never sees a
//! drained-but-not-started stepped command. Critical sections only move
//! fields; sockets handed back by the queue are closed by the caller.

use super::session::{
    ExecutionMode, SessionSnapshot, SessionState, StepProgress, Transition,
};
use crate::core::types::{Pose, Quat, Vec3};
use crate::protocol::{
    CameraParams, CameraRequest, Command, ForceInput, SpawnRequest, TeleportDelta,
};
use parking_lot::Mutex;
use std::net::{SocketAddr, TcpStream};

/// Movement applied by the tick driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Movement {
    Teleport(TeleportDelta),
    Force(ForceInput),
    Pose(Pose),
}

#[derive(Debug)]
pub struct PendingMovement {
    pub movement: Movement,
    /// Runs for one capture frame and is acknowledged on completion
    pub stepped: bool,
    /// Step-port connection waiting for the `ack`
    pub ack: Option<TcpStream>,
}

/// A pending request together with the address its reply goes to
#[derive(Debug, Clone, PartialEq)]
pub struct Addressed<T> {
    pub value: T,
    pub requester: SocketAddr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectCommand {
    Spawn(SpawnRequest),
    /// Remove listed ids; empty removes everything
    Remove(Vec<i32>),
    Query,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub cameras: Vec<CameraRequest>,
    pub with_metadata: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraCommand {
    Info(i32),
    Params(CameraParams),
    Position { camera: i32, offset: Vec3 },
    Rotation { camera: i32, rotation: Quat },
}

/// Latest pending command of every family
#[derive(Debug, Default)]
pub struct PendingCommands {
    pub movement: Option<PendingMovement>,
    pub capture_rate: Option<u32>,
    pub hover_height: Option<f32>,
    pub respawn: bool,
    pub collider: Option<bool>,
    pub seed: Option<i32>,
    pub scene: Option<Addressed<i32>>,
    pub objects: Option<Addressed<ObjectCommand>>,
    pub image: Option<Addressed<ImageRequest>>,
    pub camera: Option<Addressed<CameraCommand>>,
    pub metadata: Option<SocketAddr>,
}

impl PendingCommands {
    pub fn is_empty(&self) -> bool {
        self.movement.is_none()
            && self.capture_rate.is_none()
            && self.hover_height.is_none()
            && !self.respawn
            && self.collider.is_none()
            && self.seed.is_none()
            && self.scene.is_none()
            && self.objects.is_none()
            && self.image.is_none()
            && self.camera.is_none()
            && self.metadata.is_none()
    }
}

/// Everything one tick has to act on
#[derive(Debug)]
pub struct TickBatch {
    pub commands: PendingCommands,
    /// Capture-rate switch applied by this drain
    pub transition: Option<Transition>,
    /// A stepped command started with this drain
    pub step_started: bool,
    /// Session state after this drain
    pub session: SessionSnapshot,
    /// Step connections that can no longer be acknowledged; close them
    pub dropped_acks: Vec<TcpStream>,
}

impl TickBatch {
    /// True when nothing was drained and no transition happened
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.transition.is_none() && !self.step_started
    }
}

/// Why a command was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("real-time movement while capture rate is active")]
    CaptureRateActive,
    #[error("stepped command while capture rate is 0")]
    RealTimeMode,
    #[error("a stepped command is already in flight")]
    CommandInFlight,
    #[error("a stepped command is already pending")]
    StepPending,
    #[error("a capture-rate change is pending")]
    RateChangePending,
    #[error("negative capture rate {0}")]
    InvalidRate(i32),
}

/// Rejected command; `ack` is handed back so the caller closes it
#[derive(Debug)]
pub struct Rejected {
    pub reason: RejectReason,
    pub ack: Option<TcpStream>,
}

/// Accepted command; a stepped command displaced by this one loses its
/// acknowledgement channel, which the caller closes
#[derive(Debug, Default)]
pub struct Admitted {
    pub displaced_ack: Option<TcpStream>,
}

struct Shared {
    pending: PendingCommands,
    session: SessionState,
}

impl Shared {
    fn step_pending(&self) -> bool {
        self.pending.movement.as_ref().is_some_and(|m| m.stepped)
    }

    /// Capture rate the session will run at once pending changes apply
    fn effective_rate(&self) -> u32 {
        self.pending
            .capture_rate
            .unwrap_or_else(|| self.session.capture_rate())
    }

    fn check_admission(&self, command: &Command) -> Result<(), RejectReason> {
        match command {
            Command::Teleport(_) | Command::AddForce2D { .. } | Command::AddForce3D(_) => {
                if self.effective_rate() != 0 {
                    return Err(RejectReason::CaptureRateActive);
                }
            }
            Command::TeleportStepped(_) | Command::AddForceStepped { .. } => {
                if self.session.capture_rate() == 0 {
                    return Err(RejectReason::RealTimeMode);
                }
                if self.pending.capture_rate.is_some() {
                    return Err(RejectReason::RateChangePending);
                }
                if !self.session.is_idle() {
                    return Err(RejectReason::CommandInFlight);
                }
                if self.step_pending() {
                    return Err(RejectReason::StepPending);
                }
            }
            Command::SetCaptureRate(rate) => {
                if *rate < 0 {
                    return Err(RejectReason::InvalidRate(*rate));
                }
                if !self.session.is_idle() {
                    return Err(RejectReason::CommandInFlight);
                }
                if self.step_pending() {
                    return Err(RejectReason::StepPending);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn set_movement(&mut self, movement: Movement, stepped: bool, ack: Option<TcpStream>) -> Admitted {
        let displaced = self
            .pending
            .movement
            .replace(PendingMovement {
                movement,
                stepped,
                ack,
            })
            .and_then(|old| old.ack);
        Admitted {
            displaced_ack: displaced,
        }
    }

    fn store(&mut self, command: Command, requester: SocketAddr, ack: Option<TcpStream>) -> Admitted {
        let (movement, stepped) = match command {
            Command::Teleport(t) => (Movement::Teleport(t), false),
            Command::TeleportStepped(t) => (Movement::Teleport(t), true),
            Command::AddForce2D { force, torque } => (
                Movement::Force(ForceInput {
                    force,
                    torque,
                    strafe: 0.0,
                }),
                false,
            ),
            Command::AddForceStepped { input, .. } => (Movement::Force(input), true),
            Command::AddForce3D(input) => (Movement::Force(input), false),
            Command::SetPositionOrientation(pose) => (Movement::Pose(pose), false),
            other => {
                self.store_request(other, requester);
                return Admitted::default();
            }
        };
        self.set_movement(movement, stepped, if stepped { ack } else { None })
    }

    fn store_request(&mut self, command: Command, requester: SocketAddr) {
        let p = &mut self.pending;
        let objects = |value| Some(Addressed { value, requester });
        let camera = |value| Some(Addressed { value, requester });
        let image = |cameras, with_metadata| {
            Some(Addressed {
                value: ImageRequest {
                    cameras,
                    with_metadata,
                },
                requester,
            })
        };
        match command {
            Command::SetCaptureRate(rate) => p.capture_rate = Some(rate.max(0) as u32),
            Command::SetHoverHeight(h) => p.hover_height = Some(h),
            Command::Respawn => p.respawn = true,
            Command::SetCollider(enabled) => p.collider = Some(enabled),
            Command::SetSeed(seed) => p.seed = Some(seed),
            Command::ChangeScene(index) => {
                p.scene = Some(Addressed {
                    value: index,
                    requester,
                })
            }
            Command::SpawnObject(req) => p.objects = objects(ObjectCommand::Spawn(req)),
            Command::RemoveObjects(ids) => p.objects = objects(ObjectCommand::Remove(ids)),
            Command::QuerySpawnedObjects => p.objects = objects(ObjectCommand::Query),
            Command::ImageRequest(cameras) => p.image = image(cameras, false),
            Command::ImageWithMetadataRequest(cameras) => p.image = image(cameras, true),
            Command::CameraInfoRequest(id) => p.camera = camera(CameraCommand::Info(id)),
            Command::SetCameraParams(params) => p.camera = camera(CameraCommand::Params(params)),
            Command::SetCameraPosition { camera: id, offset } => {
                p.camera = camera(CameraCommand::Position { camera: id, offset })
            }
            Command::SetCameraRotation { camera: id, rotation } => {
                p.camera = camera(CameraCommand::Rotation {
                    camera: id,
                    rotation,
                })
            }
            Command::MetadataRequest => p.metadata = Some(requester),
            // Movement is stored by `store`
            Command::Teleport(_)
            | Command::TeleportStepped(_)
            | Command::AddForce2D { .. }
            | Command::AddForceStepped { .. }
            | Command::AddForce3D(_)
            | Command::SetPositionOrientation(_) => {}
        }
    }
}

/// Mutex-guarded pending commands plus session state
pub struct CommandQueue {
    inner: Mutex<Shared>,
}

impl CommandQueue {
    pub fn new(session: SessionState) -> Self {
        Self {
            inner: Mutex::new(Shared {
                pending: PendingCommands::default(),
                session,
            }),
        }
    }

    /// Admit and store a command from `requester`.
    ///
    /// `ack` is the step-port connection of a stepped command; it stays
    /// open until the command completes.
    pub fn publish(
        &self,
        command: Command,
        requester: SocketAddr,
        ack: Option<TcpStream>,
    ) -> Result<Admitted, Rejected> {
        let mut shared = self.inner.lock();
        if let Err(reason) = shared.check_admission(&command) {
            return Err(Rejected { reason, ack });
        }
        Ok(shared.store(command, requester, ack))
    }

    /// Take every pending command for this tick.
    ///
    /// Applies the capture-rate switch and starts a pending stepped command
    /// in the same critical section. While a stepped command is executing,
    /// image requests stay queued so they observe the completed step.
    pub fn drain_tick(&self) -> TickBatch {
        let mut shared = self.inner.lock();
        let executing = shared.session.mode() == ExecutionMode::Executing;
        let held_image = if executing {
            shared.pending.image.take()
        } else {
            None
        };

        let mut commands = std::mem::take(&mut shared.pending);
        shared.pending.image = held_image;

        let mut transition = None;
        if let Some(rate) = commands.capture_rate.take() {
            match shared.session.set_capture_rate(rate) {
                Some(t) => transition = Some(t),
                // In flight: keep it for a later tick
                None => shared.pending.capture_rate = Some(rate),
            }
        }

        let mut step_started = false;
        let mut dropped_acks = Vec::new();
        if let Some(pending) = commands.movement.take() {
            if pending.stepped {
                match shared.session.begin_step(pending.ack) {
                    Ok(()) => {
                        step_started = true;
                        commands.movement = Some(PendingMovement {
                            movement: pending.movement,
                            stepped: true,
                            ack: None,
                        });
                    }
                    Err(ack) => dropped_acks.extend(ack),
                }
            } else {
                commands.movement = Some(pending);
            }
        }

        TickBatch {
            commands,
            transition,
            step_started,
            session: shared.session.snapshot(),
            dropped_acks,
        }
    }

    /// Advance the in-flight stepped command by one tick of `dt` seconds.
    pub fn finish_tick(&self, dt: f64) -> StepProgress {
        self.inner.lock().session.advance(dt)
    }

    pub fn session(&self) -> SessionSnapshot {
        self.inner.lock().session.snapshot()
    }
}
