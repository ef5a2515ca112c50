//! Agent rigid body.
//!
//! A point mass hovering at a fixed height that only yaws. Body-frame force
//! and yaw torque are held between steps; linear and angular velocity decay
//! with a single damping coefficient:
//!
//! ```text
//! a = R·F / m - c·v          α = τ / m - c·ω
//! v += a·dt                   ω += α·dt
//! p += v·dt                   yaw += ω·dt
//! ```

use super::room::{Room, Wall};
use crate::core::types::{AgentState, Pose, Quat, Vec3};

#[derive(Debug, Clone)]
pub struct RigidBody {
    position: Vec3,
    rotation: Quat,
    /// World frame
    velocity: Vec3,
    /// Yaw rate (rad/s)
    yaw_rate: f32,
    acceleration: Vec3,
    yaw_acceleration: f32,
    force: Vec3,
    torque: Vec3,
    mass: f32,
    damping: f32,
    hover_height: f32,
}

impl RigidBody {
    pub fn new(mass: f32, damping: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            yaw_rate: 0.0,
            acceleration: Vec3::ZERO,
            yaw_acceleration: 0.0,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            mass: mass.max(f32::EPSILON),
            damping: damping.max(0.0),
            hover_height: 0.0,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// Overwrite the pose and stop all motion
    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.rotation = pose.rotation.normalized();
        self.stop();
    }

    pub fn stop(&mut self) {
        self.velocity = Vec3::ZERO;
        self.yaw_rate = 0.0;
        self.acceleration = Vec3::ZERO;
        self.yaw_acceleration = 0.0;
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    pub fn rotate(&mut self, rotation: Quat) {
        self.rotation = (self.rotation * rotation).normalized();
    }

    pub fn set_hover_height(&mut self, height: f32) {
        self.hover_height = height;
        self.position.y = height;
    }

    pub fn hover_height(&self) -> f32 {
        self.hover_height
    }

    pub fn apply_force(&mut self, force: Vec3, torque: Vec3) {
        self.force = force;
        self.torque = torque;
    }

    /// Currently held body-frame force and torque
    pub fn held_force(&self) -> (Vec3, Vec3) {
        (self.force, self.torque)
    }

    /// Integrate one step. With a room, the body is confined to it and the
    /// wall it ran into (if any) is returned.
    pub fn step(&mut self, dt: f32, room: Option<&Room>) -> Option<Wall> {
        if dt <= 0.0 {
            return None;
        }
        let inv_mass = 1.0 / self.mass;
        let acceleration = self.rotation.rotate(self.force) * inv_mass - self.velocity * self.damping;
        let acceleration = Vec3::new(acceleration.x, 0.0, acceleration.z);
        let yaw_acceleration = self.torque.y * inv_mass - self.yaw_rate * self.damping;

        self.velocity += acceleration * dt;
        self.yaw_rate += yaw_acceleration * dt;
        self.acceleration = acceleration;
        self.yaw_acceleration = yaw_acceleration;

        self.position += self.velocity * dt;
        self.position.y = self.hover_height;
        self.rotate(Quat::from_yaw_degrees((self.yaw_rate * dt).to_degrees()));

        let (confined, wall) = room.map_or((self.position, None), |r| r.confine(self.position));
        if wall.is_some() {
            self.position = confined;
            // Stop motion into the wall, keep sliding along it
            match wall {
                Some(Wall::North | Wall::South) => self.velocity.z = 0.0,
                Some(Wall::East | Wall::West) => self.velocity.x = 0.0,
                None => {}
            }
        }
        wall
    }

    /// Snapshot with body-frame velocities and accelerations
    pub fn state(&self, time: f64, collider_enabled: bool) -> AgentState {
        let to_body = self.rotation.conjugate();
        AgentState {
            pose: self.pose(),
            velocity: to_body.rotate(self.velocity),
            angular_velocity: Vec3::new(0.0, self.yaw_rate, 0.0),
            acceleration: to_body.rotate(self.acceleration),
            angular_acceleration: Vec3::new(0.0, self.yaw_acceleration, 0.0),
            time,
            collider_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_force_moves_forward() {
        let mut body = RigidBody::new(1.0, 0.0);
        body.apply_force(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        for _ in 0..10 {
            body.step(0.1, None);
        }
        let p = body.pose().position;
        assert!(p.z > 0.4, "z = {}", p.z);
        assert!(p.x.abs() < 1e-5);
        let state = body.state(1.0, true);
        assert!((state.velocity.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_force_is_body_frame() {
        let mut body = RigidBody::new(1.0, 0.0);
        body.set_pose(Pose::new(Vec3::ZERO, Quat::from_yaw_degrees(90.0)));
        body.apply_force(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        body.step(0.5, None);
        let p = body.pose().position;
        assert!(p.x > 0.0);
        assert!(p.z.abs() < 1e-5);
    }

    #[test]
    fn test_torque_yaws() {
        let mut body = RigidBody::new(1.0, 0.0);
        body.apply_force(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        body.step(0.5, None);
        assert!(body.pose().rotation.yaw_degrees() > 0.0);
    }

    #[test]
    fn test_damping_decays_velocity() {
        let mut body = RigidBody::new(1.0, 2.0);
        body.apply_force(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        body.step(0.1, None);
        body.apply_force(Vec3::ZERO, Vec3::ZERO);
        let before = body.state(0.0, true).velocity.z;
        body.step(0.1, None);
        assert!(body.state(0.0, true).velocity.z < before);
    }

    #[test]
    fn test_wall_stops_motion() {
        let room = Room::new(1.0);
        let mut body = RigidBody::new(1.0, 0.0);
        body.apply_force(Vec3::new(0.0, 0.0, 100.0), Vec3::ZERO);
        let mut hit = None;
        for _ in 0..10 {
            hit = hit.or(body.step(0.1, Some(&room)));
        }
        assert_eq!(hit, Some(Wall::North));
        assert!(body.pose().position.z <= room.walkable_half_extent() + 1e-6);
    }

    #[test]
    fn test_hover_height_holds() {
        let mut body = RigidBody::new(1.0, 0.5);
        body.set_hover_height(1.5);
        body.step(0.02, None);
        assert_eq!(body.pose().position.y, 1.5);
    }
}
