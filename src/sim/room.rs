//! Axis-aligned square room used as the collision world of every scene.
//!
//! The room is centred on the origin and bounded by four walls in the
//! horizontal (x, z) plane; height is ignored.

use crate::core::types::Vec3;

/// Distance kept between the agent centre and a wall
pub const AGENT_RADIUS: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    /// +z
    North,
    /// -z
    South,
    /// +x
    East,
    /// -x
    West,
}

impl Wall {
    pub fn name(&self) -> &'static str {
        match self {
            Wall::North => "wall_north",
            Wall::South => "wall_south",
            Wall::East => "wall_east",
            Wall::West => "wall_west",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Room {
    half_extent: f32,
}

impl Room {
    pub fn new(half_extent: f32) -> Self {
        Self {
            half_extent: half_extent.max(AGENT_RADIUS * 2.0),
        }
    }

    pub fn half_extent(&self) -> f32 {
        self.half_extent
    }

    /// Half extent of the region the agent centre may occupy
    pub fn walkable_half_extent(&self) -> f32 {
        self.half_extent - AGENT_RADIUS
    }

    /// First wall hit along `direction` from `origin`, if within
    /// `max_distance`. Origins outside the room hit immediately.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<(f32, Wall)> {
        let dir = Vec3::new(direction.x, 0.0, direction.z).normalized();
        if dir.is_zero() {
            return None;
        }
        let h = self.half_extent;
        let mut best: Option<(f32, Wall)> = None;
        let mut consider = |t: f32, wall: Wall| {
            let t = t.max(0.0);
            if best.is_none_or(|(b, _)| t < b) {
                best = Some((t, wall));
            }
        };
        if dir.x > 0.0 {
            consider((h - origin.x) / dir.x, Wall::East);
        } else if dir.x < 0.0 {
            consider((-h - origin.x) / dir.x, Wall::West);
        }
        if dir.z > 0.0 {
            consider((h - origin.z) / dir.z, Wall::North);
        } else if dir.z < 0.0 {
            consider((-h - origin.z) / dir.z, Wall::South);
        }
        best.filter(|(t, _)| *t <= max_distance)
    }

    /// Clamp a position into the walkable region, reporting the wall that
    /// stopped it (the x wall wins when a corner is hit).
    pub fn confine(&self, position: Vec3) -> (Vec3, Option<Wall>) {
        let limit = self.walkable_half_extent();
        let mut confined = position;
        let mut hit = None;
        if position.z > limit {
            confined.z = limit;
            hit = Some(Wall::North);
        } else if position.z < -limit {
            confined.z = -limit;
            hit = Some(Wall::South);
        }
        if position.x > limit {
            confined.x = limit;
            hit = Some(Wall::East);
        } else if position.x < -limit {
            confined.x = -limit;
            hit = Some(Wall::West);
        }
        (confined, hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raycast_hits_facing_wall() {
        let room = Room::new(10.0);
        let (t, wall) = room
            .raycast(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), 20.0)
            .unwrap();
        assert!((t - 10.0).abs() < 1e-5);
        assert_eq!(wall, Wall::North);
    }

    #[test]
    fn test_raycast_respects_max_distance() {
        let room = Room::new(10.0);
        assert!(room.raycast(Vec3::ZERO, Vec3::new(-1.0, 0.0, 0.0), 5.0).is_none());
        let (_, wall) = room
            .raycast(Vec3::new(8.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0), 5.0)
            .unwrap();
        assert_eq!(wall, Wall::East);
    }

    #[test]
    fn test_raycast_vertical_direction_misses() {
        let room = Room::new(10.0);
        assert!(room.raycast(Vec3::ZERO, Vec3::UP, 100.0).is_none());
    }

    #[test]
    fn test_confine() {
        let room = Room::new(5.0);
        let (p, hit) = room.confine(Vec3::new(0.0, 1.0, 9.0));
        assert_eq!(hit, Some(Wall::North));
        assert!((p.z - room.walkable_half_extent()).abs() < 1e-6);
        assert_eq!(p.y, 1.0);

        let inside = Vec3::new(1.0, 0.0, -1.0);
        assert_eq!(room.confine(inside), (inside, None));
    }
}
