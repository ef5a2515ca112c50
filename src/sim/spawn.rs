//! Seeded randomness for spawn points, headings and segmentation colours.

use super::room::Room;
use crate::core::types::{Pose, Quat, Vec3};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Uniform};

/// Spawn points generated per scene
const SPAWN_POINTS_PER_SCENE: usize = 8;

#[derive(Clone)]
pub struct SpawnSampler {
    rng: SmallRng,
    points: Vec<Vec3>,
    jitter: f32,
}

impl SpawnSampler {
    /// Seed 0 draws from entropy; anything else is reproducible.
    pub fn new(seed: u64, jitter: f32) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self {
            rng,
            points: Vec::new(),
            jitter: jitter.max(0.0),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Uniform in `[low, high)`; `low` when the range is empty
    pub fn uniform(&mut self, low: f32, high: f32) -> f32 {
        if high <= low {
            return low;
        }
        Uniform::new(low, high).sample(&mut self.rng)
    }

    /// Draw a fresh set of spawn points inside `room`
    pub fn refresh_points(&mut self, room: &Room) {
        let limit = room.walkable_half_extent() * 0.8;
        let points = (0..SPAWN_POINTS_PER_SCENE)
            .map(|_| Vec3::new(self.uniform(-limit, limit), 0.0, self.uniform(-limit, limit)))
            .collect();
        self.points = points;
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// A spawn point plus jitter, kept inside `room`, with a random heading
    pub fn pose(&mut self, room: &Room, height: f32) -> Pose {
        let base = if self.points.is_empty() {
            Vec3::ZERO
        } else {
            let i = self.rng.gen_range(0..self.points.len());
            self.points[i]
        };
        let j = self.jitter;
        let candidate = base + Vec3::new(self.uniform(-j, j), 0.0, self.uniform(-j, j));
        let (mut position, _) = room.confine(candidate);
        position.y = height;
        let heading = self.uniform(0.0, 360.0);
        Pose::new(position, Quat::from_yaw_degrees(heading))
    }

    pub fn color(&mut self) -> [u8; 3] {
        [
            self.rng.gen_range(0..=255),
            self.rng.gen_range(0..=255),
            self.rng.gen_range(0..=255),
        ]
    }
}
