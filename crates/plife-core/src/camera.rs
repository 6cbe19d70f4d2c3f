//! Smoothed camera that follows a frozen pool of tracked particles.

use crate::Vec2;
use plife_index::SpatialGrid;
use serde::{Deserialize, Serialize};

/// Tuning knobs for the follow camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Most particles ever admitted to the tracking pool.
    pub max_pool: usize,
    /// Fewest particles required for a follow to start.
    pub min_pool: usize,
    /// Pool dispersion (2D standard deviation) beyond which the follow
    /// automatically disengages.
    pub max_deviation: f32,
    /// Exponential easing rate for the focus point, per second.
    pub focus_rate: f32,
    /// Exponential easing rate for the zoom level, per second.
    pub zoom_rate: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            max_pool: 50,
            min_pool: 5,
            max_deviation: 150.0,
            focus_rate: 10.0,
            zoom_rate: 10.0,
        }
    }
}

/// Focus/zoom state eased toward a target each frame.
///
/// While following, the target focus is the centroid of a pool of particle
/// indices frozen at follow start; the pool is never re-selected, so the
/// camera stays with the cluster it latched onto until the cluster
/// disperses or a structural mutation invalidates the indices.
#[derive(Debug, Clone)]
pub struct CameraFollow {
    config: CameraConfig,
    home: Vec2,
    pool: Vec<u32>,
    focus: Vec2,
    focus_target: Vec2,
    zoom: f32,
    zoom_target: f32,
}

impl CameraFollow {
    #[must_use]
    pub fn new(config: CameraConfig, home: Vec2) -> Self {
        Self {
            config,
            home,
            pool: Vec::new(),
            focus: home,
            focus_target: home,
            zoom: 1.0,
            zoom_target: 1.0,
        }
    }

    #[must_use]
    pub fn focus(&self) -> Vec2 {
        self.focus
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    #[must_use]
    pub fn is_following(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Try to start following the particles within `radius` of `target`.
    ///
    /// Freezes up to `max_pool` of them as the tracking pool. Returns
    /// `false` (and stays disengaged) when fewer than `min_pool` particles
    /// are in range.
    pub fn start_follow(
        &mut self,
        grid: &SpatialGrid,
        positions: &[Vec2],
        wrap: bool,
        target: Vec2,
        radius: f32,
        zoom: f32,
    ) -> bool {
        let mut pool = Vec::new();
        grid.for_each_within(
            target.x,
            target.y,
            radius,
            wrap,
            |i| {
                let p = positions[i as usize];
                (p.x, p.y)
            },
            &mut |particle, _dist_sq| {
                if pool.len() < self.config.max_pool {
                    pool.push(particle);
                }
            },
        );

        if pool.len() < self.config.min_pool {
            return false;
        }
        self.pool = pool;
        self.zoom_target = zoom;
        true
    }

    /// Disengage and ease back to the world center at unit zoom.
    pub fn stop_follow(&mut self) {
        self.pool.clear();
        self.focus_target = self.home;
        self.zoom_target = 1.0;
    }

    /// Advance the easing by `dt` seconds, retargeting onto the pool
    /// centroid first when following.
    pub fn update(&mut self, dt: f32, positions: &[Vec2]) {
        if !self.pool.is_empty() {
            // Structural mutations are expected to stop the follow before
            // indices go stale; a stale pool here disengages instead of
            // panicking.
            if self.pool.iter().any(|&i| i as usize >= positions.len()) {
                self.stop_follow();
            } else {
                let n = self.pool.len() as f32;
                let mut centroid = Vec2::ZERO;
                for &i in &self.pool {
                    centroid.x += positions[i as usize].x;
                    centroid.y += positions[i as usize].y;
                }
                centroid.x /= n;
                centroid.y /= n;

                let mut variance = 0.0;
                for &i in &self.pool {
                    let dx = positions[i as usize].x - centroid.x;
                    let dy = positions[i as usize].y - centroid.y;
                    variance += dx * dx + dy * dy;
                }
                if (variance / n).sqrt() > self.config.max_deviation {
                    self.stop_follow();
                } else {
                    self.focus_target = centroid;
                }
            }
        }

        self.focus.x = ease(self.focus.x, self.focus_target.x, self.config.focus_rate, dt);
        self.focus.y = ease(self.focus.y, self.focus_target.y, self.config.focus_rate, dt);
        self.zoom = ease(self.zoom, self.zoom_target, self.config.zoom_rate, dt);
    }
}

/// Frame-rate independent exponential approach of `value` toward `target`.
#[inline]
fn ease(value: f32, target: f32, rate: f32, dt: f32) -> f32 {
    target + (value - target) * (-rate * dt).exp()
}
