//! Pairwise force kernel and the parallel velocity pass.

use crate::matrix::AttractionMatrix;
use crate::{LifeConfig, Vec2};
use plife_index::{SpatialGrid, min_image};
use rayon::prelude::*;
use std::sync::Arc;

/// Dimensionless force between two particles at the given distance.
///
/// Below `r_min` the force is a repulsion ramp from `-1` at contact to `0`
/// at `r_min`, independent of the attraction coefficient. Between `r_min`
/// and `r_max` it is a triangular profile peaking at `attraction` midway
/// between the two radii. At `r_max` and beyond it is zero.
#[inline]
#[must_use]
pub fn force_magnitude(distance: f32, r_min: f32, r_max: f32, attraction: f32) -> f32 {
    if distance < r_min {
        distance / r_min - 1.0
    } else if distance < r_max {
        attraction * (1.0 - (2.0 * distance - r_min - r_max).abs() / (r_max - r_min))
    } else {
        0.0
    }
}

/// Frozen per-frame physics parameters.
///
/// Captured once at the start of a frame so every worker sees the same
/// values even if a command mutates the live configuration between frames.
#[derive(Debug, Clone)]
pub struct StepParams {
    pub width: f32,
    pub height: f32,
    pub r_min: f32,
    pub r_max: f32,
    pub r_max_squared: f32,
    pub force_scale: f32,
    pub dt: f32,
    pub wrap: bool,
    /// Friction applied multiplicatively after force accumulation,
    /// floored at zero so large `friction * dt` stops particles instead
    /// of reversing them.
    pub one_minus_friction_dt: f32,
    matrix: Arc<AttractionMatrix>,
}

impl StepParams {
    #[must_use]
    pub fn new(config: &LifeConfig, matrix: Arc<AttractionMatrix>) -> Self {
        Self {
            width: config.world_width,
            height: config.world_height,
            r_min: config.r_min,
            r_max: config.r_max,
            r_max_squared: config.r_max * config.r_max,
            force_scale: config.force_scale,
            dt: config.dt,
            wrap: config.wrap,
            one_minus_friction_dt: (1.0 - config.friction * config.dt).max(0.0),
            matrix,
        }
    }

    /// Attraction coefficient type `a` feels toward type `b`.
    #[inline]
    #[must_use]
    pub fn attraction(&self, a: u16, b: u16) -> f32 {
        self.matrix.get(a as usize, b as usize)
    }
}

/// Strategy for advancing one particle's velocity across a frame.
///
/// Implementations must be pure with respect to their inputs; the parallel
/// pass invokes them concurrently over disjoint particles.
pub trait ForceLaw: Sync {
    /// New velocity for `subject` after accumulating this frame's forces
    /// from `candidates` (particle indices near the subject, possibly
    /// including the subject itself).
    fn update_velocity(
        &self,
        params: &StepParams,
        positions: &[Vec2],
        types: &[u16],
        candidates: &[u32],
        subject: u32,
        velocity: Vec2,
    ) -> Vec2;
}

/// The standard short-range law: close-range repulsion, a triangular
/// attraction profile out to the cutoff, boundary reflection in bounded
/// worlds, then friction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardForceLaw;

impl ForceLaw for StandardForceLaw {
    fn update_velocity(
        &self,
        params: &StepParams,
        positions: &[Vec2],
        types: &[u16],
        candidates: &[u32],
        subject: u32,
        velocity: Vec2,
    ) -> Vec2 {
        let position = positions[subject as usize];
        let subject_type = types[subject as usize];
        let mut velocity = velocity;

        for &other in candidates {
            if other == subject {
                continue;
            }
            let mut dx = positions[other as usize].x - position.x;
            let mut dy = positions[other as usize].y - position.y;
            if params.wrap {
                dx = min_image(dx, params.width);
                dy = min_image(dy, params.height);
            }
            let dist_sq = dx * dx + dy * dy;
            // Coincident particles have no direction to push along.
            if dist_sq >= params.r_max_squared || dist_sq <= 0.0 {
                continue;
            }
            let distance = dist_sq.sqrt();
            let attraction = params.attraction(subject_type, types[other as usize]);
            let force = force_magnitude(distance, params.r_min, params.r_max, attraction);
            let factor = params.force_scale * force / distance * params.dt;
            velocity.x += dx * factor;
            velocity.y += dy * factor;
        }

        if !params.wrap {
            // Reflect any component that would carry the particle out of
            // bounds on the next position update.
            let next_x = position.x + velocity.x * params.dt;
            if next_x < 0.0 || next_x > params.width {
                velocity.x = -velocity.x;
            }
            let next_y = position.y + velocity.y * params.dt;
            if next_y < 0.0 || next_y > params.height {
                velocity.y = -velocity.y;
            }
        }

        velocity.x *= params.one_minus_friction_dt;
        velocity.y *= params.one_minus_friction_dt;
        velocity
    }
}

/// Evaluate the force law for every particle in parallel, cell by cell,
/// writing the new velocities into `scratch` (index-aligned with the
/// inputs). Old velocities are read-only for the whole pass, so every
/// particle sees the same frame-start state regardless of evaluation order.
pub(crate) fn parallel_velocity_pass(
    params: &StepParams,
    grid: &SpatialGrid,
    types: &[u16],
    positions: &[Vec2],
    velocities: &[Vec2],
    law: &dyn ForceLaw,
    scratch: &mut [Vec2],
) {
    debug_assert_eq!(positions.len(), scratch.len());

    let per_cell: Vec<(usize, Vec<Vec2>)> = (0..grid.cell_count())
        .into_par_iter()
        .map(|cell_index| {
            let members = grid.cell(cell_index);
            if members.is_empty() {
                return (cell_index, Vec::new());
            }
            let (cx, cy) = grid.cell_position(cell_index);
            let mut candidates = members.to_vec();
            for neighbor in grid.neighbor_cells(cx, cy, 1, 1, false, params.wrap) {
                candidates.extend_from_slice(grid.cell(neighbor));
            }

            let updated = members
                .iter()
                .map(|&subject| {
                    law.update_velocity(
                        params,
                        positions,
                        types,
                        &candidates,
                        subject,
                        velocities[subject as usize],
                    )
                })
                .collect();
            (cell_index, updated)
        })
        .collect();

    for (cell_index, updated) in per_cell {
        for (&subject, velocity) in grid.cell(cell_index).iter().zip(updated) {
            scratch[subject as usize] = velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixGenerator;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn kernel_boundary_values() {
        let (r_min, r_max) = (10.0, 40.0);
        assert_eq!(force_magnitude(0.0, r_min, r_max, 0.7), -1.0);
        assert_eq!(force_magnitude(r_min, r_min, r_max, 0.7), 0.0);
        assert_eq!(force_magnitude(r_max, r_min, r_max, 0.7), 0.0);
        assert_eq!(force_magnitude(r_max + 5.0, r_min, r_max, 0.7), 0.0);
    }

    #[test]
    fn kernel_peaks_at_midpoint() {
        let (r_min, r_max) = (10.0, 40.0);
        let mid = (r_min + r_max) / 2.0;
        assert!(approx_eq(force_magnitude(mid, r_min, r_max, 0.7), 0.7));
        assert!(approx_eq(force_magnitude(mid, r_min, r_max, -0.4), -0.4));
        // Halfway up the ramp on either side of the peak.
        let quarter = force_magnitude((r_min + mid) / 2.0, r_min, r_max, 1.0);
        assert!(approx_eq(quarter, 0.5));
    }

    #[test]
    fn repulsion_ignores_attraction_coefficient() {
        for attraction in [-1.0, 0.0, 1.0] {
            assert_eq!(force_magnitude(5.0, 10.0, 40.0, attraction), -0.5);
        }
    }

    #[test]
    fn friction_factor_floors_at_zero() {
        let config = LifeConfig {
            friction: 100.0,
            dt: 0.02,
            ..LifeConfig::default()
        };
        let matrix = Arc::new(AttractionMatrix::zeroed(config.type_count));
        let params = StepParams::new(&config, matrix);
        assert_eq!(params.one_minus_friction_dt, 0.0);
    }

    #[test]
    fn coincident_particles_produce_finite_velocities() {
        let config = LifeConfig::default();
        let matrix = Arc::new(AttractionMatrix::zeroed(config.type_count));
        let params = StepParams::new(&config, matrix);
        let positions = vec![Vec2::new(50.0, 50.0); 2];
        let types = vec![0_u16; 2];

        let velocity = StandardForceLaw.update_velocity(
            &params,
            &positions,
            &types,
            &[0, 1],
            0,
            Vec2::ZERO,
        );
        assert!(velocity.x.is_finite() && velocity.y.is_finite());
        assert_eq!(velocity, Vec2::ZERO);
    }

    #[test]
    fn bounded_world_reflects_escaping_velocity() {
        let config = LifeConfig {
            wrap: false,
            friction: 0.0,
            ..LifeConfig::default()
        };
        let matrix = Arc::new(AttractionMatrix::zeroed(config.type_count));
        let params = StepParams::new(&config, matrix);

        let positions = vec![Vec2::new(0.5, 200.0)];
        let types = vec![0_u16];
        let inbound = Vec2::new(-100.0, 0.0);
        let velocity =
            StandardForceLaw.update_velocity(&params, &positions, &types, &[0], 0, inbound);
        assert_eq!(velocity, Vec2::new(100.0, 0.0));
    }

    #[test]
    fn parallel_pass_matches_direct_evaluation() {
        use plife_index::SpatialGrid;
        use rand::{Rng, SeedableRng, rngs::SmallRng};

        let config = LifeConfig {
            world_width: 200.0,
            world_height: 200.0,
            ..LifeConfig::default()
        };
        let mut rng = SmallRng::seed_from_u64(11);
        let matrix = Arc::new(AttractionMatrix::generate(
            config.type_count,
            MatrixGenerator::Random,
            &mut rng,
        ));
        let params = StepParams::new(&config, Arc::clone(&matrix));

        let count = 400;
        let positions: Vec<Vec2> = (0..count)
            .map(|_| Vec2::new(rng.random::<f32>() * 200.0, rng.random::<f32>() * 200.0))
            .collect();
        let types: Vec<u16> = (0..count)
            .map(|_| rng.random_range(0..config.type_count as u16))
            .collect();
        let velocities = vec![Vec2::ZERO; count];

        let mut grid = SpatialGrid::new(200.0, 200.0, config.r_max).expect("grid");
        grid.fill(count as u32, config.wrap, |i| {
            let p = positions[i as usize];
            (p.x, p.y)
        });

        let mut scratch = vec![Vec2::ZERO; count];
        parallel_velocity_pass(
            &params,
            &grid,
            &types,
            &positions,
            &velocities,
            &StandardForceLaw,
            &mut scratch,
        );

        // Brute force over all pairs must agree with the grid-accelerated pass.
        let everyone: Vec<u32> = (0..count as u32).collect();
        for subject in 0..count as u32 {
            let expected = StandardForceLaw.update_velocity(
                &params,
                &positions,
                &types,
                &everyone,
                subject,
                Vec2::ZERO,
            );
            let got = scratch[subject as usize];
            // Summation order differs between the two candidate lists, so
            // allow for float accumulation drift.
            let tolerance = 1e-3 * (1.0 + expected.x.abs().max(expected.y.abs()));
            assert!(
                (expected.x - got.x).abs() < tolerance && (expected.y - got.y).abs() < tolerance,
                "particle {subject}: expected {expected:?}, got {got:?}"
            );
        }
    }
}
