//! Structure-of-arrays particle storage and spawn layouts.

use crate::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Initial particle layouts, selectable per respawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SpawnMode {
    #[default]
    Uniform,
    CenteredGaussian,
    Disc,
    CenteredDisc,
    Ring,
    Spiral,
    Line,
    TwoDiscs,
}

/// Parallel arrays holding every particle's type, position, and velocity.
///
/// Particle identity is the array index; density- and type-changing
/// mutations rebuild all three arrays together so the equal-length
/// invariant can never be observed broken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleStore {
    types: Vec<u16>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
}

impl ParticleStore {
    /// Assemble a store from pre-built arrays.
    ///
    /// Panics if the arrays disagree in length; callers validate untrusted
    /// input (snapshots) before reaching this point.
    #[must_use]
    pub fn from_arrays(types: Vec<u16>, positions: Vec<Vec2>, velocities: Vec<Vec2>) -> Self {
        assert_eq!(types.len(), positions.len(), "store arrays must align");
        assert_eq!(types.len(), velocities.len(), "store arrays must align");
        Self {
            types,
            positions,
            velocities,
        }
    }

    /// Spawn `count` particles of random types with zero velocity, laid out
    /// according to the spawn mode.
    #[must_use]
    pub fn spawn(
        count: usize,
        type_count: usize,
        mode: SpawnMode,
        width: f32,
        height: f32,
        rng: &mut impl Rng,
    ) -> Self {
        let mut types = Vec::with_capacity(count);
        let mut positions = Vec::with_capacity(count);
        let radius = width.min(height) / 4.0;

        for _ in 0..count {
            let position = match mode {
                SpawnMode::Uniform => {
                    Vec2::new(rng.random::<f32>() * width, rng.random::<f32>() * height)
                }
                SpawnMode::CenteredGaussian => {
                    let r = radius * gaussian(rng);
                    polar(width, height, rng, r)
                }
                SpawnMode::Disc => {
                    let r = radius * rng.random::<f32>().sqrt();
                    polar(width, height, rng, r)
                }
                SpawnMode::CenteredDisc => {
                    let r = radius * rng.random::<f32>();
                    polar(width, height, rng, r)
                }
                SpawnMode::Ring => {
                    let r = radius * (1.0 + 0.05 * (1.0 - 2.0 * rng.random::<f32>()));
                    polar(width, height, rng, r)
                }
                SpawnMode::Spiral => {
                    let f = rng.random::<f32>();
                    let angle = TAU * f;
                    let r = radius * f.sqrt() + radius * 0.1 * rng.random::<f32>();
                    Vec2::new(
                        width / 2.0 + r * angle.cos(),
                        height / 2.0 + r * angle.sin(),
                    )
                }
                SpawnMode::Line => Vec2::new(
                    rng.random::<f32>() * width,
                    height / 2.0 * (1.0 + 0.05 * (1.0 - 2.0 * rng.random::<f32>())),
                ),
                SpawnMode::TwoDiscs => {
                    let angle = TAU * rng.random::<f32>();
                    let r = radius * rng.random::<f32>().sqrt() / std::f32::consts::SQRT_2;
                    let center_x = width * if rng.random_bool(0.5) { 0.25 } else { 0.75 };
                    Vec2::new(center_x + r * angle.cos(), height / 2.0 + r * angle.sin())
                }
            };
            types.push(rng.random_range(0..type_count as u16));
            positions.push(position);
        }

        let velocities = vec![Vec2::ZERO; count];
        Self {
            types,
            positions,
            velocities,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[must_use]
    pub fn types(&self) -> &[u16] {
        &self.types
    }

    #[must_use]
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    #[must_use]
    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    /// Whether the three arrays agree in length (used to vet deserialized
    /// snapshots; live stores hold this by construction).
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.types.len() == self.positions.len() && self.types.len() == self.velocities.len()
    }

    pub(crate) fn positions_velocities_mut(&mut self) -> (&mut [Vec2], &mut [Vec2]) {
        (&mut self.positions, &mut self.velocities)
    }

    /// Replace the live velocity array with `scratch`, handing the previous
    /// array back as the next frame's scratch buffer.
    pub(crate) fn swap_velocities(&mut self, scratch: &mut Vec<Vec2>) {
        std::mem::swap(&mut self.velocities, scratch);
    }

    /// Reassign every particle a fresh random type.
    pub(crate) fn randomize_types(&mut self, type_count: usize, rng: &mut impl Rng) {
        for ty in &mut self.types {
            *ty = rng.random_range(0..type_count as u16);
        }
    }

    /// Trim down to `target` particles by kicking survivors out with
    /// probability `excess / len`, preserving the relative order and
    /// index alignment of everything that stays.
    pub(crate) fn truncate_weighted(&mut self, target: usize, rng: &mut impl Rng) {
        let len = self.len();
        if target >= len {
            return;
        }
        let mut excess = len - target;
        let kick_probability = excess as f64 / len as f64;

        let mut kept = 0;
        for i in 0..len {
            if kept == target {
                break;
            }
            if excess > 0 && rng.random::<f64>() < kick_probability {
                excess -= 1;
            } else {
                self.types[kept] = self.types[i];
                self.positions[kept] = self.positions[i];
                self.velocities[kept] = self.velocities[i];
                kept += 1;
            }
        }
        self.types.truncate(kept);
        self.positions.truncate(kept);
        self.velocities.truncate(kept);
    }

    /// Grow to `target` particles by appending fresh ones: random type,
    /// uniform random position, zero velocity. Existing particles are left
    /// untouched.
    pub(crate) fn grow_random(
        &mut self,
        target: usize,
        type_count: usize,
        width: f32,
        height: f32,
        rng: &mut impl Rng,
    ) {
        while self.len() < target {
            self.types.push(rng.random_range(0..type_count as u16));
            self.positions.push(Vec2::new(
                rng.random::<f32>() * width,
                rng.random::<f32>() * height,
            ));
            self.velocities.push(Vec2::ZERO);
        }
    }

    /// Delete every particle of the removed type and renumber the types
    /// above it, keeping survivor order and attribute alignment.
    pub(crate) fn remove_type(&mut self, removed: u16) {
        let mut kept = 0;
        for i in 0..self.len() {
            let ty = self.types[i];
            if ty == removed {
                continue;
            }
            self.types[kept] = if ty > removed { ty - 1 } else { ty };
            self.positions[kept] = self.positions[i];
            self.velocities[kept] = self.velocities[i];
            kept += 1;
        }
        self.types.truncate(kept);
        self.positions.truncate(kept);
        self.velocities.truncate(kept);
    }

    /// Reassign particles of the removed type via `replacement` (which
    /// returns a type id in the post-removal numbering) and renumber the
    /// types above it. The particle count is preserved.
    pub(crate) fn retype_removed(&mut self, removed: u16, mut replacement: impl FnMut() -> u16) {
        for ty in &mut self.types {
            if *ty == removed {
                *ty = replacement();
            } else if *ty > removed {
                *ty -= 1;
            }
        }
    }
}

fn polar(width: f32, height: f32, rng: &mut impl Rng, r: f32) -> Vec2 {
    let angle = TAU * rng.random::<f32>();
    Vec2::new(width / 2.0 + r * angle.cos(), height / 2.0 + r * angle.sin())
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut impl Rng) -> f32 {
    let u1 = rng.random::<f32>().clamp(f32::MIN_POSITIVE, 1.0);
    let u2 = rng.random::<f32>();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn spawn_produces_aligned_arrays_with_zero_velocity() {
        let mut rng = SmallRng::seed_from_u64(5);
        for mode in [
            SpawnMode::Uniform,
            SpawnMode::CenteredGaussian,
            SpawnMode::Disc,
            SpawnMode::CenteredDisc,
            SpawnMode::Ring,
            SpawnMode::Spiral,
            SpawnMode::Line,
            SpawnMode::TwoDiscs,
        ] {
            let store = ParticleStore::spawn(128, 4, mode, 400.0, 300.0, &mut rng);
            assert_eq!(store.len(), 128);
            assert!(store.is_consistent());
            assert!(store.velocities().iter().all(|v| *v == Vec2::ZERO));
            assert!(store.types().iter().all(|&t| t < 4));
        }
    }

    #[test]
    fn ring_spawn_stays_in_the_annulus() {
        let mut rng = SmallRng::seed_from_u64(9);
        let store = ParticleStore::spawn(256, 4, SpawnMode::Ring, 400.0, 400.0, &mut rng);
        // Radius 100 with a 5% wobble on either side.
        for p in store.positions() {
            let r = (p.x - 200.0).hypot(p.y - 200.0);
            assert!((94.99..=105.01).contains(&r), "off the ring: {p:?} (r={r})");
        }
    }

    #[test]
    fn disc_spawns_fill_the_central_disc() {
        let mut rng = SmallRng::seed_from_u64(10);
        for mode in [SpawnMode::Disc, SpawnMode::CenteredDisc] {
            let store = ParticleStore::spawn(256, 4, mode, 400.0, 400.0, &mut rng);
            for p in store.positions() {
                let r = (p.x - 200.0).hypot(p.y - 200.0);
                assert!(r <= 100.0 + 1e-3, "escaped disc: {p:?} (r={r})");
            }
        }
    }

    #[test]
    fn weighted_truncation_preserves_survivor_alignment() {
        let mut rng = SmallRng::seed_from_u64(6);
        let mut store = ParticleStore::spawn(500, 3, SpawnMode::Uniform, 100.0, 100.0, &mut rng);
        let before = store.clone();

        store.truncate_weighted(200, &mut rng);
        assert!(store.len() <= 200);
        assert!(store.is_consistent());

        // Every survivor must be an intact (type, position, velocity) triple
        // from the original store, in the original relative order.
        let mut cursor = 0;
        for i in 0..store.len() {
            let found = (cursor..before.len()).find(|&j| {
                before.types()[j] == store.types()[i]
                    && before.positions()[j] == store.positions()[i]
            });
            let j = found.expect("survivor must come from the original store");
            cursor = j + 1;
        }
    }

    #[test]
    fn grow_appends_without_touching_existing_particles() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut store = ParticleStore::spawn(100, 3, SpawnMode::Uniform, 100.0, 100.0, &mut rng);
        let before = store.clone();

        store.grow_random(250, 3, 100.0, 100.0, &mut rng);
        assert_eq!(store.len(), 250);
        assert_eq!(&store.types()[..100], before.types());
        assert_eq!(&store.positions()[..100], before.positions());
        assert_eq!(&store.velocities()[..100], before.velocities());
        assert!(store.velocities()[100..].iter().all(|v| *v == Vec2::ZERO));
    }

    #[test]
    fn remove_type_renumbers_higher_types() {
        let types = vec![0_u16, 1, 2, 1, 2, 0];
        let positions: Vec<Vec2> = (0..6).map(|i| Vec2::new(i as f32, 0.0)).collect();
        let velocities = vec![Vec2::ZERO; 6];
        let mut store = ParticleStore::from_arrays(types, positions, velocities);

        store.remove_type(1);
        assert_eq!(store.types(), &[0, 1, 1, 0]);
        let xs: Vec<f32> = store.positions().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn retype_keeps_count_and_renumbers() {
        let types = vec![0_u16, 1, 2, 1];
        let positions = vec![Vec2::ZERO; 4];
        let velocities = vec![Vec2::ZERO; 4];
        let mut store = ParticleStore::from_arrays(types, positions, velocities);

        store.retype_removed(1, || 0);
        assert_eq!(store.len(), 4);
        assert_eq!(store.types(), &[0, 0, 1, 0]);
    }
}
