//! Control commands applied between frames.
//!
//! Commands arrive from other threads via a queue owned by the caller and
//! are drained on the simulation thread, so every mutation lands on a frame
//! boundary. Invalid commands are dropped with a debug log rather than
//! surfaced as errors; the queue is fire-and-forget by design.

use crate::matrix::{AttractionMatrix, MatrixGenerator};
use crate::snapshot::WorldSnapshot;
use crate::store::{ParticleStore, SpawnMode};
use crate::{Vec2, WorldState};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// What happens to particles of a removed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeReplacement {
    /// Delete the particles outright.
    Delete,
    /// Reassign them all to the given type (in post-removal numbering).
    Remap(u16),
    /// Reassign each to an independently random surviving type.
    Random,
}

/// Every mutation a controller can request of a running world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Replace the whole attraction matrix. A size mismatch first resizes
    /// the type space to match.
    SetMatrix(AttractionMatrix),
    SetMatrixValue { row: usize, col: usize, value: f32 },
    /// Grow (zero-filled) or shrink (deleting particles of the dropped
    /// types, highest first) the type space.
    SetMatrixSize(usize),
    /// Regenerate the matrix with the configured generator.
    RandomizeMatrix,
    SetGenerator(MatrixGenerator),
    /// Append one type with zeroed coefficients.
    AddType,
    RemoveType { index: u16, replacement: TypeReplacement },
    /// Retarget the particle density (particles per unit area) and grow or
    /// trim the population to match.
    SetDensity(f32),
    RandomizeTypes,
    /// Discard all particles and spawn a fresh population.
    Respawn,
    SetSpawnMode(SpawnMode),
    SetFriction(f32),
    SetHeat(f32),
    SetRMin(f32),
    SetRMax(f32),
    SetForceScale(f32),
    SetWrap(bool),
    SetDt(f32),
    SetPaused(bool),
    SetFollowZoom(f32),
    /// Latch the camera onto the particles around `center`.
    Follow { center: Vec2, radius: f32 },
    StopFollow,
    /// Grab the particles around `center` and displace them by `delta`
    /// with their velocity zeroed.
    Drag { center: Vec2, radius: f32, delta: Vec2 },
    LoadSnapshot(Box<WorldSnapshot>),
}

impl WorldState {
    /// Apply one command. Invalid commands are ignored.
    pub fn apply_command(&mut self, command: Command) {
        match command {
            Command::SetMatrix(matrix) => {
                if matrix.size() == 0 || !matrix.is_consistent() {
                    debug!("dropping malformed replacement matrix");
                    return;
                }
                self.resize_type_space(matrix.size());
                self.matrix = Arc::new(matrix);
            }
            Command::SetMatrixValue { row, col, value } => {
                if row >= self.matrix.size() || col >= self.matrix.size() || !value.is_finite() {
                    debug!(row, col, value, "dropping out-of-range matrix write");
                    return;
                }
                Arc::make_mut(&mut self.matrix).set(row, col, value);
            }
            Command::SetMatrixSize(size) => {
                if size == 0 {
                    debug!("dropping zero matrix size");
                    return;
                }
                self.resize_type_space(size);
            }
            Command::RandomizeMatrix => {
                self.matrix = Arc::new(AttractionMatrix::generate(
                    self.matrix.size(),
                    self.config.generator,
                    &mut self.rng,
                ));
            }
            Command::SetGenerator(generator) => self.config.generator = generator,
            Command::AddType => {
                self.matrix = Arc::new(self.matrix.resized(self.matrix.size() + 1));
                self.config.type_count = self.matrix.size();
            }
            Command::RemoveType { index, replacement } => {
                self.remove_one_type(index, replacement);
            }
            Command::SetDensity(density) => {
                if !(density.is_finite() && density >= 0.0) {
                    debug!(density, "dropping invalid density");
                    return;
                }
                self.config.particle_density = density;
                self.resize_population(self.config.particle_count());
            }
            Command::RandomizeTypes => {
                let type_count = self.matrix.size();
                let Self { store, rng, .. } = self;
                store.randomize_types(type_count, rng);
            }
            Command::Respawn => self.respawn(),
            Command::SetSpawnMode(mode) => self.config.spawn_mode = mode,
            Command::SetFriction(friction) => {
                if friction.is_finite() && friction >= 0.0 {
                    self.config.friction = friction;
                } else {
                    debug!(friction, "dropping invalid friction");
                }
            }
            Command::SetHeat(heat) => {
                if heat.is_finite() && heat >= 0.0 {
                    self.config.heat = heat;
                } else {
                    debug!(heat, "dropping invalid heat");
                }
            }
            Command::SetRMin(r_min) => {
                if r_min.is_finite() && r_min > 0.0 && r_min < self.config.r_max {
                    self.config.r_min = r_min;
                } else {
                    debug!(r_min, "dropping invalid inner radius");
                }
            }
            Command::SetRMax(r_max) => {
                if r_max.is_finite() && r_max > self.config.r_min {
                    self.config.r_max = r_max;
                    // Cutoff change invalidates the cell geometry.
                    self.grid_dirty = true;
                } else {
                    debug!(r_max, "dropping invalid cutoff radius");
                }
            }
            Command::SetForceScale(scale) => {
                if scale.is_finite() {
                    self.config.force_scale = scale;
                } else {
                    debug!(scale, "dropping non-finite force scale");
                }
            }
            Command::SetWrap(wrap) => {
                self.config.wrap = wrap;
                self.grid_dirty = true;
            }
            Command::SetDt(dt) => {
                if dt.is_finite() && dt > 0.0 {
                    self.config.dt = dt;
                } else {
                    debug!(dt, "dropping invalid time step");
                }
            }
            Command::SetPaused(paused) => self.paused = paused,
            Command::SetFollowZoom(zoom) => {
                if zoom.is_finite() && zoom > 0.0 {
                    self.config.follow_zoom = zoom;
                } else {
                    debug!(zoom, "dropping invalid follow zoom");
                }
            }
            Command::Follow { center, radius } => {
                if !self.follow_start(center, radius) {
                    debug!(?center, radius, "not enough particles to follow");
                }
            }
            Command::StopFollow => self.follow_stop(),
            Command::Drag { center, radius, delta } => self.drag(center, radius, delta),
            Command::LoadSnapshot(snapshot) => {
                if let Err(error) = self.load_snapshot(*snapshot) {
                    debug!(%error, "dropping invalid snapshot");
                }
            }
        }
    }

    /// Grow or shrink the type space to `size`, keeping matrix and
    /// particles consistent throughout.
    fn resize_type_space(&mut self, size: usize) {
        while self.matrix.size() > size {
            let last = (self.matrix.size() - 1) as u16;
            self.remove_one_type(last, TypeReplacement::Delete);
        }
        if self.matrix.size() < size {
            self.matrix = Arc::new(self.matrix.resized(size));
            self.config.type_count = size;
        }
    }

    fn remove_one_type(&mut self, index: u16, replacement: TypeReplacement) {
        let size = self.matrix.size();
        if size <= 1 || index as usize >= size {
            debug!(index, size, "dropping type removal");
            return;
        }
        match replacement {
            TypeReplacement::Delete => {
                self.store.remove_type(index);
                self.grid_dirty = true;
                self.camera.stop_follow();
            }
            TypeReplacement::Remap(target) => {
                if target as usize >= size - 1 {
                    debug!(index, target, "dropping remap to a removed type");
                    return;
                }
                self.store.retype_removed(index, || target);
            }
            TypeReplacement::Random => {
                let survivors = (size - 1) as u16;
                let Self { store, rng, .. } = self;
                store.retype_removed(index, || rng.random_range(0..survivors));
            }
        }
        self.matrix = Arc::new(self.matrix.without_type(index as usize));
        self.config.type_count = self.matrix.size();
    }

    fn resize_population(&mut self, target: usize) {
        let type_count = self.matrix.size();
        let (width, height) = (self.config.world_width, self.config.world_height);
        let Self { store, rng, .. } = self;
        if target < store.len() {
            store.truncate_weighted(target, rng);
        } else {
            store.grow_random(target, type_count, width, height, rng);
        }
        self.velocity_scratch.resize(self.store.len(), Vec2::ZERO);
        self.grid_dirty = true;
        self.camera.stop_follow();
    }

    /// Replace the population with a freshly spawned one.
    pub fn respawn(&mut self) {
        self.store = ParticleStore::spawn(
            self.config.particle_count(),
            self.matrix.size(),
            self.config.spawn_mode,
            self.config.world_width,
            self.config.world_height,
            &mut self.rng,
        );
        self.velocity_scratch.resize(self.store.len(), Vec2::ZERO);
        self.grid_dirty = true;
        self.camera.stop_follow();
    }
}
