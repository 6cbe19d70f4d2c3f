//! Attraction matrix and its generator strategies.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Square table of per-type-pair force coefficients in `[-1, 1]`.
///
/// `get(a, b)` is the coefficient type `a` feels toward type `b`; the table
/// is asymmetric in general. The size always equals the number of distinct
/// particle types in use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractionMatrix {
    size: usize,
    values: Vec<f32>,
}

impl AttractionMatrix {
    /// Matrix of the given size with every coefficient set to zero.
    #[must_use]
    pub fn zeroed(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    /// Build a matrix of the given size with the chosen generator strategy.
    #[must_use]
    pub fn generate(size: usize, generator: MatrixGenerator, rng: &mut impl Rng) -> Self {
        let mut matrix = Self::zeroed(size);
        match generator {
            MatrixGenerator::Zero => {}
            MatrixGenerator::Random => {
                for value in &mut matrix.values {
                    *value = rng.random_range(-1.0..1.0);
                }
            }
            MatrixGenerator::Chains => {
                for a in 0..size {
                    for b in 0..size {
                        matrix.set(a, b, chain_coefficient(a, b, size, 1.0));
                    }
                }
            }
            MatrixGenerator::RandomChains => {
                for a in 0..size {
                    let self_affinity = rng.random_range(0.2..1.0);
                    for b in 0..size {
                        matrix.set(a, b, chain_coefficient(a, b, size, self_affinity));
                    }
                }
            }
            MatrixGenerator::SymmetricPairs => {
                let base = Self::generate(size, MatrixGenerator::Random, rng);
                for a in 0..size {
                    for b in 0..size {
                        matrix.set(a, b, base.get(a.min(b), a.max(b)));
                    }
                }
            }
        }
        matrix
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Coefficient type `a` feels toward type `b`.
    #[inline]
    #[must_use]
    pub fn get(&self, a: usize, b: usize) -> f32 {
        self.values[a * self.size + b]
    }

    pub fn set(&mut self, a: usize, b: usize, value: f32) {
        self.values[a * self.size + b] = value;
    }

    /// Copy of this matrix resized to `new_size`: the surviving sub-matrix
    /// keeps its values, new entries are zero.
    #[must_use]
    pub fn resized(&self, new_size: usize) -> Self {
        let mut out = Self::zeroed(new_size);
        let keep = self.size.min(new_size);
        for a in 0..keep {
            for b in 0..keep {
                out.set(a, b, self.get(a, b));
            }
        }
        out
    }

    /// Copy of this matrix with the given type's row and column removed.
    #[must_use]
    pub fn without_type(&self, removed: usize) -> Self {
        debug_assert!(removed < self.size);
        let mut out = Self::zeroed(self.size - 1);
        for a in 0..out.size {
            for b in 0..out.size {
                let src_a = if a < removed { a } else { a + 1 };
                let src_b = if b < removed { b } else { b + 1 };
                out.set(a, b, self.get(src_a, src_b));
            }
        }
        out
    }

    /// Whether the flat storage matches the declared size (used to vet
    /// deserialized snapshots).
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.size * self.size
    }
}

/// Chain topology: strong self-affinity, neutral predecessor, weak pull
/// toward the successor type (indices wrap around).
fn chain_coefficient(a: usize, b: usize, size: usize, self_affinity: f32) -> f32 {
    if b == a {
        self_affinity
    } else if b == (a + size - 1) % size {
        0.0
    } else if b == (a + 1) % size {
        0.2
    } else {
        0.0
    }
}

/// Strategies for (re)initializing the attraction matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MatrixGenerator {
    Zero,
    #[default]
    Random,
    Chains,
    RandomChains,
    SymmetricPairs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn resize_preserves_surviving_submatrix() {
        let mut rng = SmallRng::seed_from_u64(1);
        let small = AttractionMatrix::generate(3, MatrixGenerator::Random, &mut rng);
        let grown = small.resized(5);
        assert_eq!(grown.size(), 5);
        for a in 0..3 {
            for b in 0..3 {
                assert_eq!(grown.get(a, b), small.get(a, b));
            }
        }
        for a in 0..5 {
            for b in 3..5 {
                assert_eq!(grown.get(a, b), 0.0);
                assert_eq!(grown.get(b, a), 0.0);
            }
        }
    }

    #[test]
    fn without_type_splices_row_and_column() {
        let mut matrix = AttractionMatrix::zeroed(3);
        for a in 0..3 {
            for b in 0..3 {
                matrix.set(a, b, (a * 10 + b) as f32);
            }
        }
        let reduced = matrix.without_type(1);
        assert_eq!(reduced.size(), 2);
        assert_eq!(reduced.get(0, 0), 0.0);
        assert_eq!(reduced.get(0, 1), 2.0);
        assert_eq!(reduced.get(1, 0), 20.0);
        assert_eq!(reduced.get(1, 1), 22.0);
    }

    #[test]
    fn chains_wrap_around_the_type_ring() {
        let mut rng = SmallRng::seed_from_u64(2);
        let matrix = AttractionMatrix::generate(4, MatrixGenerator::Chains, &mut rng);
        for a in 0..4 {
            assert_eq!(matrix.get(a, a), 1.0);
            assert_eq!(matrix.get(a, (a + 1) % 4), 0.2);
            assert_eq!(matrix.get(a, (a + 3) % 4), 0.0);
        }
    }

    #[test]
    fn symmetric_pairs_mirror_the_upper_triangle() {
        let mut rng = SmallRng::seed_from_u64(3);
        let matrix = AttractionMatrix::generate(6, MatrixGenerator::SymmetricPairs, &mut rng);
        for a in 0..6 {
            for b in 0..6 {
                assert_eq!(matrix.get(a, b), matrix.get(b, a));
            }
        }
    }

    #[test]
    fn random_coefficients_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(4);
        let matrix = AttractionMatrix::generate(8, MatrixGenerator::Random, &mut rng);
        for a in 0..8 {
            for b in 0..8 {
                let value = matrix.get(a, b);
                assert!((-1.0..1.0).contains(&value));
            }
        }
    }
}
