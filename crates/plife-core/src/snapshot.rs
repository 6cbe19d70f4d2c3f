//! Serializable capture of a complete world.

use crate::matrix::AttractionMatrix;
use crate::store::ParticleStore;
use crate::{LifeConfig, WorldError};
use serde::{Deserialize, Serialize};

/// Everything needed to reconstruct a world bit-for-bit at frame
/// granularity: configuration, attraction matrix, and particle arrays.
///
/// Transient state (the spatial grid, scratch buffers, camera easing) is
/// deliberately excluded; it is rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub config: LifeConfig,
    pub matrix: AttractionMatrix,
    pub store: ParticleStore,
}

impl WorldSnapshot {
    /// Check internal consistency, rejecting snapshots whose parts
    /// disagree. Deserialized input goes through here before it is allowed
    /// to touch a live world.
    pub fn validate(&self) -> Result<(), WorldError> {
        self.config.validate()?;
        if self.matrix.size() == 0 {
            return Err(WorldError::InvalidConfig("matrix must have at least one type"));
        }
        if !self.matrix.is_consistent() {
            return Err(WorldError::InvalidConfig("matrix storage disagrees with its size"));
        }
        if self.config.type_count != self.matrix.size() {
            return Err(WorldError::InvalidConfig("type count disagrees with matrix size"));
        }
        if !self.store.is_consistent() {
            return Err(WorldError::InvalidConfig("particle arrays disagree in length"));
        }
        if self
            .store
            .types()
            .iter()
            .any(|&ty| ty as usize >= self.matrix.size())
        {
            return Err(WorldError::InvalidConfig("particle type outside the matrix"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec2;

    fn valid_snapshot() -> WorldSnapshot {
        let config = LifeConfig {
            type_count: 2,
            ..LifeConfig::default()
        };
        WorldSnapshot {
            config,
            matrix: AttractionMatrix::zeroed(2),
            store: ParticleStore::from_arrays(
                vec![0, 1, 1],
                vec![Vec2::new(1.0, 1.0); 3],
                vec![Vec2::ZERO; 3],
            ),
        }
    }

    #[test]
    fn valid_snapshot_passes() {
        assert!(valid_snapshot().validate().is_ok());
    }

    #[test]
    fn out_of_range_particle_type_is_rejected() {
        let mut snapshot = valid_snapshot();
        snapshot.store = ParticleStore::from_arrays(
            vec![0, 7],
            vec![Vec2::ZERO; 2],
            vec![Vec2::ZERO; 2],
        );
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn matrix_and_type_count_must_agree() {
        let mut snapshot = valid_snapshot();
        snapshot.matrix = AttractionMatrix::zeroed(5);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn survives_a_serde_round_trip() {
        let snapshot = valid_snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back: WorldSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert!(back.validate().is_ok());
        assert_eq!(back.store, snapshot.store);
        assert_eq!(back.matrix, snapshot.matrix);
    }
}
