use crate::{DetailLevel, geometry};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the crossway engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct Config {
    /// Tolerance in degrees under which a segment endpoint counts as touching
    /// another segment. Default: 1e-9
    pub intersection_epsilon: f64,
    /// How many times a propagation write is retried after a version conflict
    /// before the operation gives up. Default: 3
    pub max_conflict_retries: u32,
    /// Detail level requested from the store for intersection candidates.
    /// Intersections are only as precise as this geometry. Default: `Full`
    pub intersection_detail: DetailLevel,
    /// Page size used when the engine walks a store query to exhaustion
    /// (place cleanup and reconciliation). Default: 100
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intersection_epsilon: geometry::EPSILON,
            max_conflict_retries: 3,
            intersection_detail: DetailLevel::Full,
            page_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.intersection_epsilon, 1e-9);
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.intersection_detail, DetailLevel::Full);
        assert_eq!(config.page_size, 100);
    }
}
