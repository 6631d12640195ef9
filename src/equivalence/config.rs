// Scoring configuration: category weights and thresholds

use crate::error::ConfigError;
use crate::graph::ResourceCategory;
use serde::{Deserialize, Serialize};

/// Tolerance when checking that weights sum to one
const WEIGHT_EPSILON: f64 = 1e-6;

/// Relative importance of each resource category in the aggregate score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub file: f64,
    pub library: f64,
    pub network: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            file: 0.4,
            library: 0.3,
            network: 0.3,
        }
    }
}

impl CategoryWeights {
    pub fn new(file: f64, library: f64, network: f64) -> Self {
        Self {
            file,
            library,
            network,
        }
    }

    pub fn get(&self, category: ResourceCategory) -> f64 {
        match category {
            ResourceCategory::File => self.file,
            ResourceCategory::Library => self.library,
            ResourceCategory::Network => self.network,
        }
    }

    pub fn sum(&self) -> f64 {
        self.file + self.library + self.network
    }

    /// Each weight in `[0, 1]` and the total equal to 1.0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = [self.file, self.library, self.network]
            .iter()
            .all(|w| (0.0..=1.0).contains(w));
        if !in_range || (self.sum() - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ConfigError::InvalidWeights {
                file: self.file,
                library: self.library,
                network: self.network,
            });
        }
        Ok(())
    }
}

/// Equivalence scoring parameters
///
/// # Example
/// ```
/// use dozer::equivalence::ScoreConfig;
///
/// let config = ScoreConfig::default();
/// assert_eq!(config.threshold, 0.85);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub weights: CategoryWeights,

    /// Aggregate score at or above which the verdict is Pass
    pub threshold: f64,

    /// Minimum pairwise similarity for a fuzzy match between resources that
    /// are not identical on both sides
    pub match_threshold: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            threshold: 0.85,
            match_threshold: 0.7,
        }
    }
}

impl ScoreConfig {
    /// Higher bar for Pass, fewer fuzzy matches
    pub fn strict() -> Self {
        Self {
            weights: CategoryWeights::default(),
            threshold: 0.95,
            match_threshold: 0.85,
        }
    }

    /// Tolerates more drift between the two executions
    pub fn permissive() -> Self {
        Self {
            weights: CategoryWeights::default(),
            threshold: 0.7,
            match_threshold: 0.6,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        for (name, value) in [
            ("threshold", self.threshold),
            ("match_threshold", self.match_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScoreConfig::default();
        assert_eq!(config.weights, CategoryWeights::new(0.4, 0.3, 0.3));
        assert_eq!(config.threshold, 0.85);
        assert_eq!(config.match_threshold, 0.7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(ScoreConfig::strict().validate().is_ok());
        assert!(ScoreConfig::permissive().validate().is_ok());
        assert!(ScoreConfig::strict().threshold > ScoreConfig::permissive().threshold);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = CategoryWeights::new(0.5, 0.5, 0.5);
        assert!(matches!(
            weights.validate(),
            Err(ConfigError::InvalidWeights { .. })
        ));
        assert!(CategoryWeights::new(1.0, 0.0, 0.0).validate().is_ok());
        assert!(CategoryWeights::new(1.2, -0.1, -0.1).validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_threshold() {
        let mut config = ScoreConfig::default();
        config.threshold = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                name: "threshold",
                value: 1.5
            })
        );
    }

    #[test]
    fn test_weight_lookup() {
        let weights = CategoryWeights::default();
        assert_eq!(weights.get(ResourceCategory::Library), 0.3);
        assert!((weights.sum() - 1.0).abs() < 1e-12);
    }
}
