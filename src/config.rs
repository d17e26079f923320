use std::path::PathBuf;

use crate::error::AttackError;

/// Parameters of the approximate attack (AppSAT).
#[derive(Debug, Clone, PartialEq)]
pub struct AppSatParams {
    /// Stop once the measured error stays strictly below this rate.
    pub error_threshold: f64,
    /// Measure the error every `nb_di_queries` DI rounds.
    pub nb_di_queries: usize,
    /// Random inputs drawn per measurement.
    pub nb_random_vectors: usize,
    /// Consecutive good measurements required to stop.
    pub settle_threshold: usize,
    /// Cap on failing random vectors added as constraints per measurement.
    /// `None` uses the current number of test vectors.
    pub max_constraints: Option<usize>,
}

impl AppSatParams {
    pub fn validate(&self) -> Result<(), AttackError> {
        if !self.error_threshold.is_finite() || !(0.0..=1.0).contains(&self.error_threshold) {
            return Err(AttackError::InvalidConfig(format!(
                "error threshold must be in [0, 1], got {}",
                self.error_threshold
            )));
        }
        if self.nb_di_queries == 0 {
            return Err(AttackError::InvalidConfig(
                "the number of DI queries between measurements must be positive".to_string(),
            ));
        }
        if self.nb_random_vectors == 0 {
            return Err(AttackError::InvalidConfig(
                "the number of random vectors must be positive".to_string(),
            ));
        }
        if self.settle_threshold == 0 {
            return Err(AttackError::InvalidConfig(
                "the settle threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which protocol the controller runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AttackMode {
    Exact,
    Approximate(AppSatParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackConfig {
    pub nb_initial_vectors: usize,
    /// A non-zero threshold selects AppSAT.
    pub error_threshold: f64,
    pub nb_di_queries: usize,
    pub nb_random_vectors: usize,
    pub settle_threshold: usize,
    pub max_constraints: Option<usize>,
    /// Per-query solver time limit, in seconds.
    pub time_limit: Option<f64>,
    pub seed: u64,
    /// Where to dump the key-search CNF.
    pub cnf_file: Option<PathBuf>,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            nb_initial_vectors: 1024,
            error_threshold: 0.0,
            nb_di_queries: 8,
            nb_random_vectors: 1000,
            settle_threshold: 3,
            max_constraints: None,
            time_limit: None,
            seed: 0,
            cnf_file: None,
        }
    }
}

impl AttackConfig {
    pub fn mode(&self) -> AttackMode {
        if self.error_threshold == 0.0 {
            AttackMode::Exact
        } else {
            AttackMode::Approximate(AppSatParams {
                error_threshold: self.error_threshold,
                nb_di_queries: self.nb_di_queries,
                nb_random_vectors: self.nb_random_vectors,
                settle_threshold: self.settle_threshold,
                max_constraints: self.max_constraints,
            })
        }
    }

    pub fn validate(&self) -> Result<(), AttackError> {
        if !self.error_threshold.is_finite() || !(0.0..=1.0).contains(&self.error_threshold) {
            return Err(AttackError::InvalidConfig(format!(
                "error threshold must be in [0, 1], got {}",
                self.error_threshold
            )));
        }
        if let Some(limit) = self.time_limit {
            if limit.is_nan() || limit <= 0.0 {
                return Err(AttackError::InvalidConfig(format!(
                    "time limit must be positive, got {}",
                    limit
                )));
            }
        }
        if let AttackMode::Approximate(params) = self.mode() {
            params.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_exact() {
        let config = AttackConfig::default();
        assert_eq!(config.mode(), AttackMode::Exact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_selects_appsat() {
        let config = AttackConfig {
            error_threshold: 0.01,
            ..Default::default()
        };
        match config.mode() {
            AttackMode::Approximate(params) => {
                assert_eq!(params.error_threshold, 0.01);
                assert_eq!(params.nb_di_queries, 8);
                assert_eq!(params.settle_threshold, 3);
            }
            AttackMode::Exact => panic!("expected AppSAT"),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let bad = [
            AttackConfig {
                error_threshold: -0.5,
                ..Default::default()
            },
            AttackConfig {
                error_threshold: f64::NAN,
                ..Default::default()
            },
            AttackConfig {
                time_limit: Some(0.0),
                ..Default::default()
            },
            AttackConfig {
                error_threshold: 0.1,
                nb_di_queries: 0,
                ..Default::default()
            },
            AttackConfig {
                error_threshold: 0.1,
                nb_random_vectors: 0,
                ..Default::default()
            },
            AttackConfig {
                error_threshold: 0.1,
                settle_threshold: 0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(AttackError::InvalidConfig(_))),
                "{:?}",
                config
            );
        }
    }

    #[test]
    fn test_appsat_params_validate() {
        let good = AppSatParams {
            error_threshold: 0.05,
            nb_di_queries: 1,
            nb_random_vectors: 100,
            settle_threshold: 2,
            max_constraints: None,
        };
        assert!(good.validate().is_ok());
        for params in [
            AppSatParams {
                nb_random_vectors: 0,
                ..good.clone()
            },
            AppSatParams {
                nb_di_queries: 0,
                ..good.clone()
            },
            AppSatParams {
                settle_threshold: 0,
                ..good.clone()
            },
            AppSatParams {
                error_threshold: 1.5,
                ..good.clone()
            },
        ] {
            assert!(matches!(params.validate(), Err(AttackError::InvalidConfig(_))));
        }
    }
}
