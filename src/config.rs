use adjustp::{adjust, Procedure};
use bon::Builder;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{
    background::ParametricBackground,
    error::{ProdeError, Result},
    input::Modality,
};

/// Per-modality behavior of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalityPolicy {
    /// Design column whose coefficient is reported as the gene estimate
    pub coefficient: usize,
    /// Whether samples split into case/control groups
    pub differential: bool,
}

impl Modality {
    pub fn policy(&self) -> ModalityPolicy {
        match self {
            Modality::Nie => ModalityPolicy {
                coefficient: 0,
                differential: false,
            },
            Modality::Nice => ModalityPolicy {
                coefficient: 1,
                differential: true,
            },
        }
    }
}

/// Multiple testing correction applied to p-values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FdrMethod {
    #[default]
    BenjaminiHochberg,
    BenjaminiYekutieli,
    Bonferroni,
}
impl FdrMethod {
    /// Adjusts p-values in input order
    ///
    /// Non-finite p-values are treated as 1 so they never outrank a real test.
    pub fn adjust(&self, pvalues: &[f64]) -> Vec<f64> {
        if pvalues.is_empty() {
            return Vec::new();
        }
        let pvalues = pvalues
            .iter()
            .map(|p| if p.is_finite() { *p } else { 1.0 })
            .collect::<Vec<_>>();
        let procedure = match self {
            FdrMethod::BenjaminiHochberg => Procedure::BenjaminiHochberg,
            FdrMethod::BenjaminiYekutieli => Procedure::BenjaminiYekutieli,
            FdrMethod::Bonferroni => Procedure::Bonferroni,
        };
        adjust(&pvalues, procedure)
    }
}

/// User-facing run configuration
#[derive(Debug, Clone, Builder)]
pub struct ProdeConfig {
    /// Rank genes on the t-statistic instead of the raw coefficient
    #[builder(default = true)]
    pub scaled_est: bool,
    /// Simulate the rho background instead of using the parametric fit
    #[builder(default = false)]
    pub compute_background: bool,
    /// Drop genes with a positive control-group mean (NICE only)
    #[builder(default = false)]
    pub filter_ctrl: bool,
    /// Simulation draws per neighborhood size
    #[builder(default = 10_000)]
    pub n_iter: usize,
    /// Worker threads for every parallel stage of a run
    #[builder(default = 1)]
    pub workers: usize,
    /// Report per-group mean / sd / n (NICE only)
    #[builder(default = false)]
    pub extended_stats: bool,
    #[builder(default = 42)]
    pub seed: u64,
    #[builder(default)]
    pub fdr: FdrMethod,
    /// Simulation draws per size used to calibrate a parametric table in-run
    #[builder(default = 2_000)]
    pub calibration_iter: usize,
    /// Shipped parametric background; calibrated in-run when absent
    pub background_table: Option<ParametricBackground>,
}

impl Default for ProdeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configuration after validation and modality forcing
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub modality: Modality,
    pub policy: ModalityPolicy,
    pub scaled_est: bool,
    pub filter_ctrl: bool,
    pub extended_stats: bool,
    /// Group statistics are needed either for reporting or for control filtering
    pub group_stats: bool,
}

impl ProdeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ProdeError::Configuration(
                "workers must be a positive integer".to_string(),
            ));
        }
        if self.compute_background && self.n_iter == 0 {
            return Err(ProdeError::Configuration(
                "n_iter must be positive when computing the background".to_string(),
            ));
        }
        if !self.compute_background
            && self.background_table.is_none()
            && self.calibration_iter < 2
        {
            return Err(ProdeError::Configuration(
                "calibration_iter must be at least 2 to fit a parametric background".to_string(),
            ));
        }
        Ok(())
    }

    /// Thread pool bounding every parallel stage of a run
    pub fn worker_pool(&self) -> Result<ThreadPool> {
        if self.workers == 0 {
            return Err(ProdeError::Configuration(
                "workers must be a positive integer".to_string(),
            ));
        }
        ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| ProdeError::Configuration(format!("cannot start worker pool: {e}")))
    }

    /// Validates the flags and applies the modality policy
    pub fn resolve(&self, modality: Modality) -> Result<ResolvedConfig> {
        self.validate()?;
        let policy = modality.policy();
        let filter_ctrl = self.filter_ctrl && policy.differential;
        let extended_stats = self.extended_stats && policy.differential;
        if self.filter_ctrl && !filter_ctrl {
            log::debug!("filter_ctrl ignored for {modality:?}");
        }
        if self.extended_stats && !extended_stats {
            log::debug!("extended_stats ignored for {modality:?}");
        }
        Ok(ResolvedConfig {
            modality,
            policy,
            scaled_est: self.scaled_est,
            filter_ctrl,
            extended_stats,
            group_stats: filter_ctrl || extended_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = ProdeConfig::default();
        assert!(config.scaled_est);
        assert!(!config.compute_background);
        assert!(!config.filter_ctrl);
        assert_eq!(config.n_iter, 10_000);
        assert_eq!(config.workers, 1);
        assert!(!config.extended_stats);
        assert_eq!(config.fdr, FdrMethod::BenjaminiHochberg);
        assert!(config.background_table.is_none());
    }

    #[test]
    fn test_nie_forces_flags_false() {
        let config = ProdeConfig::builder()
            .filter_ctrl(true)
            .extended_stats(true)
            .build();
        let resolved = config.resolve(Modality::Nie).unwrap();
        assert!(!resolved.filter_ctrl);
        assert!(!resolved.extended_stats);
        assert!(!resolved.group_stats);
        assert_eq!(resolved.policy.coefficient, 0);
    }

    #[test]
    fn test_nice_filter_implies_group_stats() {
        let config = ProdeConfig::builder().filter_ctrl(true).build();
        let resolved = config.resolve(Modality::Nice).unwrap();
        assert!(resolved.filter_ctrl);
        assert!(!resolved.extended_stats);
        assert!(resolved.group_stats);
        assert_eq!(resolved.policy.coefficient, 1);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = ProdeConfig::builder()
            .compute_background(true)
            .n_iter(0)
            .build();
        assert!(matches!(
            config.validate(),
            Err(ProdeError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ProdeConfig::builder().workers(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fdr_bonferroni() {
        let adjusted = FdrMethod::Bonferroni.adjust(&[0.01, 0.2, 0.3]);
        assert_relative_eq!(adjusted[0], 0.03, epsilon = 1e-12);
        assert_relative_eq!(adjusted[1], 0.6, epsilon = 1e-12);
        assert_relative_eq!(adjusted[2], 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_fdr_benjamini_hochberg() {
        let adjusted = FdrMethod::BenjaminiHochberg.adjust(&[0.01, 0.04, 0.03]);
        assert_relative_eq!(adjusted[0], 0.03, epsilon = 1e-12);
        assert_relative_eq!(adjusted[1], 0.04, epsilon = 1e-12);
        assert_relative_eq!(adjusted[2], 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_fdr_empty() {
        assert!(FdrMethod::BenjaminiHochberg.adjust(&[]).is_empty());
    }

    #[test]
    fn test_fdr_non_finite_counts_as_one() {
        let adjusted = FdrMethod::Bonferroni.adjust(&[0.01, f64::NAN, 0.2]);
        assert_relative_eq!(adjusted[0], 0.03, epsilon = 1e-12);
        assert_relative_eq!(adjusted[1], 1.0);
        assert_relative_eq!(adjusted[2], 0.6, epsilon = 1e-12);
        assert!(FdrMethod::BenjaminiHochberg
            .adjust(&[f64::NAN, 0.04, 0.03])
            .iter()
            .all(|p| p.is_finite()));
    }

    #[test]
    fn test_worker_pool_size() {
        let pool = ProdeConfig::default().worker_pool().unwrap();
        assert_eq!(pool.install(rayon::current_num_threads), 1);
        let pool = ProdeConfig::builder().workers(3).build().worker_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }

    #[test]
    fn test_worker_pool_rejects_zero() {
        let config = ProdeConfig::builder().workers(0).build();
        assert!(matches!(config.worker_pool(), Err(ProdeError::Configuration(_))));
    }
}
