use derive_new::new;
use nalgebra::DMatrix;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::{
    config::ModalityPolicy,
    error::{ProdeError, Result},
    input::{DesignMatrix, ScoreMatrix},
    math::{arithmetic_mean, sample_sd},
};

/// Relative tolerance on the diagonal of R below which the design is rank deficient
const RANK_TOLERANCE: f64 = 1e-10;

/// Per-group descriptive statistics of a gene (differential designs only)
#[derive(Debug, Clone, Copy, PartialEq, new)]
pub struct GroupStats {
    pub ctrl_mean: f64,
    pub case_mean: f64,
    pub ctrl_sd: f64,
    pub case_sd: f64,
    pub ctrl_n: usize,
    pub case_n: usize,
}

/// OLS inference on the designated coefficient of a single gene
#[derive(Debug, Clone, PartialEq, new)]
pub struct FitRecord {
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
    pub group_stats: Option<GroupStats>,
}

/// Fit records keyed by gene, in matching order
#[derive(Debug, Clone, Default)]
pub struct FitTable {
    pub genes: Vec<String>,
    pub records: Vec<FitRecord>,
}
impl FitTable {
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Reorders / subsets the table by row indices
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            genes: indices.iter().map(|i| self.genes[*i].clone()).collect(),
            records: indices.iter().map(|i| self.records[*i].clone()).collect(),
        }
    }
}

/// Fits `Y[g, :] ~ X` for every gene against a single factorization of the design
pub struct BatchLinearFitter {
    /// Coefficient projection `(X'X)^-1 X'` (k x n)
    projection: DMatrix<f64>,
    /// Unscaled covariance diagonal entry of the designated coefficient
    unscaled_var: f64,
    design: DMatrix<f64>,
    coefficient: usize,
    df: usize,
    t_dist: StudentsT,
    /// Case membership per sample, present when group statistics are requested
    groups: Option<Vec<bool>>,
}
impl BatchLinearFitter {
    pub fn new(design: &DesignMatrix, policy: ModalityPolicy, group_stats: bool) -> Result<Self> {
        let x = design.values();
        let (n, k) = x.shape();
        if k == 0 {
            return Err(ProdeError::Fitting("design matrix has no columns".to_string()));
        }
        if n <= k {
            return Err(ProdeError::Fitting(format!(
                "{n} samples and {k} covariates leave no residual degrees of freedom"
            )));
        }
        if policy.coefficient >= k {
            return Err(ProdeError::Configuration(format!(
                "design matrix has {k} columns but coefficient {} is required",
                policy.coefficient
            )));
        }

        let qr = x.clone().qr();
        let r = qr.r();
        let max_diag = r.diagonal().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if max_diag == 0.0
            || r
                .diagonal()
                .iter()
                .any(|v| v.abs() <= RANK_TOLERANCE * max_diag)
        {
            return Err(ProdeError::Fitting("design matrix is rank deficient".to_string()));
        }

        let singular = || ProdeError::Fitting("design matrix is rank deficient".to_string());
        let r_inv = r
            .solve_upper_triangular(&DMatrix::identity(k, k))
            .ok_or_else(singular)?;
        let projection = r
            .solve_upper_triangular(&qr.q().transpose())
            .ok_or_else(singular)?;
        let unscaled = &r_inv * r_inv.transpose();

        let df = n - k;
        let t_dist = StudentsT::new(0.0, 1.0, df as f64)
            .map_err(|e| ProdeError::Fitting(format!("invalid t distribution: {e}")))?;

        let groups = if group_stats && policy.differential {
            let groups = x
                .column(policy.coefficient)
                .iter()
                .map(|v| *v != 0.0)
                .collect::<Vec<_>>();
            let n_case = groups.iter().filter(|g| **g).count();
            if n_case == 0 || n_case == n {
                return Err(ProdeError::Configuration(
                    "group column must contain both case and control samples".to_string(),
                ));
            }
            Some(groups)
        } else {
            None
        };

        Ok(Self {
            projection,
            unscaled_var: unscaled[(policy.coefficient, policy.coefficient)],
            design: x.clone(),
            coefficient: policy.coefficient,
            df,
            t_dist,
            groups,
        })
    }

    pub fn df(&self) -> usize {
        self.df
    }

    /// Fits all genes of the score matrix as one batch
    pub fn fit(&self, scores: &ScoreMatrix) -> FitTable {
        let y = scores.values();
        // (m x n) * (n x k): coefficients of every gene at once
        let beta = y * self.projection.transpose();
        let residuals = y - &beta * self.design.transpose();

        let records = (0..y.nrows())
            .map(|g| {
                let estimate = beta[(g, self.coefficient)];
                let rss = residuals.row(g).norm_squared();
                let sigma2 = rss / self.df as f64;
                let std_error = (sigma2 * self.unscaled_var).sqrt();
                let (t_value, p_value) = self.t_test(estimate, std_error);
                let group_stats = self
                    .groups
                    .as_ref()
                    .map(|groups| Self::group_stats(y.row(g).iter().copied(), groups));
                FitRecord::new(estimate, std_error, t_value, p_value, group_stats)
            })
            .collect();

        FitTable {
            genes: scores.genes().to_vec(),
            records,
        }
    }

    /// Two-sided t-test of the estimate
    ///
    /// A row without residual variance gives `t = 0, p = 1` when its estimate is
    /// zero and an infinite t with `p = 0` otherwise. Missing values yield NaN.
    fn t_test(&self, estimate: f64, std_error: f64) -> (f64, f64) {
        if estimate.is_nan() || std_error.is_nan() {
            return (f64::NAN, f64::NAN);
        }
        if std_error == 0.0 {
            return match estimate {
                e if e == 0.0 => (0.0, 1.0),
                e => (f64::INFINITY.copysign(e), 0.0),
            };
        }
        let t_value = estimate / std_error;
        if t_value.is_infinite() {
            return (t_value, 0.0);
        }
        (t_value, 2.0 * self.t_dist.sf(t_value.abs()))
    }

    fn group_stats(row: impl Iterator<Item = f64>, groups: &[bool]) -> GroupStats {
        let (case, ctrl): (Vec<_>, Vec<_>) = row
            .zip(groups.iter())
            .partition(|(_, is_case)| **is_case);
        let case = case.into_iter().map(|(v, _)| v).collect::<Vec<_>>();
        let ctrl = ctrl.into_iter().map(|(v, _)| v).collect::<Vec<_>>();
        GroupStats::new(
            arithmetic_mean(&ctrl),
            arithmetic_mean(&case),
            sample_sd(&ctrl),
            sample_sd(&case),
            ctrl.len(),
            case.len(),
        )
    }
}
