use std::{collections::BTreeMap, panic, panic::RefUnwindSafe};

use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Gamma};

use crate::{
    error::{ProdeError, Result},
    math::{arithmetic_mean, sample_sd},
    null_draw::NullDraw,
};

const TABLE_MAGIC: &str = "#prode-background";
const TABLE_VERSION: &str = "v1";

/// Null distribution of rho as a function of neighborhood size
#[derive(Debug, Clone)]
pub enum BackgroundModel {
    /// Empirical rho values from Monte-Carlo simulation
    Simulated(SimulatedBackground),
    /// Per-size parametric approximation
    Fitted(ParametricBackground),
}
impl BackgroundModel {
    /// P(rho_null <= rho | k)
    pub fn pvalue(&self, rho: f64, neighborhood_size: usize) -> Result<f64> {
        if rho >= 1.0 {
            return Ok(1.0);
        }
        match self {
            BackgroundModel::Simulated(bg) => bg.pvalue(rho, neighborhood_size),
            BackgroundModel::Fitted(bg) => bg.pvalue(rho, neighborhood_size),
        }
    }
}

/// Sorted simulated rho values per neighborhood size
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedBackground {
    nulls: BTreeMap<usize, Vec<f64>>,
}
impl SimulatedBackground {
    /// Simulates `n_iter` null rho values for every size on the current rayon pool
    ///
    /// Work is split into independent [`NullDraw`] units; the merged values are
    /// sorted per size so the result does not depend on completion order or on
    /// the number of threads. A failing unit fails the whole background.
    pub fn simulate(sizes: &[usize], n_iter: usize, seed: u64) -> Result<Self> {
        if n_iter == 0 {
            return Err(ProdeError::Configuration(
                "n_iter must be positive to simulate a background".to_string(),
            ));
        }
        let units = NullDraw::partition(sizes, n_iter, seed);
        log::debug!(
            "simulating background: {} sizes, {} units, {} threads",
            sizes.len(),
            units.len(),
            rayon::current_num_threads()
        );
        let samples = run_units(&units, NullDraw::sample)?;

        let mut nulls: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for (size, values) in samples {
            nulls.entry(size).or_default().extend(values);
        }
        for values in nulls.values_mut() {
            values.sort_unstable_by(f64::total_cmp);
        }
        Ok(Self { nulls })
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nulls.keys().copied()
    }

    pub fn null_values(&self, neighborhood_size: usize) -> Option<&[f64]> {
        self.nulls.get(&neighborhood_size).map(Vec::as_slice)
    }

    /// Empirical p-value with a +1 correction, so it never reaches zero
    pub fn pvalue(&self, rho: f64, neighborhood_size: usize) -> Result<f64> {
        let nulls = self.null_values(neighborhood_size).ok_or_else(|| {
            ProdeError::Background(format!(
                "no simulated background for neighborhood size {neighborhood_size}"
            ))
        })?;
        let below = nulls.partition_point(|x| *x <= rho);
        Ok(((below + 1) as f64 / (nulls.len() + 1) as f64).min(1.0))
    }
}

/// Evaluates every unit in parallel, turning a panicking unit into an error
fn run_units<T, F>(units: &[NullDraw], work: F) -> Result<Vec<(usize, T)>>
where
    T: Send,
    F: Fn(&NullDraw) -> T + Sync + RefUnwindSafe,
{
    units
        .par_iter()
        .map(|unit| {
            panic::catch_unwind(|| work(unit))
                .map(|values| (unit.neighborhood_size(), values))
                .map_err(|_| {
                    ProdeError::Background(format!(
                        "simulation unit failed (size {}, batch {})",
                        unit.neighborhood_size(),
                        unit.batch_index()
                    ))
                })
        })
        .collect()
}

/// Gamma(shape, rate) approximation of the rho null, one per neighborhood size
///
/// Sizes outside the table use the nearest tabulated size. Construction
/// rejects empty tables.
#[derive(Debug, Clone)]
pub struct ParametricBackground {
    params: BTreeMap<usize, Gamma>,
}
impl ParametricBackground {
    pub fn new(entries: impl IntoIterator<Item = (usize, f64, f64)>) -> Result<Self> {
        let params = entries
            .into_iter()
            .map(|(size, shape, rate)| {
                Gamma::new(shape, rate)
                    .map(|dist| (size, dist))
                    .map_err(|e| {
                        ProdeError::Background(format!(
                            "invalid gamma parameters for size {size}: {e}"
                        ))
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        if params.is_empty() {
            return Err(ProdeError::Background(
                "parametric background table is empty".to_string(),
            ));
        }
        Ok(Self { params })
    }

    /// Method-of-moments gamma fit to each simulated size
    pub fn fit(simulated: &SimulatedBackground) -> Result<Self> {
        let entries = simulated
            .nulls
            .iter()
            .map(|(size, values)| {
                let mean = arithmetic_mean(values);
                let var = sample_sd(values).powi(2);
                if !(mean > 0.0 && var > 0.0) {
                    return Err(ProdeError::Background(format!(
                        "cannot fit background for size {size}: mean {mean}, variance {var}"
                    )));
                }
                Ok((*size, mean * mean / var, mean / var))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    /// Simulates and fits a table covering the given sizes
    pub fn calibrate(sizes: &[usize], n_iter: usize, seed: u64) -> Result<Self> {
        let simulated = SimulatedBackground::simulate(sizes, n_iter, seed)?;
        Self::fit(&simulated)
    }

    /// Returns the sizes that will be served by extrapolation
    pub fn uncovered(&self, sizes: &[usize]) -> Vec<usize> {
        sizes
            .iter()
            .copied()
            .filter(|s| !self.params.contains_key(s))
            .collect()
    }

    fn lookup(&self, neighborhood_size: usize) -> Option<&Gamma> {
        let below = self.params.range(..=neighborhood_size).next_back();
        let above = self.params.range(neighborhood_size..).next();
        match (below, above) {
            (Some((lo, lo_dist)), Some((hi, hi_dist))) => {
                if neighborhood_size - lo <= hi - neighborhood_size {
                    Some(lo_dist)
                } else {
                    Some(hi_dist)
                }
            }
            (Some((_, dist)), None) | (None, Some((_, dist))) => Some(dist),
            (None, None) => None,
        }
    }

    pub fn pvalue(&self, rho: f64, neighborhood_size: usize) -> Result<f64> {
        if rho >= 1.0 {
            return Ok(1.0);
        }
        let dist = self.lookup(neighborhood_size).ok_or_else(|| {
            ProdeError::Background(format!(
                "no parametric background for neighborhood size {neighborhood_size}"
            ))
        })?;
        Ok(dist.cdf(rho.max(0.0)).clamp(f64::MIN_POSITIVE, 1.0))
    }

    /// Serializes the table as versioned TSV
    pub fn to_table(&self) -> String {
        let mut out = format!("{TABLE_MAGIC}\t{TABLE_VERSION}\nsize\tshape\trate\n");
        for (size, dist) in &self.params {
            out.push_str(&format!("{}\t{}\t{}\n", size, dist.shape(), dist.rate()));
        }
        out
    }

    /// Parses a table written by [`ParametricBackground::to_table`]
    pub fn from_table(table: &str) -> Result<Self> {
        let malformed = |msg: String| ProdeError::Background(format!("malformed table: {msg}"));
        let mut lines = table.lines().filter(|l| !l.trim().is_empty());
        match lines.next().map(|l| l.split('\t').collect::<Vec<_>>()) {
            Some(header) if header == [TABLE_MAGIC, TABLE_VERSION] => {}
            other => return Err(malformed(format!("unexpected header {other:?}"))),
        }
        if lines.next() != Some("size\tshape\trate") {
            return Err(malformed("missing column header".to_string()));
        }
        let entries = lines
            .map(|line| {
                let fields = line.split('\t').collect::<Vec<_>>();
                let [size, shape, rate] = fields.as_slice() else {
                    return Err(malformed(format!("expected 3 fields in {line:?}")));
                };
                let size = size
                    .parse::<usize>()
                    .map_err(|e| malformed(format!("size {size:?}: {e}")))?;
                let shape = shape
                    .parse::<f64>()
                    .map_err(|e| malformed(format!("shape {shape:?}: {e}")))?;
                let rate = rate
                    .parse::<f64>()
                    .map_err(|e| malformed(format!("rate {rate:?}: {e}")))?;
                Ok((size, shape, rate))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }
}
