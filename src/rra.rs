use derive_new::new;
use itertools::Itertools;
use rayon::prelude::*;

use crate::{
    background::BackgroundModel,
    config::FdrMethod,
    error::{ProdeError, Result},
    input::AdjacencyMatrix,
    math::rho_statistic,
    utils::select_indices,
};

/// Raw rho of one gene's neighborhood
#[derive(Debug, Clone, Copy, PartialEq, new)]
pub struct RhoScore {
    /// Position of the gene in the filtered adjacency
    pub index: usize,
    pub rho: f64,
    pub neighborhood_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, new)]
pub struct RraRecord {
    pub rho: f64,
    pub p_value: f64,
    pub fdr: f64,
    pub neighborhood_size: usize,
}

/// Neighborhood statistics for every gene with at least one neighbor
#[derive(Debug, Clone, Default)]
pub struct RraTable {
    pub genes: Vec<String>,
    pub records: Vec<RraRecord>,
}
impl RraTable {
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Aggregates neighbor percentiles into a rho per gene
pub struct RhoAggregator<'a> {
    percentiles: &'a [f64],
    adjacency: &'a AdjacencyMatrix,
}
impl<'a> RhoAggregator<'a> {
    /// `percentiles` must follow the gene order of `adjacency`
    pub fn new(percentiles: &'a [f64], adjacency: &'a AdjacencyMatrix) -> Result<Self> {
        if percentiles.len() != adjacency.len() {
            return Err(ProdeError::Consistency(format!(
                "{} percentiles for {} network genes",
                percentiles.len(),
                adjacency.len()
            )));
        }
        Ok(Self {
            percentiles,
            adjacency,
        })
    }

    /// Rho for every gene with a non-empty neighborhood, in adjacency order
    ///
    /// Runs on the current rayon pool.
    pub fn aggregate(&self) -> Vec<RhoScore> {
        (0..self.adjacency.len())
            .into_par_iter()
            .filter_map(|index| self.process_gene(index))
            .collect()
    }

    fn process_gene(&self, index: usize) -> Option<RhoScore> {
        let neighbors = self.adjacency.neighbors(index);
        if neighbors.is_empty() {
            return None;
        }
        let mut percentiles = select_indices(&neighbors, self.percentiles);
        let rho = rho_statistic(&mut percentiles);
        Some(RhoScore::new(index, rho, neighbors.len()))
    }

    /// Distinct neighborhood sizes among the scored genes
    pub fn neighborhood_sizes(scores: &[RhoScore]) -> Vec<usize> {
        scores
            .iter()
            .map(|s| s.neighborhood_size)
            .sorted_unstable()
            .dedup()
            .collect()
    }
}

/// Converts raw rho into background p-values and corrects them for multiple testing
pub fn assess_neighborhoods(
    scores: &[RhoScore],
    adjacency: &AdjacencyMatrix,
    background: &BackgroundModel,
    fdr: FdrMethod,
) -> Result<RraTable> {
    let pvalues = scores
        .iter()
        .map(|s| background.pvalue(s.rho, s.neighborhood_size))
        .collect::<Result<Vec<_>>>()?;
    let adjusted = fdr.adjust(&pvalues);

    let genes = scores
        .iter()
        .map(|s| adjacency.genes()[s.index].clone())
        .collect();
    let records = scores
        .iter()
        .zip(pvalues.iter().zip(adjusted.iter()))
        .map(|(s, (p, q))| RraRecord::new(s.rho, *p, *q, s.neighborhood_size))
        .collect();
    Ok(RraTable { genes, records })
}
