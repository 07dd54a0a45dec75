use std::collections::HashSet;

use derive_new::new;

use crate::{
    error::{ProdeError, Result},
    fit::FitTable,
    input::AdjacencyMatrix,
    utils::{first_duplicate, index_map},
};

/// Why a gene is absent from the result table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterReason {
    /// Scored gene missing from the interaction network
    MissingFromNetwork,
    /// Network gene without a score
    MissingFromScores,
    /// Control-group mean above zero
    ControlSignal,
    /// Retained gene with no neighbors after filtering
    EmptyNeighborhood,
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct FilteredGene {
    pub gene: String,
    pub reason: FilterReason,
}

/// Fit table and adjacency restricted to a common gene set
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub filtered_genes: Vec<FilteredGene>,
    pub fit_tab: FitTable,
    pub adj_matrix: AdjacencyMatrix,
}

/// Aligns the fit table with the interaction network
pub struct AdjacencyFilter {
    filter_ctrl: bool,
}
impl AdjacencyFilter {
    pub fn new(filter_ctrl: bool) -> Self {
        Self { filter_ctrl }
    }

    /// Restricts both inputs to their shared genes, in adjacency order
    ///
    /// With control filtering enabled, genes whose control-group mean is above
    /// zero are dropped as well. Every dropped gene is reported with its reason.
    pub fn apply(&self, fit_tab: &FitTable, adjacency: &AdjacencyMatrix) -> Result<FilterOutcome> {
        let fit_index = index_map(&fit_tab.genes);
        let adj_genes = adjacency.genes().iter().collect::<HashSet<_>>();
        let mut filtered_genes = fit_tab
            .genes
            .iter()
            .filter(|g| !adj_genes.contains(g))
            .map(|g| FilteredGene::new(g.clone(), FilterReason::MissingFromNetwork))
            .collect::<Vec<_>>();

        let mut adj_keep = Vec::new();
        let mut fit_keep = Vec::new();
        for (adj_idx, gene) in adjacency.genes().iter().enumerate() {
            let Some(&fit_idx) = fit_index.get(gene.as_str()) else {
                filtered_genes.push(FilteredGene::new(
                    gene.clone(),
                    FilterReason::MissingFromScores,
                ));
                continue;
            };
            if self.filter_ctrl && self.fails_control(fit_tab, fit_idx, gene)? {
                filtered_genes.push(FilteredGene::new(gene.clone(), FilterReason::ControlSignal));
                continue;
            }
            adj_keep.push(adj_idx);
            fit_keep.push(fit_idx);
        }

        let outcome = FilterOutcome {
            filtered_genes,
            fit_tab: fit_tab.subset(&fit_keep),
            adj_matrix: adjacency.subset(&adj_keep),
        };
        check_consistency(&outcome.fit_tab, &outcome.adj_matrix)?;

        log::debug!(
            "adjacency filter retained {} genes and dropped {}",
            outcome.fit_tab.len(),
            outcome.filtered_genes.len()
        );
        Ok(outcome)
    }

    fn fails_control(&self, fit_tab: &FitTable, fit_idx: usize, gene: &str) -> Result<bool> {
        match fit_tab.records[fit_idx].group_stats {
            Some(stats) => Ok(stats.ctrl_mean > 0.0),
            None => Err(ProdeError::Configuration(format!(
                "control filtering requested but gene {gene} has no group statistics"
            ))),
        }
    }
}

/// Verifies that the fit table and adjacency name the same genes in the same order
pub fn check_consistency(fit_tab: &FitTable, adjacency: &AdjacencyMatrix) -> Result<()> {
    if fit_tab.genes.len() != fit_tab.records.len() {
        return Err(ProdeError::Consistency(format!(
            "fit table has {} genes but {} records",
            fit_tab.genes.len(),
            fit_tab.records.len()
        )));
    }
    if let Some(dup) = first_duplicate(&fit_tab.genes) {
        return Err(ProdeError::Consistency(format!(
            "gene {dup} appears more than once after filtering"
        )));
    }
    if fit_tab.genes != adjacency.genes() {
        return Err(ProdeError::Consistency(
            "fit table and adjacency matrix gene sets diverge after filtering".to_string(),
        ));
    }
    Ok(())
}
