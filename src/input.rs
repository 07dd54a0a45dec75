use nalgebra::DMatrix;

use crate::{
    error::{ProdeError, Result},
    utils::{first_duplicate, index_map},
};

/// Which score is computed for each gene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    /// Neighborhood-informed essential: gene signal is the mean across samples
    Nie,
    /// Neighborhood-informed context-essential: gene signal is a case/control difference
    Nice,
}

fn check_unique(ids: &[String], what: &str) -> Result<()> {
    if let Some(dup) = first_duplicate(ids) {
        return Err(ProdeError::Configuration(format!(
            "duplicate {what} identifier: {dup}"
        )));
    }
    Ok(())
}

/// Per-sample gene scores (genes x samples)
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
    genes: Vec<String>,
    samples: Vec<String>,
    values: DMatrix<f64>,
}
impl ScoreMatrix {
    pub fn new(genes: Vec<String>, samples: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        if values.nrows() != genes.len() || values.ncols() != samples.len() {
            return Err(ProdeError::Configuration(format!(
                "score matrix is {}x{} but {} genes and {} samples were given",
                values.nrows(),
                values.ncols(),
                genes.len(),
                samples.len()
            )));
        }
        check_unique(&genes, "gene")?;
        check_unique(&samples, "sample")?;
        Ok(Self {
            genes,
            samples,
            values,
        })
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }
}

/// Sample covariates (samples x covariates)
///
/// For a differential analysis the second column is the group indicator:
/// non-zero entries mark case samples, zeros mark controls.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    samples: Vec<String>,
    covariates: Vec<String>,
    values: DMatrix<f64>,
}
impl DesignMatrix {
    pub fn new(
        samples: Vec<String>,
        covariates: Vec<String>,
        values: DMatrix<f64>,
    ) -> Result<Self> {
        if values.nrows() != samples.len() || values.ncols() != covariates.len() {
            return Err(ProdeError::Configuration(format!(
                "design matrix is {}x{} but {} samples and {} covariates were given",
                values.nrows(),
                values.ncols(),
                samples.len(),
                covariates.len()
            )));
        }
        check_unique(&samples, "sample")?;
        check_unique(&covariates, "covariate")?;
        Ok(Self {
            samples,
            covariates,
            values,
        })
    }

    /// An intercept-only design over the given samples
    pub fn intercept(samples: Vec<String>) -> Result<Self> {
        let n = samples.len();
        Self::new(samples, vec!["intercept".to_string()], DMatrix::from_element(n, 1, 1.0))
    }

    /// An intercept plus case/control indicator design
    pub fn two_group(samples: Vec<String>, is_case: &[bool]) -> Result<Self> {
        if samples.len() != is_case.len() {
            return Err(ProdeError::Configuration(format!(
                "{} samples but {} group labels",
                samples.len(),
                is_case.len()
            )));
        }
        let values = DMatrix::from_fn(samples.len(), 2, |i, j| match j {
            0 => 1.0,
            _ if is_case[i] => 1.0,
            _ => 0.0,
        });
        Self::new(
            samples,
            vec!["intercept".to_string(), "group".to_string()],
            values,
        )
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn covariates(&self) -> &[String] {
        &self.covariates
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }
}

/// Square gene x gene interaction matrix
///
/// Any non-zero entry `(i, j)` with `i != j` makes gene `j` a neighbor of gene `i`.
#[derive(Debug, Clone)]
pub struct AdjacencyMatrix {
    genes: Vec<String>,
    values: DMatrix<f64>,
}
impl AdjacencyMatrix {
    pub fn new(genes: Vec<String>, values: DMatrix<f64>) -> Result<Self> {
        if !values.is_square() || values.nrows() != genes.len() {
            return Err(ProdeError::Configuration(format!(
                "adjacency matrix is {}x{} but {} genes were given",
                values.nrows(),
                values.ncols(),
                genes.len()
            )));
        }
        check_unique(&genes, "gene")?;
        Ok(Self { genes, values })
    }

    /// Builds a symmetric boolean adjacency from an edge list
    pub fn from_edges(genes: Vec<String>, edges: &[(&str, &str)]) -> Result<Self> {
        let n = genes.len();
        let mut values = DMatrix::zeros(n, n);
        for (a, b) in edges {
            let i = Self::position(&genes, a)?;
            let j = Self::position(&genes, b)?;
            values[(i, j)] = 1.0;
            values[(j, i)] = 1.0;
        }
        Self::new(genes, values)
    }

    fn position(genes: &[String], gene: &str) -> Result<usize> {
        genes.iter().position(|g| g == gene).ok_or_else(|| {
            ProdeError::Configuration(format!("edge references unknown gene: {gene}"))
        })
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Indices of the first-order neighbors of the gene at `index`
    pub fn neighbors(&self, index: usize) -> Vec<usize> {
        self.values
            .row(index)
            .iter()
            .enumerate()
            .filter(|(j, w)| *j != index && **w != 0.0)
            .map(|(j, _)| j)
            .collect()
    }

    /// Restricts the matrix to the given gene indices, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        let genes = indices.iter().map(|i| self.genes[*i].clone()).collect();
        let values = DMatrix::from_fn(indices.len(), indices.len(), |i, j| {
            self.values[(indices[i], indices[j])]
        });
        Self { genes, values }
    }
}

/// Validated bundle of everything a PRODE run consumes
#[derive(Debug, Clone)]
pub struct ProdeInput {
    scores: ScoreMatrix,
    design: DesignMatrix,
    adjacency: AdjacencyMatrix,
    modality: Modality,
}
impl ProdeInput {
    pub fn new(
        scores: ScoreMatrix,
        design: DesignMatrix,
        adjacency: AdjacencyMatrix,
        modality: Modality,
    ) -> Result<Self> {
        if scores.samples() != design.samples() {
            return Err(ProdeError::Configuration(
                "score columns and design rows must name the same samples in order".to_string(),
            ));
        }
        let scored = index_map(scores.genes());
        if !adjacency
            .genes()
            .iter()
            .any(|g| scored.contains_key(g.as_str()))
        {
            return Err(ProdeError::Configuration(
                "adjacency matrix shares no genes with the score matrix".to_string(),
            ));
        }
        Ok(Self {
            scores,
            design,
            adjacency,
            modality,
        })
    }

    pub fn scores(&self) -> &ScoreMatrix {
        &self.scores
    }

    pub fn design(&self) -> &DesignMatrix {
        &self.design
    }

    pub fn adjacency(&self) -> &AdjacencyMatrix {
        &self.adjacency
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_score_matrix_shape_mismatch() {
        let result = ScoreMatrix::new(ids("g", 3), ids("s", 2), DMatrix::zeros(3, 3));
        assert!(matches!(result, Err(ProdeError::Configuration(_))));
    }

    #[test]
    fn test_score_matrix_duplicate_gene() {
        let genes = vec!["a".to_string(), "a".to_string()];
        let result = ScoreMatrix::new(genes, ids("s", 2), DMatrix::zeros(2, 2));
        assert!(matches!(result, Err(ProdeError::Configuration(_))));
    }

    #[test]
    fn test_two_group_design() {
        let design = DesignMatrix::two_group(ids("s", 4), &[false, false, true, true]).unwrap();
        assert_eq!(design.values().column(0).sum(), 4.0);
        assert_eq!(design.values().column(1).sum(), 2.0);
        assert_eq!(design.values()[(2, 1)], 1.0);
    }

    #[test]
    fn test_adjacency_neighbors_skip_self_and_zero() {
        let mut values = DMatrix::zeros(3, 3);
        values[(0, 0)] = 1.0;
        values[(0, 2)] = 0.5;
        let adj = AdjacencyMatrix::new(ids("g", 3), values).unwrap();
        assert_eq!(adj.neighbors(0), vec![2]);
        assert!(adj.neighbors(1).is_empty());
        // asymmetric: row 2 has no entries
        assert!(adj.neighbors(2).is_empty());
    }

    #[test]
    fn test_adjacency_from_edges_unknown_gene() {
        let result = AdjacencyMatrix::from_edges(ids("g", 2), &[("g1", "g9")]);
        assert!(matches!(result, Err(ProdeError::Configuration(_))));
    }

    #[test]
    fn test_adjacency_subset_preserves_order() {
        let adj = AdjacencyMatrix::from_edges(ids("g", 3), &[("g1", "g2"), ("g2", "g3")]).unwrap();
        let sub = adj.subset(&[2, 1]);
        assert_eq!(sub.genes(), &["g3".to_string(), "g2".to_string()]);
        assert_eq!(sub.neighbors(0), vec![1]);
    }

    #[test]
    fn test_input_sample_mismatch() {
        let scores = ScoreMatrix::new(ids("g", 2), ids("s", 2), DMatrix::zeros(2, 2)).unwrap();
        let design = DesignMatrix::intercept(vec!["s2".to_string(), "s1".to_string()]).unwrap();
        let adj = AdjacencyMatrix::from_edges(ids("g", 2), &[("g1", "g2")]).unwrap();
        let result = ProdeInput::new(scores, design, adj, Modality::Nie);
        assert!(matches!(result, Err(ProdeError::Configuration(_))));
    }
}
