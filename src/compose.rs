use crate::{
    config::FdrMethod,
    error::{ProdeError, Result},
    fit::FitTable,
    math::percentile_ranks,
    results::GeneResult,
    rra::RraTable,
    utils::index_map,
};

/// Joins gene-level and neighborhood-level evidence into the final score
pub struct ScoreComposer {
    scaled_est: bool,
    fdr: FdrMethod,
}
impl ScoreComposer {
    pub fn new(scaled_est: bool, fdr: FdrMethod) -> Self {
        Self { scaled_est, fdr }
    }

    /// Percentile of each gene's signal across the table, in table order
    ///
    /// Ranks the t-statistic when `scaled_est` is set, the raw estimate otherwise.
    /// Lower percentiles correspond to more negative signals.
    pub fn gene_percentiles(&self, fit_tab: &FitTable) -> Vec<f64> {
        let signal = fit_tab
            .records
            .iter()
            .map(|r| if self.scaled_est { r.t_value } else { r.estimate })
            .collect::<Vec<_>>();
        percentile_ranks(&signal)
    }

    /// Builds one result row per gene of the RRA table
    ///
    /// `u_gene` must follow the order of `fit_tab`. Every RRA gene has to be
    /// present in the fit table.
    pub fn compose(
        &self,
        fit_tab: &FitTable,
        u_gene: &[f64],
        rra: &RraTable,
    ) -> Result<Vec<GeneResult>> {
        if u_gene.len() != fit_tab.len() {
            return Err(ProdeError::Consistency(format!(
                "{} gene percentiles for {} fitted genes",
                u_gene.len(),
                fit_tab.len()
            )));
        }
        let pvalues = fit_tab.records.iter().map(|r| r.p_value).collect::<Vec<_>>();
        let adjusted = self.fdr.adjust(&pvalues);
        let fit_index = index_map(&fit_tab.genes);

        rra.genes
            .iter()
            .zip(rra.records.iter())
            .map(|(gene, neigh)| {
                let idx = *fit_index.get(gene.as_str()).ok_or_else(|| {
                    ProdeError::Consistency(format!("gene {gene} has an RRA record but no fit"))
                })?;
                let fit = &fit_tab.records[idx];
                let u_neigh = neigh.p_value;
                Ok(GeneResult::builder()
                    .gene(gene.clone())
                    .estimate(fit.estimate)
                    .std_error(fit.std_error)
                    .t_value(fit.t_value)
                    .p_value(fit.p_value)
                    .adj_p_value(adjusted[idx])
                    .maybe_group_stats(fit.group_stats)
                    .neighborhood_size(neigh.neighborhood_size)
                    .rho(neigh.rho)
                    .rra_p_value(neigh.p_value)
                    .rra_fdr(neigh.fdr)
                    .u_gene(u_gene[idx])
                    .u_neigh(u_neigh)
                    .score((u_gene[idx] * u_neigh).ln())
                    .build())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fit::FitRecord, rra::RraRecord};
    use approx::assert_relative_eq;

    fn fit_table() -> FitTable {
        FitTable {
            genes: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            records: vec![
                // large effect, small t
                FitRecord::new(-5.0, 5.0, -1.0, 0.3, None),
                FitRecord::new(-1.0, 0.1, -10.0, 0.001, None),
                FitRecord::new(2.0, 1.0, 2.0, 0.1, None),
            ],
        }
    }

    fn rra_table(genes: &[&str]) -> RraTable {
        RraTable {
            genes: genes.iter().map(|g| g.to_string()).collect(),
            records: genes
                .iter()
                .map(|_| RraRecord::new(0.2, 0.5, 0.6, 2))
                .collect(),
        }
    }

    #[test]
    fn test_scaled_estimate_ranks_t_values() {
        let scaled = ScoreComposer::new(true, FdrMethod::BenjaminiHochberg);
        assert_eq!(scaled.gene_percentiles(&fit_table()), vec![0.5, 0.25, 0.75]);

        let raw = ScoreComposer::new(false, FdrMethod::BenjaminiHochberg);
        let raw = raw.gene_percentiles(&fit_table());
        assert_eq!(raw, vec![0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_score_is_log_product() {
        let composer = ScoreComposer::new(true, FdrMethod::BenjaminiHochberg);
        let fit = fit_table();
        let u_gene = composer.gene_percentiles(&fit);
        let rows = composer.compose(&fit, &u_gene, &rra_table(&["b", "c"])).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].gene, "b");
        assert_relative_eq!(rows[0].score, (0.25_f64 * 0.5).ln(), epsilon = 1e-12);
        assert_relative_eq!(rows[1].score, (0.75_f64 * 0.5).ln(), epsilon = 1e-12);
        assert!(rows.iter().all(|r| r.score <= 0.0));
        assert!(rows[0].adj_p_value >= rows[0].p_value);
    }

    #[test]
    fn test_unknown_rra_gene_is_fatal() {
        let composer = ScoreComposer::new(true, FdrMethod::BenjaminiHochberg);
        let fit = fit_table();
        let u_gene = composer.gene_percentiles(&fit);
        let result = composer.compose(&fit, &u_gene, &rra_table(&["z"]));
        assert!(matches!(result, Err(ProdeError::Consistency(_))));
    }

    #[test]
    fn test_percentile_length_mismatch() {
        let composer = ScoreComposer::new(true, FdrMethod::BenjaminiHochberg);
        let result = composer.compose(&fit_table(), &[0.5], &rra_table(&["a"]));
        assert!(matches!(result, Err(ProdeError::Consistency(_))));
    }
}
