use crate::{
    background::{BackgroundModel, ParametricBackground, SimulatedBackground},
    compose::ScoreComposer,
    config::{ProdeConfig, ResolvedConfig},
    error::Result,
    filter::{AdjacencyFilter, FilterReason, FilteredGene},
    fit::BatchLinearFitter,
    input::ProdeInput,
    results::{ProdeResults, ResultTable},
    rra::{assess_neighborhoods, RhoAggregator, RraTable},
    utils::calculate_size_counts,
};

/// An implementation of the PRODE algorithm
///
/// Scores each gene by combining its own signal with the rank rho aggregation
/// of its first-order network neighbors (NIE / NICE scores).
pub struct Prode<'a> {
    input: &'a ProdeInput,
    config: &'a ProdeConfig,
}
impl<'a> Prode<'a> {
    pub fn new(input: &'a ProdeInput, config: &'a ProdeConfig) -> Self {
        Self { input, config }
    }

    /// Run the PRODE algorithm
    ///
    /// The PRODE algorithm is a five-step process:
    /// 1. Fit one linear model per gene against the shared design
    /// 2. Align the fit table with the interaction network
    /// 3. Aggregate neighbor percentiles into a rho per gene
    /// 4. Convert rho into p-values against the background
    /// 5. Combine gene and neighborhood percentiles into the final score
    ///
    /// Every step runs on a thread pool of `workers` threads.
    pub fn run(&self) -> Result<ProdeResults> {
        let modality = self.input.modality();
        let resolved = self.config.resolve(modality)?;
        let pool = self.config.worker_pool()?;
        log::info!(
            "running PRODE ({modality:?}) on {} genes x {} samples with {} workers",
            self.input.scores().genes().len(),
            self.input.scores().samples().len(),
            pool.current_num_threads()
        );
        pool.install(|| self.run_stages(&resolved))
    }

    fn run_stages(&self, resolved: &ResolvedConfig) -> Result<ProdeResults> {
        // Fit each gene
        let fitter =
            BatchLinearFitter::new(self.input.design(), resolved.policy, resolved.group_stats)?;
        let fit_tab = fitter.fit(self.input.scores());
        log::info!("fitted {} genes ({} residual df)", fit_tab.len(), fitter.df());

        // Align with the network
        let outcome = AdjacencyFilter::new(resolved.filter_ctrl)
            .apply(&fit_tab, self.input.adjacency())?;
        let mut filtered_genes = outcome.filtered_genes;
        let adj_matrix = outcome.adj_matrix;
        let mut fit_tab = outcome.fit_tab;
        if !resolved.extended_stats {
            fit_tab
                .records
                .iter_mut()
                .for_each(|r| r.group_stats = None);
        }
        log::info!(
            "{} genes shared with the network, {} filtered",
            fit_tab.len(),
            filtered_genes.len()
        );

        // Aggregate each neighborhood
        let composer = ScoreComposer::new(resolved.scaled_est, self.config.fdr);
        let u_gene = composer.gene_percentiles(&fit_tab);
        let rho_scores = RhoAggregator::new(&u_gene, &adj_matrix)?.aggregate();
        let isolated = fit_tab.len() - rho_scores.len();
        if isolated > 0 {
            log::warn!("{isolated} genes have no neighbors and are excluded from RRA");
            let mut scored = rho_scores.iter().map(|s| s.index).peekable();
            for (index, gene) in fit_tab.genes.iter().enumerate() {
                if scored.next_if_eq(&index).is_none() {
                    filtered_genes.push(FilteredGene::new(
                        gene.clone(),
                        FilterReason::EmptyNeighborhood,
                    ));
                }
            }
        }

        log::debug!(
            "neighborhood sizes (size, genes): {:?}",
            calculate_size_counts(
                &rho_scores
                    .iter()
                    .map(|s| s.neighborhood_size)
                    .collect::<Vec<_>>()
            )
        );

        // Assess against the background
        let sizes = RhoAggregator::neighborhood_sizes(&rho_scores);
        let rra_table = if sizes.is_empty() {
            RraTable::default()
        } else {
            let background = self.build_background(&sizes)?;
            assess_neighborhoods(&rho_scores, &adj_matrix, &background, self.config.fdr)?
        };

        // Combine the results
        let rows = composer.compose(&fit_tab, &u_gene, &rra_table)?;
        let result_table = ResultTable::from_vec(rows, resolved.extended_stats);
        log::info!("scored {} genes", result_table.len());

        Ok(ProdeResults {
            result_table,
            fit_table: fit_tab,
            rra_table,
            adj_matrix,
            filtered_genes,
            modality: resolved.modality,
        })
    }

    /// Builds the rho background for the observed neighborhood sizes
    ///
    /// Simulates when requested, otherwise uses the supplied parametric table or
    /// calibrates one from a shorter simulation.
    fn build_background(&self, sizes: &[usize]) -> Result<BackgroundModel> {
        let config = self.config;
        if config.compute_background {
            log::info!(
                "simulating background: {} draws for {} neighborhood sizes",
                config.n_iter,
                sizes.len()
            );
            let simulated = SimulatedBackground::simulate(sizes, config.n_iter, config.seed)?;
            return Ok(BackgroundModel::Simulated(simulated));
        }

        let fitted = match &config.background_table {
            Some(table) => {
                let uncovered = table.uncovered(sizes);
                if !uncovered.is_empty() {
                    log::warn!(
                        "background table lacks sizes {uncovered:?}, using nearest sizes"
                    );
                }
                table.clone()
            }
            None => {
                log::info!(
                    "calibrating parametric background from {} draws per size",
                    config.calibration_iter
                );
                ParametricBackground::calibrate(sizes, config.calibration_iter, config.seed)?
            }
        };
        Ok(BackgroundModel::Fitted(fitted))
    }
}

/// Runs PRODE on validated input
pub fn run_prode(input: &ProdeInput, config: &ProdeConfig) -> Result<ProdeResults> {
    Prode::new(input, config).run()
}
