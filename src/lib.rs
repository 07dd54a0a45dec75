//! PRODE: neighborhood-informed gene essentiality scoring
//!
//! This library scores genes from per-sample screen scores by combining a
//! gene-level signal with a neighborhood-level signal taken from an
//! interaction network.
//!
//! The main components of this library are:
//! - `BatchLinearFitter`: One OLS fit per gene against a shared design
//! - `AdjacencyFilter`: Alignment of fits and network on a common gene set
//! - `RhoAggregator`: Rank rho aggregation of neighbor percentiles
//! - `BackgroundModel`: Simulated or parametric null distribution of rho
//! - `ScoreComposer`: NIE / NICE score as `ln(u_gene * u_neigh)`
//! - `Prode`: The pipeline tying these together

mod background;
mod compose;
mod config;
mod error;
mod filter;
mod fit;
mod input;
mod math;
mod null_draw;
mod prode;
mod results;
mod rra;
mod utils;

pub use background::{BackgroundModel, ParametricBackground, SimulatedBackground};
pub use compose::ScoreComposer;
pub use config::{FdrMethod, ModalityPolicy, ProdeConfig, ResolvedConfig};
pub use error::{ProdeError, Result};
pub use filter::{check_consistency, AdjacencyFilter, FilterOutcome, FilterReason, FilteredGene};
pub use fit::{BatchLinearFitter, FitRecord, FitTable, GroupStats};
pub use input::{AdjacencyMatrix, DesignMatrix, Modality, ProdeInput, ScoreMatrix};
pub use math::{percentile_ranks, rho_statistic};
pub use prode::{run_prode, Prode};
pub use results::{GeneResult, ProdeResults, ResultTable};
pub use rra::{assess_neighborhoods, RhoAggregator, RhoScore, RraRecord, RraTable};
