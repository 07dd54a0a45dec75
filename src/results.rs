use std::io::{self, Write};

use bon::Builder;

use crate::{
    filter::FilteredGene,
    fit::{FitTable, GroupStats},
    input::{AdjacencyMatrix, Modality},
    rra::RraTable,
};

/// Final per-gene row combining gene-level and neighborhood-level evidence
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct GeneResult {
    pub gene: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
    /// Multiple-testing adjusted gene-level p-value
    pub adj_p_value: f64,
    pub group_stats: Option<GroupStats>,
    pub neighborhood_size: usize,
    pub rho: f64,
    pub rra_p_value: f64,
    pub rra_fdr: f64,
    pub u_gene: f64,
    pub u_neigh: f64,
    /// NIE or NICE score: `ln(u_gene * u_neigh)`, lower is stronger
    pub score: f64,
}

/// Result rows ordered by score, strongest first
#[derive(Debug, Clone)]
pub struct ResultTable {
    rows: Vec<GeneResult>,
    extended: bool,
}
impl ResultTable {
    pub fn from_vec(mut rows: Vec<GeneResult>, extended: bool) -> Self {
        // Sort the results by score, gene name breaks ties
        rows.sort_unstable_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.gene.cmp(&b.gene))
        });
        Self { rows, extended }
    }

    pub fn rows(&self) -> &[GeneResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether per-group columns are reported
    pub fn extended(&self) -> bool {
        self.extended
    }

    pub fn get(&self, gene: &str) -> Option<&GeneResult> {
        self.rows.iter().find(|r| r.gene == gene)
    }

    pub fn write_tsv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write!(
            writer,
            "Gene\tEstimate\tStdError\tTValue\tPValue\tAdjPValue\tNeighbors\t\
             Rho\tRraPValue\tRraFdr\tUGene\tUNeigh\tScore"
        )?;
        if self.extended {
            write!(writer, "\tCtrlMean\tCaseMean\tCtrlSd\tCaseSd\tCtrlN\tCaseN")?;
        }
        writeln!(writer)?;

        for row in &self.rows {
            write!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                row.gene,
                row.estimate,
                row.std_error,
                row.t_value,
                row.p_value,
                row.adj_p_value,
                row.neighborhood_size,
                row.rho,
                row.rra_p_value,
                row.rra_fdr,
                row.u_gene,
                row.u_neigh,
                row.score
            )?;
            if self.extended {
                match &row.group_stats {
                    Some(s) => write!(
                        writer,
                        "\t{}\t{}\t{}\t{}\t{}\t{}",
                        s.ctrl_mean, s.case_mean, s.ctrl_sd, s.case_sd, s.ctrl_n, s.case_n
                    )?,
                    None => write!(writer, "\tNA\tNA\tNA\tNA\tNA\tNA")?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn pprint(&self) -> io::Result<()> {
        self.write_tsv(io::stdout().lock())
    }
}

/// Everything a PRODE run produces
#[derive(Debug, Clone)]
pub struct ProdeResults {
    pub result_table: ResultTable,
    /// Gene-level fits over the filtered gene set
    pub fit_table: FitTable,
    pub rra_table: RraTable,
    pub adj_matrix: AdjacencyMatrix,
    pub filtered_genes: Vec<FilteredGene>,
    pub modality: Modality,
}
