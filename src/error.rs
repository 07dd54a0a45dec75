use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProdeError>;

/// Fatal failures of a PRODE run
///
/// Every variant aborts the run before a result table is assembled.
#[derive(Debug, Error)]
pub enum ProdeError {
    /// Invalid flag combination or misaligned inputs
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Design matrix cannot support an OLS fit
    #[error("fitting error: {0}")]
    Fitting(String),

    /// Stages disagree on the retained gene set
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Background construction failed (worker pool or parametric table)
    #[error("background error: {0}")]
    Background(String),
}
