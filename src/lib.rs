//! # svgeno - Structural Variant Genotype Likelihoods
//!
//! Diploid genotyping of structural variants from per-read mapping qualities.
//! For each sample, reads supporting the reference and the alternate allele are
//! combined into genotype likelihoods, a genotype call and a genotype quality.

pub mod evidence;
pub mod genotype;
pub mod phred;
pub mod samples;
pub mod utils;

pub use genotype::{Genotype, GenotypeCall, GenotypeEngine, GenotypeLikelihoods};
pub use phred::{Precision, ProbabilityTable};
pub use samples::{SampleFilter, SampleGenotypes, VariantGenotypes};

/// Smallest log10 genotype likelihood reported by default
pub const DEFAULT_SMALLEST_GL: f64 = -1000.0;

/// Largest Phred index a probability table may hold, i.e. a floor of -100000
pub const MAX_TABLE_INDEX: f64 = 1_000_000.0;

/// Default GQ below which a sample call is flagged as low quality
pub const DEFAULT_MIN_GQ_PASS: u32 = 15;

/// Configuration parameters for genotyping
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeConfig {
    pub smallest_gl: f64, // Floor for log10 likelihoods, also sizes the Phred table
    pub min_gq_pass: u32, // Minimum GQ for a PASS sample filter
}

impl Default for GenotypeConfig {
    fn default() -> Self {
        Self {
            smallest_gl: DEFAULT_SMALLEST_GL,
            min_gq_pass: DEFAULT_MIN_GQ_PASS,
        }
    }
}

/// Validate a log10 likelihood floor
pub fn validate_smallest_gl(smallest_gl: f64) -> SvgenoResult<()> {
    if !smallest_gl.is_finite() {
        return Err(SvgenoError::InvalidConfig(
            "smallest GL must be a finite number".to_string(),
        ));
    }

    if smallest_gl >= 0.0 {
        return Err(SvgenoError::InvalidConfig(format!(
            "smallest GL must be negative, got {}",
            smallest_gl
        )));
    }

    if -10.0 * smallest_gl > MAX_TABLE_INDEX {
        return Err(SvgenoError::InvalidConfig(format!(
            "smallest GL {} needs a Phred table larger than {} entries",
            smallest_gl, MAX_TABLE_INDEX
        )));
    }

    Ok(())
}

/// Validate genotyping configuration parameters
pub fn validate_genotype_config(config: &GenotypeConfig) -> SvgenoResult<()> {
    validate_smallest_gl(config.smallest_gl)
}

/// Error types for the svgeno library
#[derive(Debug, thiserror::Error)]
pub enum SvgenoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("variant {variant}, sample {sample_index}: {source}")]
    Sample {
        variant: String,
        sample_index: usize,
        source: Box<SvgenoError>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Phred index {index} exceeds probability table bound {max_index}")]
    IndexOutOfRange { index: usize, max_index: usize },

    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SvgenoError {
    /// The underlying error, without variant and sample context
    pub fn root(&self) -> &SvgenoError {
        match self {
            SvgenoError::Sample { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type SvgenoResult<T> = Result<T, SvgenoError>;
