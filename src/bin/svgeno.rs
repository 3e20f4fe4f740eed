//! CLI binary for structural variant genotyping from per-read mapping qualities

use anyhow::Context;
use clap::{Parser, ValueEnum};
use env_logger::Env;
use std::path::{Path, PathBuf};
use svgeno_rs::{
    evidence::{read_evidence, write_genotype_table, EvidenceSet},
    samples::{genotype_variants, GenotypeSummary},
    utils::{ensure_parent_dirs, format_file_size, get_num_cpus, validate_file_readable, Timer},
    validate_genotype_config, GenotypeConfig, GenotypeEngine, Precision, SvgenoError,
    SvgenoResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FloatPrecision {
    Single,
    Double,
}

#[derive(Parser)]
#[command(name = "svgeno")]
#[command(about = "Diploid structural variant genotyping from read mapping qualities")]
#[command(long_about = "
svgeno computes diploid genotypes for structural variants from the mapping
qualities of reads supporting the reference and the alternate allele.

The input is a tab-separated evidence table with the columns
Variant, Sample, Ref_MapQ and Alt_MapQ. Mapping quality lists are
comma-separated; use '.' for no supporting reads. Gzip compressed input is
detected automatically.

For every variant and sample the output table reports the genotype (GT),
genotype quality (GQ), log10 genotype likelihoods (GL), Phred-scaled
likelihoods (PL) and a sample filter (FT). The output is gzip compressed
when its name ends in .gz.
")]
struct Args {
    /// Path to the input evidence TSV file
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Path to the output genotype TSV file
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Smallest log10 genotype likelihood (also bounds PL and GQ)
    #[arg(long, default_value_t = -1000.0, allow_hyphen_values = true)]
    smallest_gl: f64,

    /// Minimum genotype quality for a PASS sample filter
    #[arg(long, default_value_t = 15)]
    min_gq: u32,

    /// Floating-point precision of likelihood arithmetic
    #[arg(long, value_enum, default_value_t = FloatPrecision::Double)]
    precision: FloatPrecision,

    /// Number of threads to use for parallel processing
    #[arg(long, default_value_t = get_num_cpus())]
    threads: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Force overwrite of output file if it exists
    #[arg(short, long)]
    force: bool,
}

fn genotype_and_write<P: Precision>(
    config: GenotypeConfig,
    evidence: &EvidenceSet,
    threads: usize,
    output: &Path,
) -> SvgenoResult<GenotypeSummary> {
    let engine = GenotypeEngine::<P>::new(config)?;

    let timer = Timer::new("Genotyping variants");
    let results = genotype_variants(&engine, &evidence.variants, threads)?;
    drop(timer);

    let mut summary = GenotypeSummary::default();
    for result in &results {
        summary.merge(&result.summary);
    }

    let _timer = Timer::new("Writing genotype table");
    write_genotype_table(&results, &evidence.samples, output)?;

    Ok(summary)
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    log::info!("Starting svgeno genotyping");
    log::info!("Evidence file: {:?}", args.input);
    log::info!("Output file: {:?}", args.output);
    log::info!("Number of threads: {}", args.threads);

    validate_file_readable(&args.input)?;

    if args.output.exists() && !args.force {
        return Err(SvgenoError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Output file {:?} already exists. Use --force to overwrite.", args.output),
        ))
        .into());
    }

    ensure_parent_dirs(&args.output)?;

    let config = GenotypeConfig {
        smallest_gl: args.smallest_gl,
        min_gq_pass: args.min_gq,
    };
    validate_genotype_config(&config)?;
    log::info!(
        "Configuration: smallest GL={}, min GQ={}, precision={:?}",
        config.smallest_gl,
        config.min_gq_pass,
        args.precision
    );

    let timer = Timer::new("Reading evidence");
    let evidence = read_evidence(&args.input)
        .with_context(|| format!("failed to read evidence from {:?}", args.input))?;
    drop(timer);

    if evidence.variants.is_empty() {
        log::warn!("No variants found in the evidence file");
    }
    log::info!(
        "Read {} variants, {} samples, {} supporting reads",
        evidence.variants.len(),
        evidence.samples.len(),
        evidence.total_reads()
    );

    let summary = match args.precision {
        FloatPrecision::Single => {
            genotype_and_write::<f32>(config, &evidence, args.threads, &args.output)
        }
        FloatPrecision::Double => {
            genotype_and_write::<f64>(config, &evidence, args.threads, &args.output)
        }
    }
    .with_context(|| format!("failed to genotype {:?}", args.input))?;

    let total_calls = evidence.variants.len() * evidence.samples.len();
    if total_calls > 0 {
        log::info!("Genotype summary:");
        log::info!(
            "  Called: {} ({:.1}%)",
            summary.called,
            (summary.called as f64 / total_calls as f64) * 100.0
        );
        log::info!("  Confident: {}", summary.confident);
        log::info!("  Non-reference: {}", summary.non_ref);
    }

    log::info!("Genotypes written to: {:?}", args.output);
    if let Ok(output_size) = std::fs::metadata(&args.output).map(|m| m.len()) {
        log::info!("Output size: {}", format_file_size(output_size));
    }

    Ok(())
}

/// Print user-friendly hints for library errors
fn handle_error(error: anyhow::Error) -> ! {
    eprintln!("Error: {:#}", error);

    match error.downcast_ref::<SvgenoError>().map(SvgenoError::root) {
        Some(SvgenoError::FileNotFound(_)) => {
            eprintln!("Please check that the file exists and is readable.");
        }
        Some(SvgenoError::InvalidEvidence(_)) | Some(SvgenoError::Csv(_)) => {
            eprintln!("Please check that the evidence table has the columns Variant, Sample, Ref_MapQ and Alt_MapQ.");
        }
        Some(SvgenoError::InvalidInput(_)) => {
            eprintln!("Mapping qualities must be non-negative integers.");
        }
        Some(SvgenoError::IndexOutOfRange { .. }) => {
            eprintln!("A mapping quality exceeds the Phred table; lower --smallest-gl to enlarge it.");
        }
        Some(SvgenoError::InvalidConfig(_)) => {
            eprintln!("Please check --smallest-gl (must be a finite negative number).");
        }
        Some(SvgenoError::Io(_)) => {
            eprintln!("Please check file permissions and disk space.");
        }
        Some(SvgenoError::ThreadPool(_)) => {
            eprintln!("Please check the --threads setting.");
        }
        Some(SvgenoError::Sample { .. }) | None => {}
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_args_parse_negative_floor() {
        let args = Args::try_parse_from([
            "svgeno",
            "--input",
            "in.tsv",
            "--output",
            "out.tsv",
            "--smallest-gl",
            "-50",
            "--precision",
            "single",
        ])
        .unwrap();

        assert_eq!(args.smallest_gl, -50.0);
        assert_eq!(args.precision, FloatPrecision::Single);
        assert_eq!(args.min_gq, 15);
    }

    #[test]
    fn test_genotype_and_write_both_precisions() {
        let mut evidence_file = NamedTempFile::new().unwrap();
        writeln!(evidence_file, "Variant\tSample\tRef_MapQ\tAlt_MapQ").unwrap();
        writeln!(evidence_file, "DEL1\tS1\t60,60,60\t.").unwrap();
        writeln!(evidence_file, "DEL1\tS2\t60,60,60\t60,60,60").unwrap();
        let evidence = read_evidence(evidence_file.path()).unwrap();

        let dir = TempDir::new().unwrap();
        let runs = [
            ("f32.tsv", FloatPrecision::Single),
            ("f64.tsv", FloatPrecision::Double),
        ];
        for (name, precision) in runs {
            let output = dir.path().join(name);
            let summary = match precision {
                FloatPrecision::Single => {
                    genotype_and_write::<f32>(GenotypeConfig::default(), &evidence, 2, &output)
                }
                FloatPrecision::Double => {
                    genotype_and_write::<f64>(GenotypeConfig::default(), &evidence, 2, &output)
                }
            }
            .unwrap();

            assert_eq!(summary.called, 2);
            assert_eq!(summary.non_ref, 1);

            let content = std::fs::read_to_string(&output).unwrap();
            assert!(content.contains("DEL1\tS1\t0/0\t10\t"));
            assert!(content.contains("DEL1\tS2\t0/1\t"));
        }
    }
}
