//! Evidence table input and genotype table output
//!
//! The evidence table is a tab-separated file with one row per variant and
//! sample:
//!
//! ```text
//! Variant  Sample   Ref_MapQ   Alt_MapQ
//! DEL0001  NA12878  60,60,37   60,20
//! DEL0001  NA12891  60,60,60   .
//! ```
//!
//! Mapping quality lists are comma-separated; `.` or an empty field means no
//! supporting reads.

use crate::{
    phred::Precision,
    samples::{SampleEvidence, VariantEvidence, VariantGenotypes},
    utils::{create_writer, open_reader},
    SvgenoError, SvgenoResult,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct EvidenceRow {
    #[serde(rename = "Variant")]
    variant: String,
    #[serde(rename = "Sample")]
    sample: String,
    #[serde(rename = "Ref_MapQ", default)]
    ref_mapq: String,
    #[serde(rename = "Alt_MapQ", default)]
    alt_mapq: String,
}

/// Variants with per-sample evidence, samples in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceSet {
    pub samples: Vec<String>,
    pub variants: Vec<VariantEvidence>,
}

impl EvidenceSet {
    pub fn total_reads(&self) -> usize {
        self.variants
            .iter()
            .flat_map(|variant| variant.samples.iter())
            .map(SampleEvidence::depth)
            .sum()
    }
}

/// Parse a comma-separated mapping quality list
pub fn parse_mapq_list(field: &str) -> SvgenoResult<Vec<i32>> {
    let field = field.trim();
    if field.is_empty() || field == "." {
        return Ok(Vec::new());
    }

    field
        .split(',')
        .map(|value| {
            value.trim().parse::<i32>().map_err(|_| {
                SvgenoError::InvalidEvidence(format!("Invalid mapping quality: {}", value))
            })
        })
        .collect()
}

/// Read the evidence table. Repeated rows for the same variant and sample are
/// pooled; samples missing from a variant get empty evidence.
pub fn read_evidence<P: AsRef<Path>>(path: P) -> SvgenoResult<EvidenceSet> {
    let reader = open_reader(&path)?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut sample_index: HashMap<String, usize> = HashMap::new();
    let mut variant_index: HashMap<String, usize> = HashMap::new();
    let mut samples: Vec<String> = Vec::new();
    let mut variant_rows: Vec<(String, HashMap<usize, SampleEvidence>)> = Vec::new();

    for result in csv_reader.deserialize() {
        let row: EvidenceRow = result?;

        let mapq_ref = parse_mapq_list(&row.ref_mapq)?;
        let mapq_alt = parse_mapq_list(&row.alt_mapq)?;

        let s = *sample_index.entry(row.sample.clone()).or_insert_with(|| {
            samples.push(row.sample.clone());
            samples.len() - 1
        });
        let v = *variant_index.entry(row.variant.clone()).or_insert_with(|| {
            variant_rows.push((row.variant.clone(), HashMap::new()));
            variant_rows.len() - 1
        });

        let evidence = variant_rows[v].1.entry(s).or_default();
        if evidence.depth() > 0 {
            log::debug!(
                "Pooling repeated evidence for variant {} sample {}",
                row.variant,
                row.sample
            );
        }
        evidence.mapq_ref.extend(mapq_ref);
        evidence.mapq_alt.extend(mapq_alt);
    }

    let num_samples = samples.len();
    let variants = variant_rows
        .into_iter()
        .map(|(id, mut by_sample)| {
            let evidence = (0..num_samples)
                .map(|s| by_sample.remove(&s).unwrap_or_default())
                .collect();
            VariantEvidence::new(id, evidence)
        })
        .collect::<Vec<_>>();

    log::info!(
        "Read evidence for {} variants across {} samples",
        variants.len(),
        num_samples
    );

    Ok(EvidenceSet { samples, variants })
}

fn join_values<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Write genotype results to a TSV file, one row per variant and sample
pub fn write_genotype_table<P: Precision, Q: AsRef<Path>>(
    results: &[VariantGenotypes<P>],
    samples: &[String],
    output_path: Q,
) -> SvgenoResult<()> {
    let mut writer = create_writer(&output_path)?;

    writeln!(writer, "Variant\tSample\tGT\tGQ\tGL\tPL\tFT")?;

    for result in results {
        let genotypes = &result.genotypes;
        if genotypes.num_samples() != samples.len() {
            return Err(SvgenoError::InvalidInput(format!(
                "variant {} has {} samples, expected {}",
                result.id,
                genotypes.num_samples(),
                samples.len()
            )));
        }

        for (sample_index, sample) in samples.iter().enumerate() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                result.id,
                sample,
                genotypes.call(sample_index)?,
                genotypes.gq[sample_index],
                join_values(genotypes.sample_gl(sample_index)),
                join_values(genotypes.sample_pl(sample_index)),
                genotypes.ft[sample_index],
            )?;
        }
    }

    writer.finish()
}
