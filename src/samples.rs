//! Multi-sample genotype buffers and batch genotyping across variants

use crate::{
    genotype::{GenotypeCall, GenotypeEngine, GenotypeLikelihoods},
    phred::Precision,
    SvgenoError, SvgenoResult,
};
use rayon::prelude::*;
use rust_htslib::bcf::record::GenotypeAllele;
use std::fmt;

/// Read evidence for one sample at one variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleEvidence {
    pub mapq_ref: Vec<i32>, // Mapping qualities of reference-supporting reads
    pub mapq_alt: Vec<i32>, // Mapping qualities of alternate-supporting reads
}

impl SampleEvidence {
    pub fn new(mapq_ref: Vec<i32>, mapq_alt: Vec<i32>) -> Self {
        Self { mapq_ref, mapq_alt }
    }

    pub fn depth(&self) -> usize {
        self.mapq_ref.len() + self.mapq_alt.len()
    }
}

/// Read evidence for all samples at one structural variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantEvidence {
    pub id: String,
    pub samples: Vec<SampleEvidence>,
}

impl VariantEvidence {
    pub fn new(id: String, samples: Vec<SampleEvidence>) -> Self {
        Self { id, samples }
    }
}

/// Per-sample FT value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFilter {
    Pass,
    LowQual,
}

impl SampleFilter {
    pub fn from_gq(gq: u32, min_gq_pass: u32) -> Self {
        if gq < min_gq_pass {
            SampleFilter::LowQual
        } else {
            SampleFilter::Pass
        }
    }
}

impl fmt::Display for SampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFilter::Pass => f.write_str("PASS"),
            SampleFilter::LowQual => f.write_str("LowQual"),
        }
    }
}

/// Flat per-sample genotype fields of one variant record.
///
/// Sample `i` owns `gt[2i..2i+2]`, `gl[3i..3i+3]`, `pl[3i..3i+3]`, `gq[i]`
/// and `ft[i]`. GT uses the BCF integer allele encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGenotypes<P: Precision> {
    pub gt: Vec<i32>,
    pub gl: Vec<P>,
    pub pl: Vec<i32>,
    pub gq: Vec<i32>,
    pub ft: Vec<SampleFilter>,
}

impl<P: Precision> SampleGenotypes<P> {
    /// Buffers for `num_samples` samples, every sample a missing call
    pub fn new(num_samples: usize) -> Self {
        Self {
            gt: vec![i32::from(GenotypeAllele::UnphasedMissing); num_samples * 2],
            gl: vec![P::ZERO; num_samples * 3],
            pl: vec![0; num_samples * 3],
            gq: vec![0; num_samples],
            ft: vec![SampleFilter::LowQual; num_samples],
        }
    }

    pub fn num_samples(&self) -> usize {
        self.gq.len()
    }

    fn check_index(&self, sample_index: usize) -> SvgenoResult<()> {
        if sample_index >= self.num_samples() {
            return Err(SvgenoError::InvalidInput(format!(
                "sample index {} out of range for {} samples",
                sample_index,
                self.num_samples()
            )));
        }
        Ok(())
    }

    /// Store one sample's genotyping result in its slot
    pub fn set_sample(
        &mut self,
        sample_index: usize,
        likelihoods: &GenotypeLikelihoods<P>,
        min_gq_pass: u32,
    ) -> SvgenoResult<()> {
        self.check_index(sample_index)?;

        let [first, second] = likelihoods.call.encoded();
        self.gt[sample_index * 2] = first;
        self.gt[sample_index * 2 + 1] = second;

        for (slot, &gl) in self.gl[sample_index * 3..sample_index * 3 + 3]
            .iter_mut()
            .zip(&likelihoods.gl)
        {
            *slot = gl;
        }
        for (slot, &pl) in self.pl[sample_index * 3..sample_index * 3 + 3]
            .iter_mut()
            .zip(&likelihoods.pl)
        {
            *slot = pl as i32;
        }

        self.gq[sample_index] = likelihoods.gq as i32;
        self.ft[sample_index] = SampleFilter::from_gq(likelihoods.gq, min_gq_pass);

        Ok(())
    }

    /// Decode the GT of a sample
    pub fn call(&self, sample_index: usize) -> SvgenoResult<GenotypeCall> {
        self.check_index(sample_index)?;
        let encoded = [self.gt[sample_index * 2], self.gt[sample_index * 2 + 1]];

        [
            GenotypeCall::HomRef,
            GenotypeCall::Het,
            GenotypeCall::HomAlt,
            GenotypeCall::Missing,
        ]
        .into_iter()
        .find(|call| call.encoded() == encoded)
        .ok_or_else(|| {
            SvgenoError::InvalidInput(format!(
                "unexpected GT encoding {:?} for sample {}",
                encoded, sample_index
            ))
        })
    }

    pub fn sample_gl(&self, sample_index: usize) -> &[P] {
        &self.gl[sample_index * 3..sample_index * 3 + 3]
    }

    pub fn sample_pl(&self, sample_index: usize) -> &[i32] {
        &self.pl[sample_index * 3..sample_index * 3 + 3]
    }
}

/// Call counts over the samples of one variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenotypeSummary {
    pub called: usize,
    pub confident: usize,
    pub non_ref: usize,
}

impl GenotypeSummary {
    pub fn merge(&mut self, other: &GenotypeSummary) {
        self.called += other.called;
        self.confident += other.confident;
        self.non_ref += other.non_ref;
    }
}

/// Genotypes of all samples at one variant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantGenotypes<P: Precision> {
    pub id: String,
    pub genotypes: SampleGenotypes<P>,
    pub summary: GenotypeSummary,
}

/// Genotype every sample of a variant
pub fn genotype_variant<P: Precision>(
    engine: &GenotypeEngine<P>,
    variant: &VariantEvidence,
) -> SvgenoResult<VariantGenotypes<P>> {
    let mut genotypes = SampleGenotypes::new(variant.samples.len());
    let mut summary = GenotypeSummary::default();

    for (sample_index, evidence) in variant.samples.iter().enumerate() {
        let confident = engine
            .compute_genotype_into(
                &evidence.mapq_ref,
                &evidence.mapq_alt,
                sample_index,
                &mut genotypes,
            )
            .map_err(|e| SvgenoError::Sample {
                variant: variant.id.clone(),
                sample_index,
                source: Box::new(e),
            })?;

        let call = genotypes.call(sample_index)?;
        if call.is_called() {
            summary.called += 1;
        }
        if call.is_non_ref() {
            summary.non_ref += 1;
        }
        if confident {
            summary.confident += 1;
        }
    }

    log::debug!(
        "Variant {}: {} of {} samples called, {} non-ref",
        variant.id,
        summary.called,
        variant.samples.len(),
        summary.non_ref
    );

    Ok(VariantGenotypes {
        id: variant.id.clone(),
        genotypes,
        summary,
    })
}

/// Genotype many variants in parallel. Results keep the input order.
pub fn genotype_variants<P: Precision>(
    engine: &GenotypeEngine<P>,
    variants: &[VariantEvidence],
    num_threads: usize,
) -> SvgenoResult<Vec<VariantGenotypes<P>>> {
    if variants.is_empty() {
        return Ok(Vec::new());
    }

    let num_threads = num_threads.clamp(1, variants.len());
    let chunk_size = variants.len().div_ceil(num_threads);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?;

    // One chunk of variants per worker, each worker owns its output buffers
    let chunk_results: SvgenoResult<Vec<Vec<VariantGenotypes<P>>>> = pool.install(|| {
        variants
            .par_chunks(chunk_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|variant| genotype_variant(engine, variant))
                    .collect()
            })
            .collect()
    });

    Ok(chunk_results?.into_iter().flatten().collect())
}
