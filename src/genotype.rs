//! Diploid genotype likelihoods from reference and alternate read mapping qualities

use crate::{
    phred::{Precision, ProbabilityTable},
    samples::SampleGenotypes,
    validate_genotype_config, GenotypeConfig, SvgenoError, SvgenoResult,
};
use rust_htslib::bcf::record::GenotypeAllele;
use std::fmt;
use std::sync::OnceLock;

/// Diploid genotype hypotheses, in VCF genotype order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Genotype {
    HomRef = 0,
    Het = 1,
    HomAlt = 2,
}

impl Genotype {
    pub const ALL: [Genotype; 3] = [Genotype::HomRef, Genotype::Het, Genotype::HomAlt];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Order in which likelihoods are accumulated and scanned for the best genotype.
/// Exact ties keep the earliest entry.
const SLOT_ORDER: [Genotype; 3] = [Genotype::HomAlt, Genotype::Het, Genotype::HomRef];

/// Called genotype (GT) of a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenotypeCall {
    HomRef,
    Het,
    HomAlt,
    Missing,
}

impl GenotypeCall {
    pub fn genotype(self) -> Option<Genotype> {
        match self {
            GenotypeCall::HomRef => Some(Genotype::HomRef),
            GenotypeCall::Het => Some(Genotype::Het),
            GenotypeCall::HomAlt => Some(Genotype::HomAlt),
            GenotypeCall::Missing => None,
        }
    }

    /// Unphased htslib alleles of the call
    pub fn alleles(self) -> [GenotypeAllele; 2] {
        match self {
            GenotypeCall::HomRef => [GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(0)],
            GenotypeCall::Het => [GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(1)],
            GenotypeCall::HomAlt => [GenotypeAllele::Unphased(1), GenotypeAllele::Unphased(1)],
            GenotypeCall::Missing => [
                GenotypeAllele::UnphasedMissing,
                GenotypeAllele::UnphasedMissing,
            ],
        }
    }

    /// Integer allele encoding as stored in a BCF GT field
    pub fn encoded(self) -> [i32; 2] {
        let [first, second] = self.alleles();
        [i32::from(first), i32::from(second)]
    }

    pub fn is_called(self) -> bool {
        self != GenotypeCall::Missing
    }

    pub fn is_non_ref(self) -> bool {
        matches!(self, GenotypeCall::Het | GenotypeCall::HomAlt)
    }
}

impl From<Genotype> for GenotypeCall {
    fn from(genotype: Genotype) -> Self {
        match genotype {
            Genotype::HomRef => GenotypeCall::HomRef,
            Genotype::Het => GenotypeCall::Het,
            Genotype::HomAlt => GenotypeCall::HomAlt,
        }
    }
}

impl fmt::Display for GenotypeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gt = match self {
            GenotypeCall::HomRef => "0/0",
            GenotypeCall::Het => "0/1",
            GenotypeCall::HomAlt => "1/1",
            GenotypeCall::Missing => "./.",
        };
        f.write_str(gt)
    }
}

/// Genotyping result for one sample at one variant.
///
/// `gl` and `pl` are indexed by [`Genotype`]. The best genotype has `gl == 0`
/// and every value lies between the configured floor and zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenotypeLikelihoods<P: Precision> {
    pub gl: [P; 3],
    pub pl: [u32; 3],
    pub call: GenotypeCall,
    pub gq: u32,
    pub confident: bool,
}

impl<P: Precision> GenotypeLikelihoods<P> {
    pub fn gl_of(&self, genotype: Genotype) -> P {
        self.gl[genotype.index()]
    }

    pub fn pl_of(&self, genotype: Genotype) -> u32 {
        self.pl[genotype.index()]
    }
}

/// Genotype likelihood engine.
///
/// Owns a Phred probability table sized from the configured likelihood floor.
/// The engine holds no mutable state, so one instance can be shared across
/// threads for any number of variants and samples.
#[derive(Debug, Clone)]
pub struct GenotypeEngine<P: Precision> {
    table: ProbabilityTable<P>,
    config: GenotypeConfig,
}

static SHARED_ENGINE: OnceLock<GenotypeEngine<f64>> = OnceLock::new();

impl GenotypeEngine<f64> {
    /// Process-wide engine with the default configuration, built on first use
    pub fn shared() -> &'static GenotypeEngine<f64> {
        SHARED_ENGINE.get_or_init(|| GenotypeEngine::new_unchecked(GenotypeConfig::default()))
    }
}

impl<P: Precision> GenotypeEngine<P> {
    pub fn new(config: GenotypeConfig) -> SvgenoResult<Self> {
        validate_genotype_config(&config)?;
        Ok(Self::new_unchecked(config))
    }

    fn new_unchecked(config: GenotypeConfig) -> Self {
        Self {
            table: ProbabilityTable::build_unchecked(config.smallest_gl),
            config,
        }
    }

    pub fn table(&self) -> &ProbabilityTable<P> {
        &self.table
    }

    pub fn config(&self) -> &GenotypeConfig {
        &self.config
    }

    fn error_prob<Q>(&self, phred: Q) -> SvgenoResult<P>
    where
        Q: Copy + fmt::Display + TryInto<usize>,
    {
        let index: usize = phred.try_into().map_err(|_| {
            SvgenoError::InvalidInput(format!(
                "Phred score {} is not a non-negative integer",
                phred
            ))
        })?;
        self.table.lookup(index)
    }

    /// Reject negative or out-of-table scores before any likelihood is touched
    fn validate_evidence<Q>(&self, mapq_ref: &[Q], mapq_alt: &[Q]) -> SvgenoResult<()>
    where
        Q: Copy + fmt::Display + TryInto<usize>,
    {
        for &mapq in mapq_ref.iter().chain(mapq_alt) {
            self.error_prob(mapq)?;
        }
        Ok(())
    }

    /// Compute genotype likelihoods, call and quality for one sample
    pub fn compute_genotype<Q>(
        &self,
        mapq_ref: &[Q],
        mapq_alt: &[Q],
    ) -> SvgenoResult<GenotypeLikelihoods<P>>
    where
        Q: Copy + fmt::Display + TryInto<usize>,
    {
        self.validate_evidence(mapq_ref, mapq_alt)?;

        const HOM_REF: usize = Genotype::HomRef as usize;
        const HET: usize = Genotype::Het as usize;
        const HOM_ALT: usize = Genotype::HomAlt as usize;

        let mut gl = [P::ZERO; 3];
        let depth = mapq_ref.len() + mapq_alt.len();

        for &mapq in mapq_ref {
            let e = self.error_prob(mapq)?;
            gl[HOM_ALT] = gl[HOM_ALT] + e.log10();
            gl[HET] = gl[HET] + (e + (P::ONE - e)).log10();
            gl[HOM_REF] = gl[HOM_REF] + (P::ONE - e).log10();
        }
        for &mapq in mapq_alt {
            let e = self.error_prob(mapq)?;
            gl[HOM_ALT] = gl[HOM_ALT] + (P::ONE - e).log10();
            gl[HET] = gl[HET] + ((P::ONE - e) + e).log10();
            gl[HOM_REF] = gl[HOM_REF] + e.log10();
        }
        gl[HET] = gl[HET] + -P::from_usize(depth) * P::TWO.log10();

        let best = best_slot(&gl);
        let best_gl = gl[best.index()];

        // Rescale by the best genotype and cap at the floor
        let smallest_gl = self.table.smallest_gl();
        for value in gl.iter_mut() {
            *value = *value - best_gl;
            *value = if *value > smallest_gl { *value } else { smallest_gl };
        }

        let pl = gl.map(phred_scale);

        let likelihoods = if depth > 0 && pl.iter().any(|&value| value > 0) {
            // PL <= round(-10 * floor), the table bound, since GL is capped at the floor
            let mut prob_sum = P::ZERO;
            for genotype in SLOT_ORDER {
                prob_sum = prob_sum + self.table.lookup(pl[genotype.index()] as usize)?;
            }
            let calibrated = (P::ONE - P::ONE / prob_sum).log10();
            let calibrated = if calibrated > smallest_gl {
                calibrated
            } else {
                smallest_gl
            };
            let gq = phred_scale(calibrated);

            GenotypeLikelihoods {
                gl,
                pl,
                call: GenotypeCall::from(best),
                gq,
                confident: gq > 0,
            }
        } else {
            GenotypeLikelihoods {
                gl,
                pl,
                call: GenotypeCall::Missing,
                gq: 0,
                confident: false,
            }
        };

        log::trace!(
            "Genotyped {} ref / {} alt reads: GT={} GQ={} PL={:?}",
            mapq_ref.len(),
            mapq_alt.len(),
            likelihoods.call,
            likelihoods.gq,
            likelihoods.pl
        );

        Ok(likelihoods)
    }

    /// Compute the genotype of one sample and store it in the caller's buffers
    /// at `sample_index`. Returns whether the call is confident (`GQ > 0`).
    pub fn compute_genotype_into<Q>(
        &self,
        mapq_ref: &[Q],
        mapq_alt: &[Q],
        sample_index: usize,
        output: &mut SampleGenotypes<P>,
    ) -> SvgenoResult<bool>
    where
        Q: Copy + fmt::Display + TryInto<usize>,
    {
        let likelihoods = self.compute_genotype(mapq_ref, mapq_alt)?;
        output.set_sample(sample_index, &likelihoods, self.config.min_gq_pass)?;
        Ok(likelihoods.confident)
    }
}

/// Most likely genotype, scanning in [`SLOT_ORDER`]; exact ties keep the earlier slot
fn best_slot<P: Precision>(gl: &[P; 3]) -> Genotype {
    let mut best = SLOT_ORDER[0];
    for &genotype in &SLOT_ORDER[1..] {
        if gl[genotype.index()] > gl[best.index()] {
            best = genotype;
        }
    }
    best
}

/// `round(-10 * x)` for a log10 value `x <= 0`
fn phred_scale<P: Precision>(log10_value: P) -> u32 {
    (-P::TEN * log10_value).round().to_f64() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> GenotypeEngine<f64> {
        GenotypeEngine::new(GenotypeConfig::default()).unwrap()
    }

    #[test]
    fn test_no_evidence_is_missing() {
        let result = engine().compute_genotype::<u32>(&[], &[]).unwrap();

        assert_eq!(result.call, GenotypeCall::Missing);
        assert_eq!(result.gq, 0);
        assert!(!result.confident);
        assert_eq!(result.gl, [0.0, 0.0, 0.0]);
        assert_eq!(result.pl, [0, 0, 0]);
    }

    #[test]
    fn test_reference_only_evidence() {
        let result = engine().compute_genotype(&[60u8, 60, 60], &[]).unwrap();

        assert_eq!(result.call, GenotypeCall::HomRef);
        assert_eq!(result.pl, [0, 9, 180]);
        assert_eq!(result.gl_of(Genotype::HomRef), 0.0);
        assert_eq!(result.gq, 10);
        assert!(result.confident);
    }

    #[test]
    fn test_alternate_only_evidence() {
        let result = engine().compute_genotype(&[], &[60u8, 60, 60]).unwrap();

        assert_eq!(result.call, GenotypeCall::HomAlt);
        assert_eq!(result.pl, [180, 9, 0]);
        assert_eq!(result.gq, 10);
        assert!(result.confident);
    }

    #[test]
    fn test_balanced_evidence_is_het() {
        let result = engine()
            .compute_genotype(&[60u32, 60, 60], &[60, 60, 60])
            .unwrap();

        assert_eq!(result.call, GenotypeCall::Het);
        assert_eq!(result.pl_of(Genotype::Het), 0);
        assert_eq!(result.pl_of(Genotype::HomRef), 162);
        assert_eq!(result.pl_of(Genotype::HomAlt), 162);
        assert!(result.confident);
    }

    #[test]
    fn test_hand_computed_q20() {
        let result = engine().compute_genotype(&[20i32], &[20]).unwrap();

        // log10(0.01) + log10(0.99) + 2 * log10(2)
        let expected = -2.0 + 0.99f64.log10() + 2.0 * 2.0f64.log10();
        assert!((result.gl_of(Genotype::HomRef) - expected).abs() < 1e-9);
        assert!((result.gl_of(Genotype::HomAlt) - expected).abs() < 1e-9);
        assert!((expected + 1.4023048140744874).abs() < 1e-12);
        assert_eq!(result.gl_of(Genotype::Het), 0.0);
        assert_eq!(result.pl, [14, 0, 14]);
        assert_eq!(result.call, GenotypeCall::Het);
        assert_eq!(result.gq, 11);
        assert!(result.confident);
    }

    #[test]
    fn test_zero_pl_sum_with_reads_is_missing() {
        // 10^-0.3 * (1 - 10^-0.3) is almost exactly 1/4, so all PLs round to 0
        let result = engine().compute_genotype(&[3u8], &[3]).unwrap();

        assert_eq!(result.pl, [0, 0, 0]);
        assert_eq!(result.call, GenotypeCall::Missing);
        assert_eq!(result.gq, 0);
        assert!(!result.confident);
    }

    #[test]
    fn test_best_slot_ties() {
        // [HomRef, Het, HomAlt]
        assert_eq!(best_slot(&[-1.0f64, -1.0, -1.0]), Genotype::HomAlt);
        assert_eq!(best_slot(&[-2.0f64, -0.5, -0.5]), Genotype::HomAlt);
        assert_eq!(best_slot(&[-0.5f64, -0.5, -2.0]), Genotype::Het);
        assert_eq!(best_slot(&[-0.5f64, -2.0, -0.5]), Genotype::HomAlt);
        assert_eq!(best_slot(&[0.0f32, -0.5, -2.0]), Genotype::HomRef);
        assert_eq!(best_slot(&[-3.0f64, -2.0, -2.5]), Genotype::Het);
    }

    #[test]
    fn test_saturated_quality_clamped_to_floor() {
        // 1 / sum(10^-PL/10) rounds to exactly 1, so log10(1 - 1) is -inf and
        // GQ is capped by the floor
        let result = engine().compute_genotype(&[60u32; 200], &[]).unwrap();

        assert_eq!(result.call, GenotypeCall::HomRef);
        assert_eq!(result.pl, [0, 602, 10_000]);
        assert_eq!(result.gq, 10_000);
        assert!(result.confident);

        let config = GenotypeConfig {
            smallest_gl: -20.0,
            ..GenotypeConfig::default()
        };
        let engine = GenotypeEngine::<f32>::new(config).unwrap();
        let result = engine.compute_genotype(&[60u8; 200], &[]).unwrap();
        assert_eq!(result.pl, [0, 200, 200]);
        assert_eq!(result.gq, 200);
    }

    #[test]
    fn test_deterministic() {
        let engine = engine();
        let mapq_ref = [12u16, 37, 60, 0, 255];
        let mapq_alt = [9u16, 44, 60];

        let first = engine.compute_genotype(&mapq_ref, &mapq_alt).unwrap();
        let second = engine.compute_genotype(&mapq_ref, &mapq_alt).unwrap();

        for genotype in Genotype::ALL {
            assert_eq!(
                first.gl_of(genotype).to_bits(),
                second.gl_of(genotype).to_bits()
            );
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_monotone_in_reference_reads() {
        let engine = engine();
        let mapq_alt = [30u32; 5];
        let mut mapq_ref = Vec::new();
        let mut previous = f64::NEG_INFINITY;

        for _ in 0..400 {
            let result = engine.compute_genotype(&mapq_ref, &mapq_alt).unwrap();
            let margin = result.gl_of(Genotype::HomRef) - result.gl_of(Genotype::HomAlt);
            assert!(margin >= previous - 1e-9);
            previous = margin;
            mapq_ref.push(30);
        }
        assert_eq!(previous, 1000.0);
    }

    #[test]
    fn test_likelihoods_within_floor() {
        let engine = engine();
        let cases: [(&[u32], &[u32]); 5] = [
            (&[60; 200], &[]),
            (&[0, 0], &[60]),
            (&[5, 10, 15], &[20, 25]),
            (&[], &[1, 2, 3]),
            (&[255; 50], &[255; 50]),
        ];

        for (mapq_ref, mapq_alt) in cases {
            let result = engine.compute_genotype(mapq_ref, mapq_alt).unwrap();
            assert!(result.gl.iter().all(|&gl| (-1000.0..=0.0).contains(&gl)));
            assert!(result.gl.iter().any(|&gl| gl == 0.0));
            assert!(result.pl.iter().all(|&pl| pl <= 10_000));
        }
    }

    #[test]
    fn test_pl_at_table_bound() {
        // A Phred 0 reference read rules out hom-ref entirely: GL is capped at
        // the floor and PL lands exactly on the last table entry
        let engine = engine();
        let result = engine.compute_genotype(&[0u8], &[]).unwrap();

        assert_eq!(result.gl_of(Genotype::HomRef), -1000.0);
        assert_eq!(result.pl_of(Genotype::HomRef), 10_000);
        assert_eq!(result.pl_of(Genotype::HomRef) as usize, engine.table().max_index());
        assert_eq!(result.pl, [10_000, 3, 0]);
        assert_eq!(result.call, GenotypeCall::HomAlt);
        assert_eq!(result.gq, 5);
    }

    #[test]
    fn test_pl_at_table_bound_small_floor() {
        let config = GenotypeConfig {
            smallest_gl: -5.0,
            ..GenotypeConfig::default()
        };
        let engine = GenotypeEngine::<f64>::new(config).unwrap();
        let result = engine.compute_genotype(&[40u8; 10], &[]).unwrap();

        assert_eq!(engine.table().max_index(), 50);
        assert_eq!(result.gl_of(Genotype::HomAlt), -5.0);
        assert_eq!(result.pl, [0, 30, 50]);
        assert_eq!(result.call, GenotypeCall::HomRef);
        assert_eq!(result.gq, 30);
    }

    #[test]
    fn test_score_above_table_bound() {
        let config = GenotypeConfig {
            smallest_gl: -5.0,
            ..GenotypeConfig::default()
        };
        let engine = GenotypeEngine::<f64>::new(config).unwrap();

        match engine.compute_genotype(&[60u8, 60, 60], &[]) {
            Err(SvgenoError::IndexOutOfRange { index, max_index }) => {
                assert_eq!(index, 60);
                assert_eq!(max_index, 50);
            }
            other => panic!("Expected IndexOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_score_rejected() {
        let engine = engine();

        assert!(matches!(
            engine.compute_genotype(&[60i32, -1], &[30]),
            Err(SvgenoError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.compute_genotype(&[60i64], &[-20]),
            Err(SvgenoError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_integer_width_independent() {
        let engine = engine();
        let narrow = engine.compute_genotype(&[17u8, 42], &[33u8]).unwrap();
        let wide = engine.compute_genotype(&[17i64, 42], &[33i64]).unwrap();
        assert_eq!(narrow, wide);
    }

    #[test]
    fn test_single_precision() {
        let engine = GenotypeEngine::<f32>::new(GenotypeConfig::default()).unwrap();

        let result = engine.compute_genotype(&[60u8, 60, 60], &[]).unwrap();
        assert_eq!(result.call, GenotypeCall::HomRef);
        assert_eq!(result.pl, [0, 9, 180]);
        assert_eq!(result.gq, 10);

        let result = engine.compute_genotype(&[20u8], &[20]).unwrap();
        assert_eq!(result.pl, [14, 0, 14]);
        assert_eq!(result.call, GenotypeCall::Het);
    }

    #[test]
    fn test_invalid_config() {
        let config = GenotypeConfig {
            smallest_gl: 1.0,
            ..GenotypeConfig::default()
        };
        assert!(GenotypeEngine::<f64>::new(config).is_err());
    }

    #[test]
    fn test_shared_engine() {
        let engine = GenotypeEngine::shared();
        assert!(std::ptr::eq(engine, GenotypeEngine::shared()));
        assert_eq!(engine.table().max_index(), 10_000);
        assert_eq!(engine.config(), &GenotypeConfig::default());
    }

    #[test]
    fn test_genotype_call_encoding() {
        assert_eq!(GenotypeCall::HomRef.encoded(), [2, 2]);
        assert_eq!(GenotypeCall::Het.encoded(), [2, 4]);
        assert_eq!(GenotypeCall::HomAlt.encoded(), [4, 4]);
        assert_eq!(GenotypeCall::Missing.encoded(), [0, 0]);

        assert_eq!(GenotypeCall::Het.to_string(), "0/1");
        assert_eq!(GenotypeCall::Missing.to_string(), "./.");
        assert!(GenotypeCall::HomAlt.is_non_ref());
        assert!(!GenotypeCall::HomRef.is_non_ref());
        assert!(!GenotypeCall::Missing.is_called());
        assert_eq!(GenotypeCall::Het.genotype(), Some(Genotype::Het));
    }
}
