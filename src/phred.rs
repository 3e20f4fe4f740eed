//! Phred score to error probability lookup

use crate::{validate_smallest_gl, SvgenoError, SvgenoResult};
use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Floating-point precision used for likelihood arithmetic
pub trait Precision:
    Copy
    + Debug
    + Display
    + Default
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;
    const TWO: Self;
    const TEN: Self;

    fn from_f64(value: f64) -> Self;
    fn from_usize(value: usize) -> Self;
    fn to_f64(self) -> f64;
    fn powf(self, exponent: Self) -> Self;
    fn log10(self) -> Self;
    fn round(self) -> Self;
}

macro_rules! impl_precision {
    ($float:ty) => {
        impl Precision for $float {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const TWO: Self = 2.0;
            const TEN: Self = 10.0;

            fn from_f64(value: f64) -> Self {
                value as $float
            }

            fn from_usize(value: usize) -> Self {
                value as $float
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn powf(self, exponent: Self) -> Self {
                <$float>::powf(self, exponent)
            }

            fn log10(self) -> Self {
                <$float>::log10(self)
            }

            fn round(self) -> Self {
                <$float>::round(self)
            }
        }
    };
}

impl_precision!(f32);
impl_precision!(f64);

/// Largest Phred index of the table for a log10 likelihood floor, `round(-10 * floor)`
pub fn table_max_index(smallest_gl: f64) -> usize {
    (-10.0 * smallest_gl).round() as usize
}

/// Precomputed `10^(-p/10)` for every Phred score `p` up to the table bound.
///
/// The table is immutable once built and is shared by reference between
/// genotyping threads.
#[derive(Debug, Clone)]
pub struct ProbabilityTable<P: Precision> {
    phred2prob: Vec<P>,
    smallest_gl: P,
}

impl<P: Precision> ProbabilityTable<P> {
    /// Build the table for a log10 likelihood floor (e.g. `-1000`)
    pub fn build(smallest_gl: f64) -> SvgenoResult<Self> {
        validate_smallest_gl(smallest_gl)?;
        Ok(Self::build_unchecked(smallest_gl))
    }

    pub(crate) fn build_unchecked(smallest_gl: f64) -> Self {
        let max_index = table_max_index(smallest_gl);
        let phred2prob = (0..=max_index)
            .map(|i| P::TEN.powf(-(P::from_usize(i) / P::TEN)))
            .collect();

        log::debug!(
            "Built Phred probability table with {} entries (floor {})",
            max_index + 1,
            smallest_gl
        );

        Self {
            phred2prob,
            smallest_gl: P::from_f64(smallest_gl),
        }
    }

    /// Error probability for a Phred score
    pub fn lookup(&self, phred: usize) -> SvgenoResult<P> {
        self.phred2prob
            .get(phred)
            .copied()
            .ok_or(SvgenoError::IndexOutOfRange {
                index: phred,
                max_index: self.max_index(),
            })
    }

    pub fn max_index(&self) -> usize {
        self.phred2prob.len() - 1
    }

    pub fn len(&self) -> usize {
        self.phred2prob.len()
    }

    /// Always false, a table holds at least the Phred 0 entry
    pub fn is_empty(&self) -> bool {
        self.phred2prob.is_empty()
    }

    /// The log10 likelihood floor the table was sized for
    pub fn smallest_gl(&self) -> P {
        self.smallest_gl
    }

    pub fn as_slice(&self) -> &[P] {
        &self.phred2prob
    }
}
