//! Quality-score binning: collapse the score alphabet into a handful of
//! representative values, the way instrument vendors bin their output.

use crate::errors::Error;
use crate::quality::{char_to_score, score_to_char, Encoding};

/// A validated binning scheme: `boundaries.len() + 1` bins, one
/// representative score per bin.
#[derive(Debug, Clone, PartialEq)]
pub struct BinningStrategy {
    bins: usize,
    boundaries: Vec<i8>,
    representatives: Vec<i8>,
    encoding: Encoding,
}

impl BinningStrategy {
    /// Builds a strategy from bin boundaries. Boundaries must be non-empty,
    /// strictly ascending and inside the encoding's score range.
    ///
    /// Representatives: `b0/2` (rounded down) for the lowest bin, midpoints
    /// between consecutive boundaries, and `b[k-1]+10` (capped to the
    /// encoding maximum) for the highest.
    pub fn new(boundaries: Vec<i8>, encoding: Encoding) -> Result<Self, Error> {
        if boundaries.is_empty() {
            return Err(Error::new_invalid_boundaries("no bin boundaries given"));
        }
        let (lo, hi) = encoding.score_range();
        for &b in &boundaries {
            if b < lo || b > hi {
                return Err(Error::new_invalid_boundaries(format!(
                    "boundary {b} outside the {lo}..={hi} range of {}",
                    encoding.name()
                )));
            }
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::new_invalid_boundaries(
                "boundaries must be strictly ascending",
            ));
        }

        let k = boundaries.len();
        let mut representatives = Vec::with_capacity(k + 1);
        let first = boundaries[0];
        // keep the lowest representative inside its own bin and the range
        representatives.push(
            first
                .div_euclid(2)
                .min(first.saturating_sub(1))
                .max(lo),
        );
        for w in boundaries.windows(2) {
            representatives.push(((w[0] as i16 + w[1] as i16).div_euclid(2)) as i8);
        }
        representatives.push((boundaries[k - 1].saturating_add(10)).min(hi));

        Ok(Self {
            bins: k + 1,
            boundaries,
            representatives,
            encoding,
        })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn boundaries(&self) -> &[i8] {
        &self.boundaries
    }

    pub fn representatives(&self) -> &[i8] {
        &self.representatives
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Which bin a score falls into: bin `i` holds `[b[i-1], b[i])`.
    pub fn bin_index(&self, score: i8) -> usize {
        self.boundaries
            .iter()
            .position(|&b| score < b)
            .unwrap_or(self.bins - 1)
    }

    /// Illumina presets for 2, 3 or 5 bins (Phred+33).
    pub fn illumina(bins: usize) -> Result<Self, Error> {
        let boundaries = match bins {
            2 => vec![20],
            3 => vec![15, 30],
            5 => vec![10, 20, 25, 30],
            _ => return Err(preset_error("Illumina", bins)),
        };
        Self::new(boundaries, Encoding::Phred33)
    }

    /// PacBio presets for 2, 3 or 5 bins (Phred+33).
    pub fn pacbio(bins: usize) -> Result<Self, Error> {
        let boundaries = match bins {
            2 => vec![15],
            3 => vec![10, 20],
            5 => vec![7, 13, 20, 26],
            _ => return Err(preset_error("PacBio", bins)),
        };
        Self::new(boundaries, Encoding::Phred33)
    }

    /// Nanopore presets for 2, 3 or 5 bins (Phred+33).
    pub fn nanopore(bins: usize) -> Result<Self, Error> {
        let boundaries = match bins {
            2 => vec![12],
            3 => vec![9, 18],
            5 => vec![7, 12, 18, 25],
            _ => return Err(preset_error("Nanopore", bins)),
        };
        Self::new(boundaries, Encoding::Phred33)
    }
}

fn preset_error(platform: &str, bins: usize) -> Error {
    Error::new_invalid_boundaries(format!(
        "{platform} presets exist for 2, 3 or 5 bins, not {bins}"
    ))
}

/// Replaces each quality character by its bin representative. Idempotent:
/// binning an already-binned string is a no-op.
pub fn bin_quality(qual: &[u8], strategy: &BinningStrategy) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(qual.len());
    for &q in qual {
        let score = char_to_score(q, strategy.encoding)?;
        let rep = strategy.representatives[strategy.bin_index(score)];
        out.push(score_to_char(rep, strategy.encoding)?);
    }
    Ok(out)
}

/// Per-bin counts over a quality string.
pub fn distribution(qual: &[u8], strategy: &BinningStrategy) -> Result<Vec<usize>, Error> {
    let mut counts = vec![0usize; strategy.bins];
    for &q in qual {
        let score = char_to_score(q, strategy.encoding)?;
        counts[strategy.bin_index(score)] += 1;
    }
    Ok(counts)
}

/// Ratio of distinct characters before and after binning; 1.0 when the
/// binned string has no characters at all.
pub fn compression_ratio(original: &[u8], binned: &[u8]) -> f64 {
    let unique_binned = count_unique(binned);
    if unique_binned == 0 {
        return 1.0;
    }
    count_unique(original) as f64 / unique_binned as f64
}

fn count_unique(data: &[u8]) -> usize {
    let mut seen = [false; 256];
    let mut n = 0;
    for &b in data {
        if !seen[b as usize] {
            seen[b as usize] = true;
            n += 1;
        }
    }
    n
}
