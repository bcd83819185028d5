//! Quality-score handling: the character/score codec, encoding detection,
//! per-read statistics and score binning.
//!
//! Quality strings are ASCII by definition, so everything here operates on
//! byte slices rather than decoded strings. Scores are `i8` because Solexa
//! legally reaches -5 while Phred+33 tops out at 93.

pub mod binning;
pub mod detect;
pub mod stats;

use crate::errors::Error;

/// The three ASCII quality encodings found in FASTQ files.
///
/// Solexa is a distinct variant, not a Phred alias: it shares the +64 offset
/// with Phred+64 but permits negative scores and maps to error probability
/// through the odds ratio rather than the plain power law. Operations
/// dispatch on the variant, never on the offset alone.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Sanger / Illumina 1.8+ / SRA: offset 33, scores 0..=93
    Phred33,
    /// Illumina 1.3-1.7: offset 64, scores 0..=62
    Phred64,
    /// Solexa / Illumina 1.0: offset 64, scores -5..=62
    Solexa,
}

impl Encoding {
    pub fn offset(&self) -> u8 {
        match self {
            Encoding::Phred33 => 33,
            Encoding::Phred64 | Encoding::Solexa => 64,
        }
    }

    /// Closed score range of the variant.
    pub fn score_range(&self) -> (i8, i8) {
        match self {
            Encoding::Phred33 => (0, 93),
            Encoding::Phred64 => (0, 62),
            Encoding::Solexa => (-5, 62),
        }
    }

    /// Closed ASCII range of the variant.
    pub fn ascii_range(&self) -> (u8, u8) {
        match self {
            Encoding::Phred33 => (b'!', b'~'),
            Encoding::Phred64 => (b'@', b'~'),
            Encoding::Solexa => (b';', b'~'),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Phred33 => "Phred+33",
            Encoding::Phred64 => "Phred+64",
            Encoding::Solexa => "Solexa+64",
        }
    }
}

/// Decodes one quality character to its score.
pub fn char_to_score(ch: u8, encoding: Encoding) -> Result<i8, Error> {
    let (lo, hi) = encoding.ascii_range();
    if ch < lo || ch > hi {
        return Err(Error::new_invalid_character(ch, encoding.name(), (lo, hi)));
    }
    Ok((ch as i16 - encoding.offset() as i16) as i8)
}

/// Encodes one score to its quality character.
pub fn score_to_char(score: i8, encoding: Encoding) -> Result<u8, Error> {
    let (lo, hi) = encoding.score_range();
    if score < lo || score > hi {
        return Err(Error::new_score_out_of_range(score, encoding.name(), (lo, hi)));
    }
    Ok((score as i16 + encoding.offset() as i16) as u8)
}

/// Decodes a quality string to scores. Empty input yields an empty vector.
pub fn decode_scores(qual: &[u8], encoding: Encoding) -> Result<Vec<i8>, Error> {
    let mut scores = Vec::with_capacity(qual.len());
    for &q in qual {
        scores.push(char_to_score(q, encoding)?);
    }
    Ok(scores)
}

/// Encodes scores back to a quality string.
pub fn encode_scores(scores: &[i8], encoding: Encoding) -> Result<Vec<u8>, Error> {
    let mut qual = Vec::with_capacity(scores.len());
    for &s in scores {
        qual.push(score_to_char(s, encoding)?);
    }
    Ok(qual)
}

/// Minimum and maximum ASCII value of a quality string in a single scan,
/// without building an intermediate score vector. `None` for empty input.
pub fn ascii_extrema(qual: &[u8]) -> Option<(u8, u8)> {
    let mut iter = qual.iter();
    let first = *iter.next()?;
    let mut min = first;
    let mut max = first;
    for &q in iter {
        if q < min {
            min = q;
        }
        if q > max {
            max = q;
        }
    }
    Some((min, max))
}

/// Converts a quality string between encodings.
///
/// The numeric score is carried across unchanged and clamped to the target's
/// score range, which is lossy when the source range exceeds the target's.
/// Callers needing loss-free conversion should inspect [`ascii_extrema`]
/// first. `from == to` returns the input verbatim; each character is still
/// validated against the source range on any real conversion.
pub fn convert_quality(qual: &[u8], from: Encoding, to: Encoding) -> Result<Vec<u8>, Error> {
    if from == to {
        return Ok(qual.to_vec());
    }
    let (to_lo, to_hi) = to.score_range();
    let mut out = Vec::with_capacity(qual.len());
    for &q in qual {
        let score = char_to_score(q, from)?;
        let clamped = score.clamp(to_lo, to_hi);
        // cannot fail after the clamp
        out.push(score_to_char(clamped, to)?);
    }
    Ok(out)
}

/// Error probability of one score under its encoding's mapping.
///
/// Phred: `10^(-q/10)`. Solexa: `1/(10^(q/10)+1)` (odds-ratio scale, so
/// score 0 is probability 0.5).
pub fn error_probability(score: i8, encoding: Encoding) -> f64 {
    let q = score as f64;
    match encoding {
        Encoding::Phred33 | Encoding::Phred64 => 10f64.powf(-q / 10.0),
        Encoding::Solexa => 1.0 / (10f64.powf(q / 10.0) + 1.0),
    }
}

/// Inverse of [`error_probability`]: the score whose probability is `p`,
/// rounded and clamped into the encoding's range. `p` must lie in (0, 1].
pub fn prob_to_score(p: f64, encoding: Encoding) -> Result<i8, Error> {
    if !(p > 0.0 && p <= 1.0) {
        return Err(Error::new_invalid_probability(p));
    }
    let (lo, hi) = encoding.score_range();
    let q = match encoding {
        Encoding::Phred33 | Encoding::Phred64 => -10.0 * p.log10(),
        Encoding::Solexa => {
            if p >= 1.0 {
                return Ok(lo);
            }
            -10.0 * (p / (1.0 - p)).log10()
        }
    };
    Ok((q.round() as i64).clamp(lo as i64, hi as i64) as i8)
}
