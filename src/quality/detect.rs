//! Encoding detection from the ASCII distribution of quality strings.
//!
//! The three encodings overlap heavily (59..=126 is valid in all of them),
//! so detection is statistical evidence, never proof. Only characters below
//! ASCII 59 are exclusive to Phred+33.

use crate::errors::Error;
use crate::quality::{ascii_extrema, Encoding};

/// How many records a statistical pass will sample at most.
pub const MAX_SAMPLED_RECORDS: usize = 10_000;

/// The outcome of an encoding detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub encoding: Encoding,
    /// In [0, 1]; 1.0 only on conclusive evidence
    pub confidence: f64,
    /// Human-readable observations the decision rests on
    pub evidence: Vec<String>,
}

/// Detects the most likely encoding of a single quality string.
pub fn detect(qual: &[u8]) -> Result<Encoding, Error> {
    detect_with_confidence(qual).map(|d| d.encoding)
}

/// Detects the encoding along with a confidence and the supporting evidence.
pub fn detect_with_confidence(qual: &[u8]) -> Result<Detection, Error> {
    let (min, max) =
        ascii_extrema(qual).ok_or_else(|| Error::new_unknown_encoding("empty quality string"))?;
    classify(min, max, qual.len(), None)
}

/// Detects the encoding from a stream of quality strings, sampling at most
/// [`MAX_SAMPLED_RECORDS`] records. Any character below ASCII 59 is
/// conclusive for Phred+33 (confidence 1.0).
pub fn detect_statistical<'a, I>(quals: I) -> Result<Detection, Error>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    let mut total = 0usize;
    let mut below_64 = 0usize;
    let mut above_93 = 0usize;
    let mut records = 0usize;

    for qual in quals.into_iter().take(MAX_SAMPLED_RECORDS) {
        records += 1;
        for &q in qual {
            if q < min {
                min = q;
            }
            if q > max {
                max = q;
            }
            if q < 64 {
                below_64 += 1;
            }
            if q > 93 {
                above_93 += 1;
            }
        }
        total += qual.len();
    }

    if total == 0 {
        return Err(Error::new_unknown_encoding(format!(
            "no quality characters in {records} sampled records"
        )));
    }

    let fractions = Some(Fractions {
        records,
        below_64: below_64 as f64 / total as f64,
        above_93: above_93 as f64 / total as f64,
    });
    classify(min, max, total, fractions)
}

struct Fractions {
    records: usize,
    below_64: f64,
    above_93: f64,
}

fn classify(min: u8, max: u8, total: usize, stats: Option<Fractions>) -> Result<Detection, Error> {
    let mut evidence = vec![format!(
        "ASCII range {min}-{max} over {total} quality characters"
    )];
    if let Some(f) = stats.as_ref() {
        evidence.push(format!(
            "sampled {} records, {:.1}% of characters below 64, {:.1}% above 93",
            f.records,
            f.below_64 * 100.0,
            f.above_93 * 100.0
        ));
    }

    if max > 126 {
        return Err(Error::new_unknown_encoding(format!(
            "ASCII value {max} above 126 is valid in no FASTQ encoding"
        )));
    }
    if min < 33 {
        return Err(Error::new_unknown_encoding(format!(
            "ASCII value {min} below 33 is valid in no FASTQ encoding"
        )));
    }

    if min < 59 {
        evidence.push(format!(
            "character {} below 59 occurs only in Phred+33",
            min as char
        ));
        // a statistical pass treats this as conclusive
        let confidence = if stats.is_some() { 1.0 } else { 0.95 };
        return Ok(Detection {
            encoding: Encoding::Phred33,
            confidence,
            evidence,
        });
    }

    if min < 64 {
        evidence.push("minimum in 59-63 suggests Solexa negative scores".to_string());
        return Ok(Detection {
            encoding: Encoding::Solexa,
            confidence: 0.75,
            evidence,
        });
    }

    // NovaSeq-style binned output sits in a narrow high band that would
    // otherwise be claimed by the Phred+64 rule below.
    if min >= 70 && max <= 93 && max - min <= 5 {
        evidence.push("narrow high-quality band matches binned Phred+33 output".to_string());
        return Ok(Detection {
            encoding: Encoding::Phred33,
            confidence: 0.9,
            evidence,
        });
    }

    if max <= 104 {
        evidence.push("all characters in 64-104 match typical Phred+64 data".to_string());
        return Ok(Detection {
            encoding: Encoding::Phred64,
            confidence: 0.85,
            evidence,
        });
    }

    evidence.push("no discriminating characters, defaulting to the modern encoding".to_string());
    Ok(Detection {
        encoding: Encoding::Phred33,
        confidence: 0.55,
        evidence,
    })
}
