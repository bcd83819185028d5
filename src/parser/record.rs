//! The owned FASTQ record and the line-level predicates both parsing
//! strategies are built from.

use crate::errors::{Error, ErrorKind, ErrorPosition};
use crate::quality::stats::QualityStats;
use crate::quality::Encoding;

/// A parsed FASTQ record. Immutable once yielded by a reader; the invariant
/// `seq.len() == qual.len()` holds for every constructed record.
#[derive(Debug, Clone, PartialEq)]
pub struct FastqRecord {
    id: String,
    desc: Option<String>,
    seq: Vec<u8>,
    qual: Vec<u8>,
    encoding: Encoding,
    line_number: Option<u64>,
    scores: Option<Vec<i8>>,
    stats: Option<QualityStats>,
}

impl FastqRecord {
    /// Builds a record, enforcing the structural invariants.
    pub fn new(
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
        qual: Vec<u8>,
        encoding: Encoding,
    ) -> Result<Self, Error> {
        if id.is_empty() {
            return Err(Error::new(ErrorKind::InvalidHeader, "record ID is empty"));
        }
        if id.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(Error::new(
                ErrorKind::InvalidSequence,
                format!("record ID '{id}' contains whitespace"),
            ));
        }
        if seq.is_empty() {
            return Err(Error::new(ErrorKind::InvalidSequence, "sequence is empty")
                .at(ErrorPosition::new(0, Some(id))));
        }
        if seq.len() != qual.len() {
            return Err(Error::new_unequal_lengths(
                seq.len(),
                qual.len(),
                ErrorPosition::new(0, Some(id)),
            ));
        }
        Ok(Self {
            id,
            desc,
            seq,
            qual,
            encoding,
            line_number: None,
            scores: None,
            stats: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn qual(&self) -> &[u8] {
        &self.qual
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Number of bases (always equal to the quality length).
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Line the record's header was found on, when tracking is enabled.
    pub fn line_number(&self) -> Option<u64> {
        self.line_number
    }

    /// Decoded scores, when `parse_quality_scores` was enabled.
    pub fn scores(&self) -> Option<&[i8]> {
        self.scores.as_deref()
    }

    /// Precomputed statistics, when `parse_quality_scores` was enabled.
    pub fn stats(&self) -> Option<&QualityStats> {
        self.stats.as_ref()
    }

    pub(crate) fn set_line_number(&mut self, line: Option<u64>) {
        self.line_number = line;
    }

    pub(crate) fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    pub(crate) fn set_scores(&mut self, scores: Vec<i8>, stats: QualityStats) {
        self.scores = Some(scores);
        self.stats = Some(stats);
    }
}

/// `@` followed by at least one non-whitespace character.
pub fn is_valid_header(line: &[u8]) -> bool {
    matches!(line.split_first(), Some((b'@', rest)) if rest.iter().any(|b| !b.is_ascii_whitespace()))
}

/// `+`, optionally followed by the header's ID.
pub fn is_valid_separator(line: &[u8], expected_id: Option<&[u8]>) -> bool {
    match line.split_first() {
        Some((b'+', rest)) => match (separator_id(rest), expected_id) {
            (Some(sep_id), Some(expected)) => sep_id == expected,
            _ => true,
        },
        _ => false,
    }
}

fn separator_id(rest: &[u8]) -> Option<&[u8]> {
    let id: &[u8] = rest
        .split(|b| b.is_ascii_whitespace())
        .next()
        .unwrap_or(b"");
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

pub fn lengths_match(seq: &[u8], qual: &[u8]) -> bool {
    seq.len() == qual.len()
}

/// The leading non-whitespace run after `@`, or `None` for a malformed
/// header.
pub fn extract_id(header: &[u8]) -> Option<&[u8]> {
    let rest = header.strip_prefix(b"@")?;
    let end = rest
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Everything after the first whitespace of the header, or `None` when the
/// header carries no description.
pub fn extract_description(header: &[u8]) -> Option<&[u8]> {
    let rest = header.strip_prefix(b"@")?;
    let ws = rest.iter().position(|b| b.is_ascii_whitespace())?;
    let desc = &rest[ws + 1..];
    if desc.is_empty() {
        None
    } else {
        Some(desc)
    }
}
